//! Integration tests for reflection loading and binding flattening.

use std::io::Write;
use std::path::Path;

use serde_json::{Value, json};
use tempfile::NamedTempFile;
use vkframe_material::builder::flatten_bindings;
use vkframe_material::reflection::{
    ResourceFormat, ResourceKind, SimpleType, load_layout, parse_layout,
};
use vkframe_material::{BindingKind, MaterialError, PropertyKind, PropertyLayout};
use vkframe_rhi::shader::ShaderStage;

fn float32() -> Value {
    json!({ "kind": "scalar", "scalarType": "float32" })
}

fn mat44_field(name: &str) -> Value {
    json!({
        "name": name,
        "type": { "kind": "matrix", "rowCount": 4, "columnCount": 4, "elementType": float32() }
    })
}

fn texture_field(name: &str, binding: u32) -> Value {
    json!({
        "name": name,
        "binding": { "kind": "descriptorTableSlot", "index": binding },
        "type": {
            "kind": "resource",
            "baseShape": "texture2D",
            "resultType": { "kind": "vector", "elementCount": 4, "elementType": float32() }
        }
    })
}

fn sampler_field(name: &str, binding: u32) -> Value {
    json!({
        "name": name,
        "binding": { "kind": "descriptorTableSlot", "index": binding },
        "type": { "kind": "samplerState" }
    })
}

fn struct_field(name: &str, fields: Vec<Value>) -> Value {
    json!({ "name": name, "type": { "kind": "struct", "fields": fields } })
}

fn parameter_block(name: &str, space: u32, fields: Vec<Value>, bindings: Vec<Value>) -> Value {
    json!({
        "name": name,
        "binding": { "kind": "subElementRegisterSpace", "index": space },
        "type": {
            "kind": "parameterBlock",
            "elementVarLayout": {
                "type": { "kind": "struct", "fields": fields },
                "bindings": bindings
            }
        }
    })
}

fn document(parameters: Vec<Value>, entry_points: Vec<Value>) -> String {
    json!({ "parameters": parameters, "entryPoints": entry_points }).to_string()
}

fn default_entry_points() -> Vec<Value> {
    vec![
        json!({ "name": "vertexMain", "stage": "vertex" }),
        json!({ "name": "fragmentMain", "stage": "fragment" }),
    ]
}

/// Every object's child count matches its `fields`, and every leaf binding
/// matches the field's `binding.index`.
fn assert_round_trip(source_fields: &[Value], node: &PropertyLayout) {
    let children = node.children();
    assert_eq!(children.len(), source_fields.len(), "children of '{}'", node.name);

    for (field, child) in source_fields.iter().zip(children) {
        assert_eq!(field["name"].as_str(), Some(child.name.as_str()));
        match &child.kind {
            PropertyKind::Object { .. } => {
                let fields = field["type"]["fields"].as_array().unwrap();
                assert_round_trip(fields, child);
            }
            PropertyKind::Resource { binding, .. } | PropertyKind::Sampler { binding } => {
                assert_eq!(field["binding"]["index"].as_u64(), Some(u64::from(*binding)));
            }
            PropertyKind::Simple(_) => {}
        }
    }
}

#[test]
fn test_mvp_albedo_scenario() {
    let doc = document(
        vec![parameter_block(
            "params",
            0,
            vec![mat44_field("mvp"), texture_field("albedo", 1)],
            vec![],
        )],
        default_entry_points(),
    );

    let layout = parse_layout(&doc).unwrap();

    assert_eq!(layout.sets.len(), 1);
    let root = &layout.sets[0].root;
    assert_eq!(root.name, "params");
    assert_eq!(root.children().len(), 2);

    let mvp = &root.children()[0];
    assert_eq!(mvp.name, "mvp");
    assert_eq!(mvp.kind, PropertyKind::Simple(SimpleType::Float44));

    let albedo = &root.children()[1];
    assert_eq!(albedo.name, "albedo");
    assert_eq!(
        albedo.kind,
        PropertyKind::Resource {
            kind: ResourceKind::Texture2D,
            format: ResourceFormat::Float4,
            binding: 1,
        }
    );
}

#[test]
fn test_round_trip_nested_structs() {
    let fields = vec![
        mat44_field("model"),
        struct_field(
            "surface",
            vec![
                texture_field("albedo", 1),
                sampler_field("albedo_sampler", 2),
                struct_field("detail", vec![texture_field("normal", 3)]),
            ],
        ),
        sampler_field("shadow_sampler", 4),
    ];
    let doc = document(
        vec![parameter_block("params", 0, fields.clone(), vec![])],
        default_entry_points(),
    );

    let layout = parse_layout(&doc).unwrap();
    assert_round_trip(&fields, &layout.sets[0].root);
}

#[test]
fn test_block_bindings_offsets() {
    let doc = document(
        vec![parameter_block(
            "params",
            0,
            vec![texture_field("albedo", 1), sampler_field("albedo_sampler", 2)],
            vec![
                json!({ "kind": "descriptorTableSlot", "index": 4 }),
                json!({ "kind": "uniform", "offset": 16, "size": 64 }),
            ],
        )],
        default_entry_points(),
    );

    let layout = parse_layout(&doc).unwrap();
    let set = &layout.sets[0];
    assert_eq!(set.binding_offset, 4);
    assert_eq!(set.uniform_offset, 16);
    assert_eq!(set.uniform_size, 64);

    let slots = flatten_bindings(set);
    let summary: Vec<_> = slots.iter().map(|s| (s.binding, s.kind)).collect();
    assert_eq!(
        summary,
        vec![
            (5, BindingKind::SampledImage),
            (6, BindingKind::Sampler),
            (0, BindingKind::UniformBuffer),
        ]
    );
}

#[test]
fn test_flatten_twice_is_identical() {
    let doc = document(
        vec![parameter_block(
            "params",
            0,
            vec![
                texture_field("a", 1),
                struct_field("inner", vec![sampler_field("s", 2), texture_field("b", 3)]),
            ],
            vec![json!({ "kind": "uniform", "offset": 0, "size": 128 })],
        )],
        default_entry_points(),
    );

    let first = parse_layout(&doc).unwrap();
    let second = parse_layout(&doc).unwrap();
    assert_eq!(
        flatten_bindings(&first.sets[0]),
        flatten_bindings(&second.sets[0])
    );
}

#[test]
fn test_unknown_kinds_are_skipped() {
    let doc = document(
        vec![
            parameter_block(
                "params",
                0,
                vec![
                    json!({ "name": "buf", "type": { "kind": "structuredBuffer" } }),
                    json!({ "name": "cube", "type": {
                        "kind": "resource", "baseShape": "textureCube",
                        "resultType": { "kind": "vector", "elementCount": 4, "elementType": float32() }
                    }, "binding": { "index": 7 } }),
                    texture_field("albedo", 1),
                ],
                vec![],
            ),
            json!({
                "name": "globals",
                "binding": { "kind": "subElementRegisterSpace", "index": 1 },
                "type": { "kind": "constantBuffer" }
            }),
            json!({
                "name": "loose",
                "binding": { "kind": "descriptorTableSlot", "index": 0 },
                "type": { "kind": "resource" }
            }),
        ],
        default_entry_points(),
    );

    let layout = parse_layout(&doc).unwrap();

    assert_eq!(layout.sets[0].root.children().len(), 1);
    assert_eq!(layout.sets[0].root.children()[0].name, "albedo");
    // Unsupported block still reserves its set index
    assert_eq!(layout.sets.len(), 2);
    assert!(layout.sets[1].root.children().is_empty());
}

#[test]
fn test_unknown_stage_is_skipped() {
    let doc = document(
        vec![],
        vec![
            json!({ "name": "vertexMain", "stage": "vertex" }),
            json!({ "name": "computeMain", "stage": "compute" }),
            json!({ "name": "fragmentMain", "stage": "fragment" }),
        ],
    );

    let layout = parse_layout(&doc).unwrap();
    let stages: Vec<_> = layout.entry_points.iter().map(|e| e.stage).collect();
    assert_eq!(stages, vec![ShaderStage::Vertex, ShaderStage::Fragment]);
    assert_eq!(layout.entry_points[1].name, "fragmentMain");
}

#[test]
fn test_sets_ordered_by_register_space() {
    let doc = document(
        vec![
            parameter_block("material", 1, vec![texture_field("albedo", 0)], vec![]),
            parameter_block("frame", 0, vec![mat44_field("view")], vec![]),
        ],
        default_entry_points(),
    );

    let layout = parse_layout(&doc).unwrap();
    assert_eq!(layout.sets.len(), 2);
    assert_eq!(layout.sets[0].root.name, "frame");
    assert_eq!(layout.sets[1].root.name, "material");
}

#[test]
fn test_load_layout_from_file() {
    let doc = document(
        vec![parameter_block("params", 0, vec![mat44_field("mvp")], vec![])],
        default_entry_points(),
    );
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(doc.as_bytes()).unwrap();

    let layout = load_layout(file.path()).unwrap();
    assert_eq!(layout.sets.len(), 1);
    assert_eq!(layout.entry_points.len(), 2);
}

#[test]
fn test_load_layout_missing_file() {
    let err = load_layout(Path::new("/nonexistent/shader.spv.json")).unwrap_err();
    assert!(matches!(err, MaterialError::ReflectionMissing(_)));
}

#[test]
fn test_load_layout_invalid_json_reports_path() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"{ \"parameters\": [ ").unwrap();

    match load_layout(file.path()) {
        Err(MaterialError::ReflectionParse { path, .. }) => assert_eq!(path, file.path()),
        other => panic!("expected parse error, got {:?}", other),
    }
}

#[test]
fn test_table_offset_overflow_does_not_panic() {
    let json = document(
        vec![parameter_block(
            "params",
            0,
            vec![texture_field("albedo", 1), sampler_field("s", 0)],
            vec![json!({ "kind": "descriptorTableSlot", "index": u32::MAX })],
        )],
        default_entry_points(),
    );
    let layout = parse_layout(&json).unwrap();

    let slots = flatten_bindings(&layout.sets[0]);
    let names: Vec<_> = slots.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["s"]);
}

#[test]
fn test_huge_register_space_is_skipped() {
    let json = document(
        vec![
            parameter_block("hostile", 4_000_000_000, vec![mat44_field("mvp")], vec![]),
            parameter_block("params", 0, vec![mat44_field("mvp")], vec![]),
        ],
        default_entry_points(),
    );
    let layout = parse_layout(&json).unwrap();

    assert_eq!(layout.sets.len(), 1);
    assert_eq!(layout.sets[0].root.name, "params");
}
