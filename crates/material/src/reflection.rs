//! Shader reflection loading.
//!
//! Reads the JSON reflection document emitted next to a compiled shader
//! (`<shader>.spv.json`) into a [`Layout`]: one [`SetLayout`] per parameter
//! block, indexed by its register space, plus the entry points.
//!
//! Unknown parameter kinds, field kinds and stage names are logged and
//! skipped; only an unreadable document or a missing `parameters` array
//! fails the load.
//!
//! # Example
//!
//! ```
//! use vkframe_material::reflection::{parse_layout, PropertyKind, SimpleType};
//!
//! let json = r#"{
//!   "parameters": [{
//!     "name": "params",
//!     "binding": { "kind": "subElementRegisterSpace", "index": 0 },
//!     "type": { "kind": "parameterBlock", "elementVarLayout": {
//!       "type": { "kind": "struct", "fields": [
//!         { "name": "mvp", "type": { "kind": "matrix", "rowCount": 4, "columnCount": 4,
//!           "elementType": { "kind": "scalar", "scalarType": "float32" } } }
//!       ] },
//!       "bindings": []
//!     } }
//!   }],
//!   "entryPoints": [{ "name": "vertexMain", "stage": "vertex" }]
//! }"#;
//!
//! let layout = parse_layout(json).unwrap();
//! let mvp = &layout.sets[0].root.children()[0];
//! assert_eq!(mvp.kind, PropertyKind::Simple(SimpleType::Float44));
//! ```

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, warn};
use vkframe_rhi::shader::ShaderStage;

use crate::error::{MaterialError, MaterialResult};

/// Size of the per-draw push constant block: one 4x4 f32 transform.
pub const TRANSFORM_PUSH_CONSTANT_SIZE: u32 = 64;

/// Highest register space accepted, exclusive. Matches the largest
/// `maxBoundDescriptorSets` reported by common drivers.
pub const MAX_DESCRIPTOR_SETS: u32 = 32;

/// Value type of an informational, unbound property.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimpleType {
    Float1,
    Float2,
    Float4,
    Float44,
}

/// Shape of a sampled resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Texture2D,
}

/// Element format a resource returns when sampled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceFormat {
    Float4,
}

/// The variant carried by a [`PropertyLayout`] node.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyKind {
    /// Plain data, not bound to a descriptor.
    Simple(SimpleType),
    /// Sampled image at `binding`, relative to the set's binding offset.
    Resource {
        kind: ResourceKind,
        format: ResourceFormat,
        binding: u32,
    },
    /// Standalone sampler at `binding`, relative to the set's binding offset.
    Sampler { binding: u32 },
    /// Struct of fields, owned in declaration order.
    Object { children: Vec<PropertyLayout> },
}

/// One named node of a reflected parameter tree.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyLayout {
    pub name: String,
    pub kind: PropertyKind,
}

impl PropertyLayout {
    /// Creates an empty object node.
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: PropertyKind::Object {
                children: Vec::new(),
            },
        }
    }

    /// Children of an object node; empty for leaves.
    pub fn children(&self) -> &[PropertyLayout] {
        match &self.kind {
            PropertyKind::Object { children } => children,
            _ => &[],
        }
    }

    /// Descriptor binding of a resource or sampler leaf.
    pub fn binding(&self) -> Option<u32> {
        match self.kind {
            PropertyKind::Resource { binding, .. } | PropertyKind::Sampler { binding } => {
                Some(binding)
            }
            _ => None,
        }
    }
}

/// One reflected parameter block, occupying one descriptor set.
#[derive(Clone, Debug, PartialEq)]
pub struct SetLayout {
    /// Always an object node named after the parameter.
    pub root: PropertyLayout,
    /// Byte offset of flat uniform data in the block.
    pub uniform_offset: u32,
    /// Byte size of flat uniform data; zero if the block has none.
    pub uniform_size: u32,
    /// Base binding index for resource and sampler leaves.
    pub binding_offset: u32,
}

impl Default for SetLayout {
    fn default() -> Self {
        Self {
            root: PropertyLayout::object(""),
            uniform_offset: 0,
            uniform_size: 0,
            binding_offset: 0,
        }
    }
}

/// One shader entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryPointLayout {
    pub name: String,
    pub stage: ShaderStage,
    /// Bytes of push constant data the stage reads.
    pub push_constant_size: u32,
}

/// Everything reflected from one shader.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layout {
    /// Set layouts indexed by descriptor set number.
    pub sets: Vec<SetLayout>,
    /// Entry points in document order.
    pub entry_points: Vec<EntryPointLayout>,
}

impl Layout {
    /// First entry point for `stage`, if any.
    pub fn entry_point(&self, stage: ShaderStage) -> Option<&EntryPointLayout> {
        self.entry_points.iter().find(|e| e.stage == stage)
    }
}

/// Path of the reflection document for a compiled shader.
pub fn reflection_path(shader_path: &Path) -> PathBuf {
    let mut path = shader_path.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}

/// Loads and parses a reflection document from disk.
///
/// # Errors
///
/// Returns [`MaterialError::ReflectionMissing`] if the file does not exist
/// and [`MaterialError::ReflectionParse`] if it cannot be parsed.
pub fn load_layout(path: &Path) -> MaterialResult<Layout> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MaterialError::ReflectionMissing(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    parse_layout(&text).map_err(|e| match e {
        MaterialError::ReflectionParse { message, .. } => MaterialError::ReflectionParse {
            path: path.to_path_buf(),
            message,
        },
        other => other,
    })
}

/// Parses a reflection document.
///
/// # Errors
///
/// Returns [`MaterialError::ReflectionParse`] for invalid JSON or a missing
/// top-level `parameters` array.
pub fn parse_layout(json: &str) -> MaterialResult<Layout> {
    let root: Value = serde_json::from_str(json).map_err(|e| parse_error(e.to_string()))?;

    let params = root
        .get("parameters")
        .and_then(Value::as_array)
        .ok_or_else(|| parse_error("missing 'parameters' array".to_string()))?;

    let mut layout = Layout::default();

    for param in params {
        read_param(param, &mut layout.sets);
    }

    if let Some(entry_points) = root.get("entryPoints").and_then(Value::as_array) {
        for entry in entry_points {
            if let Some(entry_point) = read_entry_point(entry) {
                layout.entry_points.push(entry_point);
            }
        }
    }

    debug!(
        "Parsed reflection: {} set(s), {} entry point(s)",
        layout.sets.len(),
        layout.entry_points.len()
    );

    Ok(layout)
}

fn parse_error(message: String) -> MaterialError {
    MaterialError::ReflectionParse {
        path: PathBuf::new(),
        message,
    }
}

fn str_at<'v>(value: &'v Value, key: &str) -> Option<&'v str> {
    value.get(key).and_then(Value::as_str)
}

fn u32_at(value: &Value, key: &str) -> Option<u32> {
    value
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}

fn read_param(param: &Value, sets: &mut Vec<SetLayout>) {
    let name = str_at(param, "name").unwrap_or_default();

    let Some(binding) = param.get("binding") else {
        warn!("Parameter '{}' has no binding, skipping", name);
        return;
    };
    if str_at(binding, "kind") != Some("subElementRegisterSpace") {
        debug!("Parameter '{}' is not a register space, skipping", name);
        return;
    }
    let Some(index) = u32_at(binding, "index") else {
        warn!("Parameter '{}' has no register space index, skipping", name);
        return;
    };
    if index >= MAX_DESCRIPTOR_SETS {
        warn!(
            "Parameter '{}' uses register space {}, limit is {}, skipping",
            name, index, MAX_DESCRIPTOR_SETS
        );
        return;
    }

    let index = index as usize;
    if sets.len() <= index {
        sets.resize_with(index + 1, SetLayout::default);
    }

    let ty = param.get("type").unwrap_or(&Value::Null);
    if str_at(ty, "kind") != Some("parameterBlock") {
        warn!(
            "Parameter '{}' of kind {:?} is unsupported, skipping",
            name,
            str_at(ty, "kind")
        );
        return;
    }

    let element = ty.get("elementVarLayout").unwrap_or(&Value::Null);
    let element_ty = element.get("type").unwrap_or(&Value::Null);
    if str_at(element_ty, "kind") != Some("struct") {
        warn!(
            "Parameter block '{}' holds {:?} instead of a struct, skipping",
            name,
            str_at(element_ty, "kind")
        );
        return;
    }

    let mut set = SetLayout {
        root: PropertyLayout::object(name),
        ..SetLayout::default()
    };

    for entry in element
        .get("bindings")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        match str_at(entry, "kind") {
            Some("descriptorTableSlot") => {
                set.binding_offset = u32_at(entry, "index").unwrap_or(0);
            }
            Some("uniform") => {
                set.uniform_offset = u32_at(entry, "offset").unwrap_or(0);
                set.uniform_size = u32_at(entry, "size").unwrap_or(0);
            }
            other => debug!("Ignoring block binding kind {:?}", other),
        }
    }

    if let PropertyKind::Object { children } = &mut set.root.kind {
        read_fields(element_ty, children);
    }

    sets[index] = set;
}

fn read_fields(struct_ty: &Value, out: &mut Vec<PropertyLayout>) {
    for field in struct_ty
        .get("fields")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        if let Some(property) = read_field(field) {
            out.push(property);
        }
    }
}

fn read_field(field: &Value) -> Option<PropertyLayout> {
    let name = str_at(field, "name").unwrap_or_default().to_string();
    let ty = field.get("type").unwrap_or(&Value::Null);

    let kind = match str_at(ty, "kind") {
        Some("struct") => {
            let mut children = Vec::new();
            read_fields(ty, &mut children);
            PropertyKind::Object { children }
        }
        Some("matrix") => {
            let is_float44 = u32_at(ty, "rowCount") == Some(4)
                && u32_at(ty, "columnCount") == Some(4)
                && is_float32_scalar(ty.get("elementType"));
            if !is_float44 {
                warn!("Field '{}': only 4x4 float32 matrices are supported", name);
                return None;
            }
            PropertyKind::Simple(SimpleType::Float44)
        }
        Some("vector") => {
            let simple = match (u32_at(ty, "elementCount"), is_float32_scalar(ty.get("elementType"))) {
                (Some(1), true) => SimpleType::Float1,
                (Some(2), true) => SimpleType::Float2,
                (Some(4), true) => SimpleType::Float4,
                _ => {
                    warn!("Field '{}': unsupported vector shape", name);
                    return None;
                }
            };
            PropertyKind::Simple(simple)
        }
        Some("scalar") if str_at(ty, "scalarType") == Some("float32") => {
            PropertyKind::Simple(SimpleType::Float1)
        }
        Some("resource") => {
            if str_at(ty, "baseShape") != Some("texture2D") {
                warn!(
                    "Field '{}': unsupported resource shape {:?}",
                    name,
                    str_at(ty, "baseShape")
                );
                return None;
            }
            let result = ty.get("resultType").unwrap_or(&Value::Null);
            if u32_at(result, "elementCount") != Some(4)
                || !is_float32_scalar(result.get("elementType"))
            {
                warn!("Field '{}': only float4 textures are supported", name);
                return None;
            }
            PropertyKind::Resource {
                kind: ResourceKind::Texture2D,
                format: ResourceFormat::Float4,
                binding: field_binding(field, ty)?,
            }
        }
        Some("samplerState") => PropertyKind::Sampler {
            binding: field_binding(field, ty)?,
        },
        other => {
            warn!("Field '{}': unhandled type kind {:?}", name, other);
            return None;
        }
    };

    Some(PropertyLayout { name, kind })
}

fn is_float32_scalar(value: Option<&Value>) -> bool {
    value.is_some_and(|v| {
        str_at(v, "kind") == Some("scalar") && str_at(v, "scalarType") == Some("float32")
    })
}

/// Binding index of a field, found on the field itself or on its type.
fn field_binding(field: &Value, ty: &Value) -> Option<u32> {
    let index = field
        .get("binding")
        .or_else(|| ty.get("binding"))
        .and_then(|b| u32_at(b, "index"));
    if index.is_none() {
        warn!(
            "Field '{}' has no binding index, skipping",
            str_at(field, "name").unwrap_or_default()
        );
    }
    index
}

fn read_entry_point(entry: &Value) -> Option<EntryPointLayout> {
    let name = str_at(entry, "name").unwrap_or_default();
    let stage_name = str_at(entry, "stage").unwrap_or_default();

    let Some(stage) = ShaderStage::from_name(stage_name) else {
        error!(
            "Entry point '{}' has unknown stage '{}', skipping",
            name, stage_name
        );
        return None;
    };

    Some(EntryPointLayout {
        name: name.to_string(),
        stage,
        push_constant_size: TRANSFORM_PUSH_CONSTANT_SIZE,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(index: u32, fields: &str) -> String {
        format!(
            r#"{{ "name": "block{index}",
                 "binding": {{ "kind": "subElementRegisterSpace", "index": {index} }},
                 "type": {{ "kind": "parameterBlock", "elementVarLayout": {{
                   "type": {{ "kind": "struct", "fields": [{fields}] }},
                   "bindings": [] }} }} }}"#
        )
    }

    #[test]
    fn test_reflection_path_appends_json() {
        assert_eq!(
            reflection_path(Path::new("shaders/textured.spv")),
            PathBuf::from("shaders/textured.spv.json")
        );
    }

    #[test]
    fn test_set_placed_at_register_index() {
        let json = format!(r#"{{ "parameters": [{}] }}"#, block(2, ""));
        let layout = parse_layout(&json).unwrap();

        assert_eq!(layout.sets.len(), 3);
        assert_eq!(layout.sets[0], SetLayout::default());
        assert_eq!(layout.sets[2].root.name, "block2");
    }

    #[test]
    fn test_register_space_beyond_limit_skipped() {
        let json = format!(
            r#"{{ "parameters": [{}, {}] }}"#,
            block(4_000_000_000, ""),
            block(1, "")
        );
        let layout = parse_layout(&json).unwrap();

        assert_eq!(layout.sets.len(), 2);
        assert_eq!(layout.sets[1].root.name, "block1");
    }

    #[test]
    fn test_last_register_space_accepted() {
        let json = format!(
            r#"{{ "parameters": [{}] }}"#,
            block(MAX_DESCRIPTOR_SETS - 1, "")
        );
        let layout = parse_layout(&json).unwrap();
        assert_eq!(layout.sets.len(), MAX_DESCRIPTOR_SETS as usize);
    }

    #[test]
    fn test_vector_and_scalar_fields() {
        let fields = r#"
            { "name": "tint", "type": { "kind": "vector", "elementCount": 4,
              "elementType": { "kind": "scalar", "scalarType": "float32" } } },
            { "name": "uv_scale", "type": { "kind": "vector", "elementCount": 2,
              "elementType": { "kind": "scalar", "scalarType": "float32" } } },
            { "name": "time", "type": { "kind": "scalar", "scalarType": "float32" } },
            { "name": "count", "type": { "kind": "scalar", "scalarType": "int32" } }
        "#;
        let json = format!(r#"{{ "parameters": [{}] }}"#, block(0, fields));
        let layout = parse_layout(&json).unwrap();
        let kinds: Vec<_> = layout.sets[0]
            .root
            .children()
            .iter()
            .map(|p| p.kind.clone())
            .collect();

        assert_eq!(
            kinds,
            vec![
                PropertyKind::Simple(SimpleType::Float4),
                PropertyKind::Simple(SimpleType::Float2),
                PropertyKind::Simple(SimpleType::Float1),
            ]
        );
    }

    #[test]
    fn test_non_square_matrix_skipped() {
        let fields = r#"
            { "name": "m", "type": { "kind": "matrix", "rowCount": 3, "columnCount": 4,
              "elementType": { "kind": "scalar", "scalarType": "float32" } } }
        "#;
        let json = format!(r#"{{ "parameters": [{}] }}"#, block(0, fields));
        let layout = parse_layout(&json).unwrap();
        assert!(layout.sets[0].root.children().is_empty());
    }

    #[test]
    fn test_binding_on_type_is_accepted() {
        let fields = r#"
            { "name": "s", "type": { "kind": "samplerState", "binding": { "index": 3 } } }
        "#;
        let json = format!(r#"{{ "parameters": [{}] }}"#, block(0, fields));
        let layout = parse_layout(&json).unwrap();
        assert_eq!(layout.sets[0].root.children()[0].binding(), Some(3));
    }

    #[test]
    fn test_missing_parameters_is_parse_error() {
        assert!(matches!(
            parse_layout(r#"{ "entryPoints": [] }"#),
            Err(MaterialError::ReflectionParse { .. })
        ));
        assert!(matches!(
            parse_layout("not json"),
            Err(MaterialError::ReflectionParse { .. })
        ));
    }

    #[test]
    fn test_entry_point_push_constant_size() {
        let json = r#"{ "parameters": [],
            "entryPoints": [{ "name": "vs", "stage": "vertex" }] }"#;
        let layout = parse_layout(json).unwrap();
        let vs = layout.entry_point(ShaderStage::Vertex).unwrap();
        assert_eq!(vs.push_constant_size, 64);
        assert!(layout.entry_point(ShaderStage::Fragment).is_none());
    }
}
