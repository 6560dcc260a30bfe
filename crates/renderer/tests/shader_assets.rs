//! Checks the committed demo shader reflection against what the renderer
//! writes into each object's descriptor sets.

use std::path::{Path, PathBuf};

use ash::vk;
use vkframe_core::EngineConfig;
use vkframe_material::builder::{duplicate_binding, flatten_bindings};
use vkframe_material::reflection::{load_layout, reflection_path};
use vkframe_material::{BindingKind, PropertyKind};
use vkframe_renderer::FrameUniforms;
use vkframe_renderer::binder::pool_sizes;
use vkframe_rhi::shader::ShaderStage;

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn demo_reflection() -> PathBuf {
    let shader = workspace_root().join(EngineConfig::default().material.shader);
    reflection_path(&shader)
}

#[test]
fn test_default_shader_assets_exist() {
    let root = workspace_root();
    assert!(root.join("shaders/textured.slang").is_file());
    assert!(demo_reflection().is_file(), "missing {:?}", demo_reflection());
}

#[test]
fn test_demo_reflection_matches_binder_layout() {
    let layout = load_layout(&demo_reflection()).unwrap();

    // One parameter block; the push constant block is not a set.
    assert_eq!(layout.sets.len(), 1);
    let set = &layout.sets[0];
    assert_eq!(set.root.name, "material");
    assert_eq!(set.uniform_size as usize, FrameUniforms::SIZE);

    let mut slots = flatten_bindings(set);
    assert_eq!(duplicate_binding(&slots), None);
    slots.sort_by_key(|slot| slot.binding);

    let shape: Vec<(u32, BindingKind)> = slots.iter().map(|slot| (slot.binding, slot.kind)).collect();
    assert_eq!(
        shape,
        vec![
            (0, BindingKind::UniformBuffer),
            (1, BindingKind::SampledImage),
            (2, BindingKind::Sampler),
        ]
    );

    let names: Vec<&str> = set.root.children().iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["view", "proj", "albedo", "albedoSampler"]);
    assert!(matches!(
        set.root.children()[2].kind,
        PropertyKind::Resource { binding: 0, .. }
    ));
}

#[test]
fn test_demo_reflection_entry_points() {
    let layout = load_layout(&demo_reflection()).unwrap();

    let vertex = layout.entry_point(ShaderStage::Vertex).unwrap();
    assert_eq!(vertex.name, "vertexMain");
    assert_eq!(vertex.push_constant_size as usize, std::mem::size_of::<glam::Mat4>());

    let fragment = layout.entry_point(ShaderStage::Fragment).unwrap();
    assert_eq!(fragment.name, "fragmentMain");
}

#[test]
fn test_demo_reflection_pool_sizes() {
    let layout = load_layout(&demo_reflection()).unwrap();
    let slots = flatten_bindings(&layout.sets[0]);

    let sizes = pool_sizes(&slots, 8);
    assert_eq!(sizes.len(), 3);
    for ty in [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::SAMPLED_IMAGE,
        vk::DescriptorType::SAMPLER,
    ] {
        let size = sizes.iter().find(|size| size.ty == ty).unwrap();
        assert_eq!(size.descriptor_count, 8);
    }
}
