//! Reflection-driven pipeline construction.
//!
//! Turns a [`Layout`] into descriptor set layouts, a pipeline layout and a
//! graphics pipeline. Every step's error is tagged with its [`BuildStage`].

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};
use vkframe_rhi::descriptor::{DescriptorBindingBuilder, DescriptorSetLayout};
use vkframe_rhi::device::Device;
use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkframe_rhi::shader::{ShaderModule, ShaderStage};
use vkframe_rhi::vertex::Vertex;

use crate::error::{MaterialError, MaterialResult};
use crate::reflection::{Layout, PropertyKind, PropertyLayout, SetLayout, TRANSFORM_PUSH_CONSTANT_SIZE};

/// Construction step of a material, used to tag failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildStage {
    SetLayout,
    PipelineLayout,
    ShaderModule,
    Pipeline,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStage::SetLayout => "descriptor set layout",
            BuildStage::PipelineLayout => "pipeline layout",
            BuildStage::ShaderModule => "shader module",
            BuildStage::Pipeline => "graphics pipeline",
        })
    }
}

/// Descriptor kind of a flattened binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingKind {
    UniformBuffer,
    SampledImage,
    Sampler,
}

impl BindingKind {
    /// Vulkan descriptor type for this kind.
    pub fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            BindingKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            BindingKind::SampledImage => vk::DescriptorType::SAMPLED_IMAGE,
            BindingKind::Sampler => vk::DescriptorType::SAMPLER,
        }
    }

    /// Shader stages that read this kind.
    pub fn stage_flags(self) -> vk::ShaderStageFlags {
        match self {
            BindingKind::UniformBuffer => vk::ShaderStageFlags::VERTEX,
            BindingKind::SampledImage | BindingKind::Sampler => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

/// One descriptor binding of a set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindingSlot {
    /// Absolute binding number within the set.
    pub binding: u32,
    pub kind: BindingKind,
    /// Name of the reflected field, `"uniforms"` for the implicit buffer.
    pub name: String,
}

impl BindingSlot {
    /// Vulkan layout binding for this slot.
    pub fn to_vk(&self) -> vk::DescriptorSetLayoutBinding<'static> {
        DescriptorBindingBuilder::single(
            self.binding,
            self.kind.descriptor_type(),
            self.kind.stage_flags(),
        )
    }
}

/// Flattens a set's property tree into descriptor bindings.
///
/// Resource and sampler leaves are emitted depth-first in document order at
/// `binding_offset + binding`. A set with flat uniform data gets an extra
/// uniform buffer slot at binding 0, appended last.
pub fn flatten_bindings(set: &SetLayout) -> Vec<BindingSlot> {
    let mut slots = Vec::new();
    collect_leaves(&set.root, set.binding_offset, &mut slots);

    if set.uniform_size > 0 {
        slots.push(BindingSlot {
            binding: 0,
            kind: BindingKind::UniformBuffer,
            name: "uniforms".to_string(),
        });
    }

    slots
}

fn collect_leaves(node: &PropertyLayout, offset: u32, out: &mut Vec<BindingSlot>) {
    let kind = match &node.kind {
        PropertyKind::Object { children } => {
            for child in children {
                collect_leaves(child, offset, out);
            }
            return;
        }
        PropertyKind::Simple(_) => return,
        PropertyKind::Resource { .. } => BindingKind::SampledImage,
        PropertyKind::Sampler { .. } => BindingKind::Sampler,
    };

    let Some(binding) = node.binding() else {
        return;
    };
    let Some(binding) = offset.checked_add(binding) else {
        warn!(
            "Binding '{}' overflows: offset {} + {}, skipping",
            node.name, offset, binding
        );
        return;
    };
    out.push(BindingSlot {
        binding,
        kind,
        name: node.name.clone(),
    });
}

/// First binding number used by more than one slot, if any.
pub fn duplicate_binding(slots: &[BindingSlot]) -> Option<u32> {
    let mut seen = HashSet::new();
    slots
        .iter()
        .map(|slot| slot.binding)
        .find(|&binding| !seen.insert(binding))
}

/// The push constant range every material declares: one vertex-stage transform.
pub fn transform_push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::VERTEX)
        .offset(0)
        .size(TRANSFORM_PUSH_CONSTANT_SIZE)
}

/// Creates one descriptor set layout per reflected set, in set order.
///
/// # Errors
///
/// Returns [`MaterialError::DuplicateBinding`] if two slots of a set share a
/// binding number, or [`MaterialError::Build`] tagged
/// [`BuildStage::SetLayout`].
pub fn create_set_layouts(
    device: &Arc<Device>,
    layout: &Layout,
) -> MaterialResult<Vec<DescriptorSetLayout>> {
    layout
        .sets
        .iter()
        .enumerate()
        .map(|(index, set)| {
            let slots = flatten_bindings(set);
            if let Some(binding) = duplicate_binding(&slots) {
                return Err(MaterialError::DuplicateBinding { set: index, binding });
            }

            let bindings: Vec<_> = slots.iter().map(BindingSlot::to_vk).collect();
            debug!(
                "Set {} ('{}'): {} binding(s)",
                index,
                set.root.name,
                bindings.len()
            );
            DescriptorSetLayout::new(device.clone(), &bindings)
                .map_err(MaterialError::at(BuildStage::SetLayout))
        })
        .collect()
}

/// Creates the pipeline layout over `set_layouts` plus the transform range.
///
/// # Errors
///
/// Returns [`MaterialError::Build`] tagged [`BuildStage::PipelineLayout`].
pub fn create_pipeline_layout(
    device: &Arc<Device>,
    set_layouts: &[DescriptorSetLayout],
) -> MaterialResult<PipelineLayout> {
    let handles: Vec<_> = set_layouts.iter().map(DescriptorSetLayout::handle).collect();
    PipelineLayout::new(device.clone(), &handles, &[transform_push_constant_range()])
        .map_err(MaterialError::at(BuildStage::PipelineLayout))
}

/// Attachment formats a pipeline renders into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// Loads the shader binary and creates the graphics pipeline.
///
/// # Errors
///
/// Returns [`MaterialError::MissingEntryPoint`] if the layout lacks a vertex
/// or fragment entry point, or [`MaterialError::Build`] tagged
/// [`BuildStage::ShaderModule`] or [`BuildStage::Pipeline`].
pub fn create_pipeline(
    device: &Arc<Device>,
    layout: &Layout,
    shader_path: &Path,
    pipeline_layout: &PipelineLayout,
    formats: TargetFormats,
) -> MaterialResult<Pipeline> {
    for stage in ShaderStage::ALL {
        if layout.entry_point(stage).is_none() {
            return Err(MaterialError::MissingEntryPoint(stage));
        }
    }

    let module = ShaderModule::from_spirv_file(device.clone(), shader_path)
        .map_err(MaterialError::at(BuildStage::ShaderModule))?;

    let entry_points = layout
        .entry_points
        .iter()
        .map(|e| module.entry_point(e.stage, &e.name))
        .collect::<Result<Vec<_>, _>>()
        .map_err(MaterialError::at(BuildStage::ShaderModule))?;

    let mut builder = GraphicsPipelineBuilder::new()
        .vertex_binding(Vertex::binding_description())
        .vertex_attributes(&Vertex::attribute_descriptions())
        .color_attachment_format(formats.color)
        .depth_attachment_format(formats.depth);
    for entry_point in &entry_points {
        builder = builder.stage(entry_point.stage_create_info());
    }

    let pipeline = builder
        .build(device.clone(), pipeline_layout)
        .map_err(MaterialError::at(BuildStage::Pipeline))?;

    info!(
        "Built pipeline from {:?} with {} entry point(s)",
        shader_path,
        entry_points.len()
    );

    Ok(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflection::{ResourceFormat, ResourceKind, SimpleType};

    fn leaf(name: &str, kind: PropertyKind) -> PropertyLayout {
        PropertyLayout {
            name: name.to_string(),
            kind,
        }
    }

    fn texture(name: &str, binding: u32) -> PropertyLayout {
        leaf(
            name,
            PropertyKind::Resource {
                kind: ResourceKind::Texture2D,
                format: ResourceFormat::Float4,
                binding,
            },
        )
    }

    fn set(children: Vec<PropertyLayout>, binding_offset: u32, uniform_size: u32) -> SetLayout {
        SetLayout {
            root: PropertyLayout {
                name: "params".to_string(),
                kind: PropertyKind::Object { children },
            },
            uniform_offset: 0,
            uniform_size,
            binding_offset,
        }
    }

    #[test]
    fn test_flatten_depth_first_with_offset() {
        let nested = PropertyLayout {
            name: "detail".to_string(),
            kind: PropertyKind::Object {
                children: vec![texture("detail_map", 3), leaf("s2", PropertyKind::Sampler { binding: 4 })],
            },
        };
        let set = set(
            vec![
                leaf("mvp", PropertyKind::Simple(SimpleType::Float44)),
                texture("albedo", 1),
                nested,
                leaf("s", PropertyKind::Sampler { binding: 2 }),
            ],
            10,
            0,
        );

        let slots = flatten_bindings(&set);
        let summary: Vec<_> = slots.iter().map(|s| (s.binding, s.kind, s.name.as_str())).collect();
        assert_eq!(
            summary,
            vec![
                (11, BindingKind::SampledImage, "albedo"),
                (13, BindingKind::SampledImage, "detail_map"),
                (14, BindingKind::Sampler, "s2"),
                (12, BindingKind::Sampler, "s"),
            ]
        );
    }

    #[test]
    fn test_flatten_appends_uniform_buffer() {
        let slots = flatten_bindings(&set(vec![texture("albedo", 1)], 0, 64));
        assert_eq!(slots.len(), 2);
        assert_eq!(slots[1].binding, 0);
        assert_eq!(slots[1].kind, BindingKind::UniformBuffer);
    }

    #[test]
    fn test_flatten_is_deterministic() {
        let set = set(
            vec![texture("a", 1), leaf("s", PropertyKind::Sampler { binding: 2 })],
            0,
            128,
        );
        assert_eq!(flatten_bindings(&set), flatten_bindings(&set));
    }

    #[test]
    fn test_flatten_skips_overflowing_binding() {
        let set = set(
            vec![texture("huge", 1), leaf("s", PropertyKind::Sampler { binding: 0 })],
            u32::MAX,
            0,
        );

        let slots = flatten_bindings(&set);
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].name, "s");
        assert_eq!(slots[0].binding, u32::MAX);
    }

    #[test]
    fn test_duplicate_binding_detected() {
        // A texture at binding 0 collides with the implicit uniform buffer
        let clash = flatten_bindings(&set(vec![texture("albedo", 0)], 0, 64));
        assert_eq!(duplicate_binding(&clash), Some(0));

        let distinct = flatten_bindings(&set(vec![texture("albedo", 1)], 0, 64));
        assert_eq!(duplicate_binding(&distinct), None);
    }

    #[test]
    fn test_stage_visibility() {
        assert_eq!(
            BindingKind::UniformBuffer.stage_flags(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            BindingKind::SampledImage.stage_flags(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(BindingKind::Sampler.stage_flags(), vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_binding_slot_to_vk() {
        let slot = BindingSlot {
            binding: 5,
            kind: BindingKind::SampledImage,
            name: "albedo".to_string(),
        };
        let vk_binding = slot.to_vk();
        assert_eq!(vk_binding.binding, 5);
        assert_eq!(vk_binding.descriptor_type, vk::DescriptorType::SAMPLED_IMAGE);
        assert_eq!(vk_binding.descriptor_count, 1);
        assert_eq!(vk_binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_transform_push_constant_range() {
        let range = transform_push_constant_range();
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 64);
    }

    #[test]
    fn test_build_stage_display() {
        assert_eq!(BuildStage::SetLayout.to_string(), "descriptor set layout");
        assert_eq!(BuildStage::Pipeline.to_string(), "graphics pipeline");
    }
}
