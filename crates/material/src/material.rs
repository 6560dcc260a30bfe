//! Materials: a shader plus the GPU state derived from its reflection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};
use vkframe_rhi::descriptor::DescriptorSetLayout;
use vkframe_rhi::device::Device;
use vkframe_rhi::pipeline::{Pipeline, PipelineLayout};

use crate::builder::{self, BindingSlot, TargetFormats};
use crate::error::MaterialResult;
use crate::reflection::{self, Layout};

/// A compiled shader with its pipeline state.
///
/// Built once from `<shader>` and its `<shader>.json` reflection. A material
/// whose construction failed is still a valid value: [`created`](Self::created)
/// returns false and it owns no GPU objects.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use std::sync::Arc;
/// use ash::vk;
/// use vkframe_material::Material;
/// use vkframe_rhi::device::Device;
///
/// # fn example(device: Arc<Device>) {
/// let material = Material::new(
///     device,
///     Path::new("shaders/textured.spv"),
///     vk::Format::B8G8R8A8_SRGB,
///     vk::Format::D32_SFLOAT,
/// );
/// if !material.created() {
///     return;
/// }
/// # }
/// ```
pub struct Material {
    // Field order is drop order: pipeline before its layouts.
    pipeline: Option<Pipeline>,
    pipeline_layout: Option<PipelineLayout>,
    set_layouts: Vec<DescriptorSetLayout>,
    bindings: Vec<Vec<BindingSlot>>,
    layout: Layout,
    shader_path: PathBuf,
}

impl Material {
    /// Builds a material, logging and swallowing any failure.
    pub fn new(
        device: Arc<Device>,
        shader_path: &Path,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> Self {
        match Self::try_new(device, shader_path, color_format, depth_format) {
            Ok(material) => material,
            Err(e) => {
                error!("Material {:?} not created: {}", shader_path, e);
                Self {
                    pipeline: None,
                    pipeline_layout: None,
                    set_layouts: Vec::new(),
                    bindings: Vec::new(),
                    layout: Layout::default(),
                    shader_path: shader_path.to_path_buf(),
                }
            }
        }
    }

    /// Builds a material.
    ///
    /// # Errors
    ///
    /// Returns an error if the reflection cannot be loaded or any GPU object
    /// fails to build.
    pub fn try_new(
        device: Arc<Device>,
        shader_path: &Path,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> MaterialResult<Self> {
        let layout = reflection::load_layout(&reflection::reflection_path(shader_path))?;
        Self::from_layout(device, layout, shader_path, color_format, depth_format)
    }

    /// Builds a material from an already loaded layout.
    ///
    /// # Errors
    ///
    /// Returns an error if any GPU object fails to build.
    pub fn from_layout(
        device: Arc<Device>,
        layout: Layout,
        shader_path: &Path,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> MaterialResult<Self> {
        let bindings: Vec<_> = layout.sets.iter().map(builder::flatten_bindings).collect();

        let set_layouts = builder::create_set_layouts(&device, &layout)?;
        let pipeline_layout = builder::create_pipeline_layout(&device, &set_layouts)?;
        let pipeline = builder::create_pipeline(
            &device,
            &layout,
            shader_path,
            &pipeline_layout,
            TargetFormats {
                color: color_format,
                depth: depth_format,
            },
        )?;

        info!(
            "Material {:?} created: {} set(s)",
            shader_path,
            set_layouts.len()
        );

        Ok(Self {
            pipeline: Some(pipeline),
            pipeline_layout: Some(pipeline_layout),
            set_layouts,
            bindings,
            layout,
            shader_path: shader_path.to_path_buf(),
        })
    }

    /// Returns true if every GPU object was built.
    #[inline]
    pub fn created(&self) -> bool {
        self.pipeline.is_some()
    }

    /// The reflected layout; empty if loading failed.
    #[inline]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Descriptor set layouts, indexed by set number.
    #[inline]
    pub fn set_layouts(&self) -> &[DescriptorSetLayout] {
        &self.set_layouts
    }

    #[inline]
    pub fn pipeline_layout(&self) -> Option<&PipelineLayout> {
        self.pipeline_layout.as_ref()
    }

    #[inline]
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.pipeline.as_ref()
    }

    /// Flattened bindings of set `set`, empty if there is no such set.
    pub fn bindings(&self, set: usize) -> &[BindingSlot] {
        self.bindings.get(set).map(Vec::as_slice).unwrap_or_default()
    }

    #[inline]
    pub fn shader_path(&self) -> &Path {
        &self.shader_path
    }
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("shader_path", &self.shader_path)
            .field("created", &self.created())
            .field("sets", &self.set_layouts.len())
            .finish()
    }
}
