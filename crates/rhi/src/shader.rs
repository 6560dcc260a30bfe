//! SPIR-V shader modules.
//!
//! A single module may hold several entry points (one per stage), as emitted
//! by compilers that build a whole effect into one SPIR-V binary.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::shader::{ShaderModule, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let module = ShaderModule::from_spirv_file(device, Path::new("shaders/textured.spv"))?;
//! let vs = module.entry_point(ShaderStage::Vertex, "vertexMain")?;
//! let fs = module.entry_point(ShaderStage::Fragment, "fragmentMain")?;
//! let _stages = [vs.stage_create_info(), fs.stage_create_info()];
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// SPIR-V magic number, first word of every module.
const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Graphics shader stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader stage
    Vertex,
    /// Fragment (pixel) shader stage
    Fragment,
}

impl ShaderStage {
    /// Every supported stage, in pipeline order.
    pub const ALL: [ShaderStage; 2] = [ShaderStage::Vertex, ShaderStage::Fragment];

    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Lowercase stage name as used in reflection documents.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }

    /// Looks a stage up by its reflection name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.name() == name)
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Vulkan shader module wrapper.
pub struct ShaderModule {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan shader module handle.
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Creates a shader module from a SPIR-V file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The SPIR-V data is invalid
    /// - Shader module creation fails
    pub fn from_spirv_file(device: Arc<Device>, path: &Path) -> RhiResult<Self> {
        debug!("Loading shader module from {:?}", path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `bytes` is not a word-aligned SPIR-V binary or
    /// module creation fails.
    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8]) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!("Created shader module ({} words)", code.len());

        Ok(Self { device, module })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Names an entry point of this module for `stage`.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` contains a NUL byte.
    pub fn entry_point(&self, stage: ShaderStage, name: &str) -> RhiResult<EntryPoint<'_>> {
        let name = CString::new(name)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;
        Ok(EntryPoint {
            module: self,
            stage,
            name,
        })
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed shader module");
    }
}

/// One stage's entry point within a [`ShaderModule`].
pub struct EntryPoint<'m> {
    module: &'m ShaderModule,
    stage: ShaderStage,
    name: CString,
}

impl EntryPoint<'_> {
    /// Returns the shader stage.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the entry point function name.
    #[inline]
    pub fn name(&self) -> &CStr {
        &self.name
    }

    /// Pipeline stage description borrowing this entry point.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module.handle())
            .name(&self.name)
    }
}

/// Converts a SPIR-V byte blob into little-endian words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] for empty, misaligned or non-SPIR-V data.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(RhiError::ShaderError("SPIR-V code is empty".to_string()));
    }
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    let code: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    if code[0] != SPIRV_MAGIC {
        return Err(RhiError::ShaderError(format!(
            "Invalid SPIR-V magic number: {:#010x}",
            code[0]
        )));
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shader_stage_to_vk_stage() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_shader_stage_name_table() {
        assert_eq!(ShaderStage::from_name("vertex"), Some(ShaderStage::Vertex));
        assert_eq!(
            ShaderStage::from_name("fragment"),
            Some(ShaderStage::Fragment)
        );
        assert_eq!(ShaderStage::from_name("compute"), None);
        assert_eq!(ShaderStage::from_name("Vertex"), None);
    }

    #[test]
    fn test_shader_stage_display() {
        assert_eq!(format!("{}", ShaderStage::Vertex), "vertex");
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        assert!(matches!(
            spirv_words(&[0u8; 5]),
            Err(RhiError::ShaderError(_))
        ));
    }

    #[test]
    fn test_spirv_words_rejects_empty() {
        assert!(spirv_words(&[]).is_err());
    }

    #[test]
    fn test_spirv_words_rejects_bad_magic() {
        assert!(spirv_words(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_spirv_words_little_endian() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0300u32.to_le_bytes());
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0300]);
    }
}
