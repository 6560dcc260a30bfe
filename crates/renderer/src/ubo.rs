//! Per-frame uniform data and the camera projection that feeds it.
//!
//! The layout must match the shader's frame uniform block. `#[repr(C)]` plus
//! `Pod` lets it be copied into the staging buffer as raw bytes.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use vkframe_core::CameraConfig;

/// View and projection transforms, uploaded once per frame.
///
/// # Memory Layout
///
/// - Offset 0: view matrix (64 bytes)
/// - Offset 64: projection matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    /// World to view space.
    pub view: Mat4,
    /// View to clip space.
    pub proj: Mat4,
}

impl FrameUniforms {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(view: Mat4, proj: Mat4) -> Self {
        Self { view, proj }
    }
}

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Projection {
    /// Right-handed perspective with `[0, 1]` depth and Y pointing down in
    /// clip space, as Vulkan expects.
    pub fn matrix(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_degrees.to_radians(), aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Width over height, 1.0 for a degenerate extent.
    pub fn aspect(width: u32, height: u32) -> f32 {
        if width == 0 || height == 0 {
            1.0
        } else {
            width as f32 / height as f32
        }
    }
}

impl Default for Projection {
    fn default() -> Self {
        Self::from(&CameraConfig::default())
    }
}

impl From<&CameraConfig> for Projection {
    fn from(config: &CameraConfig) -> Self {
        Self {
            fov_degrees: config.fov_degrees,
            near: config.near,
            far: config.far,
        }
    }
}
