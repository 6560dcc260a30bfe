//! Engine vertex format and its input descriptions.
//!
//! Fields are stored as plain float arrays so the layout is tightly packed
//! (glam's SIMD `Vec4` would pad the struct to 48 bytes).
//!
//! # Memory Layout
//!
//! - Offset 0: pos (16 bytes)
//! - Offset 16: col (16 bytes)
//! - Offset 32: uv (8 bytes)
//! - Total size: 40 bytes

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec4};

/// Vertex with homogeneous position, RGBA color and texture coordinates.
///
/// # Shader Locations
///
/// - location 0: pos (vec4)
/// - location 1: col (vec4)
/// - location 2: uv (vec2)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position, `w` normally 1.0.
    pub pos: [f32; 4],
    /// Linear RGBA color.
    pub col: [f32; 4],
    /// Texture coordinates.
    pub uv: [f32; 2],
}

impl Vertex {
    /// Creates a vertex from glam vectors.
    #[inline]
    pub fn new(pos: Vec4, col: Vec4, uv: Vec2) -> Self {
        Self {
            pos: pos.to_array(),
            col: col.to_array(),
            uv: uv.to_array(),
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Binding 0, per-vertex input rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for locations 0..=2.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32A32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, col) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, uv) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        // 4 + 4 + 2 floats
        assert_eq!(Vertex::size(), 40);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 40);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();

        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);

        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32A32_SFLOAT);
        assert_eq!(attrs[1].offset, 16);

        assert_eq!(attrs[2].location, 2);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[2].offset, 32);

        assert!(attrs.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn test_vertex_new() {
        let vertex = Vertex::new(
            Vec4::new(1.0, 2.0, 3.0, 1.0),
            Vec4::new(0.5, 0.6, 0.7, 1.0),
            Vec2::new(0.25, 0.75),
        );
        assert_eq!(vertex.pos, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(vertex.col, [0.5, 0.6, 0.7, 1.0]);
        assert_eq!(vertex.uv, [0.25, 0.75]);
    }

    #[test]
    fn test_vertex_pod_cast() {
        let vertices = [Vertex::default(); 4];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 160);
    }
}
