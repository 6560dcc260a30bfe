//! Demo scene: a row of textured quads spinning in front of the camera.

use glam::{Mat4, Vec2, Vec3, Vec4};
use tracing::{debug, info};

use vkframe_renderer::{Drawable, ObjectDesc, RenderResult, Renderer};
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::texture::{Texture, checkerboard};
use vkframe_rhi::vertex::Vertex;

/// Number of quads in the row.
pub const QUAD_COUNT: usize = 3;

const TEXTURE_SIZE: u32 = 256;
const TEXTURE_CELL: u32 = 32;
const SPACING: f32 = 1.5;

/// Unit quad in the XY plane, facing +Z, wound counter-clockwise.
pub fn quad() -> ([Vertex; 4], [u16; 6]) {
    let white = Vec4::ONE;
    let vertices = [
        Vertex::new(Vec4::new(-0.5, -0.5, 0.0, 1.0), white, Vec2::new(0.0, 1.0)),
        Vertex::new(Vec4::new(0.5, -0.5, 0.0, 1.0), white, Vec2::new(1.0, 1.0)),
        Vertex::new(Vec4::new(0.5, 0.5, 0.0, 1.0), white, Vec2::new(1.0, 0.0)),
        Vertex::new(Vec4::new(-0.5, 0.5, 0.0, 1.0), white, Vec2::new(0.0, 0.0)),
    ];
    let indices = [0, 1, 2, 2, 3, 0];
    (vertices, indices)
}

/// Model matrix of quad `index` at `time` seconds.
pub fn quad_transform(index: usize, count: usize, time: f32) -> Mat4 {
    let center = (count as f32 - 1.0) * 0.5;
    let x = (index as f32 - center) * SPACING;
    let phase = index as f32 * std::f32::consts::FRAC_PI_3;

    Mat4::from_translation(Vec3::new(x, 0.0, 0.0)) * Mat4::from_rotation_y(time + phase)
}

/// Camera looking at the row from slightly above.
pub fn view_matrix() -> Mat4 {
    Mat4::look_at_rh(Vec3::new(0.0, 1.0, 4.0), Vec3::ZERO, Vec3::Y)
}

/// GPU resources of the demo and the drawables that use them.
pub struct Scene {
    // Drawables reference the buffers and texture below
    drawables: Vec<Drawable>,
    texture: Texture,
    index_buffer: Buffer,
    vertex_buffer: Buffer,
}

impl Scene {
    /// Uploads the quad and texture, then creates one drawable per quad.
    ///
    /// # Errors
    ///
    /// Returns an error if an upload fails or the descriptor pool is full.
    pub fn new(renderer: &Renderer) -> RenderResult<Self> {
        let device = renderer.device();
        let (vertices, indices) = quad();

        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            BufferUsage::Vertex,
            bytemuck::cast_slice(&vertices),
        )?;
        let index_buffer = Buffer::new_device_local(
            device.clone(),
            BufferUsage::Index,
            bytemuck::cast_slice(&indices),
        )?;

        let pixels = checkerboard(
            TEXTURE_SIZE,
            TEXTURE_CELL,
            [230, 230, 230, 255],
            [40, 90, 160, 255],
        );
        let texture = Texture::from_rgba8(device.clone(), TEXTURE_SIZE, TEXTURE_SIZE, &pixels)?;

        let drawables = (0..QUAD_COUNT)
            .map(|i| {
                renderer.init_object(ObjectDesc {
                    vertex_buffer: &vertex_buffer,
                    index_buffer: &index_buffer,
                    index_count: indices.len() as u32,
                    texture: &texture,
                    transform: quad_transform(i, QUAD_COUNT, 0.0),
                })
            })
            .collect::<RenderResult<Vec<_>>>()?;

        info!("Scene created with {} drawable(s)", drawables.len());

        Ok(Self {
            drawables,
            texture,
            index_buffer,
            vertex_buffer,
        })
    }

    /// Advances the animation to `time` seconds.
    pub fn update(&mut self, time: f32) {
        let count = self.drawables.len();
        for (i, drawable) in self.drawables.iter_mut().enumerate() {
            drawable.set_transform(quad_transform(i, count, time));
        }
    }

    pub fn drawables(&self) -> Vec<&Drawable> {
        self.drawables.iter().collect()
    }

    /// Frees every drawable's descriptor sets, then the GPU resources.
    ///
    /// # Errors
    ///
    /// Returns the first error from freeing a drawable.
    pub fn destroy(mut self, renderer: &Renderer) -> RenderResult<()> {
        for drawable in self.drawables.drain(..) {
            renderer.destroy_object(drawable)?;
        }

        let extent = self.texture.extent();
        debug!(
            "Releasing scene: {}x{} texture with {} mip level(s), {} bytes of geometry",
            extent.width,
            extent.height,
            self.texture.mip_levels(),
            self.vertex_buffer.size() + self.index_buffer.size()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_indices_in_range() {
        let (vertices, indices) = quad();
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn test_quad_is_counter_clockwise() {
        let (vertices, indices) = quad();
        let p = |i: u16| Vec3::new(vertices[i as usize].pos[0], vertices[i as usize].pos[1], 0.0);
        for tri in indices.chunks(3) {
            let normal = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
            assert!(normal.z > 0.0);
        }
    }

    #[test]
    fn test_quads_are_centered() {
        let first = quad_transform(0, 3, 0.0).w_axis;
        let middle = quad_transform(1, 3, 0.0).w_axis;
        let last = quad_transform(2, 3, 0.0).w_axis;

        assert_eq!(middle.x, 0.0);
        assert_eq!(first.x, -last.x);
    }

    #[test]
    fn test_view_looks_at_origin() {
        let origin = view_matrix().transform_point3(Vec3::ZERO);
        assert!(origin.z < 0.0);
        assert!(origin.x.abs() < 1e-5);
    }
}
