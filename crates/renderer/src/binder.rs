//! Per-object descriptor sets.
//!
//! Every [`Drawable`] owns one descriptor set per frame slot, so writing an
//! object's set for slot N never races with the GPU reading slot M. Sets are
//! never shared between objects.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, info};

use vkframe_material::{BindingKind, BindingSlot, Material};
use vkframe_rhi::RhiError;
use vkframe_rhi::buffer::Buffer;
use vkframe_rhi::descriptor::{self, DescriptorPool};
use vkframe_rhi::device::Device;
use vkframe_rhi::texture::Texture;

use crate::error::{RenderError, RenderResult};
use crate::frame_scheduler::FrameScheduler;

/// GPU resources an object is drawn from.
#[derive(Clone, Copy)]
pub struct ObjectDesc<'a> {
    pub vertex_buffer: &'a Buffer,
    /// `u16` indices.
    pub index_buffer: &'a Buffer,
    pub index_count: u32,
    pub texture: &'a Texture,
    /// Model matrix, pushed as a vertex-stage push constant.
    pub transform: Mat4,
}

/// A drawable object: buffer handles, transform and its descriptor sets.
///
/// The referenced buffers and texture must outlive the drawable. Return it
/// through [`DescriptorBinder::destroy_object`] to free its sets.
#[derive(Debug)]
pub struct Drawable {
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    index_count: u32,
    transform: Mat4,
    descriptor_sets: Vec<vk::DescriptorSet>,
}

impl Drawable {
    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    #[inline]
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    /// One set per frame slot, indexed by slot. Empty if the material has no
    /// descriptor sets.
    #[inline]
    pub fn descriptor_sets(&self) -> &[vk::DescriptorSet] {
        &self.descriptor_sets
    }
}

/// Allocates and writes descriptor sets for drawables.
///
/// The pool is sized for `max_objects` live drawables at `slot_count` sets
/// each. The binder is `!Sync`: allocation and freeing mutate the pool.
pub struct DescriptorBinder {
    pool: DescriptorPool,
    device: Arc<Device>,
    slot_count: usize,
    objects: ObjectCount,
}

impl DescriptorBinder {
    /// Creates a pool fitting `max_objects` drawables of `material`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        material: &Material,
        slot_count: usize,
        max_objects: u32,
    ) -> RenderResult<Self> {
        let max_sets = max_objects.saturating_mul(slot_count as u32).max(1);
        let sizes = pool_sizes(material.bindings(0), max_sets);

        let pool = DescriptorPool::new(device.clone(), max_sets, &sizes)?;

        info!(
            "Descriptor binder created: {} object(s) x {} slot(s)",
            max_objects, slot_count
        );

        Ok(Self {
            pool,
            device,
            slot_count,
            objects: ObjectCount::new(max_objects),
        })
    }

    /// Allocates one set per slot for a new object and writes every binding
    /// of the material's set 0.
    ///
    /// # Errors
    ///
    /// Returns:
    /// - [`RenderError::MaterialNotCreated`] for a failed material
    /// - [`RenderError::SlotCountChanged`] if the scheduler's slot count no
    ///   longer matches the pool
    /// - [`RenderError::DescriptorPoolExhausted`] when `max_objects` are live
    pub fn init_object(
        &self,
        material: &Material,
        scheduler: &FrameScheduler,
        desc: ObjectDesc<'_>,
    ) -> RenderResult<Drawable> {
        if !material.created() {
            return Err(RenderError::MaterialNotCreated);
        }
        if scheduler.slot_count() != self.slot_count {
            return Err(RenderError::SlotCountChanged {
                old: self.slot_count,
                new: scheduler.slot_count(),
            });
        }
        self.objects.check()?;

        let descriptor_sets = match material.set_layouts().first() {
            Some(layout) => {
                let layouts = vec![layout.handle(); self.slot_count];
                let sets = self.pool.allocate(&layouts).map_err(pool_error)?;

                for (slot, &set) in sets.iter().enumerate() {
                    if let Some(uniform_buffer) = scheduler.uniform_buffer(slot) {
                        self.write_set(set, material.bindings(0), uniform_buffer, desc.texture);
                    }
                }
                sets
            }
            None => Vec::new(),
        };

        let live = self.objects.add();
        debug!(
            "Object created with {} descriptor set(s), {} live",
            descriptor_sets.len(),
            live
        );

        Ok(Drawable {
            vertex_buffer: desc.vertex_buffer.handle(),
            index_buffer: desc.index_buffer.handle(),
            index_count: desc.index_count,
            transform: desc.transform,
            descriptor_sets,
        })
    }

    fn write_set(&self, set: vk::DescriptorSet, bindings: &[BindingSlot], uniform_buffer: &Buffer, texture: &Texture) {
        let buffer_info = [descriptor::buffer_info(
            uniform_buffer.handle(),
            0,
            uniform_buffer.size(),
        )];
        let image_info = [descriptor::image_info(
            vk::Sampler::null(),
            texture.image_view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        let sampler_info = [descriptor::image_info(
            texture.sampler(),
            vk::ImageView::null(),
            vk::ImageLayout::UNDEFINED,
        )];

        let writes: Vec<_> = bindings
            .iter()
            .map(|slot| {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(slot.binding)
                    .dst_array_element(0)
                    .descriptor_type(slot.kind.descriptor_type());
                match slot.kind {
                    BindingKind::UniformBuffer => write.buffer_info(&buffer_info),
                    BindingKind::SampledImage => write.image_info(&image_info),
                    BindingKind::Sampler => write.image_info(&sampler_info),
                }
            })
            .collect();

        descriptor::update_descriptor_sets(&self.device, &writes);
    }

    /// Frees a drawable's sets back to the pool.
    ///
    /// No in-flight frame may still reference the drawable; wait for the
    /// device to idle first.
    ///
    /// # Errors
    ///
    /// Returns an error if the free fails.
    pub fn destroy_object(&self, drawable: Drawable) -> RenderResult<()> {
        self.pool.free(&drawable.descriptor_sets)?;
        let live = self.objects.remove();
        debug!("Object destroyed, {} live", live);
        Ok(())
    }

    /// Number of drawables currently holding sets.
    #[inline]
    pub fn live_objects(&self) -> u32 {
        self.objects.live()
    }
}

/// Live drawables counted against the pool's object budget.
#[derive(Debug)]
struct ObjectCount {
    live: Cell<u32>,
    max: u32,
}

impl ObjectCount {
    fn new(max: u32) -> Self {
        Self {
            live: Cell::new(0),
            max,
        }
    }

    fn check(&self) -> RenderResult<()> {
        check_capacity(self.live.get(), self.max)
    }

    fn add(&self) -> u32 {
        let live = self.live.get() + 1;
        self.live.set(live);
        live
    }

    fn remove(&self) -> u32 {
        let live = self.live.get().saturating_sub(1);
        self.live.set(live);
        live
    }

    #[inline]
    fn live(&self) -> u32 {
        self.live.get()
    }
}

/// Pool sizes for `max_sets` sets laid out as `bindings`.
///
/// A material without bindings still gets one entry, since a pool needs at
/// least one size.
pub fn pool_sizes(bindings: &[BindingSlot], max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
    let mut per_type: BTreeMap<i32, u32> = BTreeMap::new();
    for slot in bindings {
        *per_type.entry(slot.kind.descriptor_type().as_raw()).or_default() += 1;
    }

    if per_type.is_empty() {
        return vec![
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(max_sets),
        ];
    }

    per_type
        .into_iter()
        .map(|(ty, count)| {
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::from_raw(ty))
                .descriptor_count(count.saturating_mul(max_sets))
        })
        .collect()
}

/// Fails once `live` objects fill the pool.
pub fn check_capacity(live: u32, max_objects: u32) -> RenderResult<()> {
    if live >= max_objects {
        return Err(RenderError::DescriptorPoolExhausted);
    }
    Ok(())
}

/// Maps Vulkan pool exhaustion to [`RenderError::DescriptorPoolExhausted`].
fn pool_error(error: RhiError) -> RenderError {
    match error {
        RhiError::VulkanError(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {
            RenderError::DescriptorPoolExhausted
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(binding: u32, kind: BindingKind) -> BindingSlot {
        BindingSlot {
            binding,
            kind,
            name: format!("b{}", binding),
        }
    }

    fn count_of(sizes: &[vk::DescriptorPoolSize], ty: vk::DescriptorType) -> Option<u32> {
        sizes
            .iter()
            .find(|size| size.ty == ty)
            .map(|size| size.descriptor_count)
    }

    #[test]
    fn test_pool_sizes_per_kind() {
        let bindings = [
            slot(1, BindingKind::SampledImage),
            slot(2, BindingKind::Sampler),
            slot(3, BindingKind::SampledImage),
            slot(0, BindingKind::UniformBuffer),
        ];
        let sizes = pool_sizes(&bindings, 10);

        assert_eq!(sizes.len(), 3);
        assert_eq!(count_of(&sizes, vk::DescriptorType::SAMPLED_IMAGE), Some(20));
        assert_eq!(count_of(&sizes, vk::DescriptorType::SAMPLER), Some(10));
        assert_eq!(count_of(&sizes, vk::DescriptorType::UNIFORM_BUFFER), Some(10));
    }

    #[test]
    fn test_pool_sizes_without_bindings() {
        let sizes = pool_sizes(&[], 4);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].descriptor_count, 4);
    }

    #[test]
    fn test_capacity() {
        assert!(check_capacity(0, 1).is_ok());
        assert!(check_capacity(2, 3).is_ok());
        assert!(matches!(
            check_capacity(3, 3),
            Err(RenderError::DescriptorPoolExhausted)
        ));
    }

    #[test]
    fn test_object_count_tracks_live_drawables() {
        let objects = ObjectCount::new(2);
        assert_eq!(objects.live(), 0);

        assert!(objects.check().is_ok());
        assert_eq!(objects.add(), 1);
        assert!(objects.check().is_ok());
        assert_eq!(objects.add(), 2);
        assert!(matches!(objects.check(), Err(RenderError::DescriptorPoolExhausted)));

        assert_eq!(objects.remove(), 1);
        assert!(objects.check().is_ok());
        assert_eq!(objects.live(), 1);
    }

    #[test]
    fn test_object_count_remove_saturates() {
        let objects = ObjectCount::new(1);
        assert_eq!(objects.remove(), 0);
        assert_eq!(objects.live(), 0);
        assert_eq!(objects.add(), 1);
    }

    #[test]
    fn test_pool_errors_map_to_exhausted() {
        for result in [vk::Result::ERROR_OUT_OF_POOL_MEMORY, vk::Result::ERROR_FRAGMENTED_POOL] {
            assert!(matches!(
                pool_error(RhiError::VulkanError(result)),
                RenderError::DescriptorPoolExhausted
            ));
        }
        assert!(matches!(
            pool_error(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST)),
            RenderError::Rhi(_)
        ));
    }

    #[test]
    fn test_drawable_set_transform() {
        let mut drawable = Drawable {
            vertex_buffer: vk::Buffer::null(),
            index_buffer: vk::Buffer::null(),
            index_count: 6,
            transform: Mat4::IDENTITY,
            descriptor_sets: Vec::new(),
        };
        let moved = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        drawable.set_transform(moved);
        assert_eq!(drawable.transform(), moved);
        assert!(drawable.descriptor_sets().is_empty());
    }

    #[test]
    fn test_binder_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<DescriptorBinder>();
        assert_send::<Drawable>();
    }
}
