//! Sampled 2D textures.
//!
//! A [`Texture`] is an RGBA8 image in device-local memory plus a view and a
//! sampler. Pixels are uploaded into mip level 0 through a staging buffer,
//! then the rest of the chain is blitted down from it in the same one-shot
//! submission. Every level ends in `SHADER_READ_ONLY_OPTIMAL`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::texture::{Texture, checkerboard};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let pixels = checkerboard(64, 8, [255, 255, 255, 255], [40, 40, 40, 255]);
//! let texture = Texture::from_rgba8(device, 64, 64, &pixels)?;
//! let _view = texture.image_view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Texel format of every texture created here.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Sampled RGBA8 texture with its view and sampler.
pub struct Texture {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    allocation: Option<Allocation>,
    extent: vk::Extent2D,
    mip_levels: u32,
}

impl Texture {
    /// Creates a texture from tightly packed RGBA8 pixels.
    ///
    /// The image carries a full mip chain (see [`mip_levels`]) unless the
    /// device cannot blit the texture format with linear filtering, in which
    /// case only level 0 exists. Blocks until the upload has completed.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The dimensions are zero or `pixels` has the wrong length
    /// - Image, memory, view or sampler creation fails
    /// - The upload submission fails
    pub fn from_rgba8(device: Arc<Device>, width: u32, height: u32, pixels: &[u8]) -> RhiResult<Self> {
        check_pixel_len(width, height, pixels.len())?;

        let mip_levels = if device.linear_blit_supported() {
            mip_levels(width, height)
        } else {
            1
        };

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(
                vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let mut texture = Self {
            device: device.clone(),
            image,
            image_view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            allocation: None,
            extent: vk::Extent2D { width, height },
            mip_levels,
        };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };
        let allocation = device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: "texture",
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }
        texture.allocation = Some(allocation);

        texture.upload(pixels)?;

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(TEXTURE_FORMAT)
            .subresource_range(color_subresource_range(0, mip_levels));
        texture.image_view = unsafe { device.handle().create_image_view(&view_info, None)? };

        let mut sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);
        if device.anisotropy_enabled() {
            sampler_info = sampler_info
                .anisotropy_enable(true)
                .max_anisotropy(device.limits().max_sampler_anisotropy);
        }
        texture.sampler = unsafe { device.handle().create_sampler(&sampler_info, None)? };

        info!(
            "Created texture: {}x{} ({:?}, {} mip level(s))",
            width, height, TEXTURE_FORMAT, mip_levels
        );

        Ok(texture)
    }

    fn upload(&self, pixels: &[u8]) -> RhiResult<()> {
        let staging = Buffer::new_staging(self.device.clone(), pixels)?;
        let device = self.device.handle();
        let image = self.image;
        let extent = self.extent;
        let mip_levels = self.mip_levels;

        self.device.submit_one_shot(|cmd| {
            let to_transfer = layout_barrier(
                image,
                color_subresource_range(0, mip_levels),
                (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (vk::AccessFlags::empty(), vk::AccessFlags::TRANSFER_WRITE),
            );

            let region = vk::BufferImageCopy::default()
                .image_subresource(color_subresource_layers(0))
                .image_extent(vk::Extent3D {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                });

            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    vk::PipelineStageFlags::TOP_OF_PIPE,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[to_transfer],
                );
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }

            record_mip_chain(device, cmd, image, extent, mip_levels);
        })
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            let device = self.device.handle();
            if self.sampler != vk::Sampler::null() {
                device.destroy_sampler(self.sampler, None);
            }
            if self.image_view != vk::ImageView::null() {
                device.destroy_image_view(self.image_view, None);
            }
            device.destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free texture allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking texture allocation: {}", e),
            }
        }

        debug!(
            "Destroyed texture: {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

/// Number of levels in a full mip chain for a `width` x `height` image.
///
/// Halving stops at 1x1, so this is `floor(log2(max(width, height))) + 1`.
/// Zero-sized dimensions are treated as 1.
pub fn mip_levels(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Extent of mip `level` for a base of `extent`, clamped to at least 1x1.
fn mip_extent(extent: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width.checked_shr(level).unwrap_or(0).max(1),
        height: extent.height.checked_shr(level).unwrap_or(0).max(1),
    }
}

/// Records the blits that fill levels `1..mip_levels` from level 0.
///
/// Expects every level in `TRANSFER_DST_OPTIMAL` with level 0 written, and
/// leaves every level in `SHADER_READ_ONLY_OPTIMAL`.
fn record_mip_chain(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    extent: vk::Extent2D,
    mip_levels: u32,
) {
    for level in 1..mip_levels {
        let src = mip_extent(extent, level - 1);
        let dst = mip_extent(extent, level);

        let to_src = layout_barrier(
            image,
            color_subresource_range(level - 1, 1),
            (
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ),
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ),
        );

        let blit = vk::ImageBlit::default()
            .src_subresource(color_subresource_layers(level - 1))
            .src_offsets([vk::Offset3D::default(), far_corner(src)])
            .dst_subresource(color_subresource_layers(level))
            .dst_offsets([vk::Offset3D::default(), far_corner(dst)]);

        let src_to_shader_read = layout_barrier(
            image,
            color_subresource_range(level - 1, 1),
            (
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            ),
            (vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ),
        );

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[to_src],
            );
            device.cmd_blit_image(
                cmd,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );
            device.cmd_pipeline_barrier(
                cmd,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[src_to_shader_read],
            );
        }
    }

    // The last level was only ever a blit (or copy) destination.
    let last_to_shader_read = layout_barrier(
        image,
        color_subresource_range(mip_levels - 1, 1),
        (
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ),
        (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ),
    );
    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[last_to_shader_read],
        );
    }
}

fn layout_barrier(
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
    (src_access, dst_access): (vk::AccessFlags, vk::AccessFlags),
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

fn far_corner(extent: vk::Extent2D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: 1,
    }
}

fn color_subresource_range(base_mip_level: u32, level_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(base_mip_level)
        .level_count(level_count)
        .layer_count(1)
}

fn color_subresource_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(mip_level)
        .layer_count(1)
}

fn check_pixel_len(width: u32, height: u32, len: usize) -> RhiResult<()> {
    if width == 0 || height == 0 {
        return Err(RhiError::InvalidHandle(
            "Texture dimensions must be greater than 0".to_string(),
        ));
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(RhiError::InvalidHandle(format!(
            "Expected {} bytes of RGBA8 pixels for {}x{}, got {}",
            expected, width, height, len
        )));
    }
    Ok(())
}

/// Generates a square RGBA8 checkerboard of `size` pixels with `cell`-pixel squares.
pub fn checkerboard(size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Vec<u8> {
    let cell = cell.max(1);
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        for x in 0..size {
            let texel = if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b };
            pixels.extend_from_slice(&texel);
        }
    }
    pixels
}
