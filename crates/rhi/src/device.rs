//! Vulkan logical device, queues and memory allocator.
//!
//! The [`Device`] is the engine's device context. It is created once, shared
//! as `Arc<Device>`, and passed explicitly to every component that touches GPU
//! handles. It provides:
//! - Logical device creation with dynamic rendering and synchronization2
//! - Graphics and present queues
//! - Memory allocation via gpu-allocator
//! - Blocking one-shot command submission for setup-time uploads
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::physical_device::select_physical_device;
//! use vkframe_rhi::surface::Surface;
//!
//! # fn example(instance: &Instance, surface: &Surface) -> Result<(), vkframe_rhi::RhiError> {
//! let info = select_physical_device(instance.handle(), surface)?;
//! let device = Device::new(instance, &info)?;
//!
//! device.submit_one_shot(|cmd| {
//!     // record copy commands into `cmd`
//!     let _ = cmd;
//! })?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{DEVICE_EXTENSIONS, PhysicalDeviceInfo, QueueFamilyIndices};
use crate::texture::TEXTURE_FORMAT;

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across threads through `Arc`. The allocator and the one-shot
/// command pool are each guarded by a `Mutex`.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Device limits captured at selection time.
    limits: vk::PhysicalDeviceLimits,
    /// Whether anisotropic filtering was enabled.
    anisotropy_enabled: bool,
    /// Whether the texture format supports linear-filtered blits.
    linear_blit: bool,
    /// GPU memory allocator. Dropped before the device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Transient pool for one-shot submissions.
    upload_pool: Mutex<vk::CommandPool>,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle.
    present_queue: vk::Queue,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// Enables the swapchain extension, the Vulkan 1.3 dynamic rendering and
    /// synchronization2 features, and sampler anisotropy when supported.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The queue families are incomplete
    /// - Device creation fails
    /// - Allocator or command pool initialization fails
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::NoSuitableGpu);
        };

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let anisotropy_enabled = physical_device_info.supports_anisotropy();
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(anisotropy_enabled);

        let format_properties = unsafe {
            instance
                .handle()
                .get_physical_device_format_properties(physical_device_info.device, TEXTURE_FORMAT)
        };
        let linear_blit = format_properties.optimal_tiling_features.contains(
            vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR
                | vk::FormatFeatureFlags::BLIT_SRC
                | vk::FormatFeatureFlags::BLIT_DST,
        );
        if !linear_blit {
            warn!(
                "{:?} does not support linear blits, textures get a single mip level",
                TEXTURE_FORMAT
            );
        }

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!(
            "Queues retrieved (graphics family {}, present family {})",
            graphics_family, present_family
        );

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(graphics_family);
        let upload_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                drop(allocator);
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            limits: physical_device_info.properties.limits,
            anisotropy_enabled,
            linear_blit,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            upload_pool: Mutex::new(upload_pool),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the physical device limits.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.limits
    }

    /// Whether samplers may enable anisotropic filtering.
    #[inline]
    pub fn anisotropy_enabled(&self) -> bool {
        self.anisotropy_enabled
    }

    /// Whether texture mip chains can be generated with linear blits.
    #[inline]
    pub fn linear_blit_supported(&self) -> bool {
        self.linear_blit
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Graphics queue family index.
    #[inline]
    pub fn graphics_family(&self) -> u32 {
        // Device::new rejects incomplete families
        self.queue_families.graphics_family.unwrap_or_default()
    }

    /// Returns the GPU memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }

    /// Locks the allocator.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::LockPoisoned`] if a thread panicked while holding it.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator.lock().map_err(|_| RhiError::LockPoisoned)
    }

    /// Blocks until all queues are idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - Referenced semaphores are in the expected state
    /// - The fence (if not null) is unsignaled and not in use
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }

    /// Records commands into a one-shot command buffer, submits it and waits
    /// for completion.
    ///
    /// Intended for setup-time uploads; it blocks on the graphics queue.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation, recording or submission fails.
    pub fn submit_one_shot<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let pool = self.upload_pool.lock().map_err(|_| RhiError::LockPoisoned)?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = unsafe { self.device.allocate_command_buffers(&alloc_info)? }[0];

        let result = self.record_and_wait(cmd, record);

        unsafe { self.device.free_command_buffers(*pool, &[cmd]) };
        result
    }

    fn record_and_wait<F>(&self, cmd: vk::CommandBuffer, record: F) -> RhiResult<()>
    where
        F: FnOnce(vk::CommandBuffer),
    {
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device.begin_command_buffer(cmd, &begin_info)?;
            record(cmd);
            self.device.end_command_buffer(cmd)?;

            let command_buffers = [cmd];
            let submit = vk::SubmitInfo::default().command_buffers(&command_buffers);
            self.device
                .queue_submit(self.graphics_queue, &[submit], vk::Fence::null())?;
            self.device.queue_wait_idle(self.graphics_queue)?;
        }

        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            if let Ok(pool) = self.upload_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }

            // The allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device is Send+Sync
// - vk handles are plain Copy values
// - The allocator and the upload pool are behind Mutexes
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
