//! Renderer facade.
//!
//! [`Renderer`] wires the device context, the frame scheduler, the configured
//! material and its descriptor binder together, and owns their teardown
//! order.

use std::sync::Arc;

use glam::Mat4;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{error, info, warn};

use vkframe_core::EngineConfig;
use vkframe_material::Material;
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::surface::Surface;

use crate::binder::{DescriptorBinder, Drawable, ObjectDesc};
use crate::error::{RenderError, RenderResult};
use crate::frame_scheduler::FrameScheduler;

/// Everything needed to draw textured objects into a window.
///
/// # Example
///
/// ```no_run
/// use glam::Mat4;
/// use vkframe_core::EngineConfig;
/// use vkframe_renderer::Renderer;
/// # use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
///
/// # fn example(display: RawDisplayHandle, window: RawWindowHandle) -> vkframe_renderer::RenderResult<()> {
/// let config = EngineConfig::default();
/// // SAFETY: the window outlives the renderer.
/// let mut renderer = unsafe { Renderer::new(&config, display, window, 1280, 720)? };
/// renderer.render_frame(Mat4::IDENTITY, &[])?;
/// # Ok(())
/// # }
/// ```
pub struct Renderer {
    // Field order is drop order.
    binder: DescriptorBinder,
    material: Material,
    scheduler: FrameScheduler,
    // Held only to outlive everything above.
    _surface: Arc<Surface>,
    device: Arc<Device>,
    _instance: Instance,
}

impl Renderer {
    /// Brings up Vulkan for a window and builds the configured material.
    ///
    /// # Safety
    ///
    /// `display` and `window` must be valid and outlive the renderer.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::MaterialNotCreated`] if the material failed to
    /// build (the cause is logged), or any device error.
    pub unsafe fn new(
        config: &EngineConfig,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        info!("Initializing renderer ({}x{})", width, height);

        let instance = Instance::new(&config.window.title, config.renderer.validation, Some(display))?;
        // SAFETY: handle validity is guaranteed by the caller.
        let surface = Arc::new(unsafe { Surface::new(&instance, display, window)? });
        let physical_device = select_physical_device(instance.handle(), &surface)?;
        let device = Device::new(&instance, &physical_device)?;

        let scheduler = FrameScheduler::new(
            device.clone(),
            &instance,
            surface.clone(),
            &config.renderer,
            &config.camera,
            width,
            height,
        )?;

        let material = Material::new(
            device.clone(),
            &config.material.shader,
            scheduler.color_format(),
            scheduler.depth_format(),
        );
        if !material.created() {
            return Err(RenderError::MaterialNotCreated);
        }

        let binder = DescriptorBinder::new(
            device.clone(),
            &material,
            scheduler.slot_count(),
            config.renderer.max_objects,
        )?;

        info!(
            "Renderer initialized: {} frame slot(s), up to {} object(s)",
            scheduler.slot_count(),
            config.renderer.max_objects
        );

        Ok(Self {
            binder,
            material,
            scheduler,
            _surface: surface,
            device,
            _instance: instance,
        })
    }

    /// Creates a drawable for the renderer's material.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::DescriptorPoolExhausted`] once
    /// `renderer.max_objects` drawables are live.
    pub fn init_object(&self, desc: ObjectDesc<'_>) -> RenderResult<Drawable> {
        self.binder.init_object(&self.material, &self.scheduler, desc)
    }

    /// Waits for in-flight frames, then frees the drawable's sets.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait or the free fails.
    pub fn destroy_object(&self, drawable: Drawable) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.binder.destroy_object(drawable)
    }

    /// Draws one frame. A frame skipped for swapchain recreation is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns any scheduler error, including
    /// [`RenderError::SlotCountChanged`] after a resize the renderer cannot
    /// absorb.
    pub fn render_frame(&mut self, view: Mat4, drawables: &[&Drawable]) -> RenderResult<()> {
        let Some(frame) = self.scheduler.begin_frame(view)? else {
            return Ok(());
        };
        self.scheduler.draw(&frame, &self.material, drawables)?;
        self.scheduler.end_frame(frame)
    }

    /// Schedules swapchain recreation for a new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.scheduler.resize(width, height);
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }
        let live = self.binder.live_objects();
        if live > 0 {
            warn!("{} drawable(s) still live at renderer drop", live);
        }
        info!("Renderer destroyed");
    }
}
