//! Acquire, record, submit and present.
//!
//! [`FrameScheduler`] drives one frame at a time through [`FrameState`]:
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting -> Idle
//!   |         |            |
//!   |         +------------+--------> Idle        (frame abandoned)
//!   +----> Recreating -> Idle
//! ```
//!
//! A frame that fails after its image was acquired is abandoned: the
//! signaled acquire semaphore is discarded rather than pooled, the slot fence
//! is left signaled, and the swapchain is rebuilt on the next frame to
//! reclaim the image.
//!
//! Each swapchain image owns a [`FrameSlot`]. Acquire semaphores come from a
//! [`SemaphorePool`] because the image index, and so the slot, is only known
//! after the acquire has consumed a semaphore.
//!
//! # Example
//!
//! ```no_run
//! use glam::Mat4;
//! use vkframe_material::Material;
//! use vkframe_renderer::binder::Drawable;
//! use vkframe_renderer::frame_scheduler::FrameScheduler;
//!
//! # fn example(
//! #     scheduler: &mut FrameScheduler,
//! #     material: &Material,
//! #     drawables: &[&Drawable],
//! # ) -> vkframe_renderer::RenderResult<()> {
//! // None means the swapchain was out of date and the frame is skipped
//! if let Some(frame) = scheduler.begin_frame(Mat4::IDENTITY)? {
//!     scheduler.draw(&frame, material, drawables)?;
//!     scheduler.end_frame(frame)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, error, info, trace, warn};

use vkframe_core::{CameraConfig, RendererConfig};
use vkframe_material::Material;
use vkframe_rhi::{RhiError, RhiResult};
use vkframe_rhi::buffer::Buffer;
use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::device::Device;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::surface::Surface;
use vkframe_rhi::swapchain::{Swapchain, SwapchainDesc};
use vkframe_rhi::sync::Semaphore;

use crate::binder::Drawable;
use crate::depth_buffer::{DepthBuffer, depth_subresource_range};
use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameSlot, SlotTimeline};
use crate::semaphore_pool::SemaphorePool;
use crate::ubo::{FrameUniforms, Projection};

/// Where the scheduler is in the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    Recreating,
}

impl FrameState {
    /// Whether `self -> next` is a legal edge.
    pub fn can_transition_to(self, next: FrameState) -> bool {
        use FrameState::*;

        matches!(
            (self, next),
            (Idle, Acquiring)
                | (Acquiring, Recording)
                | (Recording, Submitted)
                | (Submitted, Presenting)
                | (Presenting, Idle)
                | (Acquiring, Idle)
                | (Recording, Idle)
                | (Idle, Recreating)
                | (Acquiring, Recreating)
                | (Recreating, Idle)
        )
    }
}

/// Handle to the frame being recorded.
///
/// Returned by [`FrameScheduler::begin_frame`] and consumed by
/// [`FrameScheduler::end_frame`], so a frame cannot be submitted twice.
#[derive(Debug)]
pub struct FrameContext {
    slot: usize,
    image_index: u32,
    serial: u64,
}

impl FrameContext {
    /// Frame slot, equal to the acquired image index.
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Monotonic frame number, starting at 1.
    #[inline]
    pub fn serial(&self) -> u64 {
        self.serial
    }
}

/// Owns the swapchain and every per-frame resource.
pub struct FrameScheduler {
    // Field order is drop order.
    slots: Vec<FrameSlot>,
    command_pool: CommandPool,
    semaphores: SemaphorePool<Semaphore>,
    depth_buffer: DepthBuffer,
    swapchain: Swapchain,
    surface: Arc<Surface>,
    device: Arc<Device>,

    timeline: SlotTimeline,
    state: FrameState,
    serial: u64,
    needs_recreate: bool,
    width: u32,
    height: u32,
    clear_color: [f32; 4],
    projection: Projection,
    proj_matrix: Mat4,
}

impl FrameScheduler {
    /// Creates the swapchain, depth buffer and one slot per swapchain image.
    ///
    /// `config.frames_in_flight` is a request; the surface may grant more
    /// images, and the slot count follows the granted count.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object fails to create.
    pub fn new(
        device: Arc<Device>,
        instance: &Instance,
        surface: Arc<Surface>,
        config: &RendererConfig,
        camera: &CameraConfig,
        width: u32,
        height: u32,
    ) -> RenderResult<Self> {
        let swapchain = Swapchain::new(
            instance,
            device.clone(),
            &surface,
            SwapchainDesc {
                width,
                height,
                image_count: config.frames_in_flight,
                vsync: config.vsync,
            },
        )?;

        let extent = swapchain.extent();
        let depth_buffer = DepthBuffer::with_default_format(device.clone(), extent.width, extent.height)?;
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;

        let slots = (0..swapchain.image_count())
            .map(|_| FrameSlot::new(device.clone(), &command_pool))
            .collect::<RhiResult<Vec<_>>>()?;

        let projection = Projection::from(camera);
        let proj_matrix = projection.matrix(Projection::aspect(extent.width, extent.height));

        info!(
            "Frame scheduler created: {} slot(s), {}x{}",
            slots.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            timeline: SlotTimeline::new(slots.len()),
            slots,
            command_pool,
            semaphores: SemaphorePool::new(),
            depth_buffer,
            swapchain,
            surface,
            device,
            state: FrameState::Idle,
            serial: 0,
            needs_recreate: false,
            width,
            height,
            clear_color: config.clear_color,
            projection,
            proj_matrix,
        })
    }

    fn transition(&mut self, next: FrameState) -> RenderResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RenderError::InvalidState {
                from: self.state,
                to: next,
            });
        }
        trace!("Frame state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    // =========================================================================
    // Frame Loop
    // =========================================================================

    /// Acquires an image and starts recording into its slot.
    ///
    /// Runs a pending recreation first. Returns `Ok(None)` when the
    /// swapchain turned out to be out of date; it has been recreated and the
    /// caller should skip this frame.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidState`] if a frame is already in
    /// progress, or any Vulkan error from acquire, wait or recording.
    pub fn begin_frame(&mut self, view: Mat4) -> RenderResult<Option<FrameContext>> {
        if self.needs_recreate {
            debug!("Recreation pending, rebuilding before acquire");
            self.transition(FrameState::Recreating)?;
            self.finish_recreate()?;
        }

        self.transition(FrameState::Acquiring)?;

        let result = self.acquire_and_record(view);
        if result.is_err() {
            self.state = FrameState::Idle;
        }
        result
    }

    fn acquire_and_record(&mut self, view: Mat4) -> RenderResult<Option<FrameContext>> {
        let device = &self.device;
        let semaphore = self.semaphores.acquire_with(|| Semaphore::new(device.clone()))?;

        let (image_index, suboptimal) =
            match self.swapchain.acquire_next_image(semaphore.handle(), u64::MAX) {
                Ok(acquired) => acquired,
                Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    debug!("Swapchain out of date during acquire");
                    // Nothing was signaled, so the semaphore is reusable now
                    return_to_pool(&mut self.semaphores, semaphore);
                    self.transition(FrameState::Recreating)?;
                    self.finish_recreate()?;
                    return Ok(None);
                }
                Err(e) => {
                    return_to_pool(&mut self.semaphores, semaphore);
                    return Err(RenderError::Rhi(e.into()));
                }
            };

        if suboptimal {
            debug!("Swapchain suboptimal during acquire");
            self.needs_recreate = true;
        }

        // From here on the semaphore is signaled and only a submit may
        // consume it.
        let slot = image_index as usize;
        let slot_count = self.slots.len();
        let Some(frame) = self.slots.get_mut(slot) else {
            discard_from_pool(&mut self.semaphores, semaphore);
            self.needs_recreate = true;
            return Err(RenderError::SlotCountChanged {
                old: slot_count,
                new: slot + 1,
            });
        };

        if let Err(e) = frame.frame_complete().wait(u64::MAX) {
            discard_from_pool(&mut self.semaphores, semaphore);
            self.abandon_frame(slot);
            return Err(e.into());
        }
        if let Some(retired) = self.timeline.retire(slot) {
            trace!("Slot {} retired frame {}", slot, retired);
        }

        // The fence wait means the previous submission no longer reads it
        if let Some(previous) = frame.replace_image_available(semaphore) {
            return_to_pool(&mut self.semaphores, previous);
        }

        if let Err(e) = self.record_frame_start(slot, view) {
            self.abandon_frame(slot);
            return Err(e);
        }

        self.serial += 1;
        self.transition(FrameState::Recording)?;

        Ok(Some(FrameContext {
            slot,
            image_index,
            serial: self.serial,
        }))
    }

    /// Uploads the frame uniforms and opens dynamic rendering on `slot`.
    fn record_frame_start(&self, slot: usize, view: Mat4) -> RenderResult<()> {
        let frame = &self.slots[slot];

        let uniforms = FrameUniforms::new(view, self.proj_matrix);
        frame.staging().write_data(0, bytemuck::bytes_of(&uniforms))?;

        let cmd = frame.command_buffer();
        cmd.reset()?;
        cmd.begin()?;

        record_uniform_upload(cmd, frame.staging(), frame.uniform_buffer());

        let color_image = self.swapchain.image(slot).ok_or_else(|| missing_image(slot))?;
        let color_view = self.swapchain.image_view(slot).ok_or_else(|| missing_image(slot))?;
        transition_image(
            cmd,
            color_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            color_subresource_range(),
        );
        transition_image(
            cmd,
            self.depth_buffer.image(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            depth_subresource_range(),
        );

        let extent = self.swapchain.extent();
        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(color_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            });
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_buffer.image_view())
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            });

        let rendering_info = vk::RenderingInfo::default()
            .render_area(full_scissor(extent))
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        cmd.begin_rendering(&rendering_info);
        cmd.set_viewport_with_count(&[full_viewport(extent)]);
        cmd.set_scissor_with_count(&[full_scissor(extent)]);

        Ok(())
    }

    /// Records draws for `drawables` with `material`'s pipeline.
    ///
    /// Each drawable pushes its transform and binds its descriptor set for
    /// the frame's slot at set 0.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidState`] outside of recording. A failed
    /// material returns [`RenderError::MaterialNotCreated`] and abandons the
    /// frame; `ctx` is then stale and the scheduler is back in `Idle`.
    pub fn draw(&mut self, ctx: &FrameContext, material: &Material, drawables: &[&Drawable]) -> RenderResult<()> {
        if self.state != FrameState::Recording {
            return Err(RenderError::InvalidState {
                from: self.state,
                to: FrameState::Recording,
            });
        }

        let (Some(pipeline), Some(layout)) = (material.pipeline(), material.pipeline_layout()) else {
            self.abandon_frame(ctx.slot);
            return Err(RenderError::MaterialNotCreated);
        };

        let cmd = self.slots[ctx.slot].command_buffer();
        cmd.bind_graphics_pipeline(pipeline.handle());

        for drawable in drawables {
            cmd.push_constants(
                layout.handle(),
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&drawable.transform()),
            );
            cmd.bind_vertex_buffer(drawable.vertex_buffer(), 0);
            cmd.bind_index_buffer(drawable.index_buffer(), 0, vk::IndexType::UINT16);
            if let Some(&set) = drawable.descriptor_sets().get(ctx.slot) {
                cmd.bind_descriptor_sets(layout.handle(), 0, &[set]);
            }
            cmd.draw_indexed(drawable.index_count(), 1, 0, 0, 0);
        }

        trace!("Recorded {} draw(s) into slot {}", drawables.len(), ctx.slot);

        Ok(())
    }

    /// Finishes recording, submits and presents the frame.
    ///
    /// An out-of-date or suboptimal present is not an error; the swapchain
    /// is rebuilt at the start of the next [`begin_frame`](Self::begin_frame).
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidState`] if no frame is being recorded,
    /// or any Vulkan error from submission or presentation. A failure before
    /// the submit reaches the queue abandons the frame.
    pub fn end_frame(&mut self, ctx: FrameContext) -> RenderResult<()> {
        if !self.state.can_transition_to(FrameState::Submitted) {
            return Err(RenderError::InvalidState {
                from: self.state,
                to: FrameState::Submitted,
            });
        }

        if let Err(e) = self.submit(&ctx) {
            self.abandon_frame(ctx.slot);
            return Err(e);
        }
        self.transition(FrameState::Submitted)?;

        let result = self.present(&ctx);
        if result.is_err() {
            self.state = FrameState::Idle;
        }
        result
    }

    fn submit(&mut self, ctx: &FrameContext) -> RenderResult<()> {
        let frame = &self.slots[ctx.slot];
        let cmd = frame.command_buffer();

        cmd.end_rendering();
        let color_image = self
            .swapchain
            .image(ctx.slot)
            .ok_or_else(|| missing_image(ctx.slot))?;
        transition_image(
            cmd,
            color_image,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
            color_subresource_range(),
        );
        cmd.end()?;

        let image_available = frame.image_available().ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "Slot {} has no acquire semaphore",
                ctx.slot
            ))
        })?;

        let wait_semaphores = [image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished().handle()];
        let command_buffers = [cmd.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        self.timeline.submit(ctx.slot, ctx.serial)?;

        // Reset only once work is certain to be submitted
        let frame_complete = frame.frame_complete();
        let submitted = frame_complete.reset().and_then(|()| unsafe {
            self.device
                .submit_graphics(&[submit_info], frame_complete.handle())
        });
        if let Err(e) = submitted {
            // Nothing will signal the reset fence
            self.slots[ctx.slot].renew_fence(self.device.clone())?;
            return Err(e.into());
        }

        Ok(())
    }

    fn present(&mut self, ctx: &FrameContext) -> RenderResult<()> {
        self.transition(FrameState::Presenting)?;
        let render_finished = self.slots[ctx.slot].render_finished().handle();
        match self
            .swapchain
            .present(self.device.present_queue(), ctx.image_index, render_finished)
        {
            Ok(false) => {}
            Ok(true) => {
                debug!("Swapchain suboptimal during present");
                self.needs_recreate = true;
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during present");
                self.needs_recreate = true;
            }
            Err(e) => return Err(RenderError::Rhi(e.into())),
        }

        self.transition(FrameState::Idle)
    }

    /// Drops the frame recorded into `slot` and returns to `Idle`.
    ///
    /// The slot's acquire semaphore was signaled but will never be waited
    /// on, so it is destroyed. Its image stays acquired until the swapchain
    /// is rebuilt on the next `begin_frame`.
    fn abandon_frame(&mut self, slot: usize) {
        warn!("Abandoning frame in slot {} from {:?}", slot, self.state);

        if let Some(semaphore) = self.slots.get_mut(slot).and_then(FrameSlot::take_image_available) {
            discard_from_pool(&mut self.semaphores, semaphore);
        }
        self.needs_recreate = true;

        if let Err(e) = self.transition(FrameState::Idle) {
            warn!("{}", e);
            self.state = FrameState::Idle;
        }
    }

    // =========================================================================
    // Recreation
    // =========================================================================

    /// Records a new window size; the swapchain is rebuilt on the next
    /// [`begin_frame`](Self::begin_frame). Zero sizes are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            debug!("Ignoring resize to zero dimensions");
            return;
        }

        if width != self.width || height != self.height {
            debug!(
                "Resize requested: {}x{} -> {}x{}",
                self.width, self.height, width, height
            );
            self.width = width;
            self.height = height;
            self.needs_recreate = true;
        }
    }

    /// Rebuilds the swapchain and depth buffer for `width` x `height`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::InvalidState`] mid-frame,
    /// [`RenderError::SlotCountChanged`] if the surface granted a different
    /// number of images, or any Vulkan error.
    pub fn recreate(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.transition(FrameState::Recreating)?;
        if width > 0 && height > 0 {
            self.width = width;
            self.height = height;
        }
        self.finish_recreate()
    }

    /// Runs the rebuild from `Recreating` and always lands on `Idle`.
    fn finish_recreate(&mut self) -> RenderResult<()> {
        let result = self.rebuild();
        self.state = FrameState::Idle;
        result
    }

    fn rebuild(&mut self) -> RenderResult<()> {
        self.device.wait_idle()?;
        self.timeline.retire_all();

        let old_count = self.slots.len();
        self.swapchain.recreate(&self.surface, self.width, self.height)?;

        let extent = self.swapchain.extent();
        self.depth_buffer = DepthBuffer::new(
            self.device.clone(),
            extent.width,
            extent.height,
            self.depth_buffer.format(),
        )?;
        self.proj_matrix = self
            .projection
            .matrix(Projection::aspect(extent.width, extent.height));
        self.needs_recreate = false;

        let new_count = self.swapchain.image_count() as usize;
        if new_count != old_count {
            error!(
                "Swapchain image count changed from {} to {}",
                old_count, new_count
            );
            return Err(RenderError::SlotCountChanged {
                old: old_count,
                new: new_count,
            });
        }

        info!("Swapchain recreated: {}x{}", extent.width, extent.height);
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of frame slots, one per swapchain image.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Uniform buffer of `slot`, for descriptor writes.
    #[inline]
    pub fn uniform_buffer(&self, slot: usize) -> Option<&Buffer> {
        self.slots.get(slot).map(FrameSlot::uniform_buffer)
    }

    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.swapchain.format()
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_buffer.format()
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during scheduler drop: {}", e);
        }

        // Parked semaphores go back so every one is destroyed by the pool
        for slot in &mut self.slots {
            if let Some(semaphore) = slot.take_image_available() {
                return_to_pool(&mut self.semaphores, semaphore);
            }
        }

        debug!(
            "Frame scheduler destroyed after {} frame(s), {} semaphore(s) created",
            self.serial,
            self.semaphores.created()
        );
    }
}

fn return_to_pool(pool: &mut SemaphorePool<Semaphore>, semaphore: Semaphore) {
    if let Err(semaphore) = pool.release(semaphore) {
        warn!("Semaphore {:?} was not lent out; destroying it", semaphore);
    }
}

fn discard_from_pool(pool: &mut SemaphorePool<Semaphore>, semaphore: Semaphore) {
    if let Err(semaphore) = pool.discard(semaphore) {
        warn!("Semaphore {:?} was not lent out; destroying it", semaphore);
    }
}

fn missing_image(slot: usize) -> RenderError {
    RenderError::Rhi(RhiError::SwapchainError(format!(
        "No swapchain image for slot {}",
        slot
    )))
}

/// Copies the staged frame uniforms and makes them visible to vertex shaders.
fn record_uniform_upload(cmd: &CommandBuffer, staging: &Buffer, uniform_buffer: &Buffer) {
    let region = vk::BufferCopy::default().size(FrameUniforms::SIZE as u64);
    cmd.copy_buffer(staging.handle(), uniform_buffer.handle(), &[region]);

    let barrier = vk::BufferMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::UNIFORM_READ)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(uniform_buffer.handle())
        .offset(0)
        .size(vk::WHOLE_SIZE);

    cmd.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::VERTEX_SHADER,
        &[barrier],
        &[],
    );
}

fn transition_image(
    cmd: &CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
) {
    let masks = transition_masks(old_layout, new_layout);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, &[], &[barrier]);
}

/// Stage and access masks of one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags,
    pub src_access: vk::AccessFlags,
    pub dst_stage: vk::PipelineStageFlags,
    pub dst_access: vk::AccessFlags,
}

/// Masks for the layout transitions a frame performs.
///
/// The depth image is shared by every slot, so its transition also waits on
/// depth writes of the previous frame.
pub fn transition_masks(old_layout: vk::ImageLayout, new_layout: vk::ImageLayout) -> TransitionMasks {
    let fragment_tests =
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;

    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags::empty(),
            dst_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        },
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_stage: fragment_tests,
            src_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_stage: fragment_tests,
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        },
        (vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR) => TransitionMasks {
            src_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            dst_access: vk::AccessFlags::empty(),
        },
        _ => {
            warn!(
                "Unhandled layout transition: {:?} -> {:?}",
                old_layout, new_layout
            );
            TransitionMasks {
                src_stage: vk::PipelineStageFlags::ALL_COMMANDS,
                src_access: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
                dst_stage: vk::PipelineStageFlags::ALL_COMMANDS,
                dst_access: vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            }
        }
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Viewport covering `extent` with the full depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering `extent`.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_STATES: [FrameState; 6] = [
        FrameState::Idle,
        FrameState::Acquiring,
        FrameState::Recording,
        FrameState::Submitted,
        FrameState::Presenting,
        FrameState::Recreating,
    ];

    #[test]
    fn test_happy_path_cycle() {
        let path = [
            FrameState::Idle,
            FrameState::Acquiring,
            FrameState::Recording,
            FrameState::Submitted,
            FrameState::Presenting,
            FrameState::Idle,
        ];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_recreation_edges() {
        assert!(FrameState::Acquiring.can_transition_to(FrameState::Recreating));
        assert!(FrameState::Idle.can_transition_to(FrameState::Recreating));
        assert!(FrameState::Recreating.can_transition_to(FrameState::Idle));
    }

    #[test]
    fn test_abandoned_frame_can_begin_again() {
        // A draw or record failure drops the frame from where it failed
        for failed_in in [FrameState::Acquiring, FrameState::Recording] {
            assert!(failed_in.can_transition_to(FrameState::Idle), "{:?}", failed_in);
        }
        assert!(FrameState::Idle.can_transition_to(FrameState::Acquiring));

        // Once submitted, the frame must be presented
        assert!(!FrameState::Submitted.can_transition_to(FrameState::Idle));
    }

    #[test]
    fn test_illegal_edges() {
        assert!(!FrameState::Idle.can_transition_to(FrameState::Recording));
        assert!(!FrameState::Recording.can_transition_to(FrameState::Acquiring));
        assert!(!FrameState::Submitted.can_transition_to(FrameState::Idle));
        assert!(!FrameState::Recording.can_transition_to(FrameState::Recreating));
        assert!(!FrameState::Recreating.can_transition_to(FrameState::Acquiring));
    }

    #[test]
    fn test_no_self_loops() {
        for state in ALL_STATES {
            assert!(!state.can_transition_to(state), "{:?}", state);
        }
    }

    #[test]
    fn test_every_state_reaches_idle() {
        for start in ALL_STATES {
            let mut current = start;
            for _ in 0..ALL_STATES.len() {
                if current == FrameState::Idle {
                    break;
                }
                current = ALL_STATES
                    .into_iter()
                    .find(|&next| current.can_transition_to(next))
                    .unwrap();
            }
            assert_eq!(current, FrameState::Idle, "stuck from {:?}", start);
        }
    }

    #[test]
    fn test_color_transition_masks() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(masks.dst_stage, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(masks.dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

        let present = transition_masks(
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert_eq!(present.src_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(present.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_depth_transition_waits_on_previous_writes() {
        let masks = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        assert!(masks.src_stage.contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(masks.src_access.contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_full_viewport_and_scissor() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let viewport = full_viewport(extent);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_frame_scheduler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameScheduler>();
    }
}
