//! Per-slot frame resources and submission tracking.
//!
//! There is one [`FrameSlot`] per swapchain image. A slot's resources are
//! only touched again after its `frame_complete` fence has signaled.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Acquire image with a pooled semaphore (signals image_available)
//! 2. Wait on frame_complete for the acquired slot
//! 3. Park the new image_available on the slot, release the old one
//! 4. Record into command_buffer
//! 5. Reset frame_complete, then submit:
//!    - Wait on image_available
//!    - Signal render_finished
//!    - Signal frame_complete
//! 6. Present (waits on render_finished)
//! ```
//!
//! A frame that fails between 1 and 5 is abandoned: its semaphore is
//! signaled with no waiter, so it is discarded instead of pooled.

use std::sync::Arc;

use vkframe_rhi::RhiResult;
use vkframe_rhi::buffer::{Buffer, BufferUsage};
use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::device::Device;
use vkframe_rhi::sync::{Fence, Semaphore};

use crate::error::{RenderError, RenderResult};
use crate::ubo::FrameUniforms;

/// Resources owned by one swapchain image.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    frame_complete: Fence,
    image_available: Option<Semaphore>,
    render_finished: Semaphore,
    staging: Buffer,
    uniform_buffer: Buffer,
}

impl FrameSlot {
    /// Creates a slot with a signaled fence, so the first wait returns
    /// immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if any Vulkan object fails to create.
    pub fn new(device: Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        let size = FrameUniforms::SIZE as u64;

        Ok(Self {
            command_buffer: CommandBuffer::new(device.clone(), command_pool)?,
            frame_complete: Fence::new(device.clone(), true)?,
            image_available: None,
            render_finished: Semaphore::new(device.clone())?,
            staging: Buffer::new(device.clone(), BufferUsage::Staging, size)?,
            uniform_buffer: Buffer::new(device, BufferUsage::Uniform, size)?,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn frame_complete(&self) -> &Fence {
        &self.frame_complete
    }

    /// Semaphore the slot's pending submission waits on, if any.
    #[inline]
    pub fn image_available(&self) -> Option<&Semaphore> {
        self.image_available.as_ref()
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Host-visible copy source for the frame uniforms.
    #[inline]
    pub fn staging(&self) -> &Buffer {
        &self.staging
    }

    /// Device-local frame uniforms bound by descriptor sets.
    #[inline]
    pub fn uniform_buffer(&self) -> &Buffer {
        &self.uniform_buffer
    }

    /// Parks `semaphore` on the slot and returns the one it replaces.
    ///
    /// Only call after `frame_complete` has been waited on, so the returned
    /// semaphore is no longer referenced by any submission.
    pub fn replace_image_available(&mut self, semaphore: Semaphore) -> Option<Semaphore> {
        self.image_available.replace(semaphore)
    }

    /// Replaces the fence with a fresh signaled one.
    ///
    /// Used when the fence was reset but the submission that would signal
    /// it never reached the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn renew_fence(&mut self, device: Arc<Device>) -> RhiResult<()> {
        self.frame_complete = Fence::new(device, true)?;
        Ok(())
    }

    /// Removes the parked semaphore, e.g. before the slot is destroyed.
    pub fn take_image_available(&mut self) -> Option<Semaphore> {
        self.image_available.take()
    }
}

/// Which submission each slot is waiting on.
///
/// Serials increase by one per submitted frame. A slot holds at most one
/// unretired submission; the fence wait in `begin_frame` retires it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotTimeline {
    in_flight: Vec<Option<u64>>,
}

impl SlotTimeline {
    pub fn new(slot_count: usize) -> Self {
        Self {
            in_flight: vec![None; slot_count],
        }
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Serial of the submission `slot` must wait for, if any.
    #[inline]
    pub fn pending(&self, slot: usize) -> Option<u64> {
        self.in_flight.get(slot).copied().flatten()
    }

    /// Records that `serial` was submitted on `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotInFlight`] if the slot's previous
    /// submission was never retired.
    pub fn submit(&mut self, slot: usize, serial: u64) -> RenderResult<()> {
        let Some(entry) = self.in_flight.get_mut(slot) else {
            return Err(RenderError::SlotCountChanged {
                old: self.in_flight.len(),
                new: slot + 1,
            });
        };
        if let Some(previous) = *entry {
            return Err(RenderError::SlotInFlight {
                slot,
                serial: previous,
            });
        }
        *entry = Some(serial);
        Ok(())
    }

    /// Marks the slot's submission as complete, returning its serial.
    pub fn retire(&mut self, slot: usize) -> Option<u64> {
        self.in_flight.get_mut(slot).and_then(Option::take)
    }

    /// Retires every slot, e.g. after a device idle wait.
    pub fn retire_all(&mut self) {
        self.in_flight.iter_mut().for_each(|entry| *entry = None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives the timeline the way the scheduler does with round-robin slots.
    fn run_frame(timeline: &mut SlotTimeline, serial: u64) -> Option<u64> {
        let slot = ((serial - 1) as usize) % timeline.slot_count();
        let waited_on = timeline.retire(slot);
        timeline.submit(slot, serial).unwrap();
        waited_on
    }

    #[test]
    fn test_third_frame_waits_on_first() {
        let mut timeline = SlotTimeline::new(2);

        assert_eq!(run_frame(&mut timeline, 1), None);
        assert_eq!(run_frame(&mut timeline, 2), None);
        assert_eq!(timeline.pending(0), Some(1));
        assert_eq!(run_frame(&mut timeline, 3), Some(1));
        assert_eq!(run_frame(&mut timeline, 4), Some(2));
    }

    #[test]
    fn test_submit_without_retire_is_rejected() {
        let mut timeline = SlotTimeline::new(2);
        timeline.submit(0, 1).unwrap();

        let err = timeline.submit(0, 3).unwrap_err();
        assert!(matches!(err, RenderError::SlotInFlight { slot: 0, serial: 1 }));
    }

    #[test]
    fn test_submit_out_of_range() {
        let mut timeline = SlotTimeline::new(2);
        assert!(matches!(
            timeline.submit(2, 1),
            Err(RenderError::SlotCountChanged { old: 2, new: 3 })
        ));
    }

    #[test]
    fn test_retire_all() {
        let mut timeline = SlotTimeline::new(3);
        timeline.submit(0, 1).unwrap();
        timeline.submit(2, 2).unwrap();

        timeline.retire_all();
        assert_eq!(timeline, SlotTimeline::new(3));
        assert_eq!(timeline.pending(7), None);
    }

    #[test]
    fn test_frame_slot_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameSlot>();
    }
}
