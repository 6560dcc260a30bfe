//! Renderer error types.

use thiserror::Error;
use vkframe_material::MaterialError;
use vkframe_rhi::RhiError;

use crate::frame_scheduler::FrameState;

/// Errors raised by the frame scheduler, the descriptor binder and the
/// renderer facade.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Device-level failure
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Material construction failure
    #[error(transparent)]
    Material(#[from] MaterialError),

    /// The descriptor pool has no room for another object
    #[error("Descriptor pool exhausted; raise renderer.max_objects")]
    DescriptorPoolExhausted,

    /// The frame state machine was driven along an illegal edge
    #[error("Invalid frame state transition: {from:?} -> {to:?}")]
    InvalidState { from: FrameState, to: FrameState },

    /// Swapchain recreation changed the number of frame slots
    #[error("Swapchain image count changed from {old} to {new}")]
    SlotCountChanged { old: usize, new: usize },

    /// A slot was submitted again before its previous submission retired
    #[error("Frame slot {slot} still has submission {serial} in flight")]
    SlotInFlight { slot: usize, serial: u64 },

    /// The material failed to build and cannot be drawn with
    #[error("Material was not created")]
    MaterialNotCreated,
}

/// Result type alias for renderer operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_invalid_state_display() {
        let err = RenderError::InvalidState {
            from: FrameState::Idle,
            to: FrameState::Presenting,
        };
        assert_eq!(
            err.to_string(),
            "Invalid frame state transition: Idle -> Presenting"
        );
    }

    #[test]
    fn test_rhi_error_is_transparent() {
        let err = RenderError::from(RhiError::from(vk::Result::ERROR_DEVICE_LOST));
        assert_eq!(
            err.to_string(),
            RhiError::from(vk::Result::ERROR_DEVICE_LOST).to_string()
        );
    }

    #[test]
    fn test_slot_count_changed_display() {
        let err = RenderError::SlotCountChanged { old: 2, new: 3 };
        assert_eq!(err.to_string(), "Swapchain image count changed from 2 to 3");
    }
}
