//! Frame scheduling and per-object resource binding.
//!
//! This crate drives rendering on top of `vkframe-rhi` and `vkframe-material`:
//! - [`FrameScheduler`]: acquire, record, submit and present, one slot per
//!   swapchain image
//! - [`SemaphorePool`]: recycles acquire semaphores across slots
//! - [`DescriptorBinder`]: per-object, per-slot descriptor sets
//! - [`Renderer`]: owns all of the above for one window

mod error;

pub mod binder;
pub mod depth_buffer;
pub mod frame;
pub mod frame_scheduler;
pub mod renderer;
pub mod semaphore_pool;
pub mod ubo;

pub use binder::{DescriptorBinder, Drawable, ObjectDesc};
pub use error::{RenderError, RenderResult};
pub use frame_scheduler::{FrameContext, FrameScheduler, FrameState};
pub use renderer::Renderer;
pub use semaphore_pool::SemaphorePool;
pub use ubo::{FrameUniforms, Projection};
