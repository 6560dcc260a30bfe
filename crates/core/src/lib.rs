//! Core utilities for the vkframe engine.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Engine configuration loaded from TOML
//! - Frame timing

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    CameraConfig, ConfigError, EngineConfig, MaterialConfig, RendererConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameClock;
