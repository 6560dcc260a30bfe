//! Engine configuration.
//!
//! Configuration is read from TOML. Every section and field is optional;
//! missing values fall back to [`Default`].
//!
//! # Example
//!
//! ```
//! use vkframe_core::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str(
//!     r#"
//!     [renderer]
//!     frames_in_flight = 3
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.renderer.frames_in_flight, 3);
//! assert_eq!(config.camera.fov_degrees, 70.0);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// A value is out of its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// Unsupported file format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(PathBuf),
}

/// Window settings used by the application layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "vkframe".to_string(),
        }
    }
}

/// Frame scheduling and device settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Requested number of frame slots (swapchain images). Must be 2 or 3.
    pub frames_in_flight: u32,
    /// Upper bound on live drawables, used to size the descriptor pool.
    pub max_objects: u32,
    /// Color attachment clear value (RGBA).
    pub clear_color: [f32; 4],
    /// Enable Vulkan validation layers.
    pub validation: bool,
    /// Prefer FIFO presentation over MAILBOX.
    pub vsync: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            max_objects: 1024,
            clear_color: [0.01, 0.01, 0.02, 1.0],
            validation: cfg!(debug_assertions),
            vsync: false,
        }
    }
}

/// Perspective projection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 70.0,
            near: 0.1,
            far: 100.0,
        }
    }
}

/// Material used by the demo scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialConfig {
    /// Path to the compiled SPIR-V. Its reflection lives at `<shader>.json`.
    pub shader: PathBuf,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            shader: PathBuf::from("shaders/textured.spv"),
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub camera: CameraConfig,
    pub material: MaterialConfig,
}

impl EngineConfig {
    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not `.toml`, fails to
    /// parse, or holds out-of-range values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            return Err(ConfigError::UnsupportedFormat(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Loads `path` if it exists, otherwise returns validated defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {:?}, using defaults", path);
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or out-of-range values.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.renderer;
        if !(2..=3).contains(&r.frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "renderer.frames_in_flight must be 2 or 3, got {}",
                r.frames_in_flight
            )));
        }
        if r.max_objects == 0 {
            return Err(ConfigError::Invalid(
                "renderer.max_objects must be greater than 0".to_string(),
            ));
        }

        let c = &self.camera;
        if !(c.fov_degrees > 0.0 && c.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid(format!(
                "camera.fov_degrees must be in (0, 180), got {}",
                c.fov_degrees
            )));
        }
        if !(c.near > 0.0 && c.far > c.near) {
            return Err(ConfigError::Invalid(format!(
                "camera planes must satisfy 0 < near < far, got near={} far={}",
                c.near, c.far
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(
                "window dimensions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer.frames_in_flight, 2);
        assert_eq!(config.camera.near, 0.1);
        assert_eq!(config.camera.far, 100.0);
        assert_eq!(config.camera.fov_degrees, 70.0);
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_toml_str(
            r#"
            [renderer]
            frames_in_flight = 3
            max_objects = 16
            clear_color = [1.0, 0.0, 0.0, 1.0]

            [window]
            title = "test"
            "#,
        )
        .unwrap();

        assert_eq!(config.renderer.frames_in_flight, 3);
        assert_eq!(config.renderer.max_objects, 16);
        assert_eq!(config.renderer.clear_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.window.title, "test");
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn test_rejects_bad_frames_in_flight() {
        for frames in [0, 1, 4] {
            let doc = format!("[renderer]\nframes_in_flight = {frames}\n");
            let err = EngineConfig::from_toml_str(&doc).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "frames = {frames}");
        }
    }

    #[test]
    fn test_rejects_zero_max_objects() {
        let err = EngineConfig::from_toml_str("[renderer]\nmax_objects = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_inverted_planes() {
        let err =
            EngineConfig::from_toml_str("[camera]\nnear = 10.0\nfar = 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = EngineConfig::from_toml_str("[renderer\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");

        let mut config = EngineConfig::default();
        config.renderer.frames_in_flight = 3;
        config.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = EngineConfig::load(Path::new("engine.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
