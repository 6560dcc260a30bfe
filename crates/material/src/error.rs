//! Error types for material loading and construction.

use std::path::PathBuf;

use thiserror::Error;
use vkframe_rhi::RhiError;
use vkframe_rhi::shader::ShaderStage;

use crate::builder::BuildStage;

/// Error type for material operations.
#[derive(Error, Debug)]
pub enum MaterialError {
    /// The reflection document does not exist.
    #[error("Reflection document not found: {0}")]
    ReflectionMissing(PathBuf),

    /// The reflection document is not valid JSON or lacks `parameters`.
    #[error("Failed to parse reflection document '{path}': {message}")]
    ReflectionParse {
        /// Path of the document, empty when parsed from a string.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A GPU object could not be created.
    #[error("Failed to create {stage}: {source}")]
    Build {
        /// Which construction step failed.
        stage: BuildStage,
        /// Underlying RHI error.
        #[source]
        source: RhiError,
    },

    /// Two bindings of one set share a binding number.
    #[error("Set {set} declares binding {binding} more than once")]
    DuplicateBinding {
        /// Descriptor set index.
        set: usize,
        /// The repeated binding number.
        binding: u32,
    },

    /// The reflection lists no entry point for a required stage.
    #[error("No {0} entry point in reflection")]
    MissingEntryPoint(ShaderStage),

    /// IO error while reading material files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MaterialError {
    /// Returns a closure that tags an [`RhiError`] with `stage`.
    pub(crate) fn at(stage: BuildStage) -> impl FnOnce(RhiError) -> Self {
        move |source| MaterialError::Build { stage, source }
    }
}

/// Result type alias for material operations.
pub type MaterialResult<T> = Result<T, MaterialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_error_names_stage() {
        let err = MaterialError::at(BuildStage::PipelineLayout)(RhiError::NoSuitableGpu);
        assert_eq!(
            err.to_string(),
            "Failed to create pipeline layout: No suitable GPU found"
        );
    }

    #[test]
    fn test_missing_entry_point_display() {
        let err = MaterialError::MissingEntryPoint(ShaderStage::Fragment);
        assert_eq!(err.to_string(), "No fragment entry point in reflection");
    }
}
