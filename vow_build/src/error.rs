//! Error types for the build wrapper

use thiserror::Error;

/// Result type for build operations
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that can occur while loading configuration or driving the
/// compiler
#[derive(Error, Debug)]
pub enum BuildError {
    /// Error validating a build configuration
    #[error("Validation error at {path}: {message}")]
    Validation { path: String, message: String },

    /// Invalid glob pattern
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),

    /// Error walking the source tree
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error from the deferred bridge
    #[error("Deferred error: {0}")]
    Core(#[from] vow_core::VowError),
}
