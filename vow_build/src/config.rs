//! Build configuration loading

use crate::error::{BuildError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Compiler invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Path to the compiler executable
    pub compiler_path: String,

    /// Flags passed to the compiler ahead of each file
    #[serde(default)]
    pub compiler_flags: Vec<String>,

    /// Glob patterns selecting the files to compile
    #[serde(default)]
    pub files: Vec<String>,
}

impl BuildConfig {
    /// Load a configuration file, dispatching on the extension.
    ///
    /// `.json` files are parsed as JSON; anything else is treated as
    /// YAML.
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<BuildConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&content),
            _ => Self::from_yaml_str(&content),
        }
    }

    /// Parse a configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> Result<BuildConfig> {
        let config: BuildConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<BuildConfig> {
        let config: BuildConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate a loaded configuration
    fn validate(&self) -> Result<()> {
        if self.compiler_path.trim().is_empty() {
            return Err(BuildError::Validation {
                path: "compiler_path".to_string(),
                message: "Missing compiler executable path".to_string(),
            });
        }

        if self.files.is_empty() {
            tracing::warn!("Build configuration selects no files");
        }

        Ok(())
    }
}
