//! Configuration model for a resolution run.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VresolveError};
use crate::types::{CopyPolicy, OutputFormat};

/// Root configuration for the resolver.
///
/// Every field has a default, so a config file only needs to name
/// what it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// Policy for COPY steps sharing a destination.
    pub copy_policy: CopyPolicy,
    /// Build context that COPY sources are read from under `content-hash`.
    pub context_dir: Option<PathBuf>,
    /// Format of the document printed on success.
    pub output_format: OutputFormat,
    /// Environment variables that must hold absolute paths at runtime.
    pub absolute_path_vars: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            copy_policy: CopyPolicy::default(),
            context_dir: None,
            output_format: OutputFormat::default(),
            absolute_path_vars: crate::constants::DEFAULT_ABSOLUTE_PATH_VARS
                .iter()
                .map(|v| (*v).to_owned())
                .collect(),
        }
    }
}

impl ResolverConfig {
    /// Loads a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML
    /// for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading resolver config");
        let text = std::fs::read_to_string(path).map_err(|e| VresolveError::io(path, e))?;
        Self::from_yaml(&text).map_err(|e| VresolveError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Parses a configuration from YAML text. An empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid YAML for this schema.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| VresolveError::Config {
            message: e.to_string(),
        })
    }
}
