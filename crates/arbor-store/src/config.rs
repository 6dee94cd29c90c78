//! Store configuration, loadable from JSON.

use std::path::Path;

use arbor_codec::DEFAULT_SEQUENCE_CEILING;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::StoreError;

/// Settings for loading saved state.
///
/// Every field has a default, so a partial JSON file is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Largest sequence length the decoder accepts before allocating.
    pub sequence_ceiling: u32,
    /// Check each frame's BLAKE3 digest on load.
    pub verify_digest: bool,
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sequence_ceiling: DEFAULT_SEQUENCE_CEILING,
            verify_digest: true,
            log_filter: "info".to_owned(),
        }
    }
}

impl StoreConfig {
    /// Parse a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file cannot be read, or
    /// [`StoreError::Config`] if it is not a valid config document.
    pub fn load_json_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Like [`load_json_file`](Self::load_json_file), but falls back to the
    /// defaults when the file is missing or invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file -- using defaults");
            return Self::default();
        }
        match Self::load_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to load config -- using defaults");
                Self::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
