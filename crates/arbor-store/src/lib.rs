//! Arbor store -- the file boundary for entity hierarchies.
//!
//! Saved state is the canonical encoding of a top entity wrapped in a small
//! integrity frame:
//!
//! ```text
//! +-------+---------+------------------+-------------+-----------+
//! | ARBR  | version | BLAKE3(payload)  | payload len | payload   |
//! | 4 B   | u16 LE  | 32 B             | u32 LE      | len bytes |
//! +-------+---------+------------------+-------------+-----------+
//! ```
//!
//! Loading verifies the frame before a single entity is constructed. Callers
//! that must keep running when a save is missing or damaged use the
//! `*_or_default` entry points, which log the failure and fall back.
//!
//! # Usage
//!
//! ```no_run
//! use arbor_store::prelude::*;
//!
//! let config = StoreConfig::from_json_file("arbor.json");
//! init_tracing(&config.log_filter);
//!
//! save("state.arbr", &42u32).unwrap();
//! let back: u32 = load("state.arbr", &config).unwrap();
//! assert_eq!(back, 42);
//! ```

pub mod config;
pub mod file;
pub mod frame;
pub mod logging;

pub use config::StoreConfig;
pub use file::{
    load, load_hierarchy_or_default, load_or_default, merge_into, save, save_hierarchy,
    save_or_log,
};
pub use frame::{decode_frame, encode_frame, FrameHeader, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use logging::init_tracing;

use std::path::PathBuf;

use arbor_codec::CodecError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced at the file boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file does not start with the frame magic.
    #[error("not an arbor frame (magic {found:02x?})")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported frame version {found} (expected {})", FORMAT_VERSION)]
    UnsupportedVersion { found: u16 },

    /// The payload does not hash to the digest recorded in the header.
    #[error("payload digest mismatch: recorded {recorded}, computed {computed}")]
    DigestMismatch { recorded: String, computed: String },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("invalid config {}: {source}", .path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

pub mod prelude {
    pub use crate::{
        init_tracing, load, load_hierarchy_or_default, load_or_default, merge_into, save,
        save_hierarchy, save_or_log, StoreConfig, StoreError,
    };
}
