//! Arbor codec -- canonical bytes, deterministic state hashing and
//! compare-check for entity-graph state.
//!
//! Every type stored in an Arbor graph implements [`Canonical`], which ties
//! together three views of the same field list:
//!
//! - a length-prefixed little-endian binary encoding ([`Writer`] / [`Reader`]),
//! - an order-sensitive 64-bit fold ([`StateHasher`]) used to detect divergent
//!   simulation state across processes and runs,
//! - a deep diff ([`CompareCx`]) that reports every mismatch with its full path.
//!
//! # Quick Start
//!
//! ```
//! use arbor_codec::prelude::*;
//!
//! let value = vec![1u32, 2, 3];
//! let bytes = to_bytes(&value);
//! let back: Vec<u32> = from_bytes(&bytes).unwrap();
//!
//! assert!(compare_check(&value, &back, "value", |_| {}).is_empty());
//! assert_eq!(calculate_hash(&value), calculate_hash(&back));
//! ```

pub mod canonical;
pub mod compare;
pub mod hash;
pub mod wire;

pub use canonical::{
    read_polymorphic, read_polymorphic_required, write_polymorphic, Canonical, Polymorphic,
};
pub use compare::{CompareCx, Mismatch};
pub use hash::{calculate_hash, content_digest, StateHasher, HASH_SEED};
pub use wire::{Reader, Writer, DEFAULT_SEQUENCE_CEILING};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced while decoding canonical bytes.
///
/// All of these indicate corrupted or hostile input rather than a bug in the
/// calling code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The buffer ended before a value was complete.
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A declared sequence length exceeded the reader's sanity ceiling.
    #[error("declared sequence length {len} exceeds ceiling {ceiling}")]
    SequenceTooLong { len: u32, ceiling: u32 },

    /// A string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// A boolean byte was neither 0 nor 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBool(u8),

    /// A polymorphic type tag did not name a member of its family.
    #[error("unknown type tag {tag} for family '{family}'")]
    UnknownTag { family: &'static str, tag: u16 },

    /// Bytes were left over after the top-level value was decoded.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

// ---------------------------------------------------------------------------
// Protocol entry points
// ---------------------------------------------------------------------------

/// Serialize a value to its canonical bytes.
pub fn to_bytes<T: Canonical + ?Sized>(value: &T) -> Vec<u8> {
    let mut w = Writer::new();
    value.write(&mut w);
    w.into_bytes()
}

/// Deserialize a value, rejecting trailing bytes.
pub fn from_bytes<T: Canonical>(bytes: &[u8]) -> Result<T, CodecError> {
    from_bytes_with_ceiling(bytes, DEFAULT_SEQUENCE_CEILING)
}

/// Deserialize a value with an explicit sequence ceiling.
pub fn from_bytes_with_ceiling<T: Canonical>(bytes: &[u8], ceiling: u32) -> Result<T, CodecError> {
    let mut r = Reader::with_ceiling(bytes, ceiling);
    let value = T::read(&mut r)?;
    r.finish()?;
    Ok(value)
}

/// Compare two values, returning every mismatch found.
///
/// `on_mismatch` is invoked for each mismatch as it is discovered, in
/// addition to the mismatch being collected in the returned list.
pub fn compare_check<'h, T: Canonical + ?Sized>(
    a: &T,
    b: &T,
    label: &str,
    on_mismatch: impl FnMut(&Mismatch) + 'h,
) -> Vec<Mismatch> {
    let mut cx = CompareCx::with_handler(label, on_mismatch);
    a.compare(b, &mut cx);
    cx.finish()
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::canonical::{
        read_polymorphic, read_polymorphic_required, write_polymorphic, Canonical, Polymorphic,
    };
    pub use crate::compare::{CompareCx, Mismatch};
    pub use crate::hash::{calculate_hash, content_digest, StateHasher};
    pub use crate::wire::{Reader, Writer};
    pub use crate::{compare_check, from_bytes, from_bytes_with_ceiling, to_bytes, CodecError};
}
