//! Deterministic state hashing.
//!
//! [`StateHasher`] is a 64-bit accumulator used to compare simulation state
//! across processes and runs. It is not a lookup hash: the fold order is part
//! of the contract, so every type must fold its fields in declaration order.
//!
//! Each contribution is folded as:
//!
//! ```text
//! hash += contribution
//! hash += hash << 11
//! hash ^= hash >> 7
//! ```
//!
//! All arithmetic wraps.

use crate::canonical::Canonical;

/// Fixed non-zero seed for every [`StateHasher`].
pub const HASH_SEED: u64 = 345_093_625;

/// Order-sensitive 64-bit state accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHasher(u64);

impl StateHasher {
    /// Create a hasher seeded with [`HASH_SEED`].
    pub fn new() -> Self {
        Self(HASH_SEED)
    }

    /// Fold one raw contribution.
    #[inline]
    pub fn fold(&mut self, contribution: u64) {
        let mut h = self.0.wrapping_add(contribution);
        h = h.wrapping_add(h << 11);
        h ^= h >> 7;
        self.0 = h;
    }

    /// Fold a signed integer as its two's-complement value widened to 64 bits.
    #[inline]
    pub fn fold_signed(&mut self, v: i64) {
        self.fold(v as u64);
    }

    /// Fold a byte string: a nested fold of its length then each byte, whose
    /// result becomes this hasher's contribution.
    pub fn fold_bytes(&mut self, bytes: &[u8]) {
        let mut nested = StateHasher::new();
        nested.fold(bytes.len() as u64);
        for &b in bytes {
            nested.fold(u64::from(b));
        }
        self.fold(nested.finish());
    }

    /// Fold any canonical value.
    pub fn fold_value<T: Canonical + ?Sized>(&mut self, value: &T) {
        value.fold_hash(self);
    }

    /// The accumulated hash.
    #[inline]
    pub fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for StateHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the deterministic state hash of a value.
pub fn calculate_hash<T: Canonical + ?Sized>(value: &T) -> u64 {
    let mut hasher = StateHasher::new();
    value.fold_hash(&mut hasher);
    hasher.finish()
}

/// BLAKE3 hex digest (64 lowercase hex chars) of the canonical bytes of a value.
///
/// Used for frame integrity at the file boundary, where a collision-resistant
/// digest matters more than cross-language reproducibility of the fold.
pub fn content_digest<T: Canonical + ?Sized>(value: &T) -> String {
    let bytes = crate::to_bytes(value);
    blake3::hash(&bytes).to_hex().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
