//! Entity identifiers.
//!
//! An [`EntityId`] is a small integer handle issued by a [`Root`](crate::root::Root).
//! Id `0` ([`EntityId::NONE`]) always means "no reference"; it is never issued.

use std::collections::HashMap;
use std::fmt;

use arbor_codec::prelude::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A registry-issued entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl EntityId {
    /// The "no reference" id.
    pub const NONE: EntityId = EntityId(0);

    /// Returns `true` for [`EntityId::NONE`].
    #[inline]
    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` for any issued id.
    #[inline]
    pub fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Raw `u32` representation.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Canonical for EntityId {
    fn write(&self, w: &mut Writer) {
        w.write_u32(self.0);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(EntityId(r.read_u32()?))
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold(u64::from(self.0));
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        cx.check_value(self, other);
    }
}

// ---------------------------------------------------------------------------
// IdRemap
// ---------------------------------------------------------------------------

/// Old-id to new-id table built while re-identifying an incoming subtree.
#[derive(Debug, Clone, Default)]
pub struct IdRemap {
    map: HashMap<EntityId, EntityId>,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `old` is now known as `new`.
    pub fn insert(&mut self, old: EntityId, new: EntityId) {
        self.map.insert(old, new);
    }

    /// The new id for `old`, if it was remapped.
    pub fn get(&self, old: EntityId) -> Option<EntityId> {
        self.map.get(&old).copied()
    }

    /// Remap `id` if it is in the table, otherwise return it unchanged.
    /// [`EntityId::NONE`] always maps to itself.
    pub fn apply(&self, id: EntityId) -> EntityId {
        if id.is_none() {
            return id;
        }
        self.get(id).unwrap_or(id)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_zero() {
        assert!(EntityId::NONE.is_none());
        assert!(EntityId(1).is_some());
        assert_eq!(EntityId::default(), EntityId::NONE);
    }

    #[test]
    fn remap_leaves_unknown_and_none_unchanged() {
        let mut remap = IdRemap::new();
        remap.insert(EntityId(3), EntityId(30));
        assert_eq!(remap.apply(EntityId(3)), EntityId(30));
        assert_eq!(remap.apply(EntityId(4)), EntityId(4));
        assert_eq!(remap.apply(EntityId::NONE), EntityId::NONE);
        assert_eq!(remap.get(EntityId(4)), None);
    }

    #[test]
    fn display_and_debug() {
        assert_eq!(format!("{}", EntityId(7)), "#7");
        assert_eq!(format!("{:?}", EntityId(7)), "EntityId(7)");
    }
}
