//! Static connections: reversible side effects one entity applied to another.
//!
//! When an entity applies a side effect to another entity (a modifier, a
//! subscription, a counter bump) it records a [`StaticConnection`] from its own
//! id to the target's id. Destroying the owner reverses every recorded
//! connection by looking the target up in the registry and invoking its
//! [`ConnectionTarget`] capability.

use arbor_codec::prelude::*;
use serde::{Deserialize, Serialize};

use crate::id::{EntityId, IdRemap};
use crate::root::Root;
use crate::GraphError;

/// Capability of an entity that can have side effects reversed by id.
pub trait ConnectionTarget {
    /// Undo every side effect `owner` applied to `self`.
    fn reverse_connection(&self, owner: EntityId);
}

/// `owner` has produced a reversible side effect against `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaticConnection {
    pub owner: EntityId,
    pub target: EntityId,
}

/// The connections recorded by one owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticConnections {
    list: Vec<StaticConnection>,
}

impl StaticConnections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection. Neither id may be [`EntityId::NONE`].
    pub fn add(&mut self, owner: EntityId, target: EntityId) -> Result<(), GraphError> {
        if owner.is_none() || target.is_none() {
            return Err(GraphError::NullConnection { owner, target });
        }
        self.list.push(StaticConnection { owner, target });
        Ok(())
    }

    /// Drop every record pointing at `target`. Returns how many were removed.
    pub fn remove_target(&mut self, target: EntityId) -> usize {
        let before = self.list.len();
        self.list.retain(|c| c.target != target);
        before - self.list.len()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StaticConnection> {
        self.list.iter()
    }

    pub fn clear(&mut self) {
        self.list.clear();
    }

    /// Rewrite the owner of every record, after the owning entity was
    /// re-identified.
    pub(crate) fn rebind_owner(&mut self, owner: EntityId) {
        for c in &mut self.list {
            c.owner = owner;
        }
    }

    /// Reverse every connection through the targets' capabilities, in
    /// registration order. Returns the number of reversals performed.
    ///
    /// A target that cannot be resolved, or that has no reversal capability,
    /// is logged and skipped; the remaining connections are still reversed.
    pub fn reverse_all(&self, root: &Root) -> usize {
        let mut reversed = 0;
        for c in &self.list {
            let Some(target) = root.recall(c.target) else {
                tracing::warn!(
                    owner = %c.owner,
                    target = %c.target,
                    "static connection target not registered -- cannot reverse"
                );
                continue;
            };
            match target.connection_target() {
                Some(capability) => {
                    capability.reverse_connection(c.owner);
                    reversed += 1;
                }
                None => tracing::warn!(
                    owner = %c.owner,
                    target = %c.target,
                    kind = target.type_name(),
                    "static connection target has no reversal capability"
                ),
            }
        }
        reversed
    }

    /// Rewrite both endpoints through `remap`. Records with an endpoint
    /// outside the table keep that endpoint unchanged and are returned (as
    /// they were before the rewrite) so the caller can report them.
    pub fn remap(&mut self, remap: &IdRemap) -> Vec<StaticConnection> {
        let mut unmapped = Vec::new();
        for c in &mut self.list {
            let owner = remap.get(c.owner);
            let target = remap.get(c.target);
            if owner.is_none() || target.is_none() {
                tracing::warn!(
                    owner = %c.owner,
                    target = %c.target,
                    "static connection endpoint outside the remap table"
                );
                unmapped.push(*c);
            }
            c.owner = owner.unwrap_or(c.owner);
            c.target = target.unwrap_or(c.target);
        }
        unmapped
    }
}

impl Canonical for StaticConnections {
    fn write(&self, w: &mut Writer) {
        w.write_len(self.list.len());
        for c in &self.list {
            c.owner.write(w);
            c.target.write(w);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let len = r.read_len()?;
        let mut list = Vec::with_capacity(Reader::prealloc(len));
        for _ in 0..len {
            let owner = EntityId::read(r)?;
            let target = EntityId::read(r)?;
            list.push(StaticConnection { owner, target });
        }
        Ok(Self { list })
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        h.fold(self.list.len() as u64);
        for c in &self.list {
            c.owner.fold_hash(h);
            c.target.fold_hash(h);
        }
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        let common = cx.check_len(self.list.len(), other.list.len());
        for i in 0..common {
            cx.scope(format!("[{i}]"), |cx| {
                cx.check("owner", &self.list[i].owner, &other.list[i].owner);
                cx.check("target", &self.list[i].target, &other.list[i].target);
            });
        }
    }
}
