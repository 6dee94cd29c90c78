//! A rooted hierarchy: one top entity, its root, and the whole-tree
//! operations (reconcile, canonical bytes, hash, compare-check).

use std::rc::Rc;

use arbor_codec::prelude::*;
use tracing::{debug, info_span};

use crate::entity::{adopt, subtree_ids, Node};
use crate::id::EntityId;
use crate::liveness::enter_live;
use crate::reconcile::{Entity, PartialReport};
use crate::root::Root;

pub struct Hierarchy<T> {
    root: Root,
    top: Rc<T>,
}

impl<T: Entity> Hierarchy<T> {
    /// Attach `top` to a fresh root and bring it to life.
    pub fn new(top: T) -> Self {
        Self::from_rc(Rc::new(top))
    }

    pub fn from_rc(top: Rc<T>) -> Self {
        let root = Root::new();
        adopt(&top, &root, None);
        enter_live(&*top);
        debug!(entities = root.len(), "hierarchy created");
        Self { root, top }
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn top(&self) -> &Rc<T> {
        &self.top
    }

    /// Ids of every owned entity, top first, in walk order.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        subtree_ids(&*self.top)
    }

    /// Bring the whole hierarchy in line with `source`.
    ///
    /// Runs with the root's reconcile flag raised; deferred callbacks run
    /// before the flag is lowered.
    pub fn reconcile_from(&self, source: &T) {
        let _span = info_span!("reconcile", from = %source.core().id()).entered();
        let _updating = self.root.begin_update();
        self.top.update_from(source);
        let deferred = self.root.run_deferred();
        debug!(deferred, entities = self.root.len(), "reconcile finished");
    }

    /// Reconcile against another hierarchy's current state.
    pub fn reconcile_from_hierarchy(&self, other: &Hierarchy<T>) {
        self.reconcile_from(&other.top);
    }

    /// Reconcile a subtree produced elsewhere into `target`, re-identifying it
    /// first. See [`Root::reconcile_partial`].
    pub fn reconcile_partial<S: Entity>(&self, target: &Rc<S>, source: &S) -> PartialReport {
        self.root.reconcile_partial(target, source)
    }

    // -- protocol -----------------------------------------------------------

    pub fn serialize(&self) -> Vec<u8> {
        to_bytes(&*self.top)
    }

    /// Decode a top entity and build a live hierarchy around it, keeping the
    /// encoded ids.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(Self::new(from_bytes::<T>(bytes)?))
    }

    pub fn deserialize_with_ceiling(bytes: &[u8], ceiling: u32) -> Result<Self, CodecError> {
        Ok(Self::new(from_bytes_with_ceiling::<T>(bytes, ceiling)?))
    }

    /// Deterministic 64-bit state hash.
    pub fn calculate_hash(&self) -> u64 {
        calculate_hash(&*self.top)
    }

    /// Deep comparison against another hierarchy; `on_mismatch` sees each
    /// mismatch as it is found.
    pub fn compare_check(
        &self,
        other: &Hierarchy<T>,
        on_mismatch: impl FnMut(&Mismatch),
    ) -> Vec<Mismatch> {
        compare_check(&*self.top, &*other.top, "top", on_mismatch)
    }
}

impl<T: Node> std::fmt::Debug for Hierarchy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hierarchy")
            .field("top", &self.top.core().id())
            .field("root", &self.root)
            .finish()
    }
}
