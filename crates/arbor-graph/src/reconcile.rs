//! Reconciliation: bringing a live hierarchy in line with a source state
//! while keeping instance identity wherever possible.
//!
//! Each entity type implements [`Reconcile::update_from`] by copying its
//! core and plain fields and delegating to each container's own
//! `update_from`. The positional rules live in the containers; this module
//! holds the trait and the partial (subtree) variant run on a [`Root`].

use std::rc::Rc;

use arbor_codec::Canonical;
use serde::Serialize;
use tracing::{debug, warn};

use crate::connection::StaticConnection;
use crate::container::Container;
use crate::entity::{walk, Node};
use crate::id::IdRemap;
use crate::root::Root;

/// State transfer from a same-shaped source.
pub trait Reconcile: Node + Sized {
    /// Copy `source`'s state into `self`, reusing instances positionally.
    fn update_from(&self, source: &Self);

    /// A blank instance of the same concrete kind as `source`, to be filled
    /// by [`update_from`](Reconcile::update_from).
    fn blank_like(source: &Self) -> Self;

    /// `false` if `other` must replace `self` rather than update it. Only
    /// polymorphic entity families override this.
    fn same_kind(&self, _other: &Self) -> bool {
        true
    }
}

/// Everything a hierarchy element needs: traversal, canonical form and
/// reconcile.
pub trait Entity: Node + Canonical + Reconcile {}

impl<T: Node + Canonical + Reconcile> Entity for T {}

/// Outcome of [`Root::reconcile_partial`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartialReport {
    /// Number of incoming entities given fresh ids.
    pub remapped: usize,
    /// Static connections with at least one endpoint outside the incoming
    /// subtree, left unchanged.
    pub unmapped: Vec<StaticConnection>,
}

impl Root {
    /// Reconcile `target` (attached to this root) against `source`, a subtree
    /// that was produced elsewhere and whose ids may collide with live ones.
    ///
    /// Every entity of `source` is first given a fresh id from this root and
    /// its reference ids are rewritten to match. The ordinary reconcile then
    /// runs, followed by deferred callbacks, and finally static connections
    /// in the result are rewritten through the same table.
    pub fn reconcile_partial<S: Entity>(&self, target: &Rc<S>, source: &S) -> PartialReport {
        if !target.core().root().is_some_and(|r| r.ptr_eq(self)) {
            warn!(
                entity = %target.core().id(),
                "partial reconcile target is not attached to this root"
            );
        }

        let mut remap = IdRemap::new();
        walk(source, &mut |node: &dyn Node| {
            let old = node.core().id();
            if old.is_some() {
                let fresh = self.allocate();
                node.core().set_id_raw(fresh);
                remap.insert(old, fresh);
            }
        });
        walk(source, &mut |node: &dyn Node| {
            node.visit_containers(&mut |c: &dyn Container| c.remap_ids(&remap))
        });

        {
            let _updating = self.begin_update();
            target.update_from(source);
            let deferred = self.run_deferred();
            debug!(remapped = remap.len(), deferred, "partial reconcile applied");
        }

        let mut unmapped = Vec::new();
        walk(&**target, &mut |node: &dyn Node| {
            unmapped.extend(node.core().remap_connections(&remap));
        });
        PartialReport {
            remapped: remap.len(),
            unmapped,
        }
    }
}
