//! The protocol between an entity and the containers it declares.
//!
//! Every owned list, slot and reference list embedded in an entity implements
//! [`Container`]. The entity lists its containers once, in
//! [`Node::visit_containers`](crate::entity::Node::visit_containers), and the
//! hierarchy operations (attach, liveness, destruction, traversal, id remap)
//! are all derived from that single listing.

use std::cell::{Cell, RefCell};
use std::rc::Weak;

use crate::entity::Node;
use crate::id::IdRemap;
use crate::root::{Root, WeakRoot};

/// A field of an entity that holds or references other entities.
pub trait Container {
    /// Propagate `root` and `carrier` (the owning entity) to every held child,
    /// registering their ids.
    fn mount(&self, root: &Root, carrier: &Weak<dyn Node>);

    /// Forget the root and detach every held child from it.
    fn unmount(&self);

    /// The owning entity became live.
    fn enter_live(&self) {}

    /// The owning entity is leaving liveness.
    fn exit_live(&self) {}

    /// The owning entity is being destroyed.
    fn destroy_all(&self);

    /// Visit every owned child. Reference containers own nothing.
    fn for_each_node(&self, _visit: &mut dyn FnMut(&dyn Node)) {}

    /// Rewrite stored reference ids through `remap`.
    fn remap_ids(&self, _remap: &IdRemap) {}
}

/// Attachment state shared by every container kind.
#[derive(Default)]
pub(crate) struct MountPoint {
    root: RefCell<WeakRoot>,
    carrier: RefCell<Option<Weak<dyn Node>>>,
    alive: Cell<bool>,
}

impl MountPoint {
    pub(crate) fn root(&self) -> Option<Root> {
        self.root.borrow().upgrade()
    }

    pub(crate) fn carrier(&self) -> Option<Weak<dyn Node>> {
        self.carrier.borrow().clone()
    }

    pub(crate) fn set(&self, root: &Root, carrier: Option<&Weak<dyn Node>>) {
        *self.root.borrow_mut() = root.downgrade();
        *self.carrier.borrow_mut() = carrier.cloned();
    }

    pub(crate) fn clear(&self) {
        *self.root.borrow_mut() = WeakRoot::default();
        *self.carrier.borrow_mut() = None;
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Returns the previous value.
    pub(crate) fn set_alive(&self, alive: bool) -> bool {
        self.alive.replace(alive)
    }

    /// `true` while the owning root is mid-reconcile.
    pub(crate) fn is_updating(&self) -> bool {
        self.root().is_some_and(|r| r.is_updating())
    }
}

impl std::fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountPoint")
            .field("mounted", &self.root().is_some())
            .field("alive", &self.alive.get())
            .finish()
    }
}
