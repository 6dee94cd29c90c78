//! The per-hierarchy root: registry, id allocator, reconcile flag and the
//! deferred-callback queue.
//!
//! A [`Root`] is a cheap cloneable handle. Entities and containers only keep a
//! [`WeakRoot`], so dropping the owning [`Hierarchy`](crate::hierarchy::Hierarchy)
//! releases everything.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::entity::{EntityCore, Node};
use crate::id::EntityId;
use crate::registry::{addr_of, NodeRef, Registry};

pub(crate) struct RootInner {
    registry: RefCell<Registry>,
    updating: Cell<bool>,
    deferred: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Handle to a hierarchy root.
#[derive(Clone)]
pub struct Root {
    inner: Rc<RootInner>,
}

/// Non-owning handle to a [`Root`].
#[derive(Clone, Default)]
pub struct WeakRoot(Weak<RootInner>);

impl WeakRoot {
    pub fn upgrade(&self) -> Option<Root> {
        self.0.upgrade().map(|inner| Root { inner })
    }
}

impl std::fmt::Debug for WeakRoot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WeakRoot(live: {})", self.0.strong_count() > 0)
    }
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

impl Root {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RootInner {
                registry: RefCell::new(Registry::new()),
                updating: Cell::new(false),
                deferred: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakRoot {
        WeakRoot(Rc::downgrade(&self.inner))
    }

    /// `true` if both handles refer to the same root.
    pub fn ptr_eq(&self, other: &Root) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // -- ids ----------------------------------------------------------------

    /// Issue a fresh id. Ids start at 1 and are never reissued.
    pub fn allocate(&self) -> EntityId {
        self.inner.registry.borrow_mut().allocate()
    }

    /// Number of live registered entities.
    pub fn len(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // -- registry -----------------------------------------------------------

    /// Map `id` to `entity`.
    ///
    /// Outside a reconcile pass, an id already held by a different live
    /// entity is a collision: it is logged and the mapping is overwritten.
    /// During reconcile the overwrite is the expected id transfer.
    pub fn remember<T: Node>(&self, id: EntityId, entity: &Rc<T>) {
        self.remember_ref(id, NodeRef::of(entity));
    }

    pub(crate) fn remember_ref(&self, id: EntityId, entry: NodeRef) {
        if id.is_none() {
            warn!("refusing to register an entity under the null id");
            return;
        }
        let mut registry = self.inner.registry.borrow_mut();
        let same = registry.get(id).map(|existing| existing.addr() == entry.addr());
        match same {
            Some(true) => {}
            Some(false) if self.is_updating() => {
                trace!(entity = %id, "id transferred during reconcile");
                registry.insert(id, entry);
            }
            Some(false) => {
                warn!(entity = %id, "id already registered to another entity -- overwriting");
                registry.insert(id, entry);
            }
            None => registry.insert(id, entry),
        }
        registry.advance_past(id);
    }

    /// Remove the mapping for `id`, but only if it still points at `entity`.
    pub fn forget(&self, id: EntityId, entity: &dyn Node) -> bool {
        self.forget_addr(id, addr_of(entity))
    }

    pub(crate) fn forget_addr(&self, id: EntityId, addr: *const ()) -> bool {
        if id.is_none() {
            return false;
        }
        let removed = self.inner.registry.borrow_mut().remove(id, addr);
        if !removed {
            trace!(entity = %id, "forget skipped: id no longer maps to this entity");
        }
        removed
    }

    /// Look up a live entity by id.
    pub fn recall(&self, id: EntityId) -> Option<Rc<dyn Node>> {
        self.inner.registry.borrow().get(id)?.upgrade()
    }

    /// Look up a live entity by id and downcast it.
    pub fn recall_as<T: Node>(&self, id: EntityId) -> Option<Rc<T>> {
        self.inner.registry.borrow().get(id)?.upgrade_as::<T>()
    }

    /// Register `entity` under `id`, re-identifying it if necessary, and make
    /// sure the allocator never issues `id` again.
    pub fn force_id<T: Node>(&self, id: EntityId, entity: &Rc<T>) {
        let entry = NodeRef::of(entity);
        let core = entity.core();
        let old = core.id();
        if old != id {
            self.forget_addr(old, entry.addr());
            core.reidentify(id);
        }
        self.remember_ref(id, entry);
    }

    /// Registration step of attachment: allocate an id if the entity has
    /// none, otherwise register the one it carries.
    pub(crate) fn register(&self, core: &EntityCore) {
        let Some(entry) = core.node_ref() else {
            warn!("cannot register an entity that was never bound");
            return;
        };
        let id = core.id();
        if id.is_none() {
            let fresh = self.allocate();
            core.set_id_raw(fresh);
            self.remember_ref(fresh, entry);
            return;
        }
        let taken_by_other = self
            .inner
            .registry
            .borrow()
            .get(id)
            .is_some_and(|existing| existing.addr() != entry.addr());
        if taken_by_other && !self.is_updating() {
            let fresh = self.allocate();
            warn!(
                requested = %id,
                assigned = %fresh,
                "id already registered to another entity -- assigning a fresh id"
            );
            core.reidentify(fresh);
            self.remember_ref(fresh, entry);
        } else {
            self.remember_ref(id, entry);
        }
    }

    /// Move an attached entity's mapping from `old` to `new`.
    pub(crate) fn transfer_id(&self, old: EntityId, new: EntityId, entry: &NodeRef) {
        self.forget_addr(old, entry.addr());
        if new.is_some() {
            self.remember_ref(new, entry.clone());
        }
    }

    // -- reconcile ----------------------------------------------------------

    /// `true` while a reconcile pass is running on this root.
    pub fn is_updating(&self) -> bool {
        self.inner.updating.get()
    }

    /// Raise the reconcile flag until the guard is dropped.
    pub(crate) fn begin_update(&self) -> UpdateGuard {
        let previous = self.inner.updating.replace(true);
        UpdateGuard {
            root: self.clone(),
            previous,
        }
    }

    /// Queue `f` to run after the current reconcile pass finishes copying.
    pub fn defer(&self, f: impl FnOnce() + 'static) {
        self.inner.deferred.borrow_mut().push(Box::new(f));
    }

    /// Run every queued callback in registration order, including callbacks
    /// queued by callbacks. Returns how many ran.
    pub(crate) fn run_deferred(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.inner.deferred.borrow_mut());
            if batch.is_empty() {
                break;
            }
            for f in batch {
                f();
                ran += 1;
            }
        }
        ran
    }

    pub fn pending_deferred(&self) -> usize {
        self.inner.deferred.borrow().len()
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("entities", &self.len())
            .field("updating", &self.is_updating())
            .finish()
    }
}

/// Restores the previous reconcile flag on drop.
pub(crate) struct UpdateGuard {
    root: Root,
    previous: bool,
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        self.root.inner.updating.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn updating_flag_is_scoped() {
        let root = Root::new();
        assert!(!root.is_updating());
        {
            let _g = root.begin_update();
            assert!(root.is_updating());
            {
                let _nested = root.begin_update();
            }
            assert!(root.is_updating());
        }
        assert!(!root.is_updating());
    }

    #[test]
    fn deferred_runs_in_order_including_nested() {
        let root = Root::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l1 = log.clone();
        let r1 = root.clone();
        root.defer(move || {
            l1.borrow_mut().push(1);
            let l3 = l1.clone();
            r1.defer(move || l3.borrow_mut().push(3));
        });
        let l2 = log.clone();
        root.defer(move || l2.borrow_mut().push(2));

        assert_eq!(root.pending_deferred(), 2);
        assert_eq!(root.run_deferred(), 3);
        assert_eq!(*log.borrow(), vec![1, 2, 3]);
        assert_eq!(root.pending_deferred(), 0);
    }

    #[test]
    fn weak_root_dies_with_root() {
        let root = Root::new();
        let weak = root.downgrade();
        assert!(weak.upgrade().is_some_and(|r| r.ptr_eq(&root)));
        drop(root);
        assert!(weak.upgrade().is_none());
    }
}
