//! Id-to-entity table owned by a [`Root`](crate::root::Root).
//!
//! Slots are indexed directly by id. Entries hold weak references, so the
//! registry never keeps an entity alive; an entry whose entity has been
//! dropped counts as vacant.

use std::any::Any;
use std::rc::{Rc, Weak};

use crate::entity::Node;
use crate::id::EntityId;

// ---------------------------------------------------------------------------
// NodeRef
// ---------------------------------------------------------------------------

/// Type-erased weak handle to a registered entity.
///
/// Keeps two views of the same allocation: one for hierarchy operations and
/// one for downcasting back to the concrete entity type.
#[derive(Clone)]
pub struct NodeRef {
    node: Weak<dyn Node>,
    any: Weak<dyn Any>,
    addr: *const (),
}

impl NodeRef {
    pub fn of<T: Node>(entity: &Rc<T>) -> Self {
        let weak: Weak<T> = Rc::downgrade(entity);
        let node: Weak<dyn Node> = weak.clone();
        let any: Weak<dyn Any> = weak;
        Self {
            node,
            any,
            addr: Rc::as_ptr(entity) as *const (),
        }
    }

    /// Allocation address, used for identity comparisons.
    pub fn addr(&self) -> *const () {
        self.addr
    }

    pub fn upgrade(&self) -> Option<Rc<dyn Node>> {
        self.node.upgrade()
    }

    /// Upgrade and downcast. `None` if the entity is gone or is not a `T`.
    pub fn upgrade_as<T: Node>(&self) -> Option<Rc<T>> {
        self.any.upgrade()?.downcast::<T>().ok()
    }

    pub fn is_live(&self) -> bool {
        self.node.strong_count() > 0
    }

    /// `true` if this handle refers to `node`.
    pub fn is(&self, node: &dyn Node) -> bool {
        self.addr == addr_of(node)
    }
}

impl std::fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("addr", &self.addr)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Allocation address of an entity, comparable with [`NodeRef::addr`].
pub(crate) fn addr_of(node: &dyn Node) -> *const () {
    node as *const dyn Node as *const ()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Direct-mapped id table plus the id allocator.
#[derive(Debug)]
pub(crate) struct Registry {
    slots: Vec<Option<NodeRef>>,
    next: u32,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            // Slot 0 is the reserved "no reference" id.
            slots: vec![None],
            next: 1,
        }
    }

    /// Issue a fresh id.
    ///
    /// # Panics
    ///
    /// Panics if the 32-bit id space is exhausted.
    pub(crate) fn allocate(&mut self) -> EntityId {
        let id = self.next;
        self.next = self
            .next
            .checked_add(1)
            .expect("entity id space exhausted");
        EntityId(id)
    }

    /// Make sure [`allocate`](Self::allocate) never hands out `id` or
    /// anything below it.
    pub(crate) fn advance_past(&mut self, id: EntityId) {
        if id.0 >= self.next {
            self.next = id.0.saturating_add(1);
        }
    }

    pub(crate) fn get(&self, id: EntityId) -> Option<&NodeRef> {
        if id.is_none() {
            return None;
        }
        self.slots
            .get(id.0 as usize)?
            .as_ref()
            .filter(|r| r.is_live())
    }

    pub(crate) fn insert(&mut self, id: EntityId, entry: NodeRef) {
        let index = id.0 as usize;
        if index >= self.slots.len() {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(entry);
    }

    /// Clear `id` only if it currently maps to the allocation at `addr`.
    pub(crate) fn remove(&mut self, id: EntityId, addr: *const ()) -> bool {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot) if slot.as_ref().is_some_and(|r| r.addr() == addr) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Number of live entries.
    pub(crate) fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.as_ref().is_some_and(NodeRef::is_live))
            .count()
    }

    pub(crate) fn next_id(&self) -> EntityId {
        EntityId(self.next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityCore;

    struct Bare {
        core: EntityCore,
    }

    impl Node for Bare {
        fn core(&self) -> &EntityCore {
            &self.core
        }
    }

    fn bare() -> Rc<Bare> {
        Rc::new(Bare {
            core: EntityCore::new(),
        })
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut reg = Registry::new();
        assert_eq!(reg.allocate(), EntityId(1));
        assert_eq!(reg.allocate(), EntityId(2));
        reg.advance_past(EntityId(10));
        assert_eq!(reg.allocate(), EntityId(11));
        reg.advance_past(EntityId(3));
        assert_eq!(reg.next_id(), EntityId(12));
    }

    #[test]
    fn dropped_entity_reads_as_vacant() {
        let mut reg = Registry::new();
        let e = bare();
        reg.insert(EntityId(5), NodeRef::of(&e));
        assert!(reg.get(EntityId(5)).is_some());
        assert_eq!(reg.len(), 1);
        drop(e);
        assert!(reg.get(EntityId(5)).is_none());
        assert_eq!(reg.len(), 0);
    }

    #[test]
    fn remove_checks_identity() {
        let mut reg = Registry::new();
        let a = bare();
        let b = bare();
        reg.insert(EntityId(1), NodeRef::of(&a));
        assert!(!reg.remove(EntityId(1), NodeRef::of(&b).addr()));
        assert!(reg.get(EntityId(1)).is_some());
        assert!(reg.remove(EntityId(1), NodeRef::of(&a).addr()));
        assert!(reg.get(EntityId(1)).is_none());
    }

    #[test]
    fn downcast_through_node_ref() {
        let e = bare();
        let r = NodeRef::of(&e);
        assert!(r.upgrade_as::<Bare>().is_some());
        assert!(r.is(&*e));
    }
}
