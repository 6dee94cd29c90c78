//! Instance pools for owned collections.
//!
//! A collection with a pool rents instances from it when reconcile grows the
//! collection, and hands destroyed instances back to it.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::entity::{self, Node};
use crate::reconcile::Reconcile;

/// Source of reusable entity instances.
pub trait Pool<T> {
    /// A revived instance ready to be filled, or `None` if the pool is empty.
    fn rent(&self) -> Option<Rc<T>>;

    /// Return a destroyed instance.
    fn give_back(&self, item: Rc<T>);
}

/// Bounded free-list pool.
///
/// Only instances nobody else still references are handed out again.
pub struct VecPool<T> {
    free: RefCell<Vec<Rc<T>>>,
    capacity: usize,
}

impl<T> VecPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: RefCell::new(Vec::new()),
            capacity,
        }
    }

    /// Instances currently waiting to be rented.
    pub fn available(&self) -> usize {
        self.free.borrow().len()
    }
}

impl<T: Node> Pool<T> for VecPool<T> {
    fn rent(&self) -> Option<Rc<T>> {
        loop {
            let item = self.free.borrow_mut().pop()?;
            if Rc::strong_count(&item) == 1 {
                item.core().revive();
                return Some(item);
            }
            trace!(entity = %item.core().id(), "pooled instance still referenced -- discarding");
        }
    }

    fn give_back(&self, item: Rc<T>) {
        let mut free = self.free.borrow_mut();
        if free.len() < self.capacity {
            free.push(item);
        }
    }
}

/// Destroy an owned entity that is leaving its owner for good and hand it to
/// `pool`. An instance that was already destroyed is not handed back twice.
pub(crate) fn retire<T: Node>(pool: Option<&Rc<dyn Pool<T>>>, item: &Rc<T>) {
    let first = !item.core().is_destroyed();
    entity::destroy(&**item);
    if let (true, Some(pool)) = (first, pool) {
        pool.give_back(Rc::clone(item));
    }
}

/// A detached instance holding `source`'s state, rented from `pool` when it
/// has one of the right kind. A rented instance of another kind goes back.
pub(crate) fn instantiate<T: Reconcile>(pool: Option<&Rc<dyn Pool<T>>>, source: &T) -> Rc<T> {
    let rented = pool.and_then(|p| p.rent().map(|item| (p, item)));
    let fresh = match rented {
        Some((_, item)) if item.same_kind(source) => item,
        Some((pool, other)) => {
            trace!(entity = %other.core().id(), "pooled instance is of another kind -- returning it");
            pool.give_back(other);
            Rc::new(T::blank_like(source))
        }
        None => Rc::new(T::blank_like(source)),
    };
    fresh.update_from(source);
    fresh
}

impl<T> std::fmt::Debug for VecPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VecPool")
            .field("available", &self.available())
            .field("capacity", &self.capacity)
            .finish()
    }
}
