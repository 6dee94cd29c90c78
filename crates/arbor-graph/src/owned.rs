//! Ordered owning collection.
//!
//! An [`OwnedList`] owns its elements: inserting attaches them to the list's
//! root and carrier (and makes them live if the list is live), removing takes
//! them out of liveness and destroys them. During a reconcile pass removal
//! only detaches, since the element may be re-homed by the same pass.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use arbor_codec::prelude::*;
use tracing::{error, trace};

use crate::container::{Container, MountPoint};
use crate::entity::{self, Node};
use crate::event::{CollectionEvent, EventStream, Subscription};
use crate::liveness;
use crate::pool::{self, Pool};
use crate::reconcile::Reconcile;
use crate::root::Root;
use crate::GraphError;

/// What happens to an element leaving a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eviction {
    /// Destroy unless the root is reconciling, in which case detach.
    Auto,
    Destroy,
    /// Detach only. Used for transfers between owners.
    Detach,
}

pub struct OwnedList<T> {
    items: RefCell<Vec<Rc<T>>>,
    mount: MountPoint,
    events: EventStream<CollectionEvent<Rc<T>>>,
    pool: RefCell<Option<Rc<dyn Pool<T>>>>,
}

impl<T: Node> Default for OwnedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Node> OwnedList<T> {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    /// A detached list holding `items`. They are attached when the carrying
    /// entity is.
    pub fn from_items(items: Vec<Rc<T>>) -> Self {
        Self {
            items: RefCell::new(items),
            mount: MountPoint::default(),
            events: EventStream::new(),
            pool: RefCell::new(None),
        }
    }

    /// Rent new instances from `pool` and give destroyed ones back to it.
    pub fn set_pool(&self, pool: Rc<dyn Pool<T>>) {
        *self.pool.borrow_mut() = Some(pool);
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Rc<T>> {
        self.items.borrow().get(index).cloned()
    }

    /// Snapshot of the current elements.
    pub fn to_vec(&self) -> Vec<Rc<T>> {
        self.items.borrow().clone()
    }

    pub fn position(&self, item: &Rc<T>) -> Option<usize> {
        self.items.borrow().iter().position(|x| Rc::ptr_eq(x, item))
    }

    pub fn contains(&self, item: &Rc<T>) -> bool {
        self.position(item).is_some()
    }

    /// `true` while the carrying entity is live.
    pub fn is_alive(&self) -> bool {
        self.mount.is_alive()
    }

    pub fn events(&self) -> &EventStream<CollectionEvent<Rc<T>>> {
        &self.events
    }

    pub fn subscribe(&self, handler: impl Fn(&CollectionEvent<Rc<T>>) + 'static) -> Subscription {
        self.events.subscribe(handler)
    }

    // -- mutation -----------------------------------------------------------

    pub fn push(&self, item: Rc<T>) {
        let index = self.len();
        self.insert_unchecked(index, item);
    }

    /// Wrap `value` in an `Rc`, push it, and return the handle.
    pub fn push_new(&self, value: T) -> Rc<T> {
        let item = Rc::new(value);
        self.push(Rc::clone(&item));
        item
    }

    /// Insert at `index`, shifting later elements.
    ///
    /// # Panics
    ///
    /// Panics if this list is live and `item` is already live elsewhere.
    pub fn insert(&self, index: usize, item: Rc<T>) -> Result<(), GraphError> {
        let len = self.len();
        if index > len {
            return Err(GraphError::IndexOutOfRange { index, len });
        }
        self.insert_unchecked(index, item);
        Ok(())
    }

    /// Replace the element at `index`, returning the old one (already
    /// evicted).
    pub fn set(&self, index: usize, item: Rc<T>) -> Result<Rc<T>, GraphError> {
        let len = self.len();
        if index >= len {
            return Err(GraphError::IndexOutOfRange { index, len });
        }
        Ok(self.replace_at(index, item, Eviction::Auto))
    }

    /// Remove and destroy the element at `index`.
    pub fn remove_at(&self, index: usize) -> Option<Rc<T>> {
        self.remove_with(index, Eviction::Auto)
    }

    /// Remove `item` if present.
    pub fn remove(&self, item: &Rc<T>) -> bool {
        match self.position(item) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    /// Remove the element at `index` without destroying it, so it can be
    /// inserted into another owner.
    pub fn detach_at(&self, index: usize) -> Option<Rc<T>> {
        self.remove_with(index, Eviction::Detach)
    }

    /// Remove every element, emitting a single `Reset`.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.items.borrow_mut());
        if old.is_empty() {
            return;
        }
        for item in &old {
            self.evict(item, Eviction::Auto);
        }
        self.events.send(CollectionEvent::Reset {
            old,
            new: Vec::new(),
        });
    }

    /// Replace the whole content, emitting a single `Reset`.
    ///
    /// Elements present both before and after keep their attachment and
    /// liveness; the rest are evicted or adopted.
    pub fn reset(&self, items: Vec<Rc<T>>) {
        let current = self.to_vec();
        for item in items.iter().filter(|x| !holds(&current, x)) {
            self.check_admission(item);
        }
        let old = self.items.replace(items.clone());
        for item in old.iter().filter(|x| !holds(&items, x)) {
            self.evict(item, Eviction::Auto);
        }
        for item in items.iter().filter(|x| !holds(&old, x)) {
            self.admit(item);
        }
        self.events.send(CollectionEvent::Reset { old, new: items });
    }

    // -- internals ----------------------------------------------------------

    fn check_admission(&self, item: &Rc<T>) {
        if self.mount.is_alive() && item.liveness().is_some_and(|l| l.is_alive()) {
            error!(
                entity = %item.core().id(),
                kind = item.type_name(),
                "inserting a live entity into a live collection"
            );
            panic!(
                "entity {} is already live; remove it from its previous owner first",
                item.core().id()
            );
        }
    }

    /// Attach and, if the list is live, enliven a newly held element.
    fn admit(&self, item: &Rc<T>) {
        if let Some(root) = self.mount.root() {
            entity::adopt(item, &root, self.mount.carrier().as_ref());
        }
        if self.mount.is_alive() {
            liveness::enter_live(&**item);
        }
    }

    pub(crate) fn evict(&self, item: &Rc<T>, how: Eviction) {
        if self.mount.is_alive() {
            liveness::exit_live(&**item);
        }
        let destroy = match how {
            Eviction::Auto => !self.mount.is_updating(),
            Eviction::Destroy => true,
            Eviction::Detach => false,
        };
        if destroy {
            pool::retire(self.pool().as_ref(), item);
        } else {
            entity::detach(&**item);
        }
    }

    fn pool(&self) -> Option<Rc<dyn Pool<T>>> {
        self.pool.borrow().clone()
    }

    fn insert_unchecked(&self, index: usize, item: Rc<T>) {
        self.check_admission(&item);
        self.items.borrow_mut().insert(index, Rc::clone(&item));
        self.admit(&item);
        self.events.send(CollectionEvent::Insert { index, item });
    }

    /// `index` must be in bounds.
    fn replace_at(&self, index: usize, item: Rc<T>, how: Eviction) -> Rc<T> {
        self.check_admission(&item);
        let old = std::mem::replace(&mut self.items.borrow_mut()[index], Rc::clone(&item));
        self.evict(&old, how);
        self.admit(&item);
        self.events.send(CollectionEvent::Set {
            index,
            old: Rc::clone(&old),
            new: item,
        });
        old
    }

    fn remove_with(&self, index: usize, how: Eviction) -> Option<Rc<T>> {
        if index >= self.len() {
            return None;
        }
        let item = self.items.borrow_mut().remove(index);
        self.evict(&item, how);
        self.events.send(CollectionEvent::Remove {
            index,
            item: Rc::clone(&item),
        });
        Some(item)
    }
}

fn holds<T>(among: &[Rc<T>], item: &Rc<T>) -> bool {
    among.iter().any(|x| Rc::ptr_eq(x, item))
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

impl<T: Reconcile> OwnedList<T> {
    /// Positional reconcile against `source`.
    ///
    /// The common prefix is updated in place (or replaced when the element
    /// kinds differ); extra source elements are instantiated and appended;
    /// surplus elements are removed from the end and destroyed.
    pub fn update_from(&self, source: &OwnedList<T>) {
        let src = source.to_vec();
        let current = self.to_vec();
        let common = current.len().min(src.len());

        for i in 0..common {
            if current[i].same_kind(&src[i]) {
                current[i].update_from(&src[i]);
            } else {
                trace!(index = i, "element kind changed -- replacing");
                let fresh = pool::instantiate(self.pool().as_ref(), &src[i]);
                self.replace_at(i, fresh, Eviction::Destroy);
            }
        }
        for s in &src[common..] {
            let fresh = pool::instantiate(self.pool().as_ref(), s);
            self.push(fresh);
        }
        while self.len() > src.len() {
            self.remove_with(self.len() - 1, Eviction::Destroy);
        }
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

impl<T: Node> Container for OwnedList<T> {
    fn mount(&self, root: &Root, carrier: &Weak<dyn Node>) {
        self.mount.set(root, Some(carrier));
        for item in self.to_vec() {
            entity::adopt(&item, root, Some(carrier));
        }
    }

    fn unmount(&self) {
        self.mount.clear();
        for item in self.to_vec() {
            entity::detach(&*item);
        }
    }

    fn enter_live(&self) {
        if self.mount.set_alive(true) {
            return;
        }
        for item in self.to_vec() {
            liveness::enter_live(&*item);
        }
    }

    fn exit_live(&self) {
        if !self.mount.is_alive() {
            return;
        }
        for item in self.to_vec() {
            liveness::exit_live(&*item);
        }
        self.mount.set_alive(false);
    }

    fn destroy_all(&self) {
        self.mount.set_alive(false);
        let old = std::mem::take(&mut *self.items.borrow_mut());
        let spare = self.pool();
        for item in &old {
            pool::retire(spare.as_ref(), item);
        }
        if !old.is_empty() {
            self.events.send(CollectionEvent::Reset {
                old,
                new: Vec::new(),
            });
        }
    }

    fn for_each_node(&self, visit: &mut dyn FnMut(&dyn Node)) {
        for item in self.to_vec() {
            visit(&*item);
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical
// ---------------------------------------------------------------------------

impl<T: Node + Canonical> Canonical for OwnedList<T> {
    fn write(&self, w: &mut Writer) {
        let items = self.items.borrow();
        w.write_len(items.len());
        for item in items.iter() {
            item.write(w);
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let len = r.read_len()?;
        let mut items = Vec::with_capacity(Reader::prealloc(len));
        for _ in 0..len {
            items.push(Rc::new(T::read(r)?));
        }
        Ok(Self::from_items(items))
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        let items = self.items.borrow();
        h.fold(items.len() as u64);
        for item in items.iter() {
            item.fold_hash(h);
        }
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        let a = self.to_vec();
        let b = other.to_vec();
        let common = cx.check_len(a.len(), b.len());
        for i in 0..common {
            cx.scope(format!("[{i}]"), |cx| a[i].compare(&b[i], cx));
        }
    }
}

impl<T> std::fmt::Debug for OwnedList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnedList")
            .field("len", &self.items.borrow().len())
            .field("mount", &self.mount)
            .finish()
    }
}
