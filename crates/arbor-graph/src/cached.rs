//! Reference collection with a lazily built resolution cache.
//!
//! [`CachedRefList`] stores ids like [`RefList`](crate::reference::RefList)
//! but resolves them once, keeps weak handles, and watches each resolved
//! entity's destroy signal so that a destroyed entity disappears from the
//! cache immediately. Any mutation invalidates the cache; the next read
//! rebuilds it.
//!
//! During reconcile the id copy is split in two: the new ids are staged
//! while the pass runs, and applied by a deferred callback once every entity
//! of the pass has its final id.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use arbor_codec::prelude::*;
use tracing::{error, trace};

use crate::container::Container;
use crate::entity::Node;
use crate::event::{CollectionEvent, EventStream, Subscription};
use crate::id::{EntityId, IdRemap};
use crate::reference::validate_reference;
use crate::root::{Root, WeakRoot};
use crate::GraphError;

struct CachedInner<T> {
    ids: RefCell<Vec<EntityId>>,
    cache: RefCell<Vec<Option<Weak<T>>>>,
    watches: RefCell<Vec<Subscription>>,
    set_up: Cell<bool>,
    pending: RefCell<Option<Vec<EntityId>>>,
    root: RefCell<WeakRoot>,
    events: EventStream<CollectionEvent<Option<Rc<T>>>>,
}

impl<T: Node> CachedInner<T> {
    fn root(&self) -> Option<Root> {
        self.root.borrow().upgrade()
    }

    fn invalidate(&self) {
        self.set_up.set(false);
        self.cache.borrow_mut().clear();
        let watches = std::mem::take(&mut *self.watches.borrow_mut());
        drop(watches);
    }

    /// Build the cache if needed. Returns `false` when unmounted.
    fn ensure_setup(self: &Rc<Self>) -> bool {
        if self.set_up.get() {
            return true;
        }
        let Some(root) = self.root() else {
            return false;
        };
        let ids = self.ids.borrow().clone();
        let mut cache = Vec::with_capacity(ids.len());
        let mut watches = Vec::new();
        for id in ids {
            if id.is_none() {
                cache.push(None);
                continue;
            }
            match root.recall_as::<T>(id) {
                Some(entity) => {
                    let handle = Rc::downgrade(&entity);
                    let list = Rc::downgrade(self);
                    let target = handle.clone();
                    watches.push(entity.core().subscribe_destroy(move |_| {
                        if let Some(list) = list.upgrade() {
                            list.drop_destroyed(&target);
                        }
                    }));
                    cache.push(Some(handle));
                }
                None => {
                    error!(entity = %id, "cached reference could not be resolved -- leaving slot empty");
                    cache.push(None);
                }
            }
        }
        *self.cache.borrow_mut() = cache;
        *self.watches.borrow_mut() = watches;
        self.set_up.set(true);
        true
    }

    /// Null every cache slot holding `target`.
    fn drop_destroyed(&self, target: &Weak<T>) {
        for slot in self.cache.borrow_mut().iter_mut() {
            if slot.as_ref().is_some_and(|w| w.ptr_eq(target)) {
                *slot = None;
            }
        }
    }

    fn get(self: &Rc<Self>, index: usize) -> Option<Rc<T>> {
        if !self.ensure_setup() {
            return None;
        }
        self.cache.borrow().get(index)?.as_ref()?.upgrade()
    }

    fn snapshot(self: &Rc<Self>) -> Vec<Option<Rc<T>>> {
        let len = self.ids.borrow().len();
        (0..len).map(|i| self.get(i)).collect()
    }

    /// Second phase of reconcile: apply staged ids.
    fn finish_update(self: &Rc<Self>) {
        let Some(ids) = self.pending.borrow_mut().take() else {
            return;
        };
        if *self.ids.borrow() == ids {
            // Reconcile may have moved these ids to other instances.
            trace!("cached references unchanged -- rebuilding resolutions");
            self.invalidate();
            return;
        }
        let old = self.snapshot();
        *self.ids.borrow_mut() = ids;
        self.invalidate();
        let new = self.snapshot();
        self.events.send(CollectionEvent::Reset { old, new });
    }
}

pub struct CachedRefList<T> {
    inner: Rc<CachedInner<T>>,
}

impl<T: Node> Default for CachedRefList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Node> CachedRefList<T> {
    pub fn new() -> Self {
        Self::from_ids(Vec::new())
    }

    pub fn from_ids(ids: Vec<EntityId>) -> Self {
        Self {
            inner: Rc::new(CachedInner {
                ids: RefCell::new(ids),
                cache: RefCell::new(Vec::new()),
                watches: RefCell::new(Vec::new()),
                set_up: Cell::new(false),
                pending: RefCell::new(None),
                root: RefCell::new(WeakRoot::default()),
                events: EventStream::new(),
            }),
        }
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.inner.ids.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.inner.ids.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.ids.borrow().is_empty()
    }

    /// `true` once the cache has been built and not invalidated since.
    pub fn is_cached(&self) -> bool {
        self.inner.set_up.get()
    }

    /// Resolve through the cache, building it first if needed.
    pub fn get(&self, index: usize) -> Option<Rc<T>> {
        self.inner.get(index)
    }

    pub fn to_vec(&self) -> Vec<Option<Rc<T>>> {
        self.inner.snapshot()
    }

    pub fn events(&self) -> &EventStream<CollectionEvent<Option<Rc<T>>>> {
        &self.inner.events
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&CollectionEvent<Option<Rc<T>>>) + 'static,
    ) -> Subscription {
        self.inner.events.subscribe(handler)
    }

    // -- mutation -----------------------------------------------------------

    pub fn push(&self, item: Option<&Rc<T>>) -> Result<(), GraphError> {
        self.insert(self.len(), item)
    }

    pub fn insert(&self, index: usize, item: Option<&Rc<T>>) -> Result<(), GraphError> {
        let len = self.len();
        if index > len {
            return Err(GraphError::IndexOutOfRange { index, len });
        }
        let id = validate_reference(self.inner.root().as_ref(), item)?;
        self.inner.ids.borrow_mut().insert(index, id);
        self.inner.invalidate();
        self.inner.events.send(CollectionEvent::Insert {
            index,
            item: item.cloned(),
        });
        Ok(())
    }

    pub fn set(&self, index: usize, item: Option<&Rc<T>>) -> Result<(), GraphError> {
        let len = self.len();
        if index >= len {
            return Err(GraphError::IndexOutOfRange { index, len });
        }
        let id = validate_reference(self.inner.root().as_ref(), item)?;
        let old = self.get(index);
        self.inner.ids.borrow_mut()[index] = id;
        self.inner.invalidate();
        self.inner.events.send(CollectionEvent::Set {
            index,
            old,
            new: item.cloned(),
        });
        Ok(())
    }

    pub fn remove_at(&self, index: usize) -> Option<EntityId> {
        if index >= self.len() {
            return None;
        }
        let item = self.get(index);
        let id = self.inner.ids.borrow_mut().remove(index);
        self.inner.invalidate();
        self.inner.events.send(CollectionEvent::Remove { index, item });
        Some(id)
    }

    pub fn reset(&self, items: &[Option<Rc<T>>]) -> Result<(), GraphError> {
        let root = self.inner.root();
        let ids = items
            .iter()
            .map(|item| validate_reference(root.as_ref(), item.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let old = self.to_vec();
        *self.inner.ids.borrow_mut() = ids;
        self.inner.invalidate();
        let new = self.to_vec();
        self.inner.events.send(CollectionEvent::Reset { old, new });
        Ok(())
    }

    pub fn clear(&self) {
        if self.is_empty() {
            return;
        }
        let old = self.to_vec();
        self.inner.ids.borrow_mut().clear();
        self.inner.invalidate();
        self.inner.events.send(CollectionEvent::Reset {
            old,
            new: Vec::new(),
        });
    }

    /// Reconcile against `source`.
    ///
    /// Outside a reconcile pass the ids are applied immediately. During one,
    /// they are staged and applied after the pass has finished copying, so
    /// the rebuilt cache resolves against final ids.
    pub fn update_from(&self, source: &CachedRefList<T>) {
        *self.inner.pending.borrow_mut() = Some(source.ids());
        match self.inner.root() {
            Some(root) if root.is_updating() => {
                let weak = Rc::downgrade(&self.inner);
                root.defer(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.finish_update();
                    }
                });
            }
            _ => self.inner.finish_update(),
        }
    }
}

impl<T: Node> Container for CachedRefList<T> {
    fn mount(&self, root: &Root, _carrier: &Weak<dyn Node>) {
        *self.inner.root.borrow_mut() = root.downgrade();
        self.inner.invalidate();
    }

    fn unmount(&self) {
        *self.inner.root.borrow_mut() = WeakRoot::default();
        self.inner.invalidate();
    }

    fn destroy_all(&self) {
        self.inner.invalidate();
    }

    fn remap_ids(&self, remap: &IdRemap) {
        for id in self.inner.ids.borrow_mut().iter_mut() {
            *id = remap.apply(*id);
        }
        self.inner.invalidate();
    }
}

impl<T: Node> Canonical for CachedRefList<T> {
    fn write(&self, w: &mut Writer) {
        self.inner.ids.borrow().write(w);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self::from_ids(Vec::<EntityId>::read(r)?))
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        self.inner.ids.borrow().fold_hash(h);
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        self.inner.ids.borrow().compare(&other.inner.ids.borrow(), cx);
    }
}

impl<T> std::fmt::Debug for CachedRefList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedRefList")
            .field("ids", &*self.inner.ids.borrow())
            .field("cached", &self.inner.set_up.get())
            .finish()
    }
}
