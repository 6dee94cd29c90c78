//! Non-owning ordered collection of entity references.
//!
//! A [`RefList`] stores ids and resolves them through the registry on every
//! read. Referenced entities are never attached, detached or destroyed by it.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use arbor_codec::prelude::*;
use tracing::{debug, warn};

use crate::container::{Container, MountPoint};
use crate::entity::Node;
use crate::event::{CollectionEvent, EventStream, Subscription};
use crate::id::{EntityId, IdRemap};
use crate::registry::addr_of;
use crate::root::Root;
use crate::GraphError;

/// Check that `item` may be stored as a reference in a collection mounted
/// under `root`, and return its id. `None` stores the null id.
pub(crate) fn validate_reference<T: Node>(
    root: Option<&Root>,
    item: Option<&Rc<T>>,
) -> Result<EntityId, GraphError> {
    let Some(item) = item else {
        return Ok(EntityId::NONE);
    };
    let id = item.core().id();
    let Some(root) = root.cloned().or_else(|| item.core().root()) else {
        return Err(GraphError::Detached);
    };
    if id.is_none() {
        return Err(GraphError::Detached);
    }
    match root.recall(id) {
        None => Err(GraphError::NotRegistered { id }),
        Some(found) if addr_of(&*found) != addr_of(&**item) => Err(GraphError::IdMismatch { id }),
        Some(_) => Ok(id),
    }
}

pub(crate) fn resolve<T: Node>(root: Option<&Root>, id: EntityId) -> Option<Rc<T>> {
    if id.is_none() {
        return None;
    }
    let Some(root) = root else {
        debug!(entity = %id, "reference read while unmounted");
        return None;
    };
    let found = root.recall_as::<T>(id);
    if found.is_none() {
        warn!(entity = %id, "referenced entity is not registered");
    }
    found
}

pub struct RefList<T> {
    ids: RefCell<Vec<EntityId>>,
    mount: MountPoint,
    events: EventStream<CollectionEvent<Option<Rc<T>>>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Node> Default for RefList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Node> RefList<T> {
    pub fn new() -> Self {
        Self::from_ids(Vec::new())
    }

    pub fn from_ids(ids: Vec<EntityId>) -> Self {
        Self {
            ids: RefCell::new(ids),
            mount: MountPoint::default(),
            events: EventStream::new(),
            _marker: PhantomData,
        }
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.ids.borrow().clone()
    }

    pub fn id_at(&self, index: usize) -> Option<EntityId> {
        self.ids.borrow().get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.borrow().is_empty()
    }

    /// Resolve the reference at `index`. `None` for out-of-range, null, or
    /// unregistered ids.
    pub fn get(&self, index: usize) -> Option<Rc<T>> {
        let id = self.id_at(index)?;
        resolve(self.mount.root().as_ref(), id)
    }

    pub fn to_vec(&self) -> Vec<Option<Rc<T>>> {
        let root = self.mount.root();
        self.ids()
            .into_iter()
            .map(|id| resolve(root.as_ref(), id))
            .collect()
    }

    pub fn events(&self) -> &EventStream<CollectionEvent<Option<Rc<T>>>> {
        &self.events
    }

    pub fn subscribe(
        &self,
        handler: impl Fn(&CollectionEvent<Option<Rc<T>>>) + 'static,
    ) -> Subscription {
        self.events.subscribe(handler)
    }

    // -- mutation -----------------------------------------------------------

    pub fn push(&self, item: Option<&Rc<T>>) -> Result<(), GraphError> {
        self.insert(self.len(), item)
    }

    /// Append a raw id without validation.
    pub fn push_id(&self, id: EntityId) {
        let index = self.len();
        self.ids.borrow_mut().push(id);
        let item = resolve(self.mount.root().as_ref(), id);
        self.events.send(CollectionEvent::Insert { index, item });
    }

    pub fn insert(&self, index: usize, item: Option<&Rc<T>>) -> Result<(), GraphError> {
        let len = self.len();
        if index > len {
            return Err(GraphError::IndexOutOfRange { index, len });
        }
        let id = validate_reference(self.mount.root().as_ref(), item)?;
        self.ids.borrow_mut().insert(index, id);
        self.events.send(CollectionEvent::Insert {
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
        let id = validate_reference(self.mount.root().as_ref(), item)?;
        let old = self.get(index);
        self.ids.borrow_mut()[index] = id;
        self.events.send(CollectionEvent::Set {
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
        let id = self.ids.borrow_mut().remove(index);
        self.events.send(CollectionEvent::Remove { index, item });
        Some(id)
    }

    /// Replace every reference, emitting a single `Reset`.
    pub fn reset(&self, items: &[Option<Rc<T>>]) -> Result<(), GraphError> {
        let root = self.mount.root();
        let ids = items
            .iter()
            .map(|item| validate_reference(root.as_ref(), item.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        self.reset_ids(ids);
        Ok(())
    }

    /// Replace every id without validation, emitting a single `Reset`.
    pub fn reset_ids(&self, ids: Vec<EntityId>) {
        let old = self.to_vec();
        *self.ids.borrow_mut() = ids;
        let new = self.to_vec();
        self.events.send(CollectionEvent::Reset { old, new });
    }

    pub fn clear(&self) {
        if !self.is_empty() {
            self.reset_ids(Vec::new());
        }
    }

    /// Copy `source`'s ids. Emits a `Reset` only if they differ.
    pub fn update_from(&self, source: &RefList<T>) {
        let ids = source.ids();
        if *self.ids.borrow() != ids {
            self.reset_ids(ids);
        }
    }
}

impl<T: Node> Container for RefList<T> {
    fn mount(&self, root: &Root, _carrier: &Weak<dyn Node>) {
        self.mount.set(root, None);
    }

    fn unmount(&self) {
        self.mount.clear();
    }

    fn destroy_all(&self) {}

    fn remap_ids(&self, remap: &IdRemap) {
        for id in self.ids.borrow_mut().iter_mut() {
            *id = remap.apply(*id);
        }
    }
}

impl<T: Node> Canonical for RefList<T> {
    fn write(&self, w: &mut Writer) {
        self.ids.borrow().write(w);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        Ok(Self::from_ids(Vec::<EntityId>::read(r)?))
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        self.ids.borrow().fold_hash(h);
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        self.ids.borrow().compare(&other.ids.borrow(), cx);
    }
}

impl<T> std::fmt::Debug for RefList<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefList")
            .field("ids", &*self.ids.borrow())
            .finish()
    }
}
