//! Single-entity owning field.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use arbor_codec::prelude::*;
use tracing::{error, trace};

use crate::container::{Container, MountPoint};
use crate::entity::{self, Node};
use crate::event::{CollectionEvent, EventStream, Subscription};
use crate::liveness;
use crate::owned::Eviction;
use crate::pool::{self, Pool};
use crate::reconcile::Reconcile;
use crate::root::Root;

/// Owns zero or one entity. Changes are reported as `Set { index: 0 }`.
pub struct Slot<T> {
    value: RefCell<Option<Rc<T>>>,
    mount: MountPoint,
    events: EventStream<CollectionEvent<Option<Rc<T>>>>,
    pool: RefCell<Option<Rc<dyn Pool<T>>>>,
}

impl<T: Node> Default for Slot<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: Node> Slot<T> {
    pub fn empty() -> Self {
        Self::holding(None)
    }

    /// A detached slot holding `value`.
    pub fn holding(value: Option<Rc<T>>) -> Self {
        Self {
            value: RefCell::new(value),
            mount: MountPoint::default(),
            events: EventStream::new(),
            pool: RefCell::new(None),
        }
    }

    pub fn set_pool(&self, pool: Rc<dyn Pool<T>>) {
        *self.pool.borrow_mut() = Some(pool);
    }

    pub fn get(&self) -> Option<Rc<T>> {
        self.value.borrow().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.value.borrow().is_none()
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

    /// Hold `value`, evicting (and normally destroying) the previous entity.
    /// Returns the previous entity.
    pub fn set(&self, value: Option<Rc<T>>) -> Option<Rc<T>> {
        self.replace(value, Eviction::Auto)
    }

    /// Empty the slot, destroying the held entity.
    pub fn take(&self) -> Option<Rc<T>> {
        self.replace(None, Eviction::Auto)
    }

    /// Empty the slot without destroying the held entity.
    pub fn take_detached(&self) -> Option<Rc<T>> {
        self.replace(None, Eviction::Detach)
    }

    /// Move the held entity into `to` without destroying it and without
    /// re-entering liveness when both slots are equally live. Whatever `to`
    /// held before is evicted.
    pub fn transplant(&self, to: &Slot<T>) {
        if std::ptr::eq(self, to) {
            return;
        }
        let Some(item) = self.value.borrow_mut().take() else {
            return;
        };
        let displaced = to.value.borrow_mut().replace(Rc::clone(&item));
        if let Some(old) = &displaced {
            to.evict(old, Eviction::Auto);
        }

        let from_root = self.mount.root();
        let to_root = to.mount.root();
        match (&from_root, &to_root) {
            (Some(a), Some(b)) if a.ptr_eq(b) => {
                item.core().attach_to(b, to.mount.carrier());
            }
            (_, Some(b)) => {
                entity::detach(&*item);
                entity::adopt(&item, b, to.mount.carrier().as_ref());
            }
            (Some(_), None) => entity::detach(&*item),
            (None, None) => {}
        }

        match (self.mount.is_alive(), to.mount.is_alive()) {
            (true, false) => liveness::exit_live(&*item),
            (false, true) => liveness::enter_live(&*item),
            _ => {}
        }
        trace!(entity = %item.core().id(), "transplanted between slots");

        self.events.send(CollectionEvent::Set {
            index: 0,
            old: Some(Rc::clone(&item)),
            new: None,
        });
        to.events.send(CollectionEvent::Set {
            index: 0,
            old: displaced,
            new: Some(item),
        });
    }

    fn replace(&self, value: Option<Rc<T>>, how: Eviction) -> Option<Rc<T>> {
        if let Some(item) = &value {
            let current = self.get();
            if current.as_ref().is_some_and(|c| Rc::ptr_eq(c, item)) {
                return current;
            }
            if self.mount.is_alive() && item.liveness().is_some_and(|l| l.is_alive()) {
                error!(entity = %item.core().id(), "placing a live entity into a live slot");
                panic!(
                    "entity {} is already live; remove it from its previous owner first",
                    item.core().id()
                );
            }
        }
        if value.is_none() && self.is_empty() {
            return None;
        }
        let old = self.value.replace(value.clone());
        if let Some(o) = &old {
            self.evict(o, how);
        }
        if let Some(item) = &value {
            if let Some(root) = self.mount.root() {
                entity::adopt(item, &root, self.mount.carrier().as_ref());
            }
            if self.mount.is_alive() {
                liveness::enter_live(&**item);
            }
        }
        self.events.send(CollectionEvent::Set {
            index: 0,
            old: old.clone(),
            new: value,
        });
        old
    }

    fn pool(&self) -> Option<Rc<dyn Pool<T>>> {
        self.pool.borrow().clone()
    }

    fn evict(&self, item: &Rc<T>, how: Eviction) {
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
}

impl<T: Reconcile> Slot<T> {
    /// Reconcile against `source`: update in place when both hold entities
    /// of the same kind, otherwise instantiate or destroy.
    pub fn update_from(&self, source: &Slot<T>) {
        match (self.get(), source.get()) {
            (Some(mine), Some(theirs)) if mine.same_kind(&theirs) => mine.update_from(&theirs),
            (_, Some(theirs)) => {
                let fresh = pool::instantiate(self.pool().as_ref(), &theirs);
                self.replace(Some(fresh), Eviction::Destroy);
            }
            (Some(_), None) => {
                self.replace(None, Eviction::Destroy);
            }
            (None, None) => {}
        }
    }
}

impl<T: Node> Container for Slot<T> {
    fn mount(&self, root: &Root, carrier: &Weak<dyn Node>) {
        self.mount.set(root, Some(carrier));
        if let Some(item) = self.get() {
            entity::adopt(&item, root, Some(carrier));
        }
    }

    fn unmount(&self) {
        self.mount.clear();
        if let Some(item) = self.get() {
            entity::detach(&*item);
        }
    }

    fn enter_live(&self) {
        if self.mount.set_alive(true) {
            return;
        }
        if let Some(item) = self.get() {
            liveness::enter_live(&*item);
        }
    }

    fn exit_live(&self) {
        if !self.mount.is_alive() {
            return;
        }
        if let Some(item) = self.get() {
            liveness::exit_live(&*item);
        }
        self.mount.set_alive(false);
    }

    fn destroy_all(&self) {
        self.mount.set_alive(false);
        let old = self.value.borrow_mut().take();
        if let Some(item) = &old {
            pool::retire(self.pool().as_ref(), item);
            self.events.send(CollectionEvent::Set {
                index: 0,
                old,
                new: None,
            });
        }
    }

    fn for_each_node(&self, visit: &mut dyn FnMut(&dyn Node)) {
        if let Some(item) = self.get() {
            visit(&*item);
        }
    }
}

impl<T: Node + Canonical> Canonical for Slot<T> {
    fn write(&self, w: &mut Writer) {
        match &*self.value.borrow() {
            Some(item) => {
                w.write_bool(true);
                item.write(w);
            }
            None => w.write_bool(false),
        }
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let value = if r.read_bool()? {
            Some(Rc::new(T::read(r)?))
        } else {
            None
        };
        Ok(Self::holding(value))
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        match &*self.value.borrow() {
            Some(item) => {
                h.fold(1);
                item.fold_hash(h);
            }
            None => h.fold(0),
        }
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        match (self.get(), other.get()) {
            (Some(a), Some(b)) => a.compare(&b, cx),
            (None, None) => {}
            (a, b) => cx.report(format!(
                "presence differs: {} vs {}",
                if a.is_some() { "some" } else { "none" },
                if b.is_some() { "some" } else { "none" }
            )),
        }
    }
}

impl<T> std::fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot")
            .field("occupied", &self.value.borrow().is_some())
            .field("mount", &self.mount)
            .finish()
    }
}
