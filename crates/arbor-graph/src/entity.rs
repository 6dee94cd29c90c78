//! Entities: the [`Node`] trait, the shared [`EntityCore`] and the lifecycle
//! operations (attach, detach, destroy) that every entity goes through.
//!
//! An entity is a plain struct held in an `Rc`. It embeds one [`EntityCore`]
//! plus any number of containers, and implements [`Node`] to expose them.
//! All mutable state lives behind `Cell`/`RefCell`, so every operation takes
//! `&self`.
//!
//! # Lifecycle
//!
//! ```text
//! detached ──adopt──▶ attached ──enter_live──▶ live
//!     ▲                  │  ▲                    │
//!     └────detach────────┘  └────exit_live───────┘
//!                        │
//!                     destroy ──▶ destroyed (terminal unless pooled)
//! ```

use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};

use arbor_codec::prelude::*;
use tracing::{error, trace, warn};

use crate::connection::{ConnectionTarget, StaticConnection, StaticConnections};
use crate::container::Container;
use crate::event::{DestroySignal, Subscription};
use crate::id::{EntityId, IdRemap};
use crate::liveness::{self, Liveness, Reactions};
use crate::registry::{addr_of, NodeRef};
use crate::root::{Root, WeakRoot};
use crate::GraphError;

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// An element of an entity hierarchy.
///
/// Only [`core`](Node::core) is required. Entities with children list their
/// containers in [`visit_containers`](Node::visit_containers); entities that
/// hold subscriptions while live return their [`Liveness`] and acquire them in
/// [`acquire_reactions`](Node::acquire_reactions).
pub trait Node: 'static {
    fn core(&self) -> &EntityCore;

    /// Liveness state, for entities that participate in enter/exit.
    fn liveness(&self) -> Option<&Liveness> {
        None
    }

    /// Call `visit` once for every container field, in declaration order.
    fn visit_containers(&self, _visit: &mut dyn FnMut(&dyn Container)) {}

    /// Subscribe to whatever this entity reacts to while live. Everything
    /// pushed into `held` is disposed on exit.
    fn acquire_reactions(&self, _held: &mut Reactions) {}

    /// Reversal capability, for entities that accept static connections.
    fn connection_target(&self) -> Option<&dyn ConnectionTarget> {
        None
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

// ---------------------------------------------------------------------------
// EntityCore
// ---------------------------------------------------------------------------

/// State every entity carries: id, attachment, destruction and the static
/// connections it has applied to others.
#[derive(Default)]
pub struct EntityCore {
    id: Cell<EntityId>,
    attached: Cell<bool>,
    destroyed: Cell<bool>,
    root: RefCell<WeakRoot>,
    carrier: RefCell<Option<Weak<dyn Node>>>,
    this: RefCell<Option<NodeRef>>,
    connections: RefCell<StaticConnections>,
    on_destroy: DestroySignal,
}

impl EntityCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A detached core carrying a pre-assigned id, used when building state
    /// that will later be attached or reconciled into a live hierarchy.
    pub fn with_id(id: EntityId) -> Self {
        let core = Self::default();
        core.id.set(id);
        core
    }

    pub fn id(&self) -> EntityId {
        self.id.get()
    }

    /// Give a detached entity a specific id.
    ///
    /// # Panics
    ///
    /// Panics if the entity is attached; ids of attached entities change only
    /// through [`Root::force_id`] or reconcile.
    pub fn preassign(&self, id: EntityId) {
        if self.is_attached() {
            error!(entity = %self.id(), requested = %id, "preassign on an attached entity");
            panic!("cannot preassign id {id} to attached entity {}", self.id());
        }
        self.reidentify(id);
    }

    pub(crate) fn set_id_raw(&self, id: EntityId) {
        self.id.set(id);
    }

    /// Change the id and carry recorded connections over to it.
    pub(crate) fn reidentify(&self, id: EntityId) {
        self.id.set(id);
        self.connections.borrow_mut().rebind_owner(id);
    }

    /// `true` between insertion into an owning container (or becoming a
    /// hierarchy top) and removal from it.
    pub fn is_attached(&self) -> bool {
        self.attached.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// The root this entity is registered with, if any.
    pub fn root(&self) -> Option<Root> {
        self.root.borrow().upgrade()
    }

    /// The entity whose container holds this one. `None` for a hierarchy top.
    pub fn carrier(&self) -> Option<Rc<dyn Node>> {
        self.carrier.borrow().as_ref()?.upgrade()
    }

    pub(crate) fn node_ref(&self) -> Option<NodeRef> {
        self.this.borrow().clone()
    }

    pub(crate) fn bind(&self, entry: NodeRef) {
        *self.this.borrow_mut() = Some(entry);
    }

    /// Fired once when the entity is destroyed.
    pub fn on_destroy(&self) -> &DestroySignal {
        &self.on_destroy
    }

    /// Subscribe to destruction. Inert if the entity is already destroyed.
    pub fn subscribe_destroy(&self, handler: impl Fn(&EntityId) + 'static) -> Subscription {
        self.on_destroy.subscribe(handler)
    }

    // -- static connections -------------------------------------------------

    pub fn connections(&self) -> Ref<'_, StaticConnections> {
        self.connections.borrow()
    }

    /// Record that this entity has applied a reversible side effect to
    /// `target`.
    ///
    /// Fails if either id is null, or if this entity is attached and `target`
    /// is not registered with the same root.
    pub fn connect(&self, target: EntityId) -> Result<(), GraphError> {
        if let Some(root) = self.root() {
            if target.is_some() && root.recall(target).is_none() {
                return Err(GraphError::NotRegistered { id: target });
            }
        }
        self.connections.borrow_mut().add(self.id(), target)
    }

    /// Forget the records pointing at `target` without reversing them.
    pub fn disconnect(&self, target: EntityId) -> usize {
        self.connections.borrow_mut().remove_target(target)
    }

    /// Rewrite connection endpoints, returning those that fell outside the
    /// table.
    pub(crate) fn remap_connections(&self, remap: &IdRemap) -> Vec<StaticConnection> {
        self.connections.borrow_mut().remap(remap)
    }

    // -- attachment ---------------------------------------------------------

    pub(crate) fn attach_to(&self, root: &Root, carrier: Option<Weak<dyn Node>>) {
        *self.root.borrow_mut() = root.downgrade();
        *self.carrier.borrow_mut() = carrier;
    }

    pub(crate) fn detach_from_root(&self) {
        *self.root.borrow_mut() = WeakRoot::default();
        *self.carrier.borrow_mut() = None;
    }

    pub(crate) fn notify_inserted(&self) {
        self.attached.set(true);
    }

    pub(crate) fn notify_removed(&self) {
        self.attached.set(false);
    }

    /// Reset a destroyed core so its entity can be reused from a pool.
    pub fn revive(&self) {
        self.id.set(EntityId::NONE);
        self.attached.set(false);
        self.destroyed.set(false);
        self.detach_from_root();
        *self.this.borrow_mut() = None;
        self.connections.borrow_mut().clear();
        self.on_destroy.rearm();
    }

    // -- reconcile ----------------------------------------------------------

    /// Copy identity and connections from `source`.
    ///
    /// An attached entity moves its registry mapping to the new id. A null
    /// source id leaves the current id in place.
    pub fn update_from(&self, source: &EntityCore) {
        let new = source.id();
        if new.is_some() {
            let old = self.id.replace(new);
            if old != new {
                if let (Some(root), Some(entry)) = (self.root(), self.node_ref()) {
                    trace!(from = %old, to = %new, "id transfer");
                    root.transfer_id(old, new, &entry);
                }
            }
        }
        let conns = source.connections.borrow().clone();
        *self.connections.borrow_mut() = conns;
    }
}

impl Canonical for EntityCore {
    fn write(&self, w: &mut Writer) {
        self.id().write(w);
        self.connections.borrow().write(w);
    }

    fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let id = EntityId::read(r)?;
        let connections = StaticConnections::read(r)?;
        let core = EntityCore::with_id(id);
        *core.connections.borrow_mut() = connections;
        Ok(core)
    }

    fn fold_hash(&self, h: &mut StateHasher) {
        self.id().fold_hash(h);
        self.connections.borrow().fold_hash(h);
    }

    fn compare(&self, other: &Self, cx: &mut CompareCx<'_>) {
        cx.check("id", &self.id(), &other.id());
        cx.scope("connections", |cx| {
            self.connections.borrow().compare(&other.connections.borrow(), cx)
        });
    }
}

impl std::fmt::Debug for EntityCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCore")
            .field("id", &self.id())
            .field("attached", &self.is_attached())
            .field("destroyed", &self.is_destroyed())
            .field("connections", &self.connections.borrow().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle operations
// ---------------------------------------------------------------------------

/// Attach `item` (and its whole subtree) to `root` under `carrier`.
///
/// Assigns an id if the entity has none, registers it, and propagates the
/// root to every container. Liveness is not touched.
///
/// # Panics
///
/// Panics if `item` has been destroyed and not revived.
pub fn adopt<T: Node>(item: &Rc<T>, root: &Root, carrier: Option<&Weak<dyn Node>>) {
    let core = item.core();
    if core.is_destroyed() {
        error!(entity = %core.id(), "attempt to attach a destroyed entity");
        panic!("cannot attach destroyed entity {}", core.id());
    }
    core.bind(NodeRef::of(item));
    core.attach_to(root, carrier.cloned());
    root.register(core);
    let me: Weak<T> = Rc::downgrade(item);
    let me: Weak<dyn Node> = me;
    item.visit_containers(&mut |c: &dyn Container| c.mount(root, &me));
    core.notify_inserted();
}

/// Detach `node` and its subtree from their root without destroying them.
pub fn detach(node: &dyn Node) {
    let core = node.core();
    if let Some(root) = core.root() {
        root.forget_addr(core.id(), addr_of(node));
    }
    node.visit_containers(&mut |c: &dyn Container| c.unmount());
    core.detach_from_root();
    core.notify_removed();
}

/// Destroy `node` and, recursively, everything it owns.
///
/// Order: exit liveness, fire the destroy signal, reverse static connections
/// (skipped while the root is reconciling), forget the id, cascade to owned
/// children, detach. Destroying twice logs an error and does nothing.
pub fn destroy(node: &dyn Node) {
    let core = node.core();
    if core.is_destroyed() {
        error!(
            entity = %core.id(),
            kind = node.type_name(),
            "entity destroyed twice -- ignoring"
        );
        return;
    }
    if node.liveness().is_some_and(Liveness::is_alive) {
        liveness::exit_live(node);
    }
    core.destroyed.set(true);
    core.on_destroy.fire(core.id());

    let root = core.root();
    let conns = std::mem::take(&mut *core.connections.borrow_mut());
    match &root {
        Some(root) if !root.is_updating() => {
            let reversed = conns.reverse_all(root);
            trace!(entity = %core.id(), reversed, "static connections reversed");
        }
        Some(_) => {
            trace!(entity = %core.id(), "destroyed during reconcile -- connections left in place");
        }
        None if !conns.is_empty() => {
            warn!(
                entity = %core.id(),
                count = conns.len(),
                "detached entity destroyed with static connections -- cannot reverse"
            );
        }
        None => {}
    }
    if let Some(root) = &root {
        root.forget_addr(core.id(), addr_of(node));
    }

    node.visit_containers(&mut |c: &dyn Container| c.destroy_all());
    detach(node);
}

/// Depth-first pre-order traversal of `node` and its owned subtree.
pub fn walk(node: &dyn Node, visit: &mut dyn FnMut(&dyn Node)) {
    visit(node);
    node.visit_containers(&mut |c: &dyn Container| {
        c.for_each_node(&mut |child: &dyn Node| walk(child, &mut *visit))
    });
}

/// Collect the ids of `node` and every owned descendant, in walk order.
pub fn subtree_ids(node: &dyn Node) -> Vec<EntityId> {
    let mut ids = Vec::new();
    walk(node, &mut |n: &dyn Node| ids.push(n.core().id()));
    ids
}
