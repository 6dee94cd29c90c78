//! Live/dead state and the reactions an entity holds while live.
//!
//! Entering liveness acquires the entity's reactions (subscriptions) and then
//! cascades into its containers; exiting disposes every held reaction and
//! cascades out. Entering twice or exiting twice is a contract violation.

use std::cell::{Cell, RefCell};

use tracing::{debug, error};

use crate::container::Container;
use crate::entity::Node;
use crate::event::Subscription;

/// Liveness state embedded in entities that react to events.
#[derive(Debug, Default)]
pub struct Liveness {
    alive: Cell<bool>,
    held: RefCell<Vec<Subscription>>,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Number of reactions currently held.
    pub fn held_count(&self) -> usize {
        self.held.borrow().len()
    }
}

/// Reactions acquired by [`Node::acquire_reactions`].
#[derive(Debug, Default)]
pub struct Reactions {
    subs: Vec<Subscription>,
}

impl Reactions {
    pub fn push(&mut self, sub: Subscription) {
        self.subs.push(sub);
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }
}

/// Bring `node` to life: acquire its reactions, then its containers'.
///
/// # Panics
///
/// Panics if the entity is already live.
pub fn enter_live(node: &dyn Node) {
    if let Some(live) = node.liveness() {
        if live.alive.replace(true) {
            error!(entity = %node.core().id(), kind = node.type_name(), "enter_live on a live entity");
            panic!("entity {} is already live", node.core().id());
        }
        let mut acquired = Reactions::default();
        node.acquire_reactions(&mut acquired);
        live.held.borrow_mut().extend(acquired.subs);
    }
    node.visit_containers(&mut |c: &dyn Container| c.enter_live());
}

/// Take `node` out of liveness: dispose its reactions, then exit its
/// containers.
///
/// # Panics
///
/// Panics if the entity is not live.
pub fn exit_live(node: &dyn Node) {
    if let Some(live) = node.liveness() {
        if !live.alive.get() {
            error!(entity = %node.core().id(), kind = node.type_name(), "exit_live on a dead entity");
            panic!("entity {} is not live", node.core().id());
        }
        let held = std::mem::take(&mut *live.held.borrow_mut());
        for (i, sub) in held.into_iter().enumerate() {
            if !sub.dispose() {
                debug!(entity = %node.core().id(), reaction = i, "reaction was already disconnected");
            }
        }
    }
    node.visit_containers(&mut |c: &dyn Container| c.exit_live());
    if let Some(live) = node.liveness() {
        live.alive.set(false);
    }
}
