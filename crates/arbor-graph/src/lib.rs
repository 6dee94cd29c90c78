//! Arbor graph -- a single-threaded entity hierarchy with registry-backed ids,
//! owned and referenced collections, liveness, reversible static connections
//! and identity-preserving reconciliation.
//!
//! # Architecture
//!
//! - **Entities** are structs held in `Rc`, embedding an [`EntityCore`] and
//!   implementing [`Node`] (traversal), [`Canonical`](arbor_codec::Canonical)
//!   (bytes, hash, compare) and [`Reconcile`] (state transfer).
//! - **Containers** ([`OwnedList`], [`Slot`], [`RefList`], [`CachedRefList`])
//!   are fields of entities. Owning containers drive attach, liveness and
//!   destruction of their elements; reference containers store ids.
//! - **Root** holds the id registry and the reconcile flag. It is passed
//!   explicitly; there is no global state.
//! - **Hierarchy** ties a root to its top entity and exposes whole-tree
//!   reconcile, serialize, hash and compare-check.
//!
//! # Quick Start
//!
//! ```
//! use std::rc::Rc;
//! use arbor_graph::prelude::*;
//!
//! struct Leaf {
//!     core: EntityCore,
//!     value: std::cell::Cell<u32>,
//! }
//!
//! impl Node for Leaf {
//!     fn core(&self) -> &EntityCore {
//!         &self.core
//!     }
//! }
//!
//! let root = Root::new();
//! let leaf = Rc::new(Leaf { core: EntityCore::new(), value: 7.into() });
//! adopt(&leaf, &root, None);
//!
//! let id = leaf.core().id();
//! let found = root.recall_as::<Leaf>(id).unwrap();
//! assert_eq!(found.value.get(), 7);
//!
//! destroy(&*leaf);
//! assert!(root.recall(id).is_none());
//! ```

pub mod cached;
pub mod connection;
pub mod container;
pub mod entity;
pub mod event;
pub mod hierarchy;
pub mod id;
pub mod liveness;
pub mod owned;
pub mod pool;
pub mod reconcile;
pub mod reference;
pub mod registry;
pub mod root;
pub mod slot;

pub use cached::CachedRefList;
pub use connection::{ConnectionTarget, StaticConnection, StaticConnections};
pub use container::Container;
pub use entity::{adopt, destroy, detach, subtree_ids, walk, EntityCore, Node};
pub use event::{CollectionEvent, DestroySignal, EventStream, Subscription};
pub use hierarchy::Hierarchy;
pub use id::{EntityId, IdRemap};
pub use liveness::{enter_live, exit_live, Liveness, Reactions};
pub use owned::OwnedList;
pub use pool::{Pool, VecPool};
pub use reconcile::{Entity, PartialReport, Reconcile};
pub use reference::RefList;
pub use registry::NodeRef;
pub use root::{Root, WeakRoot};
pub use slot::Slot;

use arbor_codec::CodecError;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors from graph operations that callers are expected to handle.
///
/// Contract violations (double enter/exit of liveness, inserting a live
/// entity into a live collection, preassigning an attached entity) panic
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// The entity is not attached to any root.
    #[error("entity is not attached to a root")]
    Detached,

    /// No live entity is registered under the id.
    #[error("entity {id} is not registered")]
    NotRegistered { id: EntityId },

    /// The id is registered to a different entity instance.
    #[error("id {id} is registered to a different entity")]
    IdMismatch { id: EntityId },

    /// A static connection endpoint was the null id.
    #[error("static connection from {owner} to {target} has a null endpoint")]
    NullConnection { owner: EntityId, target: EntityId },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for entity definitions.
pub mod prelude {
    pub use crate::{
        adopt, destroy, detach, enter_live, exit_live, walk, CachedRefList, CollectionEvent,
        ConnectionTarget, Container, Entity, EntityCore, EntityId, EventStream, GraphError,
        Hierarchy, Liveness, Node, OwnedList, Reactions, Reconcile, RefList, Root, Slot,
        Subscription,
    };
    pub use arbor_codec::prelude::*;
}
