//! Single-threaded event streams.
//!
//! An [`EventStream`] delivers each sent value to a snapshot of the handlers
//! registered at send time. Sends are re-entrant: a handler that sends on the
//! same stream while it is dispatching does not recurse. The new value is
//! queued together with its own handler snapshot and drained, in FIFO order,
//! once the current dispatch loop finishes.
//!
//! Handlers are disconnected by disposing the [`Subscription`] returned from
//! [`EventStream::subscribe`], either explicitly or by dropping it.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::id::EntityId;

type Handler<E> = Rc<dyn Fn(&E)>;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to a registered handler. Disposing it disconnects the handler.
///
/// Dropping a `Subscription` disposes it.
#[must_use = "dropping a Subscription disconnects its handler immediately"]
pub struct Subscription {
    dispose: Option<Box<dyn FnOnce() -> bool>>,
}

impl Subscription {
    fn new(dispose: impl FnOnce() -> bool + 'static) -> Self {
        Self {
            dispose: Some(Box::new(dispose)),
        }
    }

    /// A subscription that is not connected to anything.
    pub fn inert() -> Self {
        Self { dispose: None }
    }

    /// Returns `true` until the subscription has been disposed.
    pub fn is_active(&self) -> bool {
        self.dispose.is_some()
    }

    /// Disconnect the handler.
    ///
    /// Returns `false` if there was nothing to disconnect (already disposed,
    /// inert, or the stream itself is gone).
    pub fn dispose(mut self) -> bool {
        self.dispose_in_place()
    }

    fn dispose_in_place(&mut self) -> bool {
        match self.dispose.take() {
            Some(f) => f(),
            None => false,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose_in_place();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

struct StreamInner<E> {
    handlers: RefCell<Vec<(u64, Handler<E>)>>,
    pending: RefCell<VecDeque<(E, Vec<Handler<E>>)>>,
    dispatching: Cell<bool>,
    next_key: Cell<u64>,
}

/// Resets the dispatching flag even if a handler panics.
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A multicast stream of `E` values.
///
/// Cloning an `EventStream` yields another handle to the same stream.
pub struct EventStream<E> {
    inner: Rc<StreamInner<E>>,
}

impl<E: 'static> EventStream<E> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(StreamInner {
                handlers: RefCell::new(Vec::new()),
                pending: RefCell::new(VecDeque::new()),
                dispatching: Cell::new(false),
                next_key: Cell::new(0),
            }),
        }
    }

    /// Register a handler. It stays connected until the returned
    /// [`Subscription`] is disposed or dropped.
    pub fn subscribe(&self, handler: impl Fn(&E) + 'static) -> Subscription {
        let key = self.inner.next_key.get();
        self.inner.next_key.set(key + 1);
        self.inner
            .handlers
            .borrow_mut()
            .push((key, Rc::new(handler)));

        let weak: Weak<StreamInner<E>> = Rc::downgrade(&self.inner);
        Subscription::new(move || match weak.upgrade() {
            Some(inner) => {
                let mut handlers = inner.handlers.borrow_mut();
                let before = handlers.len();
                handlers.retain(|(k, _)| *k != key);
                handlers.len() != before
            }
            None => false,
        })
    }

    /// Deliver `event` to every handler currently registered.
    ///
    /// If the stream is already dispatching (a handler sent re-entrantly),
    /// the event is queued and delivered after the current dispatch.
    pub fn send(&self, event: E) {
        let snapshot: Vec<Handler<E>> = self
            .inner
            .handlers
            .borrow()
            .iter()
            .map(|(_, h)| Rc::clone(h))
            .collect();
        if snapshot.is_empty() {
            return;
        }
        self.inner.pending.borrow_mut().push_back((event, snapshot));
        if self.inner.dispatching.get() {
            return;
        }

        self.inner.dispatching.set(true);
        let _guard = DispatchGuard(&self.inner.dispatching);
        loop {
            let next = self.inner.pending.borrow_mut().pop_front();
            let Some((event, handlers)) = next else {
                break;
            };
            for handler in handlers {
                handler(&event);
            }
        }
    }

    /// Number of connected handlers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.handlers.borrow().len()
    }

    /// Disconnect every handler. Outstanding subscriptions become no-ops.
    pub fn clear(&self) {
        self.inner.handlers.borrow_mut().clear();
    }
}

impl<E: 'static> Default for EventStream<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EventStream<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for EventStream<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("subscribers", &self.inner.handlers.borrow().len())
            .field("dispatching", &self.inner.dispatching.get())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// DestroySignal
// ---------------------------------------------------------------------------

/// One-shot notification fired when an entity is destroyed.
///
/// After firing, the subscriber list is cleared and further subscriptions are
/// inert.
#[derive(Debug, Default)]
pub struct DestroySignal {
    stream: EventStream<EntityId>,
    fired: Cell<bool>,
}

impl DestroySignal {
    pub fn subscribe(&self, handler: impl Fn(&EntityId) + 'static) -> Subscription {
        if self.fired.get() {
            return Subscription::inert();
        }
        self.stream.subscribe(handler)
    }

    /// Fire the signal. Returns `false` if it had already fired.
    pub(crate) fn fire(&self, id: EntityId) -> bool {
        if self.fired.replace(true) {
            return false;
        }
        self.stream.send(id);
        self.stream.clear();
        true
    }

    pub fn has_fired(&self) -> bool {
        self.fired.get()
    }

    pub fn subscriber_count(&self) -> usize {
        self.stream.subscriber_count()
    }

    /// Re-arm a fired signal for a pooled instance.
    pub(crate) fn rearm(&self) {
        self.stream.clear();
        self.fired.set(false);
    }
}

// ---------------------------------------------------------------------------
// CollectionEvent
// ---------------------------------------------------------------------------

/// One structural change to an ordered collection.
///
/// Carries enough data for an observer to apply the same diff to a mirror
/// without re-reading the collection.
#[derive(Debug, Clone)]
pub enum CollectionEvent<I> {
    Insert { index: usize, item: I },
    Remove { index: usize, item: I },
    Set { index: usize, old: I, new: I },
    Reset { old: Vec<I>, new: Vec<I> },
}

impl<I: Clone> CollectionEvent<I> {
    /// Apply this change to `mirror`.
    pub fn apply_to(&self, mirror: &mut Vec<I>) {
        match self {
            CollectionEvent::Insert { index, item } => mirror.insert(*index, item.clone()),
            CollectionEvent::Remove { index, .. } => {
                mirror.remove(*index);
            }
            CollectionEvent::Set { index, new, .. } => mirror[*index] = new.clone(),
            CollectionEvent::Reset { new, .. } => *mirror = new.clone(),
        }
    }
}

impl<I> CollectionEvent<I> {
    /// Short name of the change kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            CollectionEvent::Insert { .. } => "insert",
            CollectionEvent::Remove { .. } => "remove",
            CollectionEvent::Set { .. } => "set",
            CollectionEvent::Reset { .. } => "reset",
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handlers_receive_in_registration_order() {
        let stream = EventStream::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        let _a = stream.subscribe(move |v| l1.borrow_mut().push(("a", *v)));
        let l2 = Rc::clone(&log);
        let _b = stream.subscribe(move |v| l2.borrow_mut().push(("b", *v)));

        stream.send(7);
        assert_eq!(*log.borrow(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn dropping_subscription_disconnects() {
        let stream = EventStream::<u32>::new();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let sub = stream.subscribe(move |_| h.set(h.get() + 1));
        stream.send(1);
        drop(sub);
        stream.send(2);
        assert_eq!(hits.get(), 1);
        assert_eq!(stream.subscriber_count(), 0);
    }

    #[test]
    fn dispose_reports_whether_anything_was_disconnected() {
        let stream = EventStream::<u32>::new();
        let sub = stream.subscribe(|_| {});
        stream.clear();
        assert!(!sub.dispose());
        assert!(!Subscription::inert().dispose());
        let sub = stream.subscribe(|_| {});
        assert!(sub.dispose());
    }

    #[test]
    fn reentrant_send_is_queued_fifo() {
        let stream = EventStream::<u32>::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_stream = stream.clone();
        let l1 = Rc::clone(&log);
        let _a = stream.subscribe(move |v| {
            l1.borrow_mut().push(format!("a{v}"));
            if *v == 1 {
                inner_stream.send(2);
                inner_stream.send(3);
            }
        });
        let l2 = Rc::clone(&log);
        let _b = stream.subscribe(move |v| l2.borrow_mut().push(format!("b{v}")));

        stream.send(1);
        // Event 1 reaches every handler before events 2 and 3 are delivered.
        assert_eq!(*log.borrow(), vec!["a1", "b1", "a2", "b2", "a3", "b3"]);
    }

    #[test]
    fn handler_added_during_dispatch_misses_current_event() {
        let stream = EventStream::<u32>::new();
        let late_hits = Rc::new(Cell::new(0));
        let keep = Rc::new(RefCell::new(Vec::new()));

        let s = stream.clone();
        let hits = Rc::clone(&late_hits);
        let keep2 = Rc::clone(&keep);
        let _a = stream.subscribe(move |_| {
            if keep2.borrow().is_empty() {
                let h = Rc::clone(&hits);
                let sub = s.subscribe(move |_| h.set(h.get() + 1));
                keep2.borrow_mut().push(sub);
            }
        });

        stream.send(1);
        assert_eq!(late_hits.get(), 0);
        stream.send(2);
        assert_eq!(late_hits.get(), 1);
    }

    #[test]
    fn destroy_signal_fires_once_and_clears() {
        let signal = DestroySignal::default();
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _sub = signal.subscribe(move |id| {
            assert_eq!(*id, EntityId(5));
            h.set(h.get() + 1);
        });

        assert!(signal.fire(EntityId(5)));
        assert!(!signal.fire(EntityId(5)));
        assert_eq!(hits.get(), 1);
        assert_eq!(signal.subscriber_count(), 0);
        assert!(!signal.subscribe(|_| {}).is_active());
    }

    #[test]
    fn collection_event_mirrors() {
        let mut mirror = vec!['a', 'b'];
        CollectionEvent::Insert { index: 1, item: 'x' }.apply_to(&mut mirror);
        CollectionEvent::Set {
            index: 0,
            old: 'a',
            new: 'y',
        }
        .apply_to(&mut mirror);
        CollectionEvent::Remove { index: 2, item: 'b' }.apply_to(&mut mirror);
        assert_eq!(mirror, vec!['y', 'x']);
        CollectionEvent::Reset {
            old: mirror.clone(),
            new: vec![],
        }
        .apply_to(&mut mirror);
        assert!(mirror.is_empty());
    }
}
