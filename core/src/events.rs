//! Multi-subscriber event dispatch.
//!
//! Connections, flows, and the tracker each expose named events as a
//! [`Listeners`] set. Listeners are invoked in registration order, and the set
//! may be mutated from inside a callback: a dispatch runs over a snapshot of
//! the registrations taken when it starts, so additions and removals made
//! during a dispatch take effect from the next emission onward.
//!
//! The core is single-threaded (see the crate docs), so registration uses
//! interior mutability and listener sets are neither `Send` nor `Sync`.

use std::cell::RefCell;

/// Handle returned by a registration, used to unregister the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback<S, E> = Box<dyn FnMut(&S, &E)>;

/// An ordered set of callbacks for one event.
///
/// `S` is the subject the event fires on (e.g. a flow) and `E` the event
/// payload. Both are passed by reference so a callback can inspect the subject
/// and register or unregister further listeners on it.
pub struct Listeners<S, E> {
    inner: RefCell<Inner<S, E>>,
}

struct Inner<S, E> {
    next_id: u64,
    entries: Vec<(ListenerId, Callback<S, E>)>,
    /// Removals requested while a dispatch snapshot is out.
    pending_removals: Vec<ListenerId>,
    dispatching: bool,
}

impl<S, E> Listeners<S, E> {
    pub fn new() -> Self {
        Listeners {
            inner: RefCell::new(Inner {
                next_id: 0,
                entries: Vec::new(),
                pending_removals: Vec::new(),
                dispatching: false,
            }),
        }
    }

    /// Registers `callback` and returns its handle.
    pub fn add(&self, callback: impl FnMut(&S, &E) + 'static) -> ListenerId {
        let mut inner = self.inner.borrow_mut();
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, Box::new(callback)));
        id
    }

    /// Unregisters the listener behind `id`.
    ///
    /// Returns `false` only if the listener is known to be absent. A removal
    /// requested during a dispatch is recorded and applied when the dispatch
    /// finishes; the listener still sees the in-flight event.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let before = inner.entries.len();
        inner.entries.retain(|(eid, _)| *eid != id);
        if inner.entries.len() != before {
            return true;
        }
        if inner.dispatching && id.0 < inner.next_id {
            inner.pending_removals.push(id);
            return true;
        }
        false
    }

    /// Number of registered listeners, including additions not yet merged.
    pub fn len(&self) -> usize {
        let inner = self.inner.borrow();
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every listener registered at the time of the call.
    ///
    /// Nested emissions on the same set are dropped; the pipeline never emits
    /// the same event from inside one of its own callbacks.
    pub(crate) fn emit(&self, subject: &S, event: &E) {
        let mut snapshot = {
            let mut inner = self.inner.borrow_mut();
            if inner.dispatching {
                log::debug!("dropping re-entrant event emission");
                return;
            }
            inner.dispatching = true;
            std::mem::take(&mut inner.entries)
        };

        for (_, callback) in snapshot.iter_mut() {
            callback(subject, event);
        }

        let mut inner = self.inner.borrow_mut();
        inner.dispatching = false;
        let added = std::mem::take(&mut inner.entries);
        let removed = std::mem::take(&mut inner.pending_removals);
        snapshot.retain(|(id, _)| !removed.contains(id));
        snapshot.extend(added);
        inner.entries = snapshot;
    }
}

impl<S, E> Default for Listeners<S, E> {
    fn default() -> Self {
        Listeners::new()
    }
}

impl<S, E> std::fmt::Debug for Listeners<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn core_listeners_registration_order() {
        let listeners: Listeners<(), u32> = Listeners::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for tag in ["a", "b", "c"] {
            let order = Rc::clone(&order);
            listeners.add(move |_, _| order.borrow_mut().push(tag));
        }
        listeners.emit(&(), &0);
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn core_listeners_remove() {
        let listeners: Listeners<(), u32> = Listeners::new();
        let hits = Rc::new(RefCell::new(0));
        let h = Rc::clone(&hits);
        let id = listeners.add(move |_, _| *h.borrow_mut() += 1);
        listeners.emit(&(), &0);
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        listeners.emit(&(), &0);
        assert_eq!(*hits.borrow(), 1);
    }

    #[test]
    fn core_listeners_removal_during_dispatch_sees_inflight_event() {
        let listeners: Rc<Listeners<(), ListenerId>> = Rc::new(Listeners::new());
        let hits = Rc::new(RefCell::new(0));

        let h = Rc::clone(&hits);
        let set = Rc::clone(&listeners);
        // Unregisters itself on the first event; still runs for that event.
        listeners.add(move |_, id| {
            *h.borrow_mut() += 1;
            set.remove(*id);
        });
        let h = Rc::clone(&hits);
        let id2 = listeners.add(move |_, _| *h.borrow_mut() += 10);

        // The first listener does not know its own id until after `add`
        // returns, so the event carries the id to remove.
        let id1 = ListenerId(0);
        listeners.emit(&(), &id1);
        assert_eq!(*hits.borrow(), 11);
        listeners.emit(&(), &id1);
        assert_eq!(*hits.borrow(), 21);
        assert_eq!(listeners.len(), 1);
        assert!(listeners.remove(id2));
    }

    #[test]
    fn core_listeners_addition_during_dispatch_starts_next_emit() {
        let listeners: Rc<Listeners<(), u32>> = Rc::new(Listeners::new());
        let hits = Rc::new(RefCell::new(Vec::new()));

        let h = Rc::clone(&hits);
        let set = Rc::clone(&listeners);
        listeners.add(move |_, ev| {
            h.borrow_mut().push(("first", *ev));
            if *ev == 0 {
                let h2 = Rc::clone(&h);
                set.add(move |_, ev| h2.borrow_mut().push(("second", *ev)));
            }
        });

        listeners.emit(&(), &0);
        listeners.emit(&(), &1);
        assert_eq!(
            *hits.borrow(),
            vec![("first", 0), ("first", 1), ("second", 1)]
        );
    }
}
