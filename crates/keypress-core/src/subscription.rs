#![forbid(unsafe_code)]

//! Fan-out of [`KeyEvent`](crate::event::KeyEvent)s to registered handlers.
//!
//! Handlers are registered against an explicit registry owned by the router
//! rather than holding references to each other; each is referenced by an
//! opaque id and removed via the returned unsubscribe handle rather than by
//! identity comparison.
//!
//! Broadcast iterates a **snapshot** of the registered handlers (a cloned
//! `Vec` of boxed closures is not possible without `Clone` on `FnMut`, so the
//! snapshot is a `Vec` of `Rc<RefCell<...>>` pointers instead — cheap to copy,
//! and safe if a handler unsubscribes or subscribes a new handler from within
//! its own callback, since the mutation lands on the live registry, not the
//! snapshot already being iterated).

use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::event::KeyEvent;

/// Opaque handle identifying a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<RefCell<dyn FnMut(&KeyEvent)>>;

/// Registry of key-event subscribers with panic-isolated broadcast.
#[derive(Default)]
pub struct Subscription {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl Subscription {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler and return its id.
    ///
    /// Use [`Subscription::unsubscribe`] with the returned id to remove it
    /// later; unsubscribing is safe to call from within a handler body.
    pub fn subscribe(&mut self, handler: impl FnMut(&KeyEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.handlers.push((id, Rc::new(RefCell::new(handler))));
        id
    }

    /// Remove a previously registered handler. Safe to call at any time,
    /// including from within a handler invoked during the current broadcast
    /// (it only affects handlers iterated on the *next* broadcast).
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.handlers.retain(|(existing, _)| *existing != id);
    }

    /// Returns the number of currently registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Broadcast an event to every currently-registered handler.
    ///
    /// Iterates a snapshot of the handler list so that mutation of the
    /// registry during broadcast (subscribe/unsubscribe from within a
    /// handler) never affects the handlers still pending in this call. A
    /// handler that panics is caught and logged; the remaining handlers
    /// still receive the event.
    pub fn broadcast(&self, event: &KeyEvent) {
        let snapshot: Vec<Handler> = self.handlers.iter().map(|(_, h)| Rc::clone(h)).collect();
        for handler in snapshot {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                (handler.borrow_mut())(event);
            }));
            if result.is_err() {
                crate::warn!("keypress subscriber handler panicked; isolated, continuing broadcast");
            }
        }
    }
}
