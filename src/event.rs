//! Association lifecycle events and the handler registry local users
//! subscribe to them through.
//!
//! This crate does not own a dispatch loop of its own -- the caller drives
//! the association, reading DIMSE messages and PDUs as it sees fit (see
//! [`crate::ae`]'s documentation on leaving per-connection dispatch to the
//! caller) -- so events are not delivered automatically. Instead, the
//! caller fires them at the point in its own loop where each one occurs,
//! through [`EventHandlers`]'s `fire_*` methods.

use crate::dimse::Message;

/// A tagged event raised at some point in an association's lifecycle.
#[derive(Debug)]
pub enum Event<'a> {
    /// EVT_ESTABLISHED: negotiation completed and the association is ready
    /// for data transfer.
    Established { peer_ae_title: &'a str },
    /// EVT_REQUESTED: an incoming association request is being evaluated,
    /// before the accept/reject decision is made.
    Requested { calling_ae_title: &'a str },
    /// EVT_C_STORE: a C-STORE-RQ was received.
    CStore { message: &'a Message },
    /// EVT_ABORTED: the association was aborted, by either node.
    Aborted,
    /// EVT_RELEASED: the association was released.
    Released,
}

/// A typed registry of per-event callbacks.
///
/// Each slot accepts at most one handler; registering a new one for the
/// same event replaces the last. All handlers are optional -- an event
/// with no registered handler is simply dropped.
#[derive(Default)]
pub struct EventHandlers {
    on_established: Option<Box<dyn FnMut(&str) + Send>>,
    on_requested: Option<Box<dyn FnMut(&str) + Send>>,
    on_c_store: Option<Box<dyn FnMut(&Message) + Send>>,
    on_aborted: Option<Box<dyn FnMut() + Send>>,
    on_released: Option<Box<dyn FnMut() + Send>>,
}

impl std::fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_established", &self.on_established.is_some())
            .field("on_requested", &self.on_requested.is_some())
            .field("on_c_store", &self.on_c_store.is_some())
            .field("on_aborted", &self.on_aborted.is_some())
            .field("on_released", &self.on_released.is_some())
            .finish()
    }
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_established(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_established = Some(Box::new(handler));
        self
    }

    pub fn on_requested(mut self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_requested = Some(Box::new(handler));
        self
    }

    pub fn on_c_store(mut self, handler: impl FnMut(&Message) + Send + 'static) -> Self {
        self.on_c_store = Some(Box::new(handler));
        self
    }

    pub fn on_aborted(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.on_aborted = Some(Box::new(handler));
        self
    }

    pub fn on_released(mut self, handler: impl FnMut() + Send + 'static) -> Self {
        self.on_released = Some(Box::new(handler));
        self
    }

    /// Dispatch an event to its registered handler, if any.
    pub fn dispatch(&mut self, event: Event<'_>) {
        match event {
            Event::Established { peer_ae_title } => {
                if let Some(handler) = &mut self.on_established {
                    handler(peer_ae_title);
                }
            }
            Event::Requested { calling_ae_title } => {
                if let Some(handler) = &mut self.on_requested {
                    handler(calling_ae_title);
                }
            }
            Event::CStore { message } => {
                if let Some(handler) = &mut self.on_c_store {
                    handler(message);
                }
            }
            Event::Aborted => {
                if let Some(handler) = &mut self.on_aborted {
                    handler();
                }
            }
            Event::Released => {
                if let Some(handler) = &mut self.on_released {
                    handler();
                }
            }
        }
    }

    /// Convenience wrapper firing [`Event::Established`].
    pub fn fire_established(&mut self, peer_ae_title: &str) {
        self.dispatch(Event::Established { peer_ae_title });
    }

    /// Convenience wrapper firing [`Event::Requested`].
    pub fn fire_requested(&mut self, calling_ae_title: &str) {
        self.dispatch(Event::Requested { calling_ae_title });
    }

    /// Convenience wrapper firing [`Event::CStore`].
    pub fn fire_c_store(&mut self, message: &Message) {
        self.dispatch(Event::CStore { message });
    }

    /// Convenience wrapper firing [`Event::Aborted`].
    pub fn fire_aborted(&mut self) {
        self.dispatch(Event::Aborted);
    }

    /// Convenience wrapper firing [`Event::Released`].
    pub fn fire_released(&mut self) {
        self.dispatch(Event::Released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispatch_reaches_the_registered_handler() {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&count);

        let mut handlers = EventHandlers::new().on_established(move |peer| {
            assert_eq!(peer, "OTHER-AE");
            counted.fetch_add(1, Ordering::SeqCst);
        });

        handlers.fire_established("OTHER-AE");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_event_is_silently_dropped() {
        let mut handlers = EventHandlers::new();
        handlers.fire_aborted();
        handlers.fire_released();
    }
}
