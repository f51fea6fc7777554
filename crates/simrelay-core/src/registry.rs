//! Process-wide notification target
//!
//! Code that raises events does not know who handles them. It calls
//! [`NotifyRegistry::notify`] and whatever target is registered (normally the
//! running worker's link to the controller) carries the event across.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::event::{Event, ResultCode};

/// Something that can carry an event to a handler
pub trait NotifyTarget: Send + Sync {
    /// Deliver an event
    ///
    /// Synchronous events return their response. Asynchronous events return
    /// `None` as soon as they are queued.
    fn notify(&self, event: Event) -> Option<Event>;
}

/// Holder for the currently registered target
#[derive(Default)]
pub struct NotifyRegistry {
    target: RwLock<Option<Arc<dyn NotifyTarget>>>,
}

impl NotifyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a target, replacing any previous one
    pub fn register(&self, target: Arc<dyn NotifyTarget>) {
        let previous = self.target.write().replace(target);
        if previous.is_some() {
            debug!("Replaced registered notify target");
        }
    }

    /// Remove the target, but only if it is still `target`
    pub fn unregister_if(&self, target: &Arc<dyn NotifyTarget>) -> bool {
        let mut slot = self.target.write();
        match slot.as_ref() {
            Some(current) if Arc::ptr_eq(current, target) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Whether anything is registered
    pub fn is_registered(&self) -> bool {
        self.target.read().is_some()
    }

    /// Route an event to the registered target
    ///
    /// With nobody registered a synchronous event comes straight back as
    /// rejected, and an asynchronous one is dropped.
    pub fn notify(&self, mut event: Event) -> Option<Event> {
        // Clone out so the lock is not held while the target blocks
        let target = self.target.read().clone();
        match target {
            Some(target) => target.notify(event),
            None if event.is_synchronous() => {
                warn!(event_id = %event.id(), kind = %event.kind(), "No notify target registered, rejecting");
                event.result = ResultCode::REJECTED;
                Some(event)
            }
            None => {
                debug!(event_id = %event.id(), kind = %event.kind(), "No notify target registered, dropping");
                None
            }
        }
    }
}

impl std::fmt::Debug for NotifyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyRegistry")
            .field("registered", &self.is_registered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBody, EventId, SeverityRecord};
    use crate::severity::SeverityLevel;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<EventId>>,
    }

    impl NotifyTarget for Recorder {
        fn notify(&self, mut event: Event) -> Option<Event> {
            self.seen.lock().push(event.id());
            event.result = ResultCode::new(4);
            event.is_synchronous().then_some(event)
        }
    }

    fn ask(id: u64) -> Event {
        Event::new(
            EventId(id),
            EventBody::SeverityAsk(SeverityRecord::new(SeverityLevel::Panic, "[CPU  ]", "halt")),
        )
    }

    #[test]
    fn test_unregistered_sync_is_rejected() {
        let registry = NotifyRegistry::new();
        let response = registry.notify(ask(1)).unwrap();
        assert_eq!(response.result, ResultCode::REJECTED);
    }

    #[test]
    fn test_unregistered_async_is_dropped() {
        let registry = NotifyRegistry::new();
        let notify = Event::new(
            EventId(2),
            EventBody::SeverityNotify(SeverityRecord::new(SeverityLevel::Info, "[IO   ]", "x")),
        );
        assert!(registry.notify(notify).is_none());
    }

    #[test]
    fn test_routes_to_registered_target() {
        let registry = NotifyRegistry::new();
        let recorder = Arc::new(Recorder::default());
        registry.register(recorder.clone());

        let response = registry.notify(ask(3)).unwrap();
        assert_eq!(response.result.code(), 4);
        assert_eq!(*recorder.seen.lock(), vec![EventId(3)]);
    }

    #[test]
    fn test_unregister_only_matching_target() {
        let registry = NotifyRegistry::new();
        let first: Arc<dyn NotifyTarget> = Arc::new(Recorder::default());
        let second: Arc<dyn NotifyTarget> = Arc::new(Recorder::default());

        registry.register(first.clone());
        assert!(!registry.unregister_if(&second));
        assert!(registry.is_registered());
        assert!(registry.unregister_if(&first));
        assert!(!registry.is_registered());
    }
}
