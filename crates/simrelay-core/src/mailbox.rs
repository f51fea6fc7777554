//! Single-slot response mailbox
//!
//! The controller deposits responses here and the worker picks them up. The
//! slot holds at most one event: sending into an occupied slot drops the older
//! event with a warning. This is lossy on purpose, since a worker has at most
//! one synchronous exchange in flight.
//!
//! Waiting uses a condition variable, so a blocked worker burns no CPU and
//! wakes as soon as a response lands.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{trace, warn};

use crate::event::Event;

/// Lock-protected single-slot exchange
#[derive(Debug, Default)]
pub struct EventMailbox {
    slot: Mutex<Option<Event>>,
    filled: Condvar,
}

impl EventMailbox {
    /// Create an empty mailbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an event, replacing (and dropping) any event already there
    pub fn send(&self, event: Event) {
        let mut slot = self.slot.lock();
        if let Some(old) = slot.as_ref() {
            warn!(
                dropped = %old.id(),
                kind = %old.kind(),
                replacement = %event.id(),
                "Mailbox send is throwing away an event that was previously in the mailbox"
            );
        }
        trace!(event_id = %event.id(), "Mailbox filled");
        *slot = Some(event);
        self.filled.notify_all();
    }

    /// Atomically read and clear the slot
    pub fn take(&self) -> Option<Event> {
        self.slot.lock().take()
    }

    /// Discard any pending event
    pub fn clear(&self) {
        let mut slot = self.slot.lock();
        if let Some(old) = slot.take() {
            warn!(
                dropped = %old.id(),
                kind = %old.kind(),
                "Mailbox clear is throwing away an event that was previously in the mailbox"
            );
        }
    }

    /// Check if an event is waiting
    pub fn is_occupied(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Block until an event is present, then take it
    ///
    /// There is no timeout: if nobody ever answers, this waits forever.
    pub fn wait_take(&self) -> Event {
        let mut slot = self.slot.lock();
        loop {
            if let Some(event) = slot.take() {
                return event;
            }
            self.filled.wait(&mut slot);
        }
    }

    /// Block for at most `timeout`, returning `None` if nothing arrived
    ///
    /// For callers that need bounded latency on top of the unbounded protocol.
    pub fn wait_take_timeout(&self, timeout: Duration) -> Option<Event> {
        let mut slot = self.slot.lock();
        if let Some(event) = slot.take() {
            return Some(event);
        }
        // Spurious wakeups just fall through to the final take
        let _ = self.filled.wait_for(&mut slot, timeout);
        slot.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventBody, EventId};
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use tracing_test::traced_test;

    fn event(id: u64) -> Event {
        Event::new(EventId(id), EventBody::CancelCheck)
    }

    #[test]
    fn test_take_empty() {
        let mailbox = EventMailbox::new();
        assert!(mailbox.take().is_none());
        assert!(!mailbox.is_occupied());
    }

    #[test]
    fn test_send_then_take() {
        let mailbox = EventMailbox::new();
        mailbox.send(event(1));
        assert!(mailbox.is_occupied());
        assert_eq!(mailbox.take().map(|e| e.id()), Some(EventId(1)));
        assert!(mailbox.take().is_none());
    }

    #[test]
    fn test_wait_take_wakes_on_send() {
        let mailbox = Arc::new(EventMailbox::new());
        let sender = Arc::clone(&mailbox);

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            sender.send(event(42));
        });

        let received = mailbox.wait_take();
        assert_eq!(received.id(), EventId(42));
        handle.join().unwrap();
    }

    #[test]
    #[traced_test]
    fn test_overwrite_warns() {
        let mailbox = EventMailbox::new();
        mailbox.send(event(1));
        assert!(!logs_contain("throwing away"));

        mailbox.send(event(2));
        assert!(logs_contain("Mailbox send is throwing away"));
        assert_eq!(mailbox.take().map(|e| e.id()), Some(EventId(2)));

        mailbox.send(event(3));
        mailbox.clear();
        assert!(logs_contain("Mailbox clear is throwing away"));
    }

    #[test]
    fn test_wait_take_timeout_expires() {
        let mailbox = EventMailbox::new();
        assert!(mailbox.wait_take_timeout(Duration::from_millis(10)).is_none());

        mailbox.send(event(5));
        assert_eq!(
            mailbox
                .wait_take_timeout(Duration::from_millis(10))
                .map(|e| e.id()),
            Some(EventId(5))
        );
    }

    proptest! {
        #[test]
        fn only_last_send_is_visible(ids in prop::collection::vec(any::<u64>(), 1..16)) {
            let mailbox = EventMailbox::new();
            for id in &ids {
                mailbox.send(event(*id));
            }
            let last = *ids.last().unwrap();
            prop_assert_eq!(mailbox.take().map(|e| e.id()), Some(EventId(last)));
            prop_assert!(mailbox.take().is_none());
        }

        #[test]
        fn clear_then_take_is_empty(ids in prop::collection::vec(any::<u64>(), 0..8)) {
            let mailbox = EventMailbox::new();
            for id in &ids {
                mailbox.send(event(*id));
            }
            mailbox.clear();
            prop_assert!(mailbox.take().is_none());
        }
    }
}
