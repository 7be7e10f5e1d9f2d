//! Notification bus for indexer events.
//!
//! Publishing never blocks and never fails the indexer: with no subscribers
//! the event is dropped, and a subscriber that falls behind loses the oldest
//! buffered events. Listener callbacks run on their own task so a panicking
//! observer is logged and skipped.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use archive_types::IndexEvent;

/// Broadcast bus for [`IndexEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<IndexEvent>,
}

impl EventBus {
    /// Create a new event bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event
    pub fn emit(&self, event: IndexEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            trace!(event = name, "No subscribers for event");
        }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Run `listener` for every event until the bus is dropped.
    ///
    /// Panics inside `listener` are caught and logged.
    pub fn add_listener<F>(&self, name: impl Into<String>, listener: F) -> JoinHandle<()>
    where
        F: Fn(&IndexEvent) + Send + 'static,
    {
        let name = name.into();
        let mut receiver = self.subscribe();

        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if catch_unwind(AssertUnwindSafe(|| listener(&event))).is_err() {
                            warn!(listener = %name, event = event.name(), "Event listener panicked");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(listener = %name, skipped = skipped, "Event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
