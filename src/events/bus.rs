//! Broadcast bus carrying lifecycle [`Event`]s.
//!
//! Supervisor calls, dispatchers and reaper tasks all publish here; the
//! supervisor's listener task is the main consumer and forwards into the
//! [`SubscriberSet`](crate::SubscriberSet). Extra receivers come from
//! [`Supervisor::subscribe`](crate::Supervisor::subscribe).
//!
//! ```text
//! Supervisor ─┐
//! Dispatcher ─┼─► Bus ─► listener ─► SubscriberSet
//! reapers    ─┘      └─► Supervisor::subscribe() receivers
//! ```
//!
//! Publishing never waits. A receiver that falls more than the capacity
//! behind gets `RecvError::Lagged` and resumes at the oldest retained event;
//! events sent while nobody listens are gone.

use tokio::sync::broadcast;

use super::event::Event;

/// Sending half of the event channel. Clones share one channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Opens a channel retaining up to `capacity` events (at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every current receiver.
    pub fn publish(&self, ev: Event) {
        // No receivers is not an error.
        let _ = self.tx.send(ev);
    }

    /// Receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
