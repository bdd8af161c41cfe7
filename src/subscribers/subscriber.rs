//! The [`Subscribe`] extension point.
//!
//! A subscriber sees every lifecycle event in publish order, on its own task
//! and through its own bounded queue. If the queue is full the event is
//! skipped for that subscriber alone and `SubscriberOverflow` is published;
//! a panic inside `on_event` is caught and reported as `SubscriberPanicked`.
//! Neither ever slows down the supervisor.
//!
//! ```rust
//! use async_trait::async_trait;
//! use poolvisor::{Event, EventKind, Subscribe};
//!
//! struct LostWorkers;
//!
//! #[async_trait]
//! impl Subscribe for LostWorkers {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::WorkerLost {
//!             eprintln!("lost a worker of {:?}", ev.server);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "lost-workers"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives lifecycle events.
///
/// `on_event` runs on a task owned by the [`SubscriberSet`](crate::SubscriberSet);
/// blocking in it only delays this subscriber's own queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Label used in overflow and panic events. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Queue length for this subscriber; values below 1 are raised to 1.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
