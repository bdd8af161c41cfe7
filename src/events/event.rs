//! # Runtime events emitted by the supervisor, dispatchers and reapers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Server lifecycle**: starting, running, terminating, removed
//! - **Worker lifecycle**: spawned, active, aborting, reaped, lost
//! - **Process failures**: spawn failed, signal failed, forced kill
//! - **Runtime**: shutdown and subscriber health
//!
//! The [`Event`] struct carries metadata such as timestamps, server name,
//! worker sequence id, process id and a free-form reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use poolvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::WorkerReaped)
//!     .with_server("web")
//!     .with_seq_id(3)
//!     .with_pid(4242)
//!     .with_reason("exited with code 0");
//!
//! assert_eq!(ev.kind, EventKind::WorkerReaped);
//! assert_eq!(ev.server.as_deref(), Some("web"));
//! assert_eq!(ev.worker, Some(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::core::WorkerId;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: panic message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subscriber`: subscriber name
    /// - `reason`: "full" or "closed"
    SubscriberOverflow,

    // === Runtime events ===
    /// Shutdown requested (OS signal or end of operator input).
    ShutdownRequested,

    // === Server lifecycle ===
    /// Server name reserved; the controlling process is being launched.
    ///
    /// Sets:
    /// - `server`
    ServerStarting,

    /// Controlling process is ready and the initial pool reached its minimum.
    ///
    /// Sets:
    /// - `server`
    /// - `pid`: controlling process id
    ServerRunning,

    /// Server teardown began (operator abort, controller loss, or shutdown).
    ///
    /// Sets:
    /// - `server`
    /// - `reason`: what triggered the teardown
    ServerTerminating,

    /// Controlling process reaped and every record of the server removed.
    ///
    /// Sets:
    /// - `server`
    ServerRemoved,

    /// Controlling process exited without being asked to.
    ///
    /// Sets:
    /// - `server`
    /// - `pid`
    /// - `reason`: exit description
    ControllerLost,

    // === Worker lifecycle ===
    /// Worker process created and registered as `Spawning`.
    ///
    /// Sets:
    /// - `server`, `worker`, `pid`
    WorkerSpawned,

    /// Worker announced it is ready; it now counts as `Active`.
    ///
    /// Sets:
    /// - `server`, `worker`, `pid`
    WorkerActive,

    /// Worker selected for termination.
    ///
    /// Sets:
    /// - `server`, `worker`, `pid`
    WorkerAborting,

    /// Worker exit confirmed by the OS; its record is gone.
    ///
    /// Sets:
    /// - `server`, `worker`, `pid`
    /// - `reason`: exit description
    WorkerReaped,

    /// Worker exited without being asked to.
    ///
    /// Sets:
    /// - `server`, `worker`, `pid`
    /// - `reason`: exit description
    WorkerLost,

    // === Process failures ===
    /// The OS refused to create a process.
    ///
    /// Sets:
    /// - `server`
    /// - `worker` (absent for controlling processes)
    /// - `reason`: OS error
    SpawnFailed,

    /// A control signal could not be delivered (other than "already gone").
    ///
    /// Sets:
    /// - `pid`
    /// - `reason`: OS error
    SignalFailed,

    /// A process ignored the terminate signal past the stop timeout and was killed.
    ///
    /// Sets:
    /// - `pid`
    /// - `reason`: role of the process
    TerminateEscalated,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Server name, if applicable.
    pub server: Option<Arc<str>>,
    /// Worker sequence id, if applicable.
    pub worker: Option<u64>,
    /// OS process id, if applicable.
    pub pid: Option<u32>,
    /// Human-readable reason (exit descriptions, OS errors, etc.).
    pub reason: Option<Arc<str>>,
    /// Subscriber name for subscriber health events.
    pub subscriber: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            server: None,
            worker: None,
            pid: None,
            reason: None,
            subscriber: None,
        }
    }

    /// Attaches a server name.
    #[inline]
    pub fn with_server(mut self, server: impl Into<Arc<str>>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Attaches a worker sequence id.
    #[inline]
    pub fn with_seq_id(mut self, seq: u64) -> Self {
        self.worker = Some(seq);
        self
    }

    /// Attaches both the owning server and the sequence id of a worker.
    #[inline]
    pub fn with_worker(self, worker: &WorkerId) -> Self {
        self.with_server(worker.server_arc()).with_seq_id(worker.seq())
    }

    /// Attaches an OS process id.
    #[inline]
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::ServerStarting);
        let b = Event::new(EventKind::ServerRunning);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_with_worker_sets_server_and_seq() {
        let id = WorkerId::new(Arc::from("db"), 7);
        let ev = Event::new(EventKind::WorkerActive).with_worker(&id);
        assert_eq!(ev.server.as_deref(), Some("db"));
        assert_eq!(ev.worker, Some(7));
    }

    #[test]
    fn test_subscriber_overflow_carries_name() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert_eq!(ev.kind, EventKind::SubscriberOverflow);
        assert_eq!(ev.subscriber, Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("full"));
    }
}
