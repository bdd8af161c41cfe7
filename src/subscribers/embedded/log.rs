//! # LogWriter: renders events through `tracing`
//!
//! ## Example output
//! ```text
//! INFO poolvisor: server starting server="web"
//! INFO poolvisor: worker spawned server="web" worker=3 pid=4242
//! WARN poolvisor: worker lost server="web" worker=3 pid=4242 reason="killed by signal SIGKILL"
//! INFO poolvisor: server removed server="web"
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let server = e.server.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ShutdownRequested => info!(target: "poolvisor", "shutdown requested"),
            EventKind::ServerStarting => info!(target: "poolvisor", server, "server starting"),
            EventKind::ServerRunning => {
                info!(target: "poolvisor", server, pid = e.pid, "server running")
            }
            EventKind::ServerTerminating => {
                info!(target: "poolvisor", server, reason, "server terminating")
            }
            EventKind::ServerRemoved => info!(target: "poolvisor", server, "server removed"),
            EventKind::ControllerLost => {
                warn!(target: "poolvisor", server, pid = e.pid, reason, "controlling process lost")
            }
            EventKind::WorkerSpawned => {
                info!(target: "poolvisor", server, worker = e.worker, pid = e.pid, "worker spawned")
            }
            EventKind::WorkerActive => {
                debug!(target: "poolvisor", server, worker = e.worker, pid = e.pid, "worker active")
            }
            EventKind::WorkerAborting => {
                debug!(target: "poolvisor", server, worker = e.worker, pid = e.pid, "worker aborting")
            }
            EventKind::WorkerReaped => {
                info!(target: "poolvisor", server, worker = e.worker, pid = e.pid, reason, "worker reaped")
            }
            EventKind::WorkerLost => {
                warn!(target: "poolvisor", server, worker = e.worker, pid = e.pid, reason, "worker lost")
            }
            EventKind::SpawnFailed => {
                error!(target: "poolvisor", server, worker = e.worker, reason, "spawn failed")
            }
            EventKind::SignalFailed => {
                error!(target: "poolvisor", pid = e.pid, reason, "signal delivery failed")
            }
            EventKind::TerminateEscalated => {
                warn!(target: "poolvisor", pid = e.pid, reason, "terminate ignored; killing")
            }
            EventKind::SubscriberOverflow => warn!(
                target: "poolvisor",
                subscriber = e.subscriber.unwrap_or("unknown"),
                reason,
                "subscriber dropped event"
            ),
            EventKind::SubscriberPanicked => error!(
                target: "poolvisor",
                subscriber = e.subscriber.unwrap_or("unknown"),
                reason,
                "subscriber panicked"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
