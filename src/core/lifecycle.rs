//! # Spawn, terminate and reap.
//!
//! ```text
//! launch(role) ──► Pending { handle, ready, exit }
//!                      │
//!                      ├─ register in registry (under lock)
//!                      └─ arm() ──► reaper task: exit.await ──► Shared::on_reaped
//!                                                                 └─ record removed, watch = Some(reason)
//!
//! terminate(handle):
//!   SIGTERM ──► wait watch ──(stop_timeout)──► SIGKILL ──► wait watch
//! ```
//!
//! - The reaper task is the only owner of the exit future; nothing else waits on the OS.
//! - `terminate` never holds the registry lock.
//! - Signalling a process that is already gone (`ESRCH`) counts as success.

use std::io;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use tokio::sync::{mpsc, watch};

use super::dispatcher::ControlSignal;
use super::registry::{Identity, ProcessHandle};
use super::supervisor::Shared;
use crate::error::SupervisorError;
use crate::events::{Event, EventKind};
use crate::process::{ExitReason, Role};

/// A launched process that is not yet watched by a reaper.
pub(crate) struct Pending {
    pub(crate) handle: ProcessHandle,
    ready: Option<BoxFuture<'static, bool>>,
    exit: BoxFuture<'static, ExitReason>,
    exit_tx: watch::Sender<Option<ExitReason>>,
}

impl Pending {
    /// Takes the readiness future. A second call resolves to `false`.
    pub(crate) fn take_ready(&mut self) -> BoxFuture<'static, bool> {
        self.ready
            .take()
            .unwrap_or_else(|| Box::pin(future::ready(false)))
    }

    /// Starts the reaper for a registered process.
    pub(crate) fn arm(self, shared: Arc<Shared>, identity: Identity) {
        let Pending {
            handle,
            exit,
            exit_tx,
            ..
        } = self;
        let pid = handle.pid;
        tokio::spawn(async move {
            let reason = exit.await;
            shared.on_reaped(identity, pid, reason, exit_tx).await;
        });
    }

    /// Kills and reaps a process that could not be registered.
    pub(crate) async fn discard(self) {
        let _ = self.handle.signaller.signal(Signal::SIGKILL);
        let reason = self.exit.await;
        let _ = self.exit_tx.send(Some(reason));
    }
}

/// Creates one process through the configured launcher.
pub(crate) async fn launch(shared: &Shared, role: &Role) -> io::Result<Pending> {
    let spawned = shared.launcher.launch(role).await?;
    let (exit_tx, exited) = watch::channel(None);
    Ok(Pending {
        handle: ProcessHandle {
            pid: spawned.pid,
            signaller: spawned.signaller,
            exited,
        },
        ready: Some(spawned.ready),
        exit: spawned.exit,
        exit_tx,
    })
}

/// Forwards a readiness announcement to the server's dispatcher.
pub(crate) fn announce(
    ready: BoxFuture<'static, bool>,
    signals: mpsc::Sender<ControlSignal>,
    identity: Identity,
) {
    tokio::spawn(async move {
        if ready.await {
            let _ = signals.send(ControlSignal::ChildCreated { identity }).await;
        }
    });
}

/// Asks a process to stop and waits until it has been reaped.
///
/// Idempotent: terminating an already reaped process returns `Ok(())` at once.
pub(crate) async fn terminate(
    shared: &Shared,
    process: &ProcessHandle,
    role: &Role,
) -> Result<(), SupervisorError> {
    let mut exited = process.exited.clone();
    if exited.borrow().is_some() {
        return Ok(());
    }
    deliver(shared, process, Signal::SIGTERM)?;

    match shared.cfg.stop_timeout() {
        None => wait_reaped(&mut exited).await,
        Some(limit) => {
            if tokio::time::timeout(limit, wait_reaped(&mut exited))
                .await
                .is_err()
            {
                shared.bus.publish(
                    Event::new(EventKind::TerminateEscalated)
                        .with_server(role.server())
                        .with_pid(process.pid)
                        .with_reason(role.to_string()),
                );
                deliver(shared, process, Signal::SIGKILL)?;
                wait_reaped(&mut exited).await;
            }
        }
    }
    Ok(())
}

async fn wait_reaped(exited: &mut watch::Receiver<Option<ExitReason>>) {
    let _ = exited.wait_for(Option::is_some).await;
}

/// Sends one signal; a target that no longer exists is already where we want it.
fn deliver(shared: &Shared, process: &ProcessHandle, signal: Signal) -> Result<(), SupervisorError> {
    match process.signaller.signal(signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => {
            shared.bus.publish(
                Event::new(EventKind::SignalFailed)
                    .with_pid(process.pid)
                    .with_reason(format!("{signal}: {errno}")),
            );
            Err(SupervisorError::SignalDeliveryFailure {
                pid: process.pid,
                errno,
            })
        }
    }
}
