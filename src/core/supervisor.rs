//! # Supervisor: capacity engine and public API.
//!
//! The [`Supervisor`] owns the registry, the event bus and the launcher. Every
//! operator operation validates and mutates the registry inside one critical
//! section, then hands the process work to the server's dispatcher and waits
//! for its reply outside the lock.
//!
//! ## High-level architecture
//! ```text
//! Operator calls:
//!   create_server ──► validate ─► reserve name ─► launch controller ─► attach ─► spawn Dispatcher
//!   create_worker ──► reserve slot ──────────────► Dispatcher: launch + register (Spawning)
//!   abort_worker  ──► pick newest Active, mark Aborting ─► Dispatcher: SIGTERM, wait reap
//!   abort_server  ──► mark Aborting ─► Dispatcher: TerminateAll ─► teardown (workers, then controller)
//!   status        ──► snapshot under lock
//!
//! Asynchronous notifications:
//!   ready announcer ── ChildCreated ──► Dispatcher ─► Spawning → Active
//!   reaper task     ── on_reaped: remove record, wake waiters ─► ChildExiting ──► Dispatcher
//!
//! Event flow:
//!   Supervisor / Dispatcher / reapers ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - The registry lock is never held across a process wait or a queue send.
//! - Validation errors leave the registry unchanged.
//! - After [`Supervisor::shutdown`] starts, mutating calls fail with `ShuttingDown`.
//!
//! ## Example
//! ```no_run
//! use poolvisor::{CommandLauncher, Config, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(Config::default())
//!         .with_launcher(CommandLauncher::new("sleep").arg("infinity"))
//!         .build();
//!
//!     sup.create_server("web", 1, 3).await?;
//!     sup.create_worker("web").await?;
//!     println!("{}", sup.status().await);
//!
//!     sup.abort_server("web").await?;
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::pin::pin;
use std::sync::{Arc, Mutex as StdMutex};

use futures::future::join_all;
use tokio::sync::{Mutex, Notify, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::builder::SupervisorBuilder;
use super::dispatcher::{ControlSignal, Dispatcher};
use super::lifecycle;
use super::registry::{AbortSelection, Bounds, Identity, Registry, ServerId, Slot, WorkerId};
use super::status::StatusReport;
use crate::core::Config;
use crate::error::SupervisorError;
use crate::events::{Bus, Event, EventKind};
use crate::process::{ExitReason, Launcher, Role};
use crate::subscribers::SubscriberSet;

/// State shared by the supervisor, dispatchers and reaper tasks.
pub(crate) struct Shared {
    pub(crate) cfg: Config,
    pub(crate) bus: Bus,
    pub(crate) launcher: Arc<dyn Launcher>,
    pub(crate) registry: Mutex<Registry>,
    /// Woken after every registry change that a waiting caller may care about.
    pub(crate) changed: Notify,
    pub(crate) closing: CancellationToken,
}

impl Shared {
    /// Finalizes a reaped process: record removal, events, dispatcher notification.
    pub(crate) async fn on_reaped(
        &self,
        identity: Identity,
        pid: u32,
        reason: ExitReason,
        exit_tx: watch::Sender<Option<ExitReason>>,
    ) {
        let removed = {
            let mut registry = self.registry.lock().await;
            match &identity {
                Identity::Worker(id) => registry.remove_worker(id, pid),
                Identity::Controller(name) => registry.controller_reaped(name, pid),
            }
        };
        let _ = exit_tx.send(Some(reason.clone()));
        self.changed.notify_waiters();

        let Some(removed) = removed else {
            return;
        };
        let description = reason.to_string();
        if removed.expected && !reason.is_graceful() {
            tracing::warn!(target: "poolvisor", pid, %description, "process did not stop cleanly");
        }
        match &identity {
            Identity::Worker(id) => {
                self.bus.publish(
                    Event::new(EventKind::WorkerReaped)
                        .with_worker(id)
                        .with_pid(pid)
                        .with_reason(description.as_str()),
                );
                if !removed.expected {
                    self.bus.publish(
                        Event::new(EventKind::WorkerLost)
                            .with_worker(id)
                            .with_pid(pid)
                            .with_reason(description.as_str()),
                    );
                }
            }
            Identity::Controller(name) => {
                if !removed.expected {
                    self.bus.publish(
                        Event::new(EventKind::ControllerLost)
                            .with_server(Arc::clone(name))
                            .with_pid(pid)
                            .with_reason(description.as_str()),
                    );
                }
            }
        }

        if let Some(signals) = removed.signals {
            let _ = signals
                .send(ControlSignal::ChildExiting {
                    identity,
                    reason,
                    expected: removed.expected,
                })
                .await;
        }
    }
}

/// Supervises named servers and their bounded worker pools.
///
/// Created through [`Supervisor::builder`]. All methods take `&self` and may be
/// called concurrently.
pub struct Supervisor {
    shared: Arc<Shared>,
    listener: StdMutex<Option<JoinHandle<()>>>,
    drained: CancellationToken,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: Config) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        launcher: Arc<dyn Launcher>,
        subs: SubscriberSet,
    ) -> Self {
        let shared = Arc::new(Shared {
            cfg,
            bus,
            launcher,
            registry: Mutex::new(Registry::new()),
            changed: Notify::new(),
            closing: CancellationToken::new(),
        });
        let drained = CancellationToken::new();
        let listener = subscriber_listener(&shared.bus, subs, drained.clone());
        Self {
            shared,
            listener: StdMutex::new(Some(listener)),
            drained,
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.shared.cfg
    }

    /// Subscribes to runtime events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Returns true once [`shutdown`](Self::shutdown) has started.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.closing.is_cancelled()
    }

    fn ensure_open(&self) -> Result<(), SupervisorError> {
        if self.is_shutting_down() {
            Err(SupervisorError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    /// Creates a server named `name` holding between `min` and `max` workers.
    ///
    /// Returns once the controlling process exists. The pool fills to `min`
    /// in the background; the server reports `Running` once it has.
    ///
    /// # Errors
    /// `InvalidBounds`, `InvalidName`, `DuplicateName`, `ProcessLimit`,
    /// `ShuttingDown`, or `SpawnFailure` when the controller cannot be launched
    /// (no record is left behind).
    pub async fn create_server(
        &self,
        name: &str,
        min: i64,
        max: i64,
    ) -> Result<ServerId, SupervisorError> {
        self.ensure_open()?;
        let bounds = Bounds::new(min, max)?;
        validate_name(name)?;
        let name: Arc<str> = Arc::from(name);

        let id = {
            let mut registry = self.shared.registry.lock().await;
            // Re-checked under the lock so shutdown's server snapshot sees every server.
            self.ensure_open()?;
            registry.reserve_server(&name, bounds, self.shared.cfg.process_limit())?
        };
        self.shared.bus.publish(
            Event::new(EventKind::ServerStarting)
                .with_server(Arc::clone(&name))
                .with_reason(format!("min {} max {}", bounds.min(), bounds.max())),
        );

        let role = Role::Server {
            server: Arc::clone(&name),
        };
        let mut pending = match lifecycle::launch(&self.shared, &role).await {
            Ok(pending) => pending,
            Err(source) => {
                self.shared.registry.lock().await.drop_server(&name);
                self.shared.changed.notify_waiters();
                self.shared.bus.publish(
                    Event::new(EventKind::SpawnFailed)
                        .with_server(Arc::clone(&name))
                        .with_reason(source.to_string()),
                );
                return Err(SupervisorError::SpawnFailure {
                    role: role.to_string(),
                    source,
                });
            }
        };

        let (tx, rx) = mpsc::channel(self.shared.cfg.signal_queue_capacity_clamped());
        let attached = self.shared.registry.lock().await.attach_controller(
            &name,
            pending.handle.clone(),
            tx.clone(),
        );
        self.shared.changed.notify_waiters();
        if let Err(e) = attached {
            pending.discard().await;
            return Err(e);
        }

        let ready = pending.take_ready();
        pending.arm(
            Arc::clone(&self.shared),
            Identity::Controller(Arc::clone(&name)),
        );
        lifecycle::announce(ready, tx.clone(), Identity::Controller(Arc::clone(&name)));
        tokio::spawn(Dispatcher::new(Arc::clone(&self.shared), name, tx, rx).run());
        Ok(id)
    }

    /// Tears a server down: every worker is reaped, then the controller.
    ///
    /// Returns once the server's records are gone. Aborting a server that is
    /// already being torn down waits for that teardown instead.
    ///
    /// # Errors
    /// `UnknownServer`, `ShuttingDown`.
    pub async fn abort_server(&self, name: &str) -> Result<(), SupervisorError> {
        self.ensure_open()?;
        self.terminate_server(name, "operator abort").await
    }

    async fn terminate_server(&self, name: &str, reason: &str) -> Result<(), SupervisorError> {
        let signals = loop {
            let mut attached = pin!(self.shared.changed.notified());
            attached.as_mut().enable();
            let signals = self.shared.registry.lock().await.begin_server_abort(name)?;
            match signals {
                Some(signals) => break signals,
                None => attached.await,
            }
        };

        let (reply, done) = oneshot::channel();
        let sent = signals
            .send(ControlSignal::TerminateAll {
                reason: Arc::from(reason),
                reply: Some(reply),
            })
            .await;
        if sent.is_ok() {
            // A dropped reply means the dispatcher already finished the teardown.
            let _ = done.await;
        }
        Ok(())
    }

    /// Adds one worker to `server`.
    ///
    /// Returns once the worker process exists and is registered as `Spawning`.
    ///
    /// # Errors
    /// `UnknownServer`, `CapacityExceeded`, `ProcessLimit`, `ShuttingDown`,
    /// `SpawnFailure`.
    pub async fn create_worker(&self, server: &str) -> Result<WorkerId, SupervisorError> {
        self.ensure_open()?;
        let signals = self
            .shared
            .registry
            .lock()
            .await
            .reserve_worker(server, self.shared.cfg.process_limit())?;

        let (reply, result) = oneshot::channel();
        if signals
            .send(ControlSignal::CreateWorker { reply })
            .await
            .is_err()
        {
            self.shared
                .registry
                .lock()
                .await
                .release_worker(server, Slot::Requested);
            return Err(SupervisorError::unknown(server));
        }
        result
            .await
            .unwrap_or_else(|_| Err(SupervisorError::unknown(server)))
    }

    /// Removes the most recently created active worker of `server`.
    ///
    /// Waits for workers that are still spawning rather than racing them, and
    /// returns once the chosen worker has been reaped.
    ///
    /// # Errors
    /// `UnknownServer`, `BelowMinimum`, `ShuttingDown`, `SignalDeliveryFailure`.
    pub async fn abort_worker(&self, server: &str) -> Result<(), SupervisorError> {
        self.ensure_open()?;
        let (worker, process, signals) = loop {
            let mut changed = pin!(self.shared.changed.notified());
            changed.as_mut().enable();
            let selection = self
                .shared
                .registry
                .lock()
                .await
                .select_worker_for_abort(server)?;
            match selection {
                AbortSelection::Chosen {
                    worker,
                    process,
                    signals,
                } => break (worker, process, signals),
                AbortSelection::WaitForSpawn => changed.await,
            }
        };

        self.shared.bus.publish(
            Event::new(EventKind::WorkerAborting)
                .with_worker(&worker)
                .with_pid(process.pid),
        );
        let (reply, result) = oneshot::channel();
        let sent = signals
            .send(ControlSignal::AbortWorker {
                worker,
                process,
                reply,
            })
            .await;
        if sent.is_err() {
            // Dispatcher gone: the server teardown reaps the worker.
            return Ok(());
        }
        result.await.unwrap_or(Ok(()))
    }

    /// Point-in-time counts for every live server.
    pub async fn status(&self) -> StatusReport {
        self.shared.registry.lock().await.status()
    }

    /// Aborts every server and stops accepting operations.
    ///
    /// Servers are torn down concurrently, each bottom-up. Once every server is
    /// gone, queued events are flushed to the subscribers.
    ///
    /// # Errors
    /// `GraceExceeded` when teardown outlives [`Config::shutdown_grace`]; the
    /// listed servers are still being torn down in the background.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        if !self.shared.closing.is_cancelled() {
            self.shared.closing.cancel();
            self.shared
                .bus
                .publish(Event::new(EventKind::ShutdownRequested));
        }

        let names = self.shared.registry.lock().await.server_names();
        let aborts = names
            .iter()
            .map(|name| self.terminate_server(name, "supervisor shutdown"));
        let all = join_all(aborts);

        let result = match self.shared.cfg.shutdown_grace() {
            None => {
                all.await;
                Ok(())
            }
            Some(grace) => match tokio::time::timeout(grace, all).await {
                Ok(_) => Ok(()),
                Err(_) => {
                    let stuck = self.shared.registry.lock().await.server_names();
                    Err(SupervisorError::GraceExceeded { grace, stuck })
                }
            },
        };

        self.flush_subscribers().await;
        result
    }

    async fn flush_subscribers(&self) {
        self.drained.cancel();
        let listener = match self.listener.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(listener) = listener {
            let _ = listener.await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn assert_invariants(&self) {
        self.shared.registry.lock().await.assert_invariants();
    }
}

/// Names must be non-empty and free of whitespace so the line parser can address them.
fn validate_name(name: &str) -> Result<(), SupervisorError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(SupervisorError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Forwards bus events to the subscriber set until `drained`, then flushes and stops it.
fn subscriber_listener(bus: &Bus, subs: SubscriberSet, drained: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                ev = rx.recv() => match ev {
                    Ok(ev) => subs.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = drained.cancelled() => {
                    loop {
                        match rx.try_recv() {
                            Ok(ev) => subs.emit(&ev),
                            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                            Err(_) => break,
                        }
                    }
                    break;
                }
            }
        }
        subs.shutdown().await;
    })
}
