//! # Per-server control-signal dispatcher.
//!
//! Every server has one [`Dispatcher`] task draining a bounded single-consumer
//! queue. Operator calls, readiness announcements and reaper notifications all
//! arrive here as [`ControlSignal`]s and are handled one at a time.
//!
//! ## State machine
//! ```text
//!            ChildCreated (last pending)             TerminateAll / controller lost
//!   ┌──────┐ ◄──────────────────────────── ┌─────────────────────┐ ─────────────► ┌─────────────┐
//!   │ Idle │                               │ AwaitingChildSignal │                │ Terminating │
//!   └──────┘ ────────────────────────────► └─────────────────────┘                └─────────────┘
//!            worker spawned                                                             │
//!                                                                   TeardownComplete ───┘──► exit
//! ```
//!
//! ## Rules
//! - The dispatcher never sends to its own queue; helper tasks do.
//! - Registry changes go through `Registry` methods under the shared lock.
//! - In `Terminating`, create requests are refused and duplicate
//!   `TerminateAll` signals only add a waiter.
//! - Teardown is bottom-up: every worker is reaped before the controller is signalled.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};

use super::lifecycle;
use super::registry::{Identity, ProcessHandle, Slot, WorkerId};
use super::supervisor::Shared;
use crate::error::SupervisorError;
use crate::events::{Event, EventKind};
use crate::process::{ExitReason, Role};

/// Messages handled by a server's dispatcher.
pub(crate) enum ControlSignal {
    /// Spawn one worker into a slot the caller already reserved.
    CreateWorker {
        reply: oneshot::Sender<Result<WorkerId, SupervisorError>>,
    },
    /// Terminate a worker already marked `Aborting`.
    AbortWorker {
        worker: WorkerId,
        process: ProcessHandle,
        reply: oneshot::Sender<Result<(), SupervisorError>>,
    },
    /// Tear the whole server down.
    TerminateAll {
        reason: Arc<str>,
        reply: Option<oneshot::Sender<()>>,
    },
    /// A process announced readiness.
    ChildCreated { identity: Identity },
    /// A process was reaped.
    ChildExiting {
        identity: Identity,
        reason: ExitReason,
        expected: bool,
    },
    /// Every process of the server has been reaped and its record retired.
    TeardownComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchState {
    Idle,
    AwaitingChildSignal,
    Terminating,
}

pub(crate) struct Dispatcher {
    shared: Arc<Shared>,
    name: Arc<str>,
    rx: mpsc::Receiver<ControlSignal>,
    tx: mpsc::Sender<ControlSignal>,
    state: DispatchState,
    /// Workers spawned but not yet announced.
    awaiting: HashSet<u64>,
    controller_ready: bool,
    filled: bool,
    waiters: Vec<oneshot::Sender<()>>,
}

impl Dispatcher {
    pub(crate) fn new(
        shared: Arc<Shared>,
        name: Arc<str>,
        tx: mpsc::Sender<ControlSignal>,
        rx: mpsc::Receiver<ControlSignal>,
    ) -> Self {
        Self {
            shared,
            name,
            rx,
            tx,
            state: DispatchState::Idle,
            awaiting: HashSet::new(),
            controller_ready: false,
            filled: false,
            waiters: Vec::new(),
        }
    }

    /// Fills the pool to its minimum, then serves signals until teardown completes.
    pub(crate) async fn run(mut self) {
        self.fill_to_min().await;
        self.filled = true;
        self.maybe_running().await;

        while let Some(signal) = self.rx.recv().await {
            if self.handle(signal).await.is_break() {
                break;
            }
            self.refresh_state();
        }
    }

    async fn handle(&mut self, signal: ControlSignal) -> ControlFlow<()> {
        match signal {
            ControlSignal::CreateWorker { reply } => {
                let result = if self.state == DispatchState::Terminating {
                    self.shared
                        .registry
                        .lock()
                        .await
                        .release_worker(&self.name, Slot::Requested);
                    Err(SupervisorError::unknown(&self.name))
                } else {
                    self.spawn_worker(Slot::Requested).await
                };
                let _ = reply.send(result);
            }
            ControlSignal::AbortWorker {
                worker,
                process,
                reply,
            } => {
                let shared = Arc::clone(&self.shared);
                tokio::spawn(async move {
                    let role = Role::Worker {
                        server: worker.server_arc(),
                        seq: worker.seq(),
                    };
                    let _ = reply.send(lifecycle::terminate(&shared, &process, &role).await);
                });
            }
            ControlSignal::TerminateAll { reason, reply } => {
                if let Some(reply) = reply {
                    self.waiters.push(reply);
                }
                if self.state != DispatchState::Terminating {
                    self.begin_teardown(reason);
                }
            }
            ControlSignal::ChildCreated { identity } => match identity {
                Identity::Controller(_) => {
                    self.controller_ready = true;
                    self.maybe_running().await;
                }
                Identity::Worker(id) => {
                    self.awaiting.remove(&id.seq());
                    let activated = self.shared.registry.lock().await.mark_worker_active(&id);
                    if let Some(pid) = activated {
                        self.shared.changed.notify_waiters();
                        self.shared.bus.publish(
                            Event::new(EventKind::WorkerActive)
                                .with_worker(&id)
                                .with_pid(pid),
                        );
                    }
                }
            },
            ControlSignal::ChildExiting {
                identity,
                reason,
                expected,
            } => match identity {
                Identity::Worker(id) => {
                    self.awaiting.remove(&id.seq());
                    if !expected
                        && self.state != DispatchState::Terminating
                        && self.shared.cfg.refill_below_min
                    {
                        self.fill_to_min().await;
                    }
                }
                Identity::Controller(_) => {
                    if !expected && self.state != DispatchState::Terminating {
                        self.begin_teardown(Arc::from(format!("controller {reason}")));
                    }
                }
            },
            ControlSignal::TeardownComplete => {
                for waiter in self.waiters.drain(..) {
                    let _ = waiter.send(());
                }
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn refresh_state(&mut self) {
        if self.state == DispatchState::Terminating {
            return;
        }
        self.state = if self.awaiting.is_empty() {
            DispatchState::Idle
        } else {
            DispatchState::AwaitingChildSignal
        };
    }

    async fn maybe_running(&mut self) {
        if !(self.controller_ready && self.filled) || self.state == DispatchState::Terminating {
            return;
        }
        let pid = self.shared.registry.lock().await.mark_running(&self.name);
        if let Some(pid) = pid {
            self.shared.bus.publish(
                Event::new(EventKind::ServerRunning)
                    .with_server(Arc::clone(&self.name))
                    .with_pid(pid),
            );
        }
    }

    /// Spawns the initial workers claimed at creation, then any needed to get
    /// back to the floor.
    async fn fill_to_min(&mut self) {
        let limit = self.shared.cfg.process_limit();
        loop {
            let reserved = self
                .shared
                .registry
                .lock()
                .await
                .reserve_fill(&self.name, limit);
            match reserved {
                Ok(true) => {}
                Ok(false) => break,
                Err(e @ SupervisorError::ProcessLimit { .. }) => {
                    tracing::warn!(target: "poolvisor", server = %self.name, error = %e, "pool fill stopped");
                    break;
                }
                Err(_) => break,
            }
            if self.spawn_worker(Slot::Fill).await.is_err() {
                break;
            }
        }
        self.shared.registry.lock().await.release_initial(&self.name);
    }

    /// Launches one worker into an already reserved slot.
    async fn spawn_worker(&mut self, slot: Slot) -> Result<WorkerId, SupervisorError> {
        let seq = self.shared.registry.lock().await.allocate_seq();
        let id = WorkerId::new(Arc::clone(&self.name), seq);
        let role = Role::Worker {
            server: Arc::clone(&self.name),
            seq,
        };

        let mut pending = match lifecycle::launch(&self.shared, &role).await {
            Ok(pending) => pending,
            Err(source) => {
                self.shared
                    .registry
                    .lock()
                    .await
                    .release_worker(&self.name, slot);
                self.shared.changed.notify_waiters();
                self.shared.bus.publish(
                    Event::new(EventKind::SpawnFailed)
                        .with_worker(&id)
                        .with_reason(source.to_string()),
                );
                return Err(SupervisorError::SpawnFailure {
                    role: role.to_string(),
                    source,
                });
            }
        };

        let pid = pending.handle.pid;
        let registered = self
            .shared
            .registry
            .lock()
            .await
            .register_worker(&id, pending.handle.clone(), slot);
        self.shared.changed.notify_waiters();
        if let Err(e) = registered {
            pending.discard().await;
            return Err(e);
        }

        self.shared.bus.publish(
            Event::new(EventKind::WorkerSpawned)
                .with_worker(&id)
                .with_pid(pid),
        );
        let ready = pending.take_ready();
        pending.arm(Arc::clone(&self.shared), Identity::Worker(id.clone()));
        lifecycle::announce(ready, self.tx.clone(), Identity::Worker(id.clone()));
        self.awaiting.insert(seq);
        Ok(id)
    }

    fn begin_teardown(&mut self, reason: Arc<str>) {
        self.state = DispatchState::Terminating;
        self.shared.bus.publish(
            Event::new(EventKind::ServerTerminating)
                .with_server(Arc::clone(&self.name))
                .with_reason(reason),
        );
        tokio::spawn(teardown(
            Arc::clone(&self.shared),
            Arc::clone(&self.name),
            self.tx.clone(),
        ));
    }
}

/// Reaps every worker, then the controller, then retires the server.
async fn teardown(shared: Arc<Shared>, name: Arc<str>, signals: mpsc::Sender<ControlSignal>) {
    let plan = shared.registry.lock().await.begin_teardown(&name);

    if let Some(plan) = plan {
        for (worker, process) in &plan.workers {
            shared.bus.publish(
                Event::new(EventKind::WorkerAborting)
                    .with_worker(worker)
                    .with_pid(process.pid),
            );
        }
        let workers = plan.workers.iter().map(|(worker, process)| {
            let role = Role::Worker {
                server: worker.server_arc(),
                seq: worker.seq(),
            };
            let shared = Arc::clone(&shared);
            async move { lifecycle::terminate(&shared, process, &role).await }
        });
        for result in join_all(workers).await {
            if let Err(e) = result {
                tracing::warn!(target: "poolvisor", server = %name, error = %e, "worker terminate failed");
            }
        }

        if let Some(controller) = &plan.controller {
            let role = Role::Server {
                server: Arc::clone(&name),
            };
            if let Err(e) = lifecycle::terminate(&shared, controller, &role).await {
                tracing::warn!(target: "poolvisor", server = %name, error = %e, "controller terminate failed");
            }
        }
    }

    let retired = shared.registry.lock().await.retire_server(&name);
    shared.changed.notify_waiters();
    if let Some(state) = retired {
        shared.bus.publish(
            Event::new(EventKind::ServerRemoved)
                .with_server(name)
                .with_reason(state.as_str()),
        );
    }
    let _ = signals.send(ControlSignal::TeardownComplete).await;
}
