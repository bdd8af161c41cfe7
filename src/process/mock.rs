//! In-memory launcher for tests.
//!
//! Each "process" is a [`CancellationToken`]: cancelling it is the process
//! exiting, and the exit future resolves once it is cancelled. Exits are
//! recorded in order so tests can check teardown sequencing.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::FutureExt;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use tokio_util::sync::CancellationToken;

use super::{ExitReason, Launcher, Role, Signaller, Spawned};

struct MockProc {
    role: Role,
    alive: CancellationToken,
    reason: Arc<Mutex<Option<ExitReason>>>,
    stubborn: bool,
}

#[derive(Default)]
struct MockState {
    next_pid: AtomicU32,
    fail_spawns: AtomicBool,
    stubborn: AtomicBool,
    hold_ready: AtomicBool,
    ready_gate: Mutex<CancellationToken>,
    procs: Mutex<HashMap<u32, MockProc>>,
    launched: Mutex<Vec<Role>>,
    exits: Mutex<Vec<(Role, ExitReason)>>,
}

impl MockState {
    fn finish(&self, pid: u32, reason: ExitReason) -> bool {
        let procs = self.procs.lock().unwrap();
        let Some(proc) = procs.get(&pid) else {
            return false;
        };
        if proc.alive.is_cancelled() {
            return false;
        }
        *proc.reason.lock().unwrap() = Some(reason.clone());
        self.exits.lock().unwrap().push((proc.role.clone(), reason));
        proc.alive.cancel();
        true
    }
}

/// Launcher whose processes live only in memory.
#[derive(Clone)]
pub(crate) struct MockLauncher {
    state: Arc<MockState>,
}

impl MockLauncher {
    pub(crate) fn new() -> Self {
        let state = MockState::default();
        state.next_pid.store(1000, Ordering::SeqCst);
        Self {
            state: Arc::new(state),
        }
    }

    /// Makes every following launch fail with an OS error.
    pub(crate) fn fail_spawns(&self, fail: bool) {
        self.state.fail_spawns.store(fail, Ordering::SeqCst);
    }

    /// Processes launched from now on ignore SIGTERM.
    pub(crate) fn stubborn(&self, stubborn: bool) {
        self.state.stubborn.store(stubborn, Ordering::SeqCst);
    }

    /// Processes launched from now on stay unready until [`release_ready`](Self::release_ready).
    pub(crate) fn hold_ready(&self, hold: bool) {
        self.state.hold_ready.store(hold, Ordering::SeqCst);
    }

    /// Lets every held process announce readiness.
    pub(crate) fn release_ready(&self) {
        let mut gate = self.state.ready_gate.lock().unwrap();
        gate.cancel();
        *gate = CancellationToken::new();
    }

    /// Simulates an exit nobody asked for.
    pub(crate) fn crash(&self, pid: u32, code: i32) -> bool {
        self.state.finish(pid, ExitReason::Exited(code))
    }

    /// Number of processes that have not exited.
    pub(crate) fn live_count(&self) -> usize {
        let procs = self.state.procs.lock().unwrap();
        procs.values().filter(|p| !p.alive.is_cancelled()).count()
    }

    /// Pids of live processes with the given role.
    pub(crate) fn live_pids(&self, role: &Role) -> Vec<u32> {
        let procs = self.state.procs.lock().unwrap();
        let mut pids: Vec<u32> = procs
            .iter()
            .filter(|(_, p)| !p.alive.is_cancelled() && &p.role == role)
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids
    }

    /// Every role launched so far, in launch order.
    pub(crate) fn launched(&self) -> Vec<Role> {
        self.state.launched.lock().unwrap().clone()
    }

    /// Every exit so far, in exit order.
    pub(crate) fn exits(&self) -> Vec<(Role, ExitReason)> {
        self.state.exits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(&self, role: &Role) -> io::Result<Spawned> {
        if self.state.fail_spawns.load(Ordering::SeqCst) {
            return Err(io::Error::from_raw_os_error(Errno::EAGAIN as i32));
        }
        let pid = self.state.next_pid.fetch_add(1, Ordering::SeqCst);
        let alive = CancellationToken::new();
        let reason = Arc::new(Mutex::new(None));

        self.state.procs.lock().unwrap().insert(
            pid,
            MockProc {
                role: role.clone(),
                alive: alive.clone(),
                reason: Arc::clone(&reason),
                stubborn: self.state.stubborn.load(Ordering::SeqCst),
            },
        );
        self.state.launched.lock().unwrap().push(role.clone());

        let ready = if self.state.hold_ready.load(Ordering::SeqCst) {
            let gate = self.state.ready_gate.lock().unwrap().clone();
            let dead = alive.clone();
            async move {
                tokio::select! {
                    _ = gate.cancelled() => true,
                    _ = dead.cancelled() => false,
                }
            }
            .boxed()
        } else {
            futures::future::ready(true).boxed()
        };

        let exit = async move {
            alive.cancelled().await;
            let recorded = reason.lock().unwrap().clone();
            recorded.unwrap_or_else(|| ExitReason::Unknown("no reason recorded".into()))
        }
        .boxed();

        Ok(Spawned {
            pid,
            signaller: Arc::new(MockSignaller {
                pid,
                state: Arc::clone(&self.state),
            }),
            ready,
            exit,
        })
    }
}

struct MockSignaller {
    pid: u32,
    state: Arc<MockState>,
}

impl Signaller for MockSignaller {
    fn signal(&self, signal: Signal) -> nix::Result<()> {
        {
            let procs = self.state.procs.lock().unwrap();
            match procs.get(&self.pid) {
                Some(p) if !p.alive.is_cancelled() => {
                    if p.stubborn && signal != Signal::SIGKILL {
                        return Ok(());
                    }
                }
                _ => return Err(Errno::ESRCH),
            }
        }
        self.state.finish(self.pid, ExitReason::Signaled(signal));
        Ok(())
    }
}
