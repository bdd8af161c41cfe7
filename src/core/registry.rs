//! # Server and worker registry.
//!
//! The registry is the single owner of every server record, worker record and
//! pid binding. It holds no locks itself; the supervisor wraps it in one mutex
//! and every transition below runs inside that critical section.
//!
//! ## Layout
//! ```text
//! Registry
//!   servers: name ──► ServerRecord { bounds, state, controller, workers[seq], slots }
//!   pids:    pid  ──► Identity (Controller(name) | Worker(name#seq))
//! ```
//!
//! Worker slots are claimed before a launch and counted against `max`:
//! ```text
//! initial        claimed by create_server for the first fill (min of them)
//! fill_reserved  refill launch in flight
//! reserved       operator create_worker launch in flight
//! ```
//!
//! ## Rules
//! - A record exists from the moment its launch succeeded until its exit is reaped.
//! - Every live pid maps to exactly one identity. A pid recycled by the OS
//!   before the previous owner's reap was processed belongs to the newcomer;
//!   the stale owner's removal leaves it alone.
//! - `workers.len() + initial + fill_reserved + reserved <= max` for every
//!   server, including workers that are still being aborted.
//! - Validation happens before mutation: a method that returns `Err` left the
//!   registry untouched.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::dispatcher::ControlSignal;
use super::status::{ServerStatus, StatusReport};
use crate::error::SupervisorError;
use crate::process::{ExitReason, Signaller};

/// Identity of a server, returned by `create_server`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerId(Arc<str>);

impl ServerId {
    /// Server name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a worker: owning server plus a generated sequence id.
///
/// Sequence ids are unique across the whole supervisor and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
    server: Arc<str>,
    seq: u64,
}

impl WorkerId {
    /// Creates a worker identity.
    pub fn new(server: Arc<str>, seq: u64) -> Self {
        Self { server, seq }
    }

    /// Owning server name.
    pub fn server(&self) -> &str {
        &self.server
    }

    pub(crate) fn server_arc(&self) -> Arc<str> {
        Arc::clone(&self.server)
    }

    /// Generated sequence id.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.server, self.seq)
    }
}

/// Validated worker bounds, `0 <= min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    min: usize,
    max: usize,
}

impl Bounds {
    /// Validates raw operator input.
    ///
    /// # Example
    /// ```
    /// use poolvisor::Bounds;
    ///
    /// assert!(Bounds::new(1, 3).is_ok());
    /// assert!(Bounds::new(3, 1).is_err());
    /// assert!(Bounds::new(-1, 3).is_err());
    /// ```
    pub fn new(min: i64, max: i64) -> Result<Self, SupervisorError> {
        if min < 0 || max < 0 || max < min {
            return Err(SupervisorError::InvalidBounds { min, max });
        }
        match (usize::try_from(min), usize::try_from(max)) {
            (Ok(min), Ok(max)) => Ok(Self { min, max }),
            _ => Err(SupervisorError::InvalidBounds { min, max }),
        }
    }

    /// Minimum number of workers.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Maximum number of workers.
    pub fn max(&self) -> usize {
        self.max
    }
}

/// Lifecycle state of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Controller launched, initial pool still filling.
    Starting,
    /// Controller ready and the initial pool reached its minimum.
    Running,
    /// Teardown in progress; no new workers are accepted.
    Aborting,
    /// Every process reaped and the record retired. Carried by the final
    /// `ServerRemoved` event; never present in a live status report.
    Terminated,
}

impl ServerState {
    /// Lowercase label for operator output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Starting => "starting",
            ServerState::Running => "running",
            ServerState::Aborting => "aborting",
            ServerState::Terminated => "terminated",
        }
    }

    fn accepts_work(&self) -> bool {
        matches!(self, ServerState::Starting | ServerState::Running)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Process exists; readiness not yet announced.
    Spawning,
    /// Ready announced.
    Active,
    /// Terminate requested; waiting for reap.
    Aborting,
    /// Exit confirmed. Never stored: the record is removed in the same
    /// critical section that processes the reap, so status reports only
    /// ever show the three live states.
    Reaped,
}

/// Handle to one live OS process.
#[derive(Clone)]
pub(crate) struct ProcessHandle {
    pub(crate) pid: u32,
    pub(crate) signaller: Arc<dyn Signaller>,
    /// Becomes `Some` once the process has been reaped and its record removed.
    pub(crate) exited: watch::Receiver<Option<ExitReason>>,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle").field("pid", &self.pid).finish()
    }
}

/// What a registered pid is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Identity {
    Controller(Arc<str>),
    Worker(WorkerId),
}

/// Which counter a worker slot was claimed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Operator `create_worker`.
    Requested,
    /// Initial fill or refill towards `min`.
    Fill,
}

struct WorkerRecord {
    state: WorkerState,
    process: ProcessHandle,
}

struct ServerRecord {
    bounds: Bounds,
    state: ServerState,
    controller: Option<ProcessHandle>,
    controller_pending: bool,
    workers: BTreeMap<u64, WorkerRecord>,
    /// Initial-fill slots claimed at creation and not yet launched.
    initial: usize,
    /// Fill launches that have not registered yet.
    fill_reserved: usize,
    /// Operator launches that have not registered yet.
    reserved: usize,
    signals: Option<mpsc::Sender<ControlSignal>>,
}

impl ServerRecord {
    /// Spawning plus Active workers.
    fn current(&self) -> usize {
        self.workers
            .values()
            .filter(|w| matches!(w.state, WorkerState::Spawning | WorkerState::Active))
            .count()
    }

    /// Slots held against `max`, aborting workers included.
    fn occupied(&self) -> usize {
        self.workers.len() + self.initial + self.fill_reserved + self.reserved
    }

    fn slot_counter(&mut self, slot: Slot) -> &mut usize {
        match slot {
            Slot::Requested => &mut self.reserved,
            Slot::Fill => &mut self.fill_reserved,
        }
    }

    fn processes(&self) -> usize {
        usize::from(self.controller.is_some() || self.controller_pending) + self.occupied()
    }
}

/// Outcome of choosing a worker to abort.
#[derive(Debug)]
pub(crate) enum AbortSelection {
    /// Worker marked `Aborting`; terminate it through the server's dispatcher.
    Chosen {
        worker: WorkerId,
        process: ProcessHandle,
        signals: mpsc::Sender<ControlSignal>,
    },
    /// Above the floor, but every candidate is still spawning.
    WaitForSpawn,
}

/// Processes to terminate when a server is torn down.
pub(crate) struct Teardown {
    pub(crate) workers: Vec<(WorkerId, ProcessHandle)>,
    pub(crate) controller: Option<ProcessHandle>,
}

/// Result of removing a reaped process.
pub(crate) struct Removed {
    /// Whether an abort asked for this exit.
    pub(crate) expected: bool,
    pub(crate) signals: Option<mpsc::Sender<ControlSignal>>,
}

/// Keyed server and worker records plus the pid index.
#[derive(Default)]
pub(crate) struct Registry {
    servers: HashMap<Arc<str>, ServerRecord>,
    pids: HashMap<u32, Identity>,
    next_seq: u64,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Live and reserved processes across all servers.
    fn load(&self) -> usize {
        self.servers.values().map(ServerRecord::processes).sum()
    }

    fn check_limit(&self, limit: Option<usize>) -> Result<(), SupervisorError> {
        match limit {
            Some(limit) if self.load() >= limit => Err(SupervisorError::ProcessLimit { limit }),
            _ => Ok(()),
        }
    }

    fn accepting(&self, name: &str) -> Result<&ServerRecord, SupervisorError> {
        match self.servers.get(name) {
            Some(rec) if rec.state.accepts_work() => Ok(rec),
            _ => Err(SupervisorError::unknown(name)),
        }
    }

    fn accepting_mut(&mut self, name: &str) -> Result<&mut ServerRecord, SupervisorError> {
        match self.servers.get_mut(name) {
            Some(rec) if rec.state.accepts_work() => Ok(rec),
            _ => Err(SupervisorError::unknown(name)),
        }
    }

    /// Claims `name` with a `Starting` record, the controller slot and the
    /// initial-fill slots.
    ///
    /// Initial slots are capped by the process limit; the dispatcher's fill
    /// reports whatever could not be claimed here.
    pub(crate) fn reserve_server(
        &mut self,
        name: &Arc<str>,
        bounds: Bounds,
        limit: Option<usize>,
    ) -> Result<ServerId, SupervisorError> {
        if self.servers.contains_key(name) {
            return Err(SupervisorError::DuplicateName {
                name: name.to_string(),
            });
        }
        self.check_limit(limit)?;
        let initial = match limit {
            Some(limit) => bounds.min.min(limit.saturating_sub(self.load() + 1)),
            None => bounds.min,
        };
        self.servers.insert(
            Arc::clone(name),
            ServerRecord {
                bounds,
                state: ServerState::Starting,
                controller: None,
                controller_pending: true,
                workers: BTreeMap::new(),
                initial,
                fill_reserved: 0,
                reserved: 0,
                signals: None,
            },
        );
        Ok(ServerId(Arc::clone(name)))
    }

    /// Binds the launched controller and its dispatcher queue to a reserved server.
    pub(crate) fn attach_controller(
        &mut self,
        name: &str,
        process: ProcessHandle,
        signals: mpsc::Sender<ControlSignal>,
    ) -> Result<(), SupervisorError> {
        let rec = self
            .servers
            .get_mut(name)
            .ok_or_else(|| SupervisorError::unknown(name))?;
        bind_pid(&mut self.pids, process.pid, Identity::Controller(Arc::from(name)));
        rec.controller = Some(process);
        rec.controller_pending = false;
        rec.signals = Some(signals);
        Ok(())
    }

    /// Drops a reservation whose controller never launched.
    pub(crate) fn drop_server(&mut self, name: &str) {
        let unused = self
            .servers
            .get(name)
            .is_some_and(|rec| rec.controller.is_none() && rec.workers.is_empty());
        if unused {
            self.servers.remove(name);
        }
    }

    /// Reserves one operator-requested worker slot.
    pub(crate) fn reserve_worker(
        &mut self,
        name: &str,
        limit: Option<usize>,
    ) -> Result<mpsc::Sender<ControlSignal>, SupervisorError> {
        let rec = self.accepting(name)?;
        let signals = rec
            .signals
            .clone()
            .ok_or_else(|| SupervisorError::unknown(name))?;
        if rec.occupied() >= rec.bounds.max {
            return Err(SupervisorError::CapacityExceeded {
                server: name.to_string(),
                max: rec.bounds.max,
            });
        }
        self.check_limit(limit)?;
        self.accepting_mut(name)?.reserved += 1;
        Ok(signals)
    }

    /// Reserves one fill slot.
    ///
    /// Initial slots claimed at creation are handed out first, whatever the
    /// operator did meanwhile. After that a slot is reserved only while the
    /// server is below its floor. Returns `Ok(false)` when no worker is needed.
    pub(crate) fn reserve_fill(
        &mut self,
        name: &str,
        limit: Option<usize>,
    ) -> Result<bool, SupervisorError> {
        let rec = self.accepting_mut(name)?;
        if rec.initial > 0 {
            rec.initial -= 1;
            rec.fill_reserved += 1;
            return Ok(true);
        }
        let below_min = rec.current() + rec.fill_reserved < rec.bounds.min;
        if !below_min || rec.occupied() >= rec.bounds.max {
            return Ok(false);
        }
        self.check_limit(limit)?;
        self.accepting_mut(name)?.fill_reserved += 1;
        Ok(true)
    }

    /// Returns initial slots the fill gave up on.
    pub(crate) fn release_initial(&mut self, name: &str) {
        if let Some(rec) = self.servers.get_mut(name) {
            rec.initial = 0;
        }
    }

    /// Returns a reserved slot after a failed or cancelled launch.
    pub(crate) fn release_worker(&mut self, name: &str, slot: Slot) {
        if let Some(rec) = self.servers.get_mut(name) {
            let counter = rec.slot_counter(slot);
            *counter = counter.saturating_sub(1);
        }
    }

    pub(crate) fn allocate_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Turns a reservation into a `Spawning` worker record.
    pub(crate) fn register_worker(
        &mut self,
        id: &WorkerId,
        process: ProcessHandle,
        slot: Slot,
    ) -> Result<(), SupervisorError> {
        let rec = self
            .servers
            .get_mut(id.server())
            .ok_or_else(|| SupervisorError::unknown(id.server()))?;
        let counter = rec.slot_counter(slot);
        *counter = counter.saturating_sub(1);
        bind_pid(&mut self.pids, process.pid, Identity::Worker(id.clone()));
        rec.workers.insert(
            id.seq(),
            WorkerRecord {
                state: WorkerState::Spawning,
                process,
            },
        );
        Ok(())
    }

    /// `Spawning` → `Active`. Returns the pid when the transition happened.
    pub(crate) fn mark_worker_active(&mut self, id: &WorkerId) -> Option<u32> {
        let worker = self.servers.get_mut(id.server())?.workers.get_mut(&id.seq())?;
        if worker.state != WorkerState::Spawning {
            return None;
        }
        worker.state = WorkerState::Active;
        Some(worker.process.pid)
    }

    /// `Starting` → `Running`. Returns the controller pid when the transition happened.
    pub(crate) fn mark_running(&mut self, name: &str) -> Option<u32> {
        let rec = self.servers.get_mut(name)?;
        if rec.state != ServerState::Starting {
            return None;
        }
        rec.state = ServerState::Running;
        rec.controller.as_ref().map(|c| c.pid)
    }

    /// Picks the most recently created `Active` worker and marks it `Aborting`.
    pub(crate) fn select_worker_for_abort(
        &mut self,
        name: &str,
    ) -> Result<AbortSelection, SupervisorError> {
        let rec = self.accepting_mut(name)?;
        if rec.current() <= rec.bounds.min {
            return Err(SupervisorError::BelowMinimum {
                server: name.to_string(),
                min: rec.bounds.min,
            });
        }
        let Some(signals) = rec.signals.clone() else {
            return Ok(AbortSelection::WaitForSpawn);
        };
        let chosen = rec
            .workers
            .iter_mut()
            .rev()
            .find(|(_, w)| w.state == WorkerState::Active);
        match chosen {
            Some((seq, worker)) => {
                worker.state = WorkerState::Aborting;
                Ok(AbortSelection::Chosen {
                    worker: WorkerId::new(Arc::from(name), *seq),
                    process: worker.process.clone(),
                    signals,
                })
            }
            None => Ok(AbortSelection::WaitForSpawn),
        }
    }

    /// Marks a server `Aborting` and returns its dispatcher queue.
    ///
    /// `Ok(None)` means the controller is still launching; retry once it is attached.
    pub(crate) fn begin_server_abort(
        &mut self,
        name: &str,
    ) -> Result<Option<mpsc::Sender<ControlSignal>>, SupervisorError> {
        let rec = self
            .servers
            .get_mut(name)
            .ok_or_else(|| SupervisorError::unknown(name))?;
        let Some(signals) = rec.signals.clone() else {
            return Ok(None);
        };
        rec.state = ServerState::Aborting;
        Ok(Some(signals))
    }

    /// Marks every worker `Aborting` and snapshots what must be terminated.
    pub(crate) fn begin_teardown(&mut self, name: &str) -> Option<Teardown> {
        let rec = self.servers.get_mut(name)?;
        rec.state = ServerState::Aborting;
        let workers = rec
            .workers
            .iter_mut()
            .map(|(seq, w)| {
                w.state = WorkerState::Aborting;
                (WorkerId::new(Arc::from(name), *seq), w.process.clone())
            })
            .collect();
        Some(Teardown {
            workers,
            controller: rec.controller.clone(),
        })
    }

    /// Removes a reaped worker.
    pub(crate) fn remove_worker(&mut self, id: &WorkerId, pid: u32) -> Option<Removed> {
        let rec = self.servers.get_mut(id.server())?;
        let worker = rec.workers.remove(&id.seq())?;
        unbind_pid(&mut self.pids, pid, &Identity::Worker(id.clone()));
        Some(Removed {
            expected: worker.state == WorkerState::Aborting || rec.state == ServerState::Aborting,
            signals: rec.signals.clone(),
        })
    }

    /// Clears a reaped controller. An unrequested exit moves the server to `Aborting`.
    pub(crate) fn controller_reaped(&mut self, name: &str, pid: u32) -> Option<Removed> {
        let rec = self.servers.get_mut(name)?;
        if rec.controller.as_ref().map(|c| c.pid) != Some(pid) {
            return None;
        }
        rec.controller = None;
        unbind_pid(&mut self.pids, pid, &Identity::Controller(Arc::from(name)));
        let expected = rec.state == ServerState::Aborting;
        rec.state = ServerState::Aborting;
        Some(Removed {
            expected,
            signals: rec.signals.clone(),
        })
    }

    /// Removes a torn-down server and anything still bound to it.
    ///
    /// Returns the final state, `Terminated`, or `None` if it was already gone.
    pub(crate) fn retire_server(&mut self, name: &str) -> Option<ServerState> {
        let mut rec = self.servers.remove(name)?;
        for (seq, worker) in &rec.workers {
            let owner = Identity::Worker(WorkerId::new(Arc::from(name), *seq));
            unbind_pid(&mut self.pids, worker.process.pid, &owner);
        }
        if let Some(c) = &rec.controller {
            unbind_pid(&mut self.pids, c.pid, &Identity::Controller(Arc::from(name)));
        }
        rec.state = ServerState::Terminated;
        Some(rec.state)
    }


    /// Sender for a server's dispatcher queue.
    pub(crate) fn signals(&self, name: &str) -> Option<mpsc::Sender<ControlSignal>> {
        self.servers.get(name)?.signals.clone()
    }

    /// Names of every server, sorted.
    pub(crate) fn server_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.servers.keys().map(|k| k.to_string()).collect();
        names.sort_unstable();
        names
    }

    /// Point-in-time snapshot.
    pub(crate) fn status(&self) -> StatusReport {
        let mut servers: Vec<ServerStatus> = self
            .servers
            .iter()
            .map(|(name, rec)| {
                let count =
                    |state: WorkerState| rec.workers.values().filter(|w| w.state == state).count();
                ServerStatus {
                    name: name.to_string(),
                    state: rec.state,
                    controller_pid: rec.controller.as_ref().map(|c| c.pid),
                    workers: rec.current(),
                    spawning: count(WorkerState::Spawning),
                    active: count(WorkerState::Active),
                    aborting: count(WorkerState::Aborting),
                    min: rec.bounds.min,
                    max: rec.bounds.max,
                }
            })
            .collect();
        servers.sort_unstable_by(|a, b| a.name.cmp(&b.name));
        StatusReport { servers }
    }

    /// Panics if a structural invariant is broken.
    #[cfg(test)]
    pub(crate) fn assert_invariants(&self) {
        let mut seen = 0;
        for (name, rec) in &self.servers {
            assert!(rec.occupied() <= rec.bounds.max, "{name}: over max");
            if let Some(c) = &rec.controller {
                assert_eq!(
                    self.pids.get(&c.pid),
                    Some(&Identity::Controller(Arc::clone(name)))
                );
                seen += 1;
            }
            for (seq, w) in &rec.workers {
                assert_eq!(
                    self.pids.get(&w.process.pid),
                    Some(&Identity::Worker(WorkerId::new(Arc::clone(name), *seq)))
                );
                seen += 1;
            }
        }
        assert_eq!(seen, self.pids.len(), "pid index out of sync");
    }
}

/// Binds `pid` to `owner`, replacing a binding left by a reaped process
/// whose removal has not run yet.
fn bind_pid(pids: &mut HashMap<u32, Identity>, pid: u32, owner: Identity) {
    if let Some(stale) = pids.insert(pid, owner) {
        tracing::debug!(target: "poolvisor::registry", pid, ?stale, "pid recycled before stale removal");
    }
}

/// Drops the binding of `pid` only while it still belongs to `owner`.
fn unbind_pid(pids: &mut HashMap<u32, Identity>, pid: u32, owner: &Identity) {
    if pids.get(&pid) == Some(owner) {
        pids.remove(&pid);
    }
}

#[cfg(test)]
mod tests {
    use nix::sys::signal::Signal;

    use super::*;

    struct NoopSignaller;

    impl Signaller for NoopSignaller {
        fn signal(&self, _signal: Signal) -> nix::Result<()> {
            Ok(())
        }
    }

    fn handle(pid: u32) -> ProcessHandle {
        let (_tx, exited) = watch::channel(None);
        ProcessHandle {
            pid,
            signaller: Arc::new(NoopSignaller),
            exited,
        }
    }

    fn server(reg: &mut Registry, name: &str, min: i64, max: i64) -> mpsc::Receiver<ControlSignal> {
        let name: Arc<str> = Arc::from(name);
        reg.reserve_server(&name, Bounds::new(min, max).unwrap(), None)
            .unwrap();
        let (tx, rx) = mpsc::channel(8);
        reg.attach_controller(&name, handle(1), tx).unwrap();
        rx
    }

    fn add_worker(reg: &mut Registry, name: &str, pid: u32) -> WorkerId {
        reg.reserve_worker(name, None).unwrap();
        let id = WorkerId::new(Arc::from(name), reg.allocate_seq());
        reg.register_worker(&id, handle(pid), Slot::Requested).unwrap();
        id
    }

    #[test]
    fn test_bounds_validation() {
        assert!(matches!(
            Bounds::new(2, 1),
            Err(SupervisorError::InvalidBounds { min: 2, max: 1 })
        ));
        assert!(Bounds::new(0, -1).is_err());
        let b = Bounds::new(0, 0).unwrap();
        assert_eq!((b.min(), b.max()), (0, 0));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 2);
        let err = reg
            .reserve_server(&Arc::from("web"), Bounds::new(0, 1).unwrap(), None)
            .unwrap_err();
        assert!(matches!(err, SupervisorError::DuplicateName { .. }));
        assert_eq!(reg.server_names(), vec!["web".to_string()]);
    }

    #[test]
    fn test_capacity_counts_reservations() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 2);
        reg.reserve_worker("web", None).unwrap();
        reg.reserve_worker("web", None).unwrap();
        let err = reg.reserve_worker("web", None).unwrap_err();
        assert!(matches!(err, SupervisorError::CapacityExceeded { max: 2, .. }));

        reg.release_worker("web", Slot::Requested);
        assert!(reg.reserve_worker("web", None).is_ok());
    }

    #[test]
    fn test_process_limit_includes_controllers() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "a", 0, 5);
        add_worker(&mut reg, "a", 10);
        let err = reg.reserve_worker("a", Some(2)).unwrap_err();
        assert!(matches!(err, SupervisorError::ProcessLimit { limit: 2 }));
        let err = reg
            .reserve_server(&Arc::from("b"), Bounds::new(0, 1).unwrap(), Some(2))
            .unwrap_err();
        assert!(matches!(err, SupervisorError::ProcessLimit { .. }));
    }

    #[test]
    fn test_abort_selects_newest_active() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 3);
        let first = add_worker(&mut reg, "web", 10);
        let second = add_worker(&mut reg, "web", 11);
        let third = add_worker(&mut reg, "web", 12);
        reg.mark_worker_active(&first);
        reg.mark_worker_active(&second);

        match reg.select_worker_for_abort("web").unwrap() {
            AbortSelection::Chosen { worker, process, .. } => {
                assert_eq!(worker, second);
                assert_eq!(process.pid, 11);
            }
            AbortSelection::WaitForSpawn => panic!("expected a chosen worker"),
        }
        assert_eq!(reg.mark_worker_active(&third), Some(12));
        reg.assert_invariants();
    }

    #[test]
    fn test_abort_waits_for_spawning_workers() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 3);
        add_worker(&mut reg, "web", 10);
        assert!(matches!(
            reg.select_worker_for_abort("web"),
            Ok(AbortSelection::WaitForSpawn)
        ));
    }

    #[test]
    fn test_floor_excludes_aborting_workers() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 1, 3);
        let a = add_worker(&mut reg, "web", 10);
        let b = add_worker(&mut reg, "web", 11);
        reg.mark_worker_active(&a);
        reg.mark_worker_active(&b);

        assert!(reg.select_worker_for_abort("web").is_ok());
        let err = reg.select_worker_for_abort("web").unwrap_err();
        assert!(matches!(err, SupervisorError::BelowMinimum { min: 1, .. }));
        // The aborting worker still holds its slot until reaped.
        let status = reg.status();
        assert_eq!(status.servers[0].workers, 1);
        assert_eq!(status.servers[0].aborting, 1);
    }

    #[test]
    fn test_reap_removes_record_and_pid() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 3);
        let id = add_worker(&mut reg, "web", 10);

        let removed = reg.remove_worker(&id, 10).unwrap();
        assert!(!removed.expected);
        assert!(reg.remove_worker(&id, 10).is_none());
        reg.assert_invariants();
    }

    #[test]
    fn test_teardown_marks_everything_aborting() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 3);
        let a = add_worker(&mut reg, "web", 10);
        add_worker(&mut reg, "web", 11);

        let teardown = reg.begin_teardown("web").unwrap();
        assert_eq!(teardown.workers.len(), 2);
        assert_eq!(teardown.controller.map(|c| c.pid), Some(1));
        assert!(matches!(
            reg.reserve_worker("web", None),
            Err(SupervisorError::UnknownServer { .. })
        ));
        assert!(reg.remove_worker(&a, 10).unwrap().expected);

        assert!(reg.controller_reaped("web", 1).unwrap().expected);
        assert_eq!(reg.retire_server("web"), Some(ServerState::Terminated));
        assert_eq!(reg.retire_server("web"), None);
        reg.assert_invariants();
        assert!(reg.status().servers.is_empty());
    }

    #[test]
    fn test_unrequested_controller_exit_starts_abort() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 3);
        let removed = reg.controller_reaped("web", 1).unwrap();
        assert!(!removed.expected);
        assert_eq!(reg.status().servers[0].state, ServerState::Aborting);
    }

    #[test]
    fn test_fill_reserves_up_to_min() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 2, 3);
        assert!(reg.reserve_fill("web", None).unwrap());
        assert!(reg.reserve_fill("web", None).unwrap());
        assert!(!reg.reserve_fill("web", None).unwrap());
    }

    #[test]
    fn test_initial_fill_slots_outlast_early_requests() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 1, 3);
        reg.reserve_worker("web", None).unwrap();
        reg.reserve_worker("web", None).unwrap();
        assert!(matches!(
            reg.reserve_worker("web", None),
            Err(SupervisorError::CapacityExceeded { max: 3, .. })
        ));

        assert!(reg.reserve_fill("web", None).unwrap());
        assert!(!reg.reserve_fill("web", None).unwrap());
        reg.assert_invariants();
    }

    #[test]
    fn test_initial_fill_capped_by_process_limit() {
        let mut reg = Registry::new();
        reg.reserve_server(&Arc::from("web"), Bounds::new(3, 5).unwrap(), Some(2))
            .unwrap();
        let (tx, _rx) = mpsc::channel(8);
        reg.attach_controller("web", handle(1), tx).unwrap();

        assert!(reg.reserve_fill("web", Some(2)).unwrap());
        assert!(matches!(
            reg.reserve_fill("web", Some(2)),
            Err(SupervisorError::ProcessLimit { limit: 2 })
        ));
    }

    #[test]
    fn test_released_initial_slots_free_capacity() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 2, 2);
        assert!(reg.reserve_worker("web", None).is_err());
        reg.release_initial("web");
        assert!(reg.reserve_worker("web", None).is_ok());
    }

    #[test]
    fn test_recycled_pid_belongs_to_newest_owner() {
        let mut reg = Registry::new();
        let _rx = server(&mut reg, "web", 0, 3);
        let old = add_worker(&mut reg, "web", 42);
        // The OS reaped `old` and handed pid 42 out again before its removal ran.
        let new = add_worker(&mut reg, "web", 42);

        assert!(reg.remove_worker(&old, 42).is_some());
        reg.assert_invariants();
        assert_eq!(reg.pids.get(&42), Some(&Identity::Worker(new.clone())));

        assert!(reg.remove_worker(&new, 42).is_some());
        assert!(!reg.pids.contains_key(&42));
        reg.assert_invariants();
    }

    #[test]
    fn test_sequence_ids_are_never_reused() {
        let mut reg = Registry::new();
        let a = reg.allocate_seq();
        let b = reg.allocate_seq();
        assert!(b > a);
    }
}
