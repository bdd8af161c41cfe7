//! Point-in-time status snapshots.

use std::fmt;

use super::registry::ServerState;

/// Counts for one server at the moment the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    /// Server name.
    pub name: String,
    /// Lifecycle state.
    pub state: ServerState,
    /// Controlling process id, once launched and until reaped.
    pub controller_pid: Option<u32>,
    /// Current worker count: spawning plus active.
    pub workers: usize,
    /// Workers that have not announced readiness yet.
    pub spawning: usize,
    /// Workers that announced readiness.
    pub active: usize,
    /// Workers asked to terminate and not yet reaped.
    pub aborting: usize,
    /// Configured minimum.
    pub min: usize,
    /// Configured maximum.
    pub max: usize,
}

impl ServerStatus {
    /// Live processes owned by this server, aborting ones included.
    pub fn processes(&self) -> usize {
        usize::from(self.controller_pid.is_some()) + self.workers + self.aborting
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.state)?;
        if let Some(pid) = self.controller_pid {
            write!(f, " pid {pid}")?;
        }
        write!(
            f,
            ": {} workers (min {}, max {})",
            self.workers, self.min, self.max
        )?;
        if self.spawning > 0 || self.aborting > 0 {
            write!(
                f,
                ", {} spawning, {} aborting",
                self.spawning, self.aborting
            )?;
        }
        Ok(())
    }
}

/// Snapshot of every live server, sorted by name.
///
/// May reflect counts mid-transition; it never waits for pending spawns or reaps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    /// Per-server counts.
    pub servers: Vec<ServerStatus>,
}

impl StatusReport {
    /// Number of live servers.
    pub fn active_servers(&self) -> usize {
        self.servers.len()
    }

    /// Live server and worker processes.
    pub fn processes(&self) -> usize {
        self.servers.iter().map(ServerStatus::processes).sum()
    }

    /// Counts for one server.
    pub fn server(&self, name: &str) -> Option<&ServerStatus> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Current worker count of one server.
    pub fn worker_count(&self, name: &str) -> Option<usize> {
        self.server(name).map(|s| s.workers)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Servers running: {}", self.active_servers())?;
        write!(f, "Child processes running: {}", self.processes())?;
        for server in &self.servers {
            write!(f, "\n  {server}")?;
        }
        Ok(())
    }
}
