//! Error types used by the poolvisor runtime.
//!
//! [`SupervisorError`] covers every failure an operator-facing call can report:
//! validation failures (bounds, names, capacity), process-level failures
//! (spawn, signal delivery) and runtime state (shutdown in progress).
//!
//! Validation errors are raised before any registry mutation, so a failed call
//! leaves the supervisor exactly as it found it.

use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

/// # Errors produced by supervisor operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Worker bounds are negative or inverted.
    #[error("invalid bounds min={min} max={max}; expected 0 <= min <= max")]
    InvalidBounds {
        /// Requested minimum.
        min: i64,
        /// Requested maximum.
        max: i64,
    },

    /// Server name is empty or contains whitespace.
    #[error("invalid server name {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// A live server already uses this name.
    #[error("server {name:?} already exists")]
    DuplicateName {
        /// The colliding name.
        name: String,
    },

    /// No live server matches the name.
    #[error("no live server named {name:?}")]
    UnknownServer {
        /// The requested name.
        name: String,
    },

    /// The server already holds `max` workers.
    #[error("server {server:?} is at its maximum of {max} workers")]
    CapacityExceeded {
        /// Server name.
        server: String,
        /// Configured maximum.
        max: usize,
    },

    /// Removing a worker would take the server below its floor.
    #[error("server {server:?} is at its minimum of {min} workers")]
    BelowMinimum {
        /// Server name.
        server: String,
        /// Configured minimum.
        min: usize,
    },

    /// The global process ceiling is reached.
    #[error("process limit of {limit} reached")]
    ProcessLimit {
        /// Configured ceiling.
        limit: usize,
    },

    /// The OS refused to create a process.
    #[error("failed to spawn {role}: {source}")]
    SpawnFailure {
        /// Human-readable role of the process that failed to start.
        role: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A control signal could not be delivered.
    ///
    /// `ESRCH` (target already gone) never surfaces as this error; it is treated
    /// as the terminal state having been reached.
    #[error("failed to signal process {pid}: {errno}")]
    SignalDeliveryFailure {
        /// Target process id.
        pid: u32,
        /// OS error.
        errno: Errno,
    },

    /// Supervisor shutdown did not finish within its grace period.
    #[error("shutdown grace {grace:?} exceeded; still live: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Servers that were still being torn down.
        stuck: Vec<String>,
    },

    /// The supervisor no longer accepts mutating operations.
    #[error("supervisor is shutting down")]
    ShuttingDown,
}

impl SupervisorError {
    /// Returns a short stable label (snake_case) for use in logs and operator output.
    ///
    /// # Example
    /// ```
    /// use poolvisor::SupervisorError;
    ///
    /// let err = SupervisorError::UnknownServer { name: "web".into() };
    /// assert_eq!(err.as_label(), "unknown_server");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SupervisorError::InvalidBounds { .. } => "invalid_bounds",
            SupervisorError::InvalidName { .. } => "invalid_name",
            SupervisorError::DuplicateName { .. } => "duplicate_name",
            SupervisorError::UnknownServer { .. } => "unknown_server",
            SupervisorError::CapacityExceeded { .. } => "capacity_exceeded",
            SupervisorError::BelowMinimum { .. } => "below_minimum",
            SupervisorError::ProcessLimit { .. } => "process_limit",
            SupervisorError::SpawnFailure { .. } => "spawn_failure",
            SupervisorError::SignalDeliveryFailure { .. } => "signal_delivery_failure",
            SupervisorError::GraceExceeded { .. } => "grace_exceeded",
            SupervisorError::ShuttingDown => "shutting_down",
        }
    }

    /// Indicates whether the caller may simply report the error and continue.
    ///
    /// Only [`SupervisorError::SpawnFailure`] is unrecoverable: it signals OS
    /// resource exhaustion, which the binary may treat as fatal.
    ///
    /// # Example
    /// ```
    /// use poolvisor::SupervisorError;
    ///
    /// let full = SupervisorError::CapacityExceeded { server: "web".into(), max: 3 };
    /// assert!(full.is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, SupervisorError::SpawnFailure { .. })
    }

    pub(crate) fn unknown(name: &str) -> Self {
        SupervisorError::UnknownServer {
            name: name.to_string(),
        }
    }
}
