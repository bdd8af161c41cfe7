//! # Process seam: launching, signalling and reaping OS processes.
//!
//! Every server and worker is one OS process. The supervisor never touches
//! `fork`/`waitpid` directly; it goes through a [`Launcher`], which returns the
//! parts of a freshly created process as a [`Spawned`] value:
//!
//! ```text
//! Launcher::launch(role) ──► Spawned {
//!                              pid,
//!                              signaller ──► SIGTERM / SIGKILL delivery
//!                              ready     ──► resolves when the child announces itself
//!                              exit      ──► resolves once the OS reaped the child
//!                            }
//! ```
//!
//! - [`CommandLauncher`] runs real programs through `tokio::process`.
//!   With [`CommandLauncher::current_exe`] the binary re-executes itself in a
//!   hidden role mode ([`run_role`]) that prints [`READY_LINE`] and then waits
//!   for a termination signal.
//! - The `exit` future is the only place a process is reaped, so a pid is never
//!   released while a record still refers to it.

mod command_launcher;
mod exit;
#[cfg(test)]
pub(crate) mod mock;
mod role;

use std::fmt;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use nix::sys::signal::Signal;

pub use command_launcher::CommandLauncher;
pub use exit::ExitReason;
pub use role::run_role;

/// Hidden subcommand used when the binary re-executes itself as a child role.
pub const ROLE_SUBCOMMAND: &str = "__role";

/// Line a child role writes to stdout once it is ready to receive signals.
pub const READY_LINE: &str = "ready";

/// What a launched process is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Role {
    /// The controlling process of a server.
    Server {
        /// Server name.
        server: Arc<str>,
    },
    /// A worker owned by a server.
    Worker {
        /// Owning server name.
        server: Arc<str>,
        /// Generated worker sequence id.
        seq: u64,
    },
}

impl Role {
    /// Name of the server this process belongs to.
    pub fn server(&self) -> &str {
        match self {
            Role::Server { server } | Role::Worker { server, .. } => server,
        }
    }

    /// Arguments passed after [`ROLE_SUBCOMMAND`] when re-executing the binary.
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Role::Server { server } => vec![
                ROLE_SUBCOMMAND.to_string(),
                "server".to_string(),
                server.to_string(),
            ],
            Role::Worker { server, seq } => vec![
                ROLE_SUBCOMMAND.to_string(),
                "worker".to_string(),
                server.to_string(),
                seq.to_string(),
            ],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server { server } => write!(f, "server {server}"),
            Role::Worker { server, seq } => write!(f, "worker {server}#{seq}"),
        }
    }
}

/// Delivers control signals to one process.
pub trait Signaller: Send + Sync + 'static {
    /// Sends `signal` to the process.
    ///
    /// Returns `Err(Errno::ESRCH)` when the process no longer exists.
    fn signal(&self, signal: Signal) -> nix::Result<()>;
}

/// Parts of a freshly launched process.
pub struct Spawned {
    /// OS process id.
    pub pid: u32,
    /// Signal delivery for this process.
    pub signaller: Arc<dyn Signaller>,
    /// Resolves to `true` once the child announced readiness, `false` if it never will.
    pub ready: BoxFuture<'static, bool>,
    /// Resolves once the process has exited and been reaped.
    pub exit: BoxFuture<'static, ExitReason>,
}

impl fmt::Debug for Spawned {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawned").field("pid", &self.pid).finish()
    }
}

/// Creates OS processes for servers and workers.
///
/// # Example
/// ```no_run
/// use poolvisor::{CommandLauncher, Config, Supervisor};
///
/// # async fn demo() -> std::io::Result<()> {
/// let launcher = CommandLauncher::new("sleep").arg("infinity");
/// let sup = Supervisor::builder(Config::default())
///     .with_launcher(launcher)
///     .build();
/// # Ok(()) }
/// ```
#[async_trait]
pub trait Launcher: Send + Sync + 'static {
    /// Creates one process for `role`.
    ///
    /// An error means no process exists; nothing needs cleaning up.
    async fn launch(&self, role: &Role) -> io::Result<Spawned>;
}
