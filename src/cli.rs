//! Command-line interface definitions using clap.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use poolvisor::{Config, Role};

/// Supervise named servers, each keeping a bounded pool of worker processes.
///
/// Commands are read from stdin, one per line. Type `help` for the list.
#[derive(Parser, Debug)]
#[command(name = "poolvisor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v for info, -vv for debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Seconds to wait for a terminated process before sending SIGKILL (0 waits forever).
    #[arg(long, env = "POOLVISOR_STOP_TIMEOUT", default_value_t = 10)]
    pub stop_timeout: u64,

    /// Maximum number of live server and worker processes (0 for no limit).
    #[arg(long, env = "POOLVISOR_MAX_PROCESSES", default_value_t = 256)]
    pub max_processes: usize,

    /// Do not replace workers that exit on their own.
    #[arg(long, env = "POOLVISOR_NO_REFILL")]
    pub no_refill: bool,

    /// Seconds allowed for tearing everything down on exit (0 for no limit).
    #[arg(long, env = "POOLVISOR_SHUTDOWN_GRACE", default_value_t = 30)]
    pub shutdown_grace: u64,

    /// Exit with status 1 the first time a process cannot be spawned.
    #[arg(long)]
    pub exit_on_spawn_failure: bool,

    /// Program to run for every server and worker instead of this binary.
    #[arg(long, env = "POOLVISOR_WORKER_PROGRAM")]
    pub worker_program: Option<PathBuf>,

    /// Argument passed to the worker program (repeatable).
    #[arg(long = "worker-arg", requires = "worker_program", allow_hyphen_values = true)]
    pub worker_args: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Runtime settings selected by the flags.
    pub fn config(&self) -> Config {
        Config {
            stop_timeout: Duration::from_secs(self.stop_timeout),
            max_processes: self.max_processes,
            refill_below_min: !self.no_refill,
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            ..Config::default()
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run as a supervised child process.
    #[command(name = "__role", hide = true)]
    Role(RoleArgs),
}

/// Arguments of the hidden role entry point.
#[derive(Parser, Debug)]
pub struct RoleArgs {
    /// Process kind.
    #[arg(value_enum)]
    pub kind: RoleKind,

    /// Owning server name.
    pub server: String,

    /// Worker sequence id.
    #[arg(required_if_eq("kind", "worker"))]
    pub seq: Option<u64>,
}

/// Kind of child process.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleKind {
    /// Controlling process of a server.
    Server,
    /// Worker process.
    Worker,
}

impl RoleArgs {
    /// Role described by these arguments.
    pub fn role(&self) -> Role {
        let server: Arc<str> = Arc::from(self.server.as_str());
        match (self.kind, self.seq) {
            (RoleKind::Worker, Some(seq)) => Role::Worker { server, seq },
            _ => Role::Server { server },
        }
    }
}
