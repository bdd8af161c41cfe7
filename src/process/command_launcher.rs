//! Launcher backed by `tokio::process`.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::{ExitReason, Launcher, READY_LINE, Role, Signaller, Spawned};

/// Launches every server and worker as `program args...`.
///
/// Two modes:
/// - [`CommandLauncher::new`]: run an arbitrary program (e.g. `sleep infinity`);
///   the process counts as ready as soon as it exists.
/// - [`CommandLauncher::current_exe`]: re-execute the running binary with the
///   hidden role arguments; readiness is the child's [`READY_LINE`] on stdout.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: PathBuf,
    args: Vec<OsString>,
    role_args: bool,
}

impl CommandLauncher {
    /// Runs `program` for every role.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            role_args: false,
        }
    }

    /// Re-executes the current binary in role mode.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self {
            program: std::env::current_exe()?,
            args: Vec::new(),
            role_args: true,
        })
    }

    /// Appends one fixed argument.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends fixed arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    async fn launch(&self, role: &Role) -> io::Result<Spawned> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if self.role_args {
            cmd.args(role.to_args());
            cmd.stdout(Stdio::piped());
        } else {
            cmd.stdout(Stdio::null());
        }
        cmd.stdin(Stdio::null());
        cmd.stderr(Stdio::inherit());
        // Terminal signals go to the supervisor only.
        cmd.process_group(0);
        // Dropping the exit future unreaped (runtime teardown, panic) kills the child.
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::other("process exited before its pid was read"))?;

        let ready = match child.stdout.take() {
            Some(stdout) => async move {
                let mut lines = BufReader::new(stdout).lines();
                matches!(lines.next_line().await, Ok(Some(line)) if line.trim() == READY_LINE)
            }
            .boxed(),
            None => future::ready(true).boxed(),
        };

        let exit = async move {
            match child.wait().await {
                Ok(status) => ExitReason::from_status(status),
                Err(e) => ExitReason::Unknown(e.to_string()),
            }
        }
        .boxed();

        Ok(Spawned {
            pid,
            signaller: Arc::new(PidSignaller {
                pid: Pid::from_raw(pid as i32),
            }),
            ready,
            exit,
        })
    }
}

struct PidSignaller {
    pid: Pid,
}

impl Signaller for PidSignaller {
    fn signal(&self, sig: Signal) -> nix::Result<()> {
        signal::kill(self.pid, sig)
    }
}
