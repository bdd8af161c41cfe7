//! Exit analysis for reaped processes.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use nix::sys::signal::Signal;

/// Why a process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Normal exit with status code.
    Exited(i32),
    /// Killed by signal.
    Signaled(Signal),
    /// Wait failed or the status could not be decoded.
    Unknown(String),
}

impl ExitReason {
    /// Decodes a wait status.
    pub fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return Self::Exited(code);
        }
        match status.signal() {
            Some(raw) => Signal::try_from(raw)
                .map(Self::Signaled)
                .unwrap_or_else(|_| Self::Unknown(format!("signal {raw}"))),
            None => Self::Unknown("no exit code or signal".to_string()),
        }
    }

    /// Check if this is a successful exit.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    /// Exit that a terminate request would produce: code 0, SIGTERM or SIGINT.
    pub fn is_graceful(&self) -> bool {
        matches!(
            self,
            Self::Exited(0) | Self::Signaled(Signal::SIGTERM | Signal::SIGINT)
        )
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Exited(code) => format!("exited with code {code}"),
            Self::Signaled(sig) => format!("killed by signal {sig}"),
            Self::Unknown(why) => format!("unknown exit ({why})"),
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}
