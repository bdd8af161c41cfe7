//! Body of a process launched in role mode.
//!
//! A role process installs its termination handlers, announces
//! [`READY_LINE`](super::READY_LINE) on stdout and then idles until it is
//! told to stop. It holds no supervisor state of its own.

use std::io;

use tokio::io::AsyncWriteExt;

use super::{READY_LINE, Role};
use crate::core::shutdown::ShutdownSignals;

/// Runs `role` until SIGTERM, SIGINT or SIGQUIT arrives, then returns.
///
/// Returning lets the process exit with status 0, which the supervisor
/// records as a graceful exit.
pub async fn run_role(role: Role) -> io::Result<()> {
    let mut signals = ShutdownSignals::register()?;

    // The parent may have stopped reading; a failed announce is not fatal.
    if let Err(e) = announce_ready().await {
        tracing::debug!(target: "poolvisor::role", %role, error = %e, "ready announce failed");
    }

    let received = signals.recv().await;
    tracing::debug!(target: "poolvisor::role", %role, signal = received, "terminating");
    Ok(())
}

async fn announce_ready() -> io::Result<()> {
    let mut out = tokio::io::stdout();
    out.write_all(READY_LINE.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await
}
