//! # OS termination signal handling.
//!
//! Provides [`ShutdownSignals`], a set of registered listeners that completes
//! when the process receives a termination signal, and
//! [`wait_for_shutdown_signal`] as a one-shot helper over it.
//!
//! ## Signals
//! - `SIGINT` (Ctrl-C in terminal)
//! - `SIGTERM` (default kill signal, also what the supervisor sends to children)
//! - `SIGQUIT` (quit signal, often used for core dumps or hard stop)
//!
//! Registration and waiting are split so a child role can install its
//! handlers before announcing readiness; a signal delivered between the two
//! is buffered by tokio and not lost.

use tokio::signal::unix::{Signal, SignalKind, signal};

/// Registered termination signal listeners.
pub(crate) struct ShutdownSignals {
    sigint: Signal,
    sigterm: Signal,
    sigquit: Signal,
}

impl ShutdownSignals {
    /// Installs listeners for SIGINT, SIGTERM and SIGQUIT.
    pub(crate) fn register() -> std::io::Result<Self> {
        Ok(Self {
            sigint: signal(SignalKind::interrupt())?,
            sigterm: signal(SignalKind::terminate())?,
            sigquit: signal(SignalKind::quit())?,
        })
    }

    /// Waits for the next termination signal and returns its name.
    pub(crate) async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigint.recv()  => "SIGINT",
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigquit.recv() => "SIGQUIT",
        }
    }
}

/// Waits for a termination signal.
///
/// Each call creates independent signal listeners.
///
/// Returns the signal name when any signal is received, or `Err` if signal registration fails.
pub async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    let mut signals = ShutdownSignals::register()?;
    Ok(signals.recv().await)
}
