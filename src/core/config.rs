//! Supervisor settings.
//!
//! ## Sentinel values
//! - `stop_timeout = 0s` → wait for reap indefinitely, never escalate to SIGKILL
//! - `max_processes = 0` → no global process ceiling
//! - `shutdown_grace = 0s` → shutdown waits for every teardown without limit

use std::time::Duration;

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `signal_queue_capacity`: Per-server control-signal queue size (min 1)
/// - `stop_timeout`: Wait after SIGTERM before SIGKILL (`0s` = wait forever)
/// - `max_processes`: Ceiling on live server and worker processes (`0` = unlimited)
/// - `refill_below_min`: Respawn workers lost unexpectedly while below the floor
/// - `shutdown_grace`: Time allowed for tearing down every server on shutdown (`0s` = no limit)
///
/// Read the zero sentinels through the accessors below rather than the fields.
#[derive(Clone, Debug)]
pub struct Config {
    /// Events retained by the bus for receivers that fall behind.
    pub bus_capacity: usize,

    /// Capacity of each server's control-signal queue.
    ///
    /// Operator calls wait for room when the queue is full; they never drop a signal.
    pub signal_queue_capacity: usize,

    /// How long a terminate waits for reap before escalating to SIGKILL.
    ///
    /// - `Duration::ZERO` = wait indefinitely
    /// - `> 0` = send SIGKILL once elapsed, then keep waiting for reap
    pub stop_timeout: Duration,

    /// Maximum number of live server and worker processes.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = creates beyond `n` fail with `ProcessLimit`
    pub max_processes: usize,

    /// Whether a server that lost a worker unexpectedly refills itself to `min`.
    pub refill_below_min: bool,

    /// Maximum time [`Supervisor::shutdown`](crate::Supervisor::shutdown) waits
    /// for every server to be torn down.
    pub shutdown_grace: Duration,
}

impl Config {
    /// Returns the stop timeout as an `Option`.
    ///
    /// - `None` → wait for reap indefinitely
    /// - `Some(d)` → escalate to SIGKILL after `d`
    #[inline]
    pub fn stop_timeout(&self) -> Option<Duration> {
        (!self.stop_timeout.is_zero()).then_some(self.stop_timeout)
    }

    /// Returns the global process ceiling as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` live processes
    #[inline]
    pub fn process_limit(&self) -> Option<usize> {
        (self.max_processes > 0).then_some(self.max_processes)
    }

    /// Returns the shutdown grace period as an `Option`.
    ///
    /// - `None` → wait for every teardown without limit
    /// - `Some(d)` → give up after `d` with `GraceExceeded`
    #[inline]
    pub fn shutdown_grace(&self) -> Option<Duration> {
        (!self.shutdown_grace.is_zero()).then_some(self.shutdown_grace)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns a control-signal queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn signal_queue_capacity_clamped(&self) -> usize {
        self.signal_queue_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `signal_queue_capacity = 64`
    /// - `stop_timeout = 10s`
    /// - `max_processes = 256`
    /// - `refill_below_min = true`
    /// - `shutdown_grace = 30s`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            signal_queue_capacity: 64,
            stop_timeout: Duration::from_secs(10),
            max_processes: 256,
            refill_below_min: true,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sentinels() {
        let cfg = Config {
            stop_timeout: Duration::ZERO,
            max_processes: 0,
            bus_capacity: 0,
            signal_queue_capacity: 0,
            shutdown_grace: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(cfg.stop_timeout(), None);
        assert_eq!(cfg.process_limit(), None);
        assert_eq!(cfg.shutdown_grace(), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.signal_queue_capacity_clamped(), 1);
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.stop_timeout(), Some(Duration::from_secs(10)));
        assert_eq!(cfg.process_limit(), Some(256));
        assert!(cfg.refill_below_min);
    }
}
