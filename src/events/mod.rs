//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by the supervisor, the
//! per-server dispatchers, reaper tasks and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` operations, `Dispatcher`, lifecycle reapers,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Supervisor::subscriber_listener()` (fans out to `SubscriberSet`).
//!
//! Events are observability only: counters and records live in the registry,
//! never in event payloads.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
