//! # poolvisor
//!
//! **Poolvisor** supervises named *servers*, each keeping a pool of worker
//! processes between a configured minimum and maximum.
//!
//! An operator creates and aborts servers and individual workers; poolvisor
//! enforces the bounds under concurrent requests, drives every OS process
//! through spawn, ready, terminate and reap, and never leaves a record behind
//! for a process that is gone (or a live process without a record).
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   operator commands (command::parse)        OS: ready lines, exits
//!              │                                        │
//!              ▼                                        ▼
//! ┌──────────────────────────────────┐    ┌──────────────────────────┐
//! │ Supervisor (capacity engine)     │    │ reaper / announcer tasks │
//! │ - validates, reserves, selects   │    │ - one per process        │
//! │ - Registry behind one Mutex      │◄───┤ - on_reaped(), ready     │
//! └──────────────┬───────────────────┘    └────────────┬─────────────┘
//!                │ ControlSignal                        │ ControlSignal
//!                ▼                                      ▼
//!        ┌────────────────────────────────────────────────────┐
//!        │ Dispatcher (one per server, single-consumer queue) │
//!        │ Idle ⇄ AwaitingChildSignal ─► Terminating          │
//!        └──────────────────────┬─────────────────────────────┘
//!                               ▼
//!                 lifecycle: launch / terminate / reap
//!                               │
//!                               ▼
//!                 Launcher (CommandLauncher: tokio::process)
//! ```
//!
//! ### Events
//! ```text
//! Supervisor / Dispatcher / reapers ── publish ──► Bus ──► listener ──► SubscriberSet
//!                                                                   ┌─────┴─────┐
//!                                                                   ▼           ▼
//!                                                               LogWriter     custom
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                            |
//! |-------------------|----------------------------------------------------------|-----------------------------------------------|
//! | **Supervision**   | Servers, bounded worker pools, teardown, shutdown.       | [`Supervisor`], [`Bounds`], [`StatusReport`]  |
//! | **Processes**     | Pluggable process creation and signal delivery.          | [`Launcher`], [`CommandLauncher`], [`Signaller`] |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, custom).   | [`Subscribe`], [`LogWriter`]                  |
//! | **Errors**        | Typed, labelled operator errors.                         | [`SupervisorError`]                           |
//! | **Configuration** | Centralized runtime settings.                            | [`Config`]                                    |
//! | **Commands**      | Line command parser for the interactive binary.          | [`command::Command`]                          |
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use poolvisor::{CommandLauncher, Config, LogWriter, Subscribe, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
//!     let sup = Supervisor::builder(Config::default())
//!         .with_launcher(CommandLauncher::current_exe()?)
//!         .with_subscribers(subs)
//!         .build();
//!
//!     sup.create_server("web", 1, 3).await?;
//!     sup.create_worker("web").await?;
//!     println!("{}", sup.status().await);
//!
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod command;
mod core;
mod error;
mod events;
pub mod logging;
mod process;
mod subscribers;

pub use core::{
    Bounds, Config, ServerId, ServerState, ServerStatus, StatusReport, Supervisor,
    SupervisorBuilder, WorkerId, WorkerState, wait_for_shutdown_signal,
};
pub use error::SupervisorError;
pub use events::{Bus, Event, EventKind};
pub use process::{
    CommandLauncher, ExitReason, Launcher, READY_LINE, ROLE_SUBCOMMAND, Role, Signaller, Spawned,
    run_role,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
