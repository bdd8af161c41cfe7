//! # Core runtime: supervisor, registry, dispatcher and process lifecycle.
//!
//! - [`Supervisor`] the public API and capacity engine
//! - `registry` keyed server/worker records and the pid index
//! - `dispatcher` per-server control-signal actor
//! - `lifecycle` spawn, terminate and reap
//! - `shutdown` OS termination signal handling
//! - [`Config`] runtime settings

mod builder;
mod config;
mod dispatcher;
mod lifecycle;
mod registry;
pub(crate) mod shutdown;
mod status;
mod supervisor;


pub use builder::SupervisorBuilder;
pub use config::Config;
pub use registry::{Bounds, ServerId, ServerState, WorkerId, WorkerState};
pub use shutdown::wait_for_shutdown_signal;
pub use status::{ServerStatus, StatusReport};
pub use supervisor::Supervisor;
