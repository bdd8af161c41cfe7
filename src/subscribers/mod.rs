//! # Event subscribers for the poolvisor runtime.
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Dispatcher ── publish(Event) ──► Bus ──► Supervisor listener ──► SubscriberSet
//!                                                                        │
//!                                                            ┌───────────┼──────────┐
//!                                                            ▼           ▼          ▼
//!                                                        LogWriter    Metrics    Custom
//! ```

mod embedded;
mod subscriber;
mod subscriber_set;

pub use embedded::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
