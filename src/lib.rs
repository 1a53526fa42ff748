//! `mailshell` — the engine of a terminal mail client.
//!
//! Two halves:
//! - [`scheduler`]: a queue-based, non-blocking front end that serializes
//!   every call on a blocking [`session::Session`] through one worker
//!   thread, with a [`store::MessageCache`] in front of it.
//! - [`parser`]: the body extractor that turns raw message bytes into an
//!   index of decoded parts plus plain-text and rendered-HTML views.

pub mod config;
pub mod error;
pub mod model;
pub mod parser;
pub mod scheduler;
pub mod session;
pub mod store;

pub use scheduler::{Handlers, Scheduler, SchedulerOptions};
