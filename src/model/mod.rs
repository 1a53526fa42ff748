//! Data exchanged between the scheduler and its callers.

pub mod header;
pub mod request;
pub mod status;

pub use header::Header;
pub use request::{Action, ActionKind, ActionResult, MessageFlags, Request, Response, Uid};
pub use status::{StatusFlags, StatusUpdate};
