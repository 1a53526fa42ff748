//! Local storage of fetched mailbox data.

pub mod cache;

pub use cache::{MemoryCache, MessageCache, NoCache};
