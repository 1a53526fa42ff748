//! The blocking mailbox session the scheduler drives.
//!
//! Implementations wrap a real protocol connection (IMAP or similar); the
//! scheduler only ever calls them from its worker thread, one call at a time.

mod wakeup;

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use crate::error::Result;
use crate::model::{MessageFlags, Uid};

pub use wakeup::Wakeup;

/// How an [`Session::idle_wait`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleEvent {
    /// The server reported a change in the watched folder.
    Changed,
    /// The wakeup signal was raised.
    Interrupted,
    TimedOut,
}

/// Synchronous mailbox primitives.
///
/// Every call may block on the network. Errors for which
/// [`MailError::is_connection_error`](crate::error::MailError::is_connection_error)
/// holds make the scheduler drop the connection and reconnect on the next
/// queued item.
pub trait Session: Send {
    fn connect(&mut self) -> Result<()>;

    /// Close the connection. Must be harmless when not connected.
    fn disconnect(&mut self);

    fn list_folders(&mut self) -> Result<BTreeSet<String>>;

    fn list_uids(&mut self, folder: &str) -> Result<BTreeSet<Uid>>;

    /// Raw header blocks. Ids the server does not know are left out.
    fn fetch_headers(
        &mut self,
        folder: &str,
        uids: &BTreeSet<Uid>,
    ) -> Result<BTreeMap<Uid, Vec<u8>>>;

    fn fetch_flags(
        &mut self,
        folder: &str,
        uids: &BTreeSet<Uid>,
    ) -> Result<BTreeMap<Uid, MessageFlags>>;

    /// Complete raw messages. Ids the server does not know are left out.
    fn fetch_bodies(
        &mut self,
        folder: &str,
        uids: &BTreeSet<Uid>,
    ) -> Result<BTreeMap<Uid, Vec<u8>>>;

    fn set_seen(&mut self, folder: &str, uids: &BTreeSet<Uid>, seen: bool) -> Result<()>;

    fn move_messages(
        &mut self,
        folder: &str,
        uids: &BTreeSet<Uid>,
        destination: &str,
    ) -> Result<()>;

    /// Watch `folder` until it changes, `wakeup` is signaled, or `timeout`
    /// passes. Implementations must return promptly once `wakeup` is raised.
    fn idle_wait(
        &mut self,
        folder: &str,
        wakeup: &Wakeup,
        timeout: Duration,
    ) -> Result<IdleEvent>;
}
