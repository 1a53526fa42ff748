//! Values exchanged with the session scheduler.
//!
//! Everything here is plain owned data: callers build a [`Request`] or an
//! [`Action`], hand it over by value, and later receive a [`Response`] or an
//! [`ActionResult`] on the worker thread.

use std::collections::{BTreeMap, BTreeSet};

use bitflags::bitflags;

use super::header::Header;
use crate::parser::body::Body;

/// Server-assigned message identifier, unique within a folder.
pub type Uid = u32;

bitflags! {
    /// Per-message server flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MessageFlags: u32 {
        const SEEN = 1 << 0;
        const ANSWERED = 1 << 1;
        const FLAGGED = 1 << 2;
        const DELETED = 1 << 3;
        const DRAFT = 1 << 4;
    }
}

/// What the caller wants to know about one folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub folder: String,
    pub get_folders: bool,
    pub get_uids: bool,
    pub get_headers: BTreeSet<Uid>,
    pub get_flags: BTreeSet<Uid>,
    pub get_bodies: BTreeSet<Uid>,
}

impl Request {
    /// Empty request for `folder`; set the wanted fields afterwards.
    pub fn for_folder(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }

    /// Request that only lists the folders of the account.
    pub fn folders() -> Self {
        Self {
            get_folders: true,
            ..Self::default()
        }
    }

    /// Request that only lists the message ids of `folder`.
    pub fn uids(folder: impl Into<String>) -> Self {
        Self {
            get_uids: true,
            ..Self::for_folder(folder)
        }
    }

    /// Request the bodies of `uids` in `folder`.
    pub fn bodies(folder: impl Into<String>, uids: impl IntoIterator<Item = Uid>) -> Self {
        Self {
            get_bodies: uids.into_iter().collect(),
            ..Self::for_folder(folder)
        }
    }

    /// Request the headers of `uids` in `folder`.
    pub fn headers(folder: impl Into<String>, uids: impl IntoIterator<Item = Uid>) -> Self {
        Self {
            get_headers: uids.into_iter().collect(),
            ..Self::for_folder(folder)
        }
    }

    /// `true` when nothing at all is asked for.
    pub fn is_empty(&self) -> bool {
        !self.get_folders
            && !self.get_uids
            && self.get_headers.is_empty()
            && self.get_flags.is_empty()
            && self.get_bodies.is_empty()
    }
}

/// The single mutation an [`Action`] performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    MarkSeen,
    MarkUnseen,
    Move { destination: String },
}

/// A mutation of server state for a set of messages in one folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub folder: String,
    pub uids: BTreeSet<Uid>,
    pub kind: ActionKind,
}

impl Action {
    pub fn new(
        folder: impl Into<String>,
        uids: impl IntoIterator<Item = Uid>,
        kind: ActionKind,
    ) -> Self {
        Self {
            folder: folder.into(),
            uids: uids.into_iter().collect(),
            kind,
        }
    }

    /// The request that brings a view of the folder back in sync after this
    /// action ran.
    pub fn refresh_request(&self) -> Request {
        let mut request = Request::uids(self.folder.clone());
        if matches!(self.kind, ActionKind::MarkSeen | ActionKind::MarkUnseen) {
            request.get_flags = self.uids.clone();
        }
        request
    }
}

/// Answer to one [`Request`].
///
/// Set fields are `None` when they were not requested or the listing failed;
/// maps only contain the ids that could be fetched.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub folder: String,
    pub folders: Option<BTreeSet<String>>,
    pub uids: Option<BTreeSet<Uid>>,
    pub headers: BTreeMap<Uid, Header>,
    pub flags: BTreeMap<Uid, MessageFlags>,
    pub bodies: BTreeMap<Uid, Body>,
}

impl Response {
    pub fn for_folder(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            ..Self::default()
        }
    }
}

/// Outcome of one [`Action`], carrying the action it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionResult {
    pub action: Action,
    pub success: bool,
}
