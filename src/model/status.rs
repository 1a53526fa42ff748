//! Engine state published through the status callback.

use bitflags::bitflags;

bitflags! {
    /// What the engine is currently doing. Several flags may be set at once.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u32 {
        /// No live session (not yet connected, configured offline, or lost).
        const OFFLINE = 1 << 0;
        const CONNECTING = 1 << 1;
        const FETCHING = 1 << 2;
        /// Applying a flag change.
        const UPDATING = 1 << 3;
        const MOVING = 1 << 4;
        /// Waiting for server-side changes.
        const IDLE = 1 << 5;
    }
}

/// One state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Flags that were just raised.
    pub set: StatusFlags,
    /// Flags that were just lowered.
    pub cleared: StatusFlags,
    /// The full state after the transition.
    pub current: StatusFlags,
}

/// Tracks the cumulative status and produces an update per real change.
#[derive(Debug, Default)]
pub struct StatusTracker {
    current: StatusFlags,
}

impl StatusTracker {
    /// Raise `flags`; `None` if they were all already set.
    pub fn set(&mut self, flags: StatusFlags) -> Option<StatusUpdate> {
        let added = flags - self.current;
        if added.is_empty() {
            return None;
        }
        self.current |= added;
        Some(StatusUpdate {
            set: added,
            cleared: StatusFlags::empty(),
            current: self.current,
        })
    }

    /// Lower `flags`; `None` if none of them were set.
    pub fn clear(&mut self, flags: StatusFlags) -> Option<StatusUpdate> {
        let removed = flags & self.current;
        if removed.is_empty() {
            return None;
        }
        self.current -= removed;
        Some(StatusUpdate {
            set: StatusFlags::empty(),
            cleared: removed,
            current: self.current,
        })
    }
}
