//! The scheduler's worker thread: takes one item at a time, talks to the
//! session, consults the cache, and publishes results.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::queue::Work;
use super::{Handlers, SchedulerOptions, Shared};
use crate::error::{MailError, Result};
use crate::model::status::StatusTracker;
use crate::model::{
    Action, ActionKind, ActionResult, Header, MessageFlags, Request, Response, StatusFlags,
    StatusUpdate, Uid,
};
use crate::parser::Body;
use crate::session::{IdleEvent, Session};
use crate::store::MessageCache;

/// Pause after a failed idle wait that left the connection up.
const IDLE_RETRY_DELAY: Duration = Duration::from_secs(5);

pub(crate) struct Worker {
    shared: Arc<Shared>,
    session: Box<dyn Session>,
    cache: Box<dyn MessageCache>,
    options: SchedulerOptions,
    handlers: Handlers,
    connected: bool,
    status: StatusTracker,
}

impl Worker {
    pub fn new(
        shared: Arc<Shared>,
        session: Box<dyn Session>,
        cache: Box<dyn MessageCache>,
        options: SchedulerOptions,
        handlers: Handlers,
    ) -> Self {
        Self {
            shared,
            session,
            cache,
            options,
            handlers,
            connected: false,
            status: StatusTracker::default(),
        }
    }

    pub fn run(mut self) {
        self.set_status(StatusFlags::OFFLINE);

        while self.shared.is_running() {
            // Signals sent after this point stay raised for the idle wait.
            self.shared.wakeup.reset();

            let current = self.shared.current_folder();
            let work = self.shared.queues().next(&current);
            match work {
                Some(Work::Action(action)) => self.perform_action(action),
                Some(Work::Request(request)) => self.serve(request),
                Some(Work::Prefetch(request)) => {
                    debug!(folder = %request.folder, "Serving prefetch");
                    self.serve(request);
                }
                None => self.idle(&current),
            }
        }

        if self.connected {
            self.session.disconnect();
            self.connected = false;
        }
        debug!("Session worker exiting");
    }

    // ── Connection ──────────────────────────────────────────────

    /// Connect if configured to and not yet connected. Returns whether a
    /// live session is available.
    fn ensure_connected(&mut self) -> bool {
        if !self.options.connect {
            return false;
        }
        if self.connected {
            return true;
        }
        if self.shared.connecting.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.set_status(StatusFlags::CONNECTING);
        let result = self.session.connect();
        self.shared.connecting.store(false, Ordering::SeqCst);
        self.clear_status(StatusFlags::CONNECTING);

        match result {
            Ok(()) => {
                info!("Session connected");
                self.connected = true;
                self.clear_status(StatusFlags::OFFLINE);
                true
            }
            Err(e) => {
                warn!(error = %e, "Connect failed");
                self.set_status(StatusFlags::OFFLINE);
                false
            }
        }
    }

    /// Log a failed session call; connection-class errors drop the session
    /// so the next item reconnects.
    fn handle_failure(&mut self, what: &str, error: &MailError) {
        warn!(error = %error, "{what} failed");
        if error.is_connection_error() && self.connected {
            self.session.disconnect();
            self.connected = false;
            self.set_status(StatusFlags::OFFLINE);
        }
    }

    /// Run a session call if connected, recording its failure.
    fn call<T>(
        &mut self,
        what: &str,
        op: impl FnOnce(&mut dyn Session) -> Result<T>,
    ) -> Option<T> {
        if !self.connected {
            return None;
        }
        match op(self.session.as_mut()) {
            Ok(value) => Some(value),
            Err(e) => {
                self.handle_failure(what, &e);
                None
            }
        }
    }

    // ── Requests ────────────────────────────────────────────────

    fn serve(&mut self, request: Request) {
        let response = self.perform_request(&request);
        self.emit_response(response);
    }

    fn perform_request(&mut self, request: &Request) -> Response {
        let online = self.ensure_connected();
        if online {
            self.set_status(StatusFlags::FETCHING);
        }

        let folder = request.folder.as_str();
        let mut response = Response::for_folder(folder);

        if request.get_folders {
            response.folders = if self.connected {
                let folders = self.call("List folders", |s| s.list_folders());
                if let Some(folders) = &folders {
                    self.cache.store_folders(folders);
                }
                folders
            } else {
                self.cache.folders()
            };
        }

        if request.get_uids {
            response.uids = if self.connected {
                let uids = self.call("List uids", |s| s.list_uids(folder));
                if let Some(uids) = &uids {
                    self.cache.store_uids(folder, uids);
                }
                uids
            } else {
                self.cache.uids(folder)
            };
        }

        if !request.get_headers.is_empty() {
            response.headers = self
                .cached_or_fetched(folder, &request.get_headers, Kind::Header)
                .into_iter()
                .map(|(uid, raw)| (uid, Header::parse(raw)))
                .collect();
        }

        if !request.get_flags.is_empty() {
            response.flags = if self.connected {
                let flags =
                    self.call("Fetch flags", |s| s.fetch_flags(folder, &request.get_flags));
                if let Some(flags) = &flags {
                    self.cache.store_flags(folder, flags);
                }
                flags.unwrap_or_default()
            } else {
                self.cache.flags(folder, &request.get_flags)
            };
        }

        if !request.get_bodies.is_empty() {
            let renderer = Arc::clone(&self.options.renderer);
            response.bodies = self
                .cached_or_fetched(folder, &request.get_bodies, Kind::Body)
                .into_iter()
                .map(|(uid, raw)| (uid, Body::new(raw, Arc::clone(&renderer))))
                .collect();
        }

        self.clear_status(StatusFlags::FETCHING);
        debug!(
            folder,
            headers = response.headers.len(),
            bodies = response.bodies.len(),
            "Request served"
        );
        response
    }

    /// Raw headers or bodies for `uids`: cache hits first, the rest fetched
    /// (when online) and written back.
    fn cached_or_fetched(
        &mut self,
        folder: &str,
        uids: &BTreeSet<Uid>,
        kind: Kind,
    ) -> BTreeMap<Uid, Vec<u8>> {
        let mut found = BTreeMap::new();
        let mut missing = BTreeSet::new();
        for &uid in uids {
            let hit = match kind {
                Kind::Header => self.cache.header(folder, uid),
                Kind::Body => self.cache.body(folder, uid),
            };
            match hit {
                Some(raw) => {
                    found.insert(uid, raw);
                }
                None => {
                    missing.insert(uid);
                }
            }
        }

        if missing.is_empty() {
            return found;
        }
        let fetched = match kind {
            Kind::Header => self.call("Fetch headers", |s| s.fetch_headers(folder, &missing)),
            Kind::Body => self.call("Fetch bodies", |s| s.fetch_bodies(folder, &missing)),
        };
        for (uid, raw) in fetched.unwrap_or_default() {
            match kind {
                Kind::Header => self.cache.store_header(folder, uid, &raw),
                Kind::Body => self.cache.store_body(folder, uid, &raw),
            }
            found.insert(uid, raw);
        }
        found
    }

    // ── Actions ─────────────────────────────────────────────────

    fn perform_action(&mut self, action: Action) {
        let success = self.ensure_connected() && self.apply(&action);
        if !success {
            warn!(folder = %action.folder, kind = ?action.kind, "Action failed");
        }

        let refresh = action.refresh_request();
        self.emit_result(ActionResult { action, success });
        self.shared.queues().requests.push_back(refresh);
    }

    fn apply(&mut self, action: &Action) -> bool {
        let folder = action.folder.as_str();
        let uids = &action.uids;
        let (phase, result) = match &action.kind {
            ActionKind::MarkSeen | ActionKind::MarkUnseen => {
                let seen = action.kind == ActionKind::MarkSeen;
                self.set_status(StatusFlags::UPDATING);
                let result = self.call("Set flags", |s| s.set_seen(folder, uids, seen));
                if result.is_some() {
                    self.cache.update_flags(folder, uids, MessageFlags::SEEN, seen);
                }
                (StatusFlags::UPDATING, result)
            }
            ActionKind::Move { destination } => {
                self.set_status(StatusFlags::MOVING);
                let result = self.call("Move", |s| s.move_messages(folder, uids, destination));
                if result.is_some() {
                    self.cache.evict(folder, uids);
                }
                (StatusFlags::MOVING, result)
            }
        };
        self.clear_status(phase);
        result.is_some()
    }

    // ── Idle ────────────────────────────────────────────────────

    fn idle(&mut self, folder: &str) {
        if !self.connected {
            self.shared.wakeup.wait();
            return;
        }

        self.set_status(StatusFlags::IDLE);
        let timeout = self.options.idle_timeout;
        let wakeup = self.shared.wakeup.clone();
        let event = self.session.idle_wait(folder, &wakeup, timeout);
        self.clear_status(StatusFlags::IDLE);

        match event {
            Ok(IdleEvent::Changed) => {
                debug!(folder, "Folder changed while idle");
                self.shared.queues().requests.push_back(Request::uids(folder));
            }
            Ok(IdleEvent::Interrupted | IdleEvent::TimedOut) => {}
            Err(e) => {
                self.handle_failure("Idle", &e);
                if self.connected {
                    self.shared.wakeup.wait_timeout(IDLE_RETRY_DELAY);
                }
            }
        }
    }

    // ── Publishing ──────────────────────────────────────────────

    fn set_status(&mut self, flags: StatusFlags) {
        if let Some(update) = self.status.set(flags) {
            self.emit_status(update);
        }
    }

    fn clear_status(&mut self, flags: StatusFlags) {
        if let Some(update) = self.status.clear(flags) {
            self.emit_status(update);
        }
    }

    fn emit_status(&self, update: StatusUpdate) {
        self.shared.publish(|| (self.handlers.on_status)(update));
    }

    fn emit_response(&self, response: Response) {
        self.shared.publish(|| (self.handlers.on_response)(response));
    }

    fn emit_result(&self, result: ActionResult) {
        self.shared.publish(|| (self.handlers.on_result)(result));
    }
}

#[derive(Debug, Clone, Copy)]
enum Kind {
    Header,
    Body,
}
