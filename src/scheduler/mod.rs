//! Session scheduler: a non-blocking queue front end over one blocking
//! [`Session`], drained by a single worker thread.
//!
//! Callers enqueue [`Request`]s and [`Action`]s from any thread and get
//! [`Response`]s, [`ActionResult`]s and [`StatusUpdate`]s back through the
//! [`Handlers`] given at construction. The handlers run on the worker
//! thread.

mod queue;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::{MailError, Result};
use crate::model::{Action, ActionResult, Request, Response, StatusUpdate};
use crate::parser::render::{self, BuiltinRenderer, HtmlRenderer};
use crate::session::{Session, Wakeup};
use crate::store::MessageCache;

use queue::Queues;
use worker::Worker;

/// Callbacks through which the worker publishes its results.
pub struct Handlers {
    pub on_response: Box<dyn Fn(Response) + Send>,
    pub on_result: Box<dyn Fn(ActionResult) + Send>,
    pub on_status: Box<dyn Fn(StatusUpdate) + Send>,
}

impl Default for Handlers {
    fn default() -> Self {
        Self {
            on_response: Box::new(|_| {}),
            on_result: Box::new(|_| {}),
            on_status: Box::new(|_| {}),
        }
    }
}

/// How the scheduler runs its session.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// When `false` the session is never touched and only cached data is
    /// served.
    pub connect: bool,
    /// Folder watched while idle until [`Scheduler::set_current_folder`].
    pub initial_folder: String,
    /// Upper bound for one idle wait before it is restarted.
    pub idle_timeout: Duration,
    /// Renderer attached to every delivered [`Body`](crate::parser::Body).
    pub renderer: Arc<dyn HtmlRenderer>,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            connect: true,
            initial_folder: "INBOX".to_string(),
            idle_timeout: Duration::from_secs(1200),
            renderer: Arc::new(BuiltinRenderer),
        }
    }
}

impl SchedulerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            connect: config.session.connect,
            initial_folder: config.session.initial_folder.clone(),
            idle_timeout: config.session.idle_timeout(),
            renderer: render::renderer_from_config(&config.render),
        }
    }
}

/// State shared between the public handle and the worker.
pub(crate) struct Shared {
    queues: Mutex<Queues>,
    current_folder: Mutex<String>,
    running: AtomicBool,
    connecting: AtomicBool,
    wakeup: Wakeup,
    /// Held across the running check and the callback so that no callback
    /// starts once `stop` has returned.
    publishing: Mutex<()>,
}

impl Shared {
    fn new(initial_folder: &str) -> Self {
        Self {
            queues: Mutex::new(Queues::default()),
            current_folder: Mutex::new(initial_folder.to_string()),
            running: AtomicBool::new(true),
            connecting: AtomicBool::new(false),
            wakeup: Wakeup::new(),
            publishing: Mutex::new(()),
        }
    }

    fn queues(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_folder(&self) -> String {
        self.current_folder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run `callback` unless the scheduler has been stopped.
    fn publish(&self, callback: impl FnOnce()) {
        let _guard = self.publishing.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_running() {
            callback();
        }
    }

    /// Clear the running flag, waiting for a callback in progress.
    fn stop(&self) {
        let _guard = self.publishing.lock().unwrap_or_else(PoisonError::into_inner);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Handle to a running scheduler. Dropping it shuts the worker down.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Start the worker thread. It owns `session` and `cache` from now on.
    pub fn new(
        session: Box<dyn Session>,
        cache: Box<dyn MessageCache>,
        options: SchedulerOptions,
        handlers: Handlers,
    ) -> Result<Self> {
        let shared = Arc::new(Shared::new(&options.initial_folder));

        info!(
            connect = options.connect,
            folder = %options.initial_folder,
            "Starting session scheduler"
        );
        let worker = Worker::new(Arc::clone(&shared), session, cache, options, handlers);
        let handle = thread::Builder::new()
            .name("mailshell-worker".to_string())
            .spawn(move || worker.run())
            .map_err(|e| MailError::Worker(e.to_string()))?;

        Ok(Self {
            shared,
            worker: Some(handle),
        })
    }

    /// Queue a request; its [`Response`] is delivered through `on_response`.
    pub fn async_request(&self, request: Request) {
        debug!(folder = %request.folder, "Queued request");
        self.shared.queues().requests.push_back(request);
        self.shared.wakeup.signal();
    }

    /// Queue a background request, served only when nothing else is pending.
    pub fn prefetch_request(&self, request: Request) {
        debug!(folder = %request.folder, "Queued prefetch");
        self.shared.queues().prefetch.push_back(request);
        self.shared.wakeup.signal();
    }

    /// Queue a mutation; its [`ActionResult`] goes to `on_result`.
    pub fn async_action(&self, action: Action) {
        debug!(folder = %action.folder, kind = ?action.kind, "Queued action");
        self.shared.queues().actions.push_back(action);
        self.shared.wakeup.signal();
    }

    /// Change the folder watched while idle and preferred for prefetch.
    pub fn set_current_folder(&self, folder: impl Into<String>) {
        let folder = folder.into();
        debug!(folder = %folder, "Current folder changed");
        *self
            .shared
            .current_folder
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = folder;
        // Restart any idle wait on the new folder.
        self.shared.wakeup.signal();
    }

    pub fn current_folder(&self) -> String {
        self.shared.current_folder()
    }

    /// `true` while the worker is establishing a connection.
    pub fn is_connecting(&self) -> bool {
        self.shared.connecting.load(Ordering::SeqCst)
    }

    /// Number of items not yet taken by the worker.
    pub fn pending(&self) -> usize {
        self.shared.queues().len()
    }

    /// Stop the worker and wait for it. Queued items that were not started
    /// are dropped and no callback starts after this returns.
    ///
    /// Must not be called from inside a handler.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.stop();
        self.shared.wakeup.signal();
        if handle.join().is_err() {
            error!("Session worker panicked");
        }
        info!("Session scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.session.connect = false;
        config.session.initial_folder = "Archive".to_string();
        config.session.idle_timeout_secs = 30;
        config.render.builtin = true;

        let options = SchedulerOptions::from_config(&config);
        assert!(!options.connect);
        assert_eq!(options.initial_folder, "Archive");
        assert_eq!(options.idle_timeout, Duration::from_secs(30));
        assert_eq!(format!("{:?}", options.renderer), "BuiltinRenderer");
    }

    #[test]
    fn test_publish_stops_after_stop() {
        let shared = Shared::new("INBOX");
        let mut calls = 0;
        shared.publish(|| calls += 1);
        shared.stop();
        shared.publish(|| calls += 1);
        assert_eq!(calls, 1);
        assert!(!shared.is_running());
    }
}
