//! Sticky cross-thread wakeup signal.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// A flag plus condition variable shared between the scheduler's callers and
/// its worker.
///
/// Signals are sticky: a signal sent while nobody waits is seen by the next
/// wait, and any number of signals before a reset collapse into one.
#[derive(Debug, Clone, Default)]
pub struct Wakeup {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter.
    pub fn signal(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    /// Lower the flag.
    pub fn reset(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = false;
    }

    pub fn is_signaled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the flag is raised.
    pub fn wait(&self) {
        let (lock, cvar) = &*self.inner;
        let mut signaled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*signaled {
            signaled = cvar.wait(signaled).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the flag is raised or `timeout` elapses. Returns whether
    /// the flag was raised.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, cvar) = &*self.inner;
        let mut signaled = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !*signaled {
            let Some(left) = deadline.checked_duration_since(Instant::now()) else {
                break;
            };
            signaled = cvar
                .wait_timeout(signaled, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *signaled
    }
}
