//! Single-shot cancellable timers
//!
//! Each component owns its timers. Scheduling replaces any pending timer, so
//! only the most recently scheduled callback can fire. Callbacks still guard
//! themselves with a session generation because a timer may fire in the same
//! instant a newer session starts.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A timer that runs one callback after a delay unless cancelled first
#[derive(Debug, Default)]
pub struct CancellableTimer {
    handle: Option<JoinHandle<()>>,
}

impl CancellableTimer {
    /// Create an unarmed timer
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Arm the timer, replacing any pending callback
    ///
    /// The callback is spawned as its own task once the delay elapses, so
    /// cancelling afterwards never interrupts a callback that already started.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(callback);
        }));
    }

    /// Cancel the pending callback, if any
    ///
    /// Returns true if a timer was still waiting
    pub fn cancel(&mut self) -> bool {
        self.handle.take().is_some_and(|handle| {
            let pending = !handle.is_finished();
            handle.abort();
            pending
        })
    }

    /// Whether a callback is still waiting for its delay
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for CancellableTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Monotonic counter identifying the current session of a component
///
/// Async work captures the value when it starts and compares it on completion
/// to detect that it is no longer current.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Generation(u64);

impl Generation {
    /// Move to the next generation and return it
    pub const fn advance(&mut self) -> Self {
        self.0 += 1;
        *self
    }

    /// Raw counter value, for logging
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}
