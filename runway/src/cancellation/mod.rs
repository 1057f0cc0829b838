//! Cooperative cancellation and the post-phase guard.
//!
//! Cancellation is checked between commands only; a child process already in
//! flight is never interrupted, since interruption semantics are specific to
//! the external tool being driven.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Token for requesting cancellation of a run.
///
/// Cancellation is idempotent; the first reason wins.
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: Mutex<Option<String>>,
    callbacks: Mutex<Vec<Box<dyn FnOnce(String) + Send>>>,
}

impl CancellationToken {
    /// Creates a new shared cancellation token.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Requests cancellation with a reason.
    pub fn cancel(&self, reason: impl Into<String>) {
        let reason = reason.into();

        if !self.cancelled.swap(true, Ordering::SeqCst) {
            *self.reason.lock() = Some(reason.clone());

            let callbacks: Vec<_> = {
                let mut lock = self.callbacks.lock();
                std::mem::take(&mut *lock)
            };

            for callback in callbacks {
                // Panics in callbacks must not poison the cancel path.
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback(reason.clone());
                }))
                .ok();
            }
        }
    }

    /// Registers a callback to run on cancellation.
    ///
    /// If already cancelled, the callback is invoked immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce(String) + Send + 'static,
    {
        if self.is_cancelled() {
            callback(self.reason().unwrap_or_default());
        } else {
            self.callbacks.lock().push(Box::new(callback));
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            reason: Mutex::new(None),
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

/// Guard that runs a closure when dropped, unless disarmed.
///
/// The executor arms one of these before entering the stage loop so the
/// always-phase is triggered even when the run future is dropped between
/// stage failure and post-processing.
pub struct CleanupGuard {
    cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl CleanupGuard {
    /// Creates a new armed guard.
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    /// Disarms the guard; the closure will not run on drop.
    pub fn disarm(&mut self) {
        self.cleanup = None;
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl std::fmt::Debug for CleanupGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupGuard")
            .field("armed", &self.cleanup.is_some())
            .finish()
    }
}
