//! Cancellable debounce timer
//!
//! Used for idle auto-disconnect of tool connections and for coalescing
//! storage change notifications. Runs on tokio's clock, so tests can
//! fast-forward it with `tokio::time::pause` / `advance`.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Debounce timer with arm / reset / cancel
///
/// Arming replaces any pending action, so only the last action armed
/// within the window runs. The action runs detached from the timer: once
/// it has started, `cancel()` no longer interrupts it.
pub struct DebounceTimer {
    delay: Duration,
    inner: Arc<TimerInner>,
}

struct TimerInner {
    generation: AtomicU64,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl DebounceTimer {
    /// Create a timer with the given quiet window
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            inner: Arc::new(TimerInner {
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Quiet window
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule `action` after the quiet window, replacing any pending one
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F, Fut>(&self, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(&self.inner);
        let delay = self.delay;

        let mut pending = self.inner.pending.lock();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut pending = inner.pending.lock();
                if inner.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                // Detach ourselves so a cancel() issued by the action
                // cannot abort the action mid-flight.
                pending.take();
            }
            action().await;
        });
        if let Some(previous) = pending.replace(handle) {
            previous.abort();
        }
    }

    /// Drop the pending action, if any
    pub fn cancel(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = self.inner.pending.lock().take() {
            previous.abort();
        }
    }

    /// Check whether an action is waiting for its window to elapse
    pub fn is_armed(&self) -> bool {
        self.inner.pending.lock().is_some()
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for DebounceTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DebounceTimer")
            .field("delay", &self.delay)
            .field("armed", &self.is_armed())
            .finish()
    }
}
