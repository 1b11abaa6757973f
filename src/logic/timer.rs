//! Deferred Task - single-shot cancellable timer
//!
//! Runs a closure once after a delay on a tokio runtime. Cancellation is
//! idempotent and a cancelled task never runs its closure.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// Deadlines past `now + MAX_DELAY` are clamped to it
const MAX_DELAY: Duration = Duration::from_secs(86_400 * 365);

pub struct DeferredTask {
    id: u64,
    handle: AbortHandle,
    cancelled: bool,
}

impl DeferredTask {
    /// Schedule `f` to run once after `delay`. Delays beyond what the clock
    /// can represent are clamped rather than overflowing.
    pub fn schedule<F>(runtime: &Handle, id: u64, delay: Duration, f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let now = Instant::now();
        let deadline = now
            .checked_add(delay.min(MAX_DELAY))
            .unwrap_or(now);
        let join = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            f();
        });

        Self {
            id,
            handle: join.abort_handle(),
            cancelled: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancel the task. Returns `true` only on the first call.
    pub fn cancel(&mut self) -> bool {
        if self.cancelled {
            return false;
        }
        self.cancelled = true;
        self.handle.abort();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl std::fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTask")
            .field("id", &self.id)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}
