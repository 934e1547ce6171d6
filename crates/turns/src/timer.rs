//! Deferred callbacks with single-shot, idempotent cancellation.
//!
//! Each scheduled callback runs on its own tokio task. The task and every
//! clone of its [`CancellationToken`] share one state cell that moves from
//! pending to either cancelled or fired exactly once.

use std::{
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use tokio::{runtime::Handle, task::AbortHandle};

use crate::error::TimerError;

const PENDING: u8 = 0;
const CANCELLED: u8 = 1;
const FIRED: u8 = 2;

#[derive(Debug)]
struct TokenState {
    state: AtomicU8,
    task: OnceLock<AbortHandle>,
}

#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

impl CancellationToken {
    fn new() -> Self {
        Self {
            inner: Arc::new(TokenState {
                state: AtomicU8::new(PENDING),
                task: OnceLock::new(),
            }),
        }
    }

    /// Returns `true` when this call prevented the callback from running.
    /// Later calls, and calls after the timer fired, return `false`.
    pub fn cancel(&self) -> bool {
        let cancelled = self.transition(CANCELLED);
        if cancelled {
            if let Some(task) = self.inner.task.get() {
                task.abort();
            }
        }
        cancelled
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn has_fired(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == FIRED
    }

    fn fire(&self) -> bool {
        self.transition(FIRED)
    }

    fn transition(&self, to: u8) -> bool {
        self.inner
            .state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[derive(Debug, Clone)]
pub struct TimerService {
    handle: Handle,
}

impl TimerService {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Binds to the runtime the caller is running on.
    pub fn current() -> Result<Self, TimerError> {
        Ok(Self::new(Handle::try_current()?))
    }

    /// Runs `on_fire` once `after` has elapsed, unless the returned token is
    /// cancelled first.
    pub fn schedule<F>(&self, after: Duration, on_fire: F) -> CancellationToken
    where
        F: FnOnce() + Send + 'static,
    {
        let token = CancellationToken::new();
        let guard = token.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(after).await;
            if guard.fire() {
                on_fire();
            }
        });
        // A cancel that lands before the handle is stored still wins the
        // state transition, so the task exits without firing.
        let _ = token.inner.task.set(task.abort_handle());
        token
    }

    pub fn cancel(&self, token: &CancellationToken) -> bool {
        token.cancel()
    }
}

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
mod tests;
