//! Cancellation contexts for pool submissions.
//!
//! A [`CallContext`] is what the caller hands to the pool: an optional
//! deadline, optional RPC metadata, and a done channel the caller can close
//! by calling [`CallContext::cancel`]. The pool overlays it with a
//! [`TaskContext`] that adds the per-task timeout and a task-local done
//! channel, so a waiter can tell "the endpoint finished" apart from "the
//! caller gave up" in a single `select!`.

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

// Public API
mod errors;
pub use errors::ContextError;

mod task;
pub use task::TaskContext;

#[cfg(test)]
mod tests;

/// Why a context's done channel was closed.
///
/// `Finished` marks clean completion: the channel closes so waiters wake, but
/// `err()` must not surface it to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cause {
    Finished,
    Err(ContextError),
}

/// The closeable half of a context: a zero-capacity channel whose sender is
/// dropped on the first cancellation, plus the recorded cause.
///
/// Dropping the sender is the broadcast: every `recv` on the receiver, in a
/// bare call or inside `select!`, returns an error once the channel is
/// disconnected.
#[derive(Debug)]
pub(crate) struct CancelState {
    rx: Receiver<()>,
    inner: Mutex<CancelStateInner>,
}

#[derive(Debug)]
struct CancelStateInner {
    cause: Option<Cause>,
    tx: Option<Sender<()>>,
}

impl CancelState {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        CancelState {
            rx,
            inner: Mutex::new(CancelStateInner {
                cause: None,
                tx: Some(tx),
            }),
        }
    }

    pub(crate) fn done(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Records `cause` and closes the done channel. First writer wins;
    /// later calls are no-ops.
    pub(crate) fn cancel(&self, cause: Cause) {
        let mut inner = self.inner.lock();
        if inner.cause.is_some() {
            return;
        }
        inner.cause = Some(cause);
        inner.tx.take();
    }

    pub(crate) fn cause(&self) -> Option<Cause> {
        self.inner.lock().cause
    }
}

/// RPC metadata describing the invocation a context belongs to.
///
/// Attached to a [`CallContext`] by the client runtime; the pool only reads
/// it back when converting a contained panic into an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub service: String,
    pub method: String,
}

impl CallInfo {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        CallInfo {
            service: service.into(),
            method: method.into(),
        }
    }
}

/// The caller-supplied context for one pool submission.
///
/// Cheap to clone; all clones observe the same cancellation. The deadline is
/// advisory: no timer thread is spawned for it, enforcement happens in the
/// task's wait path, which folds it into the effective deadline.
#[derive(Debug, Clone)]
pub struct CallContext {
    inner: Arc<CallContextInner>,
}

#[derive(Debug)]
struct CallContextInner {
    deadline: Option<Instant>,
    state: CancelState,
    info: OnceLock<CallInfo>,
}

impl CallContext {
    /// A context that is never canceled and carries no deadline.
    pub fn background() -> Self {
        Self::with_opt_deadline(None)
    }

    /// A context whose effective deadline will not exceed `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::with_opt_deadline(Some(deadline))
    }

    /// A context whose effective deadline will not exceed now + `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    fn with_opt_deadline(deadline: Option<Instant>) -> Self {
        CallContext {
            inner: Arc::new(CallContextInner {
                deadline,
                state: CancelState::new(),
                info: OnceLock::new(),
            }),
        }
    }

    /// Attaches RPC metadata. The first value sticks; later calls are no-ops.
    pub fn with_info(self, info: CallInfo) -> Self {
        let _ = self.inner.info.set(info);
        self
    }

    pub fn info(&self) -> Option<&CallInfo> {
        self.inner.info.get()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// The done channel. Blocked receives wake with a disconnect error once
    /// the context is canceled.
    pub fn done(&self) -> &Receiver<()> {
        self.inner.state.done()
    }

    /// Cancels the context, recording [`ContextError::Canceled`] and waking
    /// every receiver of [`done`]. Idempotent.
    ///
    /// [`done`]: CallContext::done
    pub fn cancel(&self) {
        self.inner.state.cancel(Cause::Err(ContextError::Canceled));
    }

    /// The context's terminal error: the recorded cancellation if there is
    /// one, otherwise `DeadlineExceeded` once the deadline has passed.
    pub fn err(&self) -> Option<ContextError> {
        match self.inner.state.cause() {
            Some(Cause::Err(err)) => Some(err),
            Some(Cause::Finished) | None => match self.inner.deadline {
                Some(deadline) if deadline <= Instant::now() => {
                    Some(ContextError::DeadlineExceeded)
                }
                _ => None,
            },
        }
    }
}
