use crate::context::{CallContext, CallInfo, CancelState, Cause, ContextError};
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// The per-task context handed to the endpoint and returned to the caller.
///
/// It overlays the caller's [`CallContext`] with the submission timeout and a
/// task-local done channel. The effective deadline is the earlier of the
/// parent's deadline and now + timeout; a zero timeout imposes nothing beyond
/// the parent.
///
/// Cancellation is cooperative: closing the done channel is a request, not an
/// interruption. An endpoint that never looks at [`done`] runs to completion
/// and its late result is discarded.
///
/// A fresh `TaskContext` is allocated for every submission, even when the
/// task object that carries it is pooled, because the caller may hold on to
/// the context indefinitely after the call returns.
///
/// [`done`]: TaskContext::done
#[derive(Debug, Clone)]
pub struct TaskContext {
    inner: Arc<TaskContextInner>,
}

#[derive(Debug)]
struct TaskContextInner {
    parent: CallContext,
    deadline: Option<Instant>,
    state: CancelState,
}

impl TaskContext {
    pub(crate) fn new(parent: CallContext, timeout: Duration) -> Self {
        let mut deadline = parent.deadline();
        if timeout > Duration::ZERO {
            let local = Instant::now() + timeout;
            deadline = Some(match deadline {
                // The parent wins unless the local deadline is sooner.
                Some(inherited) if inherited <= local => inherited,
                _ => local,
            });
        }
        TaskContext {
            inner: Arc::new(TaskContextInner {
                parent,
                deadline,
                state: CancelState::new(),
            }),
        }
    }

    /// The effective deadline, or `None` when neither the parent nor the
    /// submission set one.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// The task-local done channel. It closes when the task terminates for
    /// any reason: completion, error, deadline, or parent cancellation. This
    /// is distinct from the parent's channel, which only the caller closes.
    pub fn done(&self) -> &Receiver<()> {
        self.inner.state.done()
    }

    pub fn parent(&self) -> &CallContext {
        &self.inner.parent
    }

    pub fn info(&self) -> Option<&CallInfo> {
        self.inner.parent.info()
    }

    /// Records `err` as the terminal state and closes the done channel.
    /// The first recorded cause wins; later calls are no-ops.
    pub fn cancel(&self, err: ContextError) {
        self.inner.state.cancel(Cause::Err(err));
    }

    /// Closes the done channel for clean completion, without surfacing an
    /// error through [`err`].
    ///
    /// [`err`]: TaskContext::err
    pub(crate) fn finish(&self) {
        self.inner.state.cancel(Cause::Finished);
    }

    /// The terminal error, if the task ended in one. Clean completion
    /// reports `None`; an unset local state defers to the parent.
    pub fn err(&self) -> Option<ContextError> {
        match self.inner.state.cause() {
            Some(Cause::Err(err)) => Some(err),
            Some(Cause::Finished) | None => self.inner.parent.err(),
        }
    }
}
