//! One endpoint invocation: its slots, its result, and its lifecycle.
//!
//! A [`Task`] is created per submission, handed to whichever thread will run
//! it, and waited on by the submitter. `run` and `wait` race through the
//! task's context: whichever terminal event fires first (endpoint return,
//! deadline, parent cancellation) becomes the reported outcome. Task objects
//! are recycled through a process-wide free list once both sides are done
//! with them.

use crate::context::{CallContext, ContextError, TaskContext};
use crate::utils::{Latch, ScopeGuard};
use crossbeam_channel::select;
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::error;

// Public API
mod errors;
pub use errors::{PanicError, TaskError};


/// An opaque request or response slot, the shared-pointer shape RPC
/// runtimes pass through the pool. Callers that need the endpoint to write
/// into the response supply their own interior mutability.
pub type TaskValue = Arc<dyn Any + Send + Sync>;

/// One endpoint invocation. Returning `Ok(())` is success. The endpoint is
/// expected to watch `ctx.done()` to be timely under cancellation; panics
/// are contained by the pool.
pub type Endpoint = Arc<
    dyn Fn(&TaskContext, Option<&TaskValue>, Option<&TaskValue>) -> Result<(), anyhow::Error>
        + Send
        + Sync,
>;

/// Everything `run` needs to make the call, taken out of the task in one
/// piece so no lock is held while the endpoint executes.
struct Call {
    req: Option<TaskValue>,
    resp: Option<TaskValue>,
    ep: Endpoint,
}

/// Upper bound on cached task objects. Beyond this, retired tasks are
/// simply dropped.
const FREE_LIST_CAPACITY: usize = 256;

/// Process-wide cache of retired task allocations. Entries are pushed fully
/// reset; an entry is only reused while the queue holds the sole strong
/// reference to it.
static FREE_TASKS: LazyLock<ArrayQueue<Arc<Task>>> =
    LazyLock::new(|| ArrayQueue::new(FREE_LIST_CAPACITY));

/// Allocates a task for one submission, reusing a retired allocation when
/// one is available.
///
/// The [`TaskContext`] is always built fresh: the submitter may keep the
/// context returned from `wait` long after this task object has been
/// recycled into another invocation.
pub(crate) fn new_task(
    parent: CallContext,
    timeout: Duration,
    req: Option<TaskValue>,
    resp: Option<TaskValue>,
    ep: Endpoint,
) -> Arc<Task> {
    let task = FREE_TASKS
        .pop()
        .filter(|task| Arc::strong_count(task) == 1)
        .unwrap_or_else(|| Arc::new(Task::vacant()));

    *task.ctx.lock() = Some(TaskContext::new(parent, timeout));
    *task.call.lock() = Some(Call { req, resp, ep });
    *task.err.lock() = None;
    // Armed for the one `wait` call; recycling blocks until it has returned.
    task.waited.arm();
    task
}

/// A single endpoint invocation in flight.
///
/// `run` is called exactly once, on whatever thread executes the task.
/// `wait` is called exactly once, by the submitter. The latch orders the
/// two: the runner's cleanup cannot reset the slots before the waiter has
/// read the result out of them.
pub(crate) struct Task {
    /// Fresh per invocation, never recycled with the task.
    ctx: Mutex<Option<TaskContext>>,

    /// Call slots, consumed by `run`.
    call: Mutex<Option<Call>>,

    /// Terminal error slot, first writer wins.
    err: Mutex<Option<TaskError>>,

    /// Released by `wait` on return.
    waited: Latch,
}

impl Task {
    fn vacant() -> Self {
        Task {
            ctx: Mutex::new(None),
            call: Mutex::new(None),
            err: Mutex::new(None),
            waited: Latch::new(),
        }
    }

    fn context(&self) -> TaskContext {
        self.ctx.lock().clone().expect("task has no armed context")
    }

    fn record_err(&self, err: TaskError) {
        let mut slot = self.err.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Forwards a cancellation to the task's context.
    pub(crate) fn cancel(&self, err: ContextError) {
        self.context().cancel(err);
    }

    /// Executes the endpoint. Must be called in its own execution context,
    /// never on the submitting thread.
    ///
    /// Panics from the endpoint are contained and converted into a
    /// [`PanicError`]. On every path the task context is closed so waiters
    /// wake, and the task is retired for reuse.
    pub(crate) fn run(self: &Arc<Self>) {
        let ctx = self.context();
        let Call { req, resp, ep } = self.call.lock().take().expect("task already ran");

        match panic::catch_unwind(AssertUnwindSafe(|| ep(&ctx, req.as_ref(), resp.as_ref()))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => self.record_err(TaskError::Endpoint(err)),
            Err(payload) => {
                let err = PanicError::new(&ctx, payload);
                error!(payload = err.payload(), "contained an endpoint panic");
                self.record_err(TaskError::Panic(err));
            }
        }

        ctx.finish();
        self.recycle();
    }

    /// Blocks until the task terminates: the endpoint returned, the
    /// effective deadline elapsed, or the caller's context was canceled.
    /// Must be called exactly once, by the submitter.
    ///
    /// Returns the task's context and the terminal result. The context
    /// outlives the task object and may be retained freely.
    pub(crate) fn wait(self: &Arc<Self>) -> (TaskContext, Result<(), TaskError>) {
        // Unblock recycling on every return path.
        let _release = ScopeGuard::new(|| self.waited.count_down());

        let ctx = self.context();
        match ctx.deadline() {
            None => self.wait_done(&ctx),
            // Already expired: report it without blocking. The endpoint may
            // still run; its late result is discarded.
            Some(deadline) if deadline <= Instant::now() => {
                self.cancel(ContextError::DeadlineExceeded);
            }
            Some(deadline) => self.wait_deadline(&ctx, deadline),
        }

        // The endpoint's own outcome (error or panic) takes precedence; an
        // empty slot means the context decides, and clean completion is
        // filtered there.
        let result = match self.err.lock().take() {
            Some(err) => Err(err),
            None => match ctx.err() {
                Some(err) => Err(err.into()),
                None => Ok(()),
            },
        };
        (ctx, result)
    }

    fn wait_done(&self, ctx: &TaskContext) {
        let done = ctx.done();
        let parent_done = ctx.parent().done();
        select! {
            recv(done) -> _ => {},
            recv(parent_done) -> _ => {
                self.cancel(ctx.parent().err().unwrap_or(ContextError::Canceled));
            },
        }
    }

    fn wait_deadline(&self, ctx: &TaskContext, deadline: Instant) {
        let timer = crossbeam_channel::at(deadline);
        let done = ctx.done();
        let parent_done = ctx.parent().done();
        select! {
            recv(done) -> _ => {},
            recv(parent_done) -> _ => {
                self.cancel(ctx.parent().err().unwrap_or(ContextError::Canceled));
            },
            recv(timer) -> _ => {
                self.cancel(ContextError::DeadlineExceeded);
            },
        }
    }

    /// Resets the task and returns it to the free list. Blocks until the
    /// waiter has released the latch, so the result slots are never cleared
    /// under a live `wait`.
    fn recycle(self: &Arc<Self>) {
        self.waited.wait();

        *self.ctx.lock() = None;
        *self.call.lock() = None;
        // Drops any result the endpoint produced after cancellation.
        *self.err.lock() = None;

        let _ = FREE_TASKS.push(self.clone());
    }
}
