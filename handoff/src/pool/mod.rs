//! A bounded pool of reusable workers for deadline-bound endpoint calls.
//!
//! The pool keeps a small population of resident worker threads blocked on a
//! zero-capacity rendezvous channel. A submission is first offered to an
//! idle worker with a non-blocking send; failing that, a new worker is
//! spawned while the population is under its ceiling; failing that too, the
//! task runs on a detached thread. Workers reap themselves: a periodic
//! sentinel on the shared channel wakes exactly one idle worker to check how
//! long it has been without work.
//!
//! Because the channel is unbuffered, a submission can never queue up behind
//! a stuck worker, and the sentinel can never preempt a worker that is
//! executing a task.

use crate::context::{CallContext, TaskContext};
use crate::task::{self, Endpoint, Task, TaskError, TaskValue};
use crate::utils::ScopeGuard;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

// Public API
mod builder;
pub use builder::Builder;
use builder::ThreadNameFn;

mod reaper;


/// What travels over the rendezvous channel.
pub(crate) enum Job {
    /// A task handed off to an idle worker.
    Task(Arc<Task>),

    /// Sentinel wakeup: the receiving worker checks its own idle time and
    /// exits if it has been unused for too long.
    Noop,
}

/// A worker pool for endpoint calls with a timeout.
///
/// Workers are real OS threads that block on the handoff channel between
/// tasks, so reuse stays high under steady load while the population drains
/// to zero when traffic stops. There is no shutdown call: dropping the last
/// `Pool` handle stops new submissions, and the remaining workers idle out
/// on their own.
#[derive(Debug)]
pub struct Pool {
    shared: Arc<Shared>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    /// Number of live workers.
    size: AtomicI32,

    /// The rendezvous handoff point between submitters, workers, and the
    /// reaper. Zero capacity: a send completes only when a worker is
    /// already blocked on the other side.
    job_tx: Sender<Job>,
    job_rx: Receiver<Job>,

    /// Resident-worker ceiling. Too small and the pool degrades into plain
    /// detached threads.
    max_idle: i32,

    /// Idle duration after which a worker exits.
    max_idle_time: Duration,

    /// Stop signal for the currently running reaper loop, replaced on every
    /// empty-to-non-empty transition.
    reaper_stop: Mutex<Option<Sender<()>>>,

    thread_name: ThreadNameFn,
    thread_stack_size: Option<usize>,
}

impl Pool {
    /// Creates a pool with the given resident-worker ceiling and idle
    /// timeout.
    ///
    /// # Panics
    ///
    /// Panics if `max_idle` is 0 or `max_idle_time` is zero.
    pub fn new(max_idle: usize, max_idle_time: Duration) -> Self {
        Builder::new()
            .max_idle(max_idle)
            .max_idle_time(max_idle_time)
            .build()
    }

    pub fn builder() -> Builder {
        Builder::new()
    }

    pub(crate) fn from_builder(builder: &Builder) -> Self {
        let (job_tx, job_rx) = crossbeam_channel::bounded(0);
        Pool {
            shared: Arc::new(Shared {
                size: AtomicI32::new(0),
                job_tx,
                job_rx,
                max_idle: i32::try_from(builder.max_idle).expect("max_idle does not fit in i32"),
                max_idle_time: builder.max_idle_time,
                reaper_stop: Mutex::new(None),
                thread_name: builder.thread_name.clone(),
                thread_stack_size: builder.thread_stack_size,
            }),
        }
    }

    /// The number of live workers. Advisory: the value may be stale by the
    /// time it is read.
    pub fn size(&self) -> i32 {
        self.shared.size.load(Ordering::Acquire)
    }

    /// Submits one endpoint call and blocks until it terminates.
    ///
    /// `timeout` is folded with the context's deadline into the effective
    /// deadline; zero means no additional limit. `req` and `resp` are passed
    /// through to the endpoint untouched.
    ///
    /// When this returns, the endpoint either ran to completion or has been
    /// signalled to cancel through the task context's done channel. An
    /// endpoint that ignores the signal keeps running on its thread; its
    /// eventual result is discarded.
    ///
    /// The returned context reflects the terminal state and remains valid
    /// for as long as the caller keeps it.
    pub fn run_task(
        &self,
        ctx: CallContext,
        timeout: Duration,
        req: Option<TaskValue>,
        resp: Option<TaskValue>,
        ep: Endpoint,
    ) -> (TaskContext, Result<(), TaskError>) {
        let task = task::new_task(ctx, timeout, req, resp, ep);

        // Fast path: an idle worker is already blocked on the channel.
        if self.shared.job_tx.try_send(Job::Task(task.clone())).is_ok() {
            return task.wait();
        }

        if !create_worker(&self.shared, task.clone()) {
            // At the ceiling: run this one detached.
            let detached = task.clone();
            spawn_thread(&self.shared, move || detached.run());
        }
        task.wait()
    }
}

/// Claims a worker slot and spawns a worker that runs `task` first. Returns
/// false when the pool is at its ceiling, leaving the task to the caller.
fn create_worker(shared: &Arc<Shared>, task: Arc<Task>) -> bool {
    let n = shared.size.fetch_add(1, Ordering::AcqRel) + 1;
    if n >= shared.max_idle {
        shared.size.fetch_sub(1, Ordering::AcqRel);
        return false;
    }

    if n == 1 {
        // This submitter saw the pool go from empty to non-empty, so it is
        // the only one allowed to start a reaper.
        reaper::start(shared);
    }

    trace!(size = n, "spawning pool worker");
    let worker_shared = shared.clone();
    spawn_thread(shared, move || worker_loop(worker_shared, task));
    true
}

fn worker_loop(shared: Arc<Shared>, first: Arc<Task>) {
    let _population = ScopeGuard::new(|| {
        shared.size.fetch_sub(1, Ordering::AcqRel);
    });

    first.run();

    let mut last_active = Instant::now();
    for job in shared.job_rx.iter() {
        match job {
            Job::Task(task) => {
                task.run();
                last_active = Instant::now();
            }
            Job::Noop => {
                if last_active.elapsed() > shared.max_idle_time {
                    trace!("worker idle past max_idle_time, exiting");
                    break;
                }
            }
        }
    }
}

fn spawn_thread(shared: &Shared, f: impl FnOnce() + Send + 'static) {
    let mut builder = thread::Builder::new().name((shared.thread_name.0)());
    if let Some(stack_size) = shared.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }
    builder.spawn(f).expect("failed to spawn pool thread");
}
