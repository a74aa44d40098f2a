use crate::pool::Pool;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const DEFAULT_MAX_IDLE: usize = 128;

pub(crate) const DEFAULT_MAX_IDLE_TIME: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The closure itself isn't printable.
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

fn default_thread_name_fn() -> ThreadNameFn {
    let counter = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let prev = counter.fetch_add(1, Ordering::Relaxed);
        format!("handoff-worker-{prev}")
    }))
}

/// Configures and creates a [`Pool`].
///
/// ```
/// use handoff::Pool;
/// use std::time::Duration;
///
/// let pool = Pool::builder()
///     .max_idle(16)
///     .max_idle_time(Duration::from_secs(10))
///     .thread_name("rpc-pool")
///     .build();
/// # drop(pool);
/// ```
#[derive(Debug)]
pub struct Builder {
    /// Resident-worker ceiling. Submissions past it run on detached
    /// threads instead of growing the pool.
    pub(super) max_idle: usize,

    /// Idle duration after which a resident worker exits.
    pub(super) max_idle_time: Duration,

    /// Name fn used for threads spawned by the pool.
    pub(super) thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the pool.
    pub(super) thread_stack_size: Option<usize>,
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            max_idle: DEFAULT_MAX_IDLE,
            max_idle_time: DEFAULT_MAX_IDLE_TIME,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
        }
    }

    pub fn max_idle(&mut self, val: usize) -> &mut Self {
        assert!(val > 0, "max_idle cannot be set to 0");
        self.max_idle = val;
        self
    }

    pub fn max_idle_time(&mut self, val: Duration) -> &mut Self {
        assert!(!val.is_zero(), "max_idle_time cannot be zero");
        self.max_idle_time = val;
        self
    }

    /// Sets the name for every thread spawned by the pool.
    ///
    /// The default names workers "handoff-worker-{N}" with a monotonically
    /// increasing N.
    pub fn thread_name(&mut self, val: impl Into<String>) -> &mut Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the names of threads spawned by the
    /// pool.
    pub fn thread_name_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for threads spawned by the pool.
    ///
    /// The platform may round this up to its minimal stack size.
    pub fn thread_stack_size(&mut self, val: usize) -> &mut Self {
        self.thread_stack_size = Some(val);
        self
    }

    /// Creates the configured [`Pool`].
    pub fn build(&self) -> Pool {
        Pool::from_builder(self)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Builder::new()
    }
}
