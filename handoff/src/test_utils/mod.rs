use crate::task::Endpoint;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

pub(crate) fn noop_endpoint() -> Endpoint {
    Arc::new(|_, _, _| Ok(()))
}

pub(crate) fn sleeping_endpoint(d: Duration) -> Endpoint {
    Arc::new(move |_, _, _| {
        thread::sleep(d);
        Ok(())
    })
}

pub(crate) fn failing_endpoint(message: &'static str) -> Endpoint {
    Arc::new(move |_, _, _| Err(anyhow::anyhow!(message)))
}

pub(crate) fn counting_endpoint(counter: Arc<AtomicU32>) -> Endpoint {
    Arc::new(move |_, _, _| {
        counter.fetch_add(1, Ordering::AcqRel);
        Ok(())
    })
}

/// Blocks on the task's done channel, flags that cancellation was observed,
/// then lingers before returning an error. The late result must be
/// discarded by the waiter.
pub(crate) fn done_observing_endpoint(returned: Arc<AtomicBool>, linger: Duration) -> Endpoint {
    Arc::new(move |ctx, _, _| {
        let _ = ctx.done().recv();
        returned.store(true, Ordering::Release);
        thread::sleep(linger);
        Err(anyhow::anyhow!("late result"))
    })
}
