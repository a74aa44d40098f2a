use crate::pool::{Job, Shared};
use crossbeam_channel::{Receiver, select};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use tracing::debug;

/// Workers can linger up to one period past their idle timeout before the
/// next wakeup reaches them, which is acceptable.
pub(super) const MIN_TICK_PERIOD: Duration = Duration::from_millis(10);

/// Starts a fresh reaper loop. Called only by the single submitter that
/// observed the pool go from empty to non-empty, which keeps creation
/// single-threaded.
pub(super) fn start(shared: &Arc<Shared>) {
    let mut slot = shared.reaper_stop.lock();
    // Close the previous loop's stop channel before installing a new one.
    drop(slot.take());

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
    *slot = Some(stop_tx);

    let shared = shared.clone();
    thread::Builder::new()
        .name("handoff-reaper".into())
        .spawn(move || run(shared, stop_rx))
        .expect("failed to spawn reaper thread");
}

fn run(shared: Arc<Shared>, stop: Receiver<()>) {
    let period = tick_period(shared.max_idle, shared.max_idle_time);
    debug!(?period, "reaper started");

    let ticks = crossbeam_channel::tick(period);
    while shared.size.load(Ordering::Acquire) > 0 {
        select! {
            recv(ticks) -> _ => {},
            recv(stop) -> _ => return,
        }
        // Wake one idle worker for an idle check. If every worker is busy
        // there is no receiver; give up at the next tick rather than block.
        select! {
            send(shared.job_tx, Job::Noop) -> _ => {},
            recv(ticks) -> _ => {},
        }
    }

    debug!("reaper exiting, no live workers");
}

/// With max_idle_time=60s and max_idle=100 this wakes an idle worker every
/// 60ms.
pub(super) fn tick_period(max_idle: i32, max_idle_time: Duration) -> Duration {
    let period = max_idle_time / max_idle as u32 / 10;
    period.max(MIN_TICK_PERIOD)
}
