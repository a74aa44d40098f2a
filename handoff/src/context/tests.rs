use super::*;
use static_assertions::assert_impl_all;

assert_impl_all!(CallContext: Send, Sync, Clone);
assert_impl_all!(TaskContext: Send, Sync, Clone);

#[test]
fn background_has_no_deadline_and_no_error() {
    let ctx = CallContext::background();
    assert!(ctx.deadline().is_none());
    assert!(ctx.err().is_none());
    assert!(ctx.info().is_none());
}

#[test]
fn cancel_closes_done_and_is_idempotent() {
    let ctx = CallContext::background();
    ctx.cancel();
    assert_eq!(ctx.err(), Some(ContextError::Canceled));
    assert!(ctx.done().recv().is_err());

    ctx.cancel();
    assert_eq!(ctx.err(), Some(ContextError::Canceled));
}

#[test]
fn all_clones_observe_the_same_cancellation() {
    let ctx = CallContext::background();
    let observer = ctx.clone();
    ctx.cancel();
    assert_eq!(observer.err(), Some(ContextError::Canceled));
    assert!(observer.done().recv().is_err());
}

#[test]
fn info_is_set_once() {
    let ctx = CallContext::background()
        .with_info(CallInfo::new("Echo", "Ping"))
        .with_info(CallInfo::new("Echo", "Pong"));
    assert_eq!(ctx.info(), Some(&CallInfo::new("Echo", "Ping")));
}

#[test]
fn passed_deadline_reports_deadline_exceeded() {
    let ctx = CallContext::with_deadline(Instant::now());
    assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));

    // An explicit cancellation recorded first still wins.
    let ctx = CallContext::with_timeout(Duration::from_secs(10));
    ctx.cancel();
    assert_eq!(ctx.err(), Some(ContextError::Canceled));
}

#[test]
fn zero_timeout_inherits_the_parent_deadline() {
    let deadline = Instant::now() + Duration::from_secs(1);
    let parent = CallContext::with_deadline(deadline);
    let ctx = TaskContext::new(parent, Duration::ZERO);
    assert_eq!(ctx.deadline(), Some(deadline));
}

#[test]
fn no_deadline_when_neither_side_sets_one() {
    let ctx = TaskContext::new(CallContext::background(), Duration::ZERO);
    assert!(ctx.deadline().is_none());
}

#[test]
fn effective_deadline_is_the_earlier_of_the_two() {
    // Local timeout sooner than the parent deadline.
    let parent = CallContext::with_timeout(Duration::from_secs(10));
    let ctx = TaskContext::new(parent.clone(), Duration::from_millis(100));
    assert!(ctx.deadline().unwrap() < parent.deadline().unwrap());

    // Parent deadline sooner than the local timeout.
    let parent = CallContext::with_timeout(Duration::from_millis(50));
    let ctx = TaskContext::new(parent.clone(), Duration::from_secs(10));
    assert_eq!(ctx.deadline(), parent.deadline());
}

#[test]
fn finish_wakes_waiters_without_surfacing_an_error() {
    let ctx = TaskContext::new(CallContext::background(), Duration::ZERO);
    ctx.finish();
    assert!(ctx.done().recv().is_err());
    assert!(ctx.err().is_none());
}

#[test]
fn first_recorded_cause_wins() {
    let ctx = TaskContext::new(CallContext::background(), Duration::ZERO);
    ctx.cancel(ContextError::DeadlineExceeded);
    ctx.cancel(ContextError::Canceled);
    assert_eq!(ctx.err(), Some(ContextError::DeadlineExceeded));
}

#[test]
fn finish_after_cancel_does_not_clear_the_error() {
    let ctx = TaskContext::new(CallContext::background(), Duration::ZERO);
    ctx.cancel(ContextError::Canceled);
    ctx.finish();
    assert_eq!(ctx.err(), Some(ContextError::Canceled));
}

#[test]
fn unset_task_state_defers_to_the_parent() {
    let parent = CallContext::background();
    let ctx = TaskContext::new(parent.clone(), Duration::ZERO);
    assert!(ctx.err().is_none());

    parent.cancel();
    assert_eq!(ctx.err(), Some(ContextError::Canceled));

    // The task-local channel is unaffected by the parent's.
    assert!(ctx.done().try_recv().err().is_some_and(|e| e.is_empty()));
}

#[test]
fn finished_task_still_reports_a_canceled_parent() {
    let parent = CallContext::background();
    let ctx = TaskContext::new(parent.clone(), Duration::ZERO);
    ctx.finish();
    parent.cancel();
    assert_eq!(ctx.err(), Some(ContextError::Canceled));
}
