use crate::context::{CallInfo, ContextError, TaskContext};
use std::any::Any;
use std::backtrace::Backtrace;
use std::fmt;

/// The terminal error of one pool submission.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    /// The task context terminated before the endpoint returned: the caller
    /// canceled, or the effective deadline elapsed.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// The endpoint panicked. The panic was contained and converted.
    #[error(transparent)]
    Panic(#[from] PanicError),

    /// The endpoint returned an error of its own, propagated verbatim.
    #[error(transparent)]
    Endpoint(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskError::Context(ContextError::Canceled))
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, TaskError::Context(ContextError::DeadlineExceeded))
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panic(_))
    }
}

/// A contained endpoint panic: the stringified payload, the RPC metadata
/// from the context when the caller attached any, and a backtrace captured
/// at the containment site.
#[derive(Debug)]
pub struct PanicError {
    payload: String,
    call: Option<CallInfo>,
    backtrace: Backtrace,
}

impl PanicError {
    pub(crate) fn new(ctx: &TaskContext, payload: Box<dyn Any + Send>) -> Self {
        PanicError {
            payload: panic_payload_to_string(payload.as_ref()),
            call: ctx.info().cloned(),
            backtrace: Backtrace::force_capture(),
        }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn call(&self) -> Option<&CallInfo> {
        self.call.as_ref()
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.call {
            Some(call) => write!(
                f,
                "endpoint panic in {}/{}: {}",
                call.service, call.method, self.payload
            )?,
            None => write!(f, "endpoint panic: {}", self.payload)?,
        }
        write!(f, "\nstack:\n{}", self.backtrace)
    }
}

impl std::error::Error for PanicError {}

/// Best-effort rendering of a panic payload. `panic!` with a literal or a
/// formatted message covers nearly every payload in practice.
fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<opaque panic payload>".to_string()
    }
}
