pub mod context;
pub use context::{CallContext, CallInfo, ContextError, TaskContext};

pub mod pool;
pub use pool::{Builder, Pool};

pub mod task;
pub use task::{Endpoint, PanicError, TaskError, TaskValue};

pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_utils;
