pub(crate) mod latch;
pub(crate) use latch::Latch;

pub(crate) mod scope_guard;
pub(crate) use scope_guard::ScopeGuard;
