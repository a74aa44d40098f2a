/// Terminal states a context can report from `err()`.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context was canceled by its owner before the work finished.
    #[error("context canceled")]
    Canceled,

    /// The effective deadline elapsed before the work finished.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
