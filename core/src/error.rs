use thiserror::Error;

/// Errors raised by the core runtime primitives.
///
/// Every variant is an invariant violation in the calling code: it is
/// reported immediately and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// `set_result` was called on a task whose producer side is already gone.
    #[error("set_result called but the task has been disposed")]
    TaskDisposed,
    /// `cancel` was called on a token that has already been cancelled.
    #[error("cancellation token has already been cancelled")]
    AlreadyCancelled,
    /// A coroutine lock handle was disposed twice.
    #[error("coroutine lock handle already disposed (key: {0})")]
    LockAlreadyDisposed(String),
}

/// Result type for core operations.
pub type CoreResult<T = ()> = Result<T, CoreError>;
