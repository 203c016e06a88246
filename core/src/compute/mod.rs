//! Cooperative async primitives.
//!
//! Everything here is single-threaded: handles are `Rc`-based and meant to
//! be driven by a [`LocalExecutor`] on the game thread.
//!
//! - [`Task`] — manually resolved single-value future
//! - [`LocalExecutor`] — polls spawned flows when their wakers fire
//! - [`CancellationToken`] — runs cleanup actions once on cancellation
//! - [`CoroutineLock`] — keyed async mutex with FIFO hand-off

mod cancellation;
mod coroutine_lock;
mod executor;
mod task;

pub use cancellation::{ActionId, CancellationToken, Cancelled};
pub use coroutine_lock::{CoroutineLock, CoroutineLockHandle, CoroutineLockItem, LockWait};
pub use executor::{JoinAll, LocalBoxFuture, LocalExecutor, join_all};
pub use task::Task;
