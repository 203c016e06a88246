use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::{CoreError, CoreResult};

struct TaskState<T> {
    result: Option<T>,
    /// Producer side released: after this, `set_result` is an error.
    disposed: bool,
    wakers: Vec<Waker>,
}

/// A manually resolved, single-value future.
///
/// A `Task` has exactly one producer call to [`set_result`](Task::set_result).
/// Every clone of the handle is an awaiter: once resolved, each `.await`
/// yields a clone of the value.
///
/// Cancellation is not built in. Compose with
/// [`CancellationToken`](super::CancellationToken) when a wait must be
/// abandoned.
///
/// # Example
///
/// ```
/// use moye_core::compute::{LocalExecutor, Task};
///
/// let executor = LocalExecutor::new();
/// let task = Task::<u32>::create();
///
/// let waiter = task.clone();
/// let doubled = executor.spawn(async move { waiter.await * 2 });
///
/// executor.run_until_stalled();
/// assert!(!doubled.is_completed());
///
/// task.set_result(21).unwrap();
/// executor.run_until_stalled();
/// assert_eq!(doubled.try_result(), Some(42));
/// ```
pub struct Task<T = ()> {
    state: Rc<RefCell<TaskState<T>>>,
}

impl<T> Task<T> {
    /// Creates a pending task.
    pub fn create() -> Self {
        Self {
            state: Rc::new(RefCell::new(TaskState {
                result: None,
                disposed: false,
                wakers: Vec::new(),
            })),
        }
    }

    /// Resolves the task and releases the producer side.
    ///
    /// Returns [`CoreError::TaskDisposed`] if the task was already resolved
    /// or disposed.
    pub fn set_result(&self, value: T) -> CoreResult {
        let wakers = {
            let mut state = self.state.borrow_mut();
            if state.disposed {
                return Err(CoreError::TaskDisposed);
            }
            state.result = Some(value);
            state.disposed = true;
            std::mem::take(&mut state.wakers)
        };

        for waker in wakers {
            waker.wake();
        }
        Ok(())
    }

    /// Releases the producer side without resolving. Idempotent.
    ///
    /// Pending awaiters of a task disposed this way never complete.
    pub fn dispose(&self) {
        let mut state = self.state.borrow_mut();
        state.disposed = true;
        state.wakers.clear();
    }

    /// Returns `true` once a value has been set.
    pub fn is_completed(&self) -> bool {
        self.state.borrow().result.is_some()
    }

    /// Returns `true` once the producer side has been released.
    pub fn is_disposed(&self) -> bool {
        self.state.borrow().disposed
    }

    /// Returns `true` if both handles refer to the same task.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl<T: Clone> Task<T> {
    /// Returns the value if the task has been resolved.
    pub fn try_result(&self) -> Option<T> {
        self.state.borrow().result.clone()
    }
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T> Default for Task<T> {
    fn default() -> Self {
        Self::create()
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Task")
            .field("completed", &state.result.is_some())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<T: Clone> Future for Task<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.state.borrow_mut();
        if let Some(result) = &state.result {
            return Poll::Ready(result.clone());
        }
        if !state.disposed && !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::task::{RawWaker, RawWakerVTable, Wake};

    fn noop_waker() -> Waker {
        fn noop(_: *const ()) {}
        fn clone(p: *const ()) -> RawWaker {
            RawWaker::new(p, &VTABLE)
        }
        static VTABLE: RawWakerVTable = RawWakerVTable::new(clone, noop, noop, noop);
        unsafe { Waker::from_raw(RawWaker::new(std::ptr::null(), &VTABLE)) }
    }

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn pending_until_set() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut task = Task::<u32>::create();

        assert!(Pin::new(&mut task).poll(&mut cx).is_pending());
        task.set_result(7).unwrap();
        assert_eq!(Pin::new(&mut task).poll(&mut cx), Poll::Ready(7));
    }

    #[test]
    fn every_awaiter_sees_the_value() {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);
        let task = Task::<String>::create();
        let mut a = task.clone();
        let mut b = task.clone();

        task.set_result("done".into()).unwrap();
        assert_eq!(Pin::new(&mut a).poll(&mut cx), Poll::Ready("done".into()));
        assert_eq!(Pin::new(&mut b).poll(&mut cx), Poll::Ready("done".into()));
    }

    #[test]
    fn second_set_result_errors() {
        let task = Task::<u32>::create();
        task.set_result(1).unwrap();
        assert_eq!(task.set_result(2), Err(CoreError::TaskDisposed));
        assert_eq!(task.try_result(), Some(1));
    }

    #[test]
    fn set_result_after_dispose_errors() {
        let task = Task::<()>::create();
        task.dispose();
        task.dispose();
        assert!(task.is_disposed());
        assert_eq!(task.set_result(()), Err(CoreError::TaskDisposed));
        assert!(!task.is_completed());
    }

    #[test]
    fn wakes_registered_waker_once() {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        let waker = Waker::from(Arc::clone(&counter));
        let mut cx = Context::from_waker(&waker);
        let mut task = Task::<()>::create();

        // Polling twice with the same waker registers it once.
        assert!(Pin::new(&mut task).poll(&mut cx).is_pending());
        assert!(Pin::new(&mut task).poll(&mut cx).is_pending());

        task.set_result(()).unwrap();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
