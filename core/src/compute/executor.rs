use std::cell::{Cell, RefCell};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Wake, Waker};

use super::task::Task;

/// A pinned, boxed, non-`Send` future.
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Wake flag shared between a pending task and its waker.
struct WakeFlag(AtomicBool);

impl Wake for WakeFlag {
    fn wake(self: Arc<Self>) {
        self.0.store(true, Ordering::Release);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.store(true, Ordering::Release);
    }
}

/// A spawned future waiting to be polled.
struct PendingTask {
    future: LocalBoxFuture<'static, ()>,
    flag: Arc<WakeFlag>,
    waker: Waker,
}

/// Single-threaded cooperative executor.
///
/// Futures are stored and polled manually via [`tick`](LocalExecutor::tick)
/// or [`run_until_stalled`](LocalExecutor::run_until_stalled). Only tasks
/// whose waker fired since their last poll are polled again, so a flow
/// suspended on a [`Task`], a timer or a coroutine lock costs nothing until
/// it is resolved.
///
/// Futures spawned while a tick is running are picked up by the next tick.
///
/// # Example
///
/// ```
/// use moye_core::compute::LocalExecutor;
///
/// let executor = LocalExecutor::new();
/// let handle = executor.spawn(async { 42u32 });
///
/// executor.run_until_stalled();
/// assert_eq!(handle.try_result(), Some(42));
/// assert_eq!(executor.pending_count(), 0);
/// ```
pub struct LocalExecutor {
    tasks: RefCell<Vec<PendingTask>>,
    incoming: RefCell<Vec<PendingTask>>,
    polls: Cell<u64>,
}

impl LocalExecutor {
    /// Creates an empty executor.
    pub fn new() -> Self {
        Self {
            tasks: RefCell::new(Vec::new()),
            incoming: RefCell::new(Vec::new()),
            polls: Cell::new(0),
        }
    }

    /// Spawns a future. The returned [`Task`] resolves with its output.
    pub fn spawn<T, F>(&self, future: F) -> Task<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        let task = Task::create();
        let producer = task.clone();
        self.spawn_boxed(Box::pin(async move {
            let value = future.await;
            // Only fails if someone else resolved the handle first.
            let _ = producer.set_result(value);
        }));
        task
    }

    /// Spawns a fallible future and logs its error instead of returning it.
    pub fn spawn_logged<E, F>(&self, future: F)
    where
        E: Display + 'static,
        F: Future<Output = Result<(), E>> + 'static,
    {
        self.spawn_boxed(Box::pin(async move {
            if let Err(err) = future.await {
                log::error!("{err}");
            }
        }));
    }

    fn spawn_boxed(&self, future: LocalBoxFuture<'static, ()>) {
        let flag = Arc::new(WakeFlag(AtomicBool::new(true)));
        let waker = Waker::from(Arc::clone(&flag));
        self.incoming.borrow_mut().push(PendingTask {
            future,
            flag,
            waker,
        });
    }

    /// Polls every woken task once.
    ///
    /// Returns the number of tasks that were polled. Completed tasks are
    /// removed from the executor.
    pub fn tick(&self) -> usize {
        let mut batch = std::mem::take(&mut *self.tasks.borrow_mut());
        batch.append(&mut self.incoming.borrow_mut());

        let mut polled = 0;
        let mut remaining = Vec::with_capacity(batch.len());
        for mut task in batch {
            if !task.flag.0.swap(false, Ordering::AcqRel) {
                remaining.push(task);
                continue;
            }
            polled += 1;
            let mut cx = Context::from_waker(&task.waker);
            if task.future.as_mut().poll(&mut cx) == Poll::Pending {
                remaining.push(task);
            }
        }

        self.polls.set(self.polls.get() + polled as u64);
        // A nested tick may have parked tasks here meanwhile; keep them.
        self.tasks.borrow_mut().append(&mut remaining);
        polled
    }

    /// Ticks until no task is woken. Returns the total number of polls.
    pub fn run_until_stalled(&self) -> usize {
        let mut total = 0;
        loop {
            let polled = self.tick();
            if polled == 0 {
                return total;
            }
            total += polled;
        }
    }

    /// Number of spawned tasks that have not completed.
    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().len() + self.incoming.borrow().len()
    }

    /// Total number of polls performed since creation.
    pub fn poll_count(&self) -> u64 {
        self.polls.get()
    }

    /// Drops every pending task without completing it.
    pub fn clear(&self) {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        let incoming = std::mem::take(&mut *self.incoming.borrow_mut());
        // Dropped outside the borrows: a future's destructor may spawn.
        drop(tasks);
        drop(incoming);
    }
}

impl Default for LocalExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Future returned by [`join_all`].
pub struct JoinAll<'a, T> {
    futures: Vec<Option<LocalBoxFuture<'a, T>>>,
    results: Vec<Option<T>>,
}

/// Awaits every future concurrently and returns their outputs in order.
pub fn join_all<'a, T>(futures: Vec<LocalBoxFuture<'a, T>>) -> JoinAll<'a, T> {
    let results = futures.iter().map(|_| None).collect();
    JoinAll {
        futures: futures.into_iter().map(Some).collect(),
        results,
    }
}

// Outputs are never pinned; the futures are already boxed.
impl<T> Unpin for JoinAll<'_, T> {}

impl<T> Future for JoinAll<'_, T> {
    type Output = Vec<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Vec<T>> {
        let this = self.get_mut();
        let mut all_done = true;
        for (slot, result) in this.futures.iter_mut().zip(this.results.iter_mut()) {
            let Some(future) = slot else {
                continue;
            };
            match future.as_mut().poll(cx) {
                Poll::Ready(value) => {
                    *result = Some(value);
                    *slot = None;
                }
                Poll::Pending => all_done = false,
            }
        }

        if all_done {
            Poll::Ready(this.results.iter_mut().filter_map(Option::take).collect())
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn spawn_runs_to_completion() {
        let executor = LocalExecutor::new();
        let handle = executor.spawn(async { 5u8 });
        assert_eq!(executor.pending_count(), 1);
        assert_eq!(executor.tick(), 1);
        assert_eq!(handle.try_result(), Some(5));
        assert_eq!(executor.pending_count(), 0);
    }

    #[test]
    fn suspended_task_is_not_polled_until_woken() {
        let executor = LocalExecutor::new();
        let gate = Task::<()>::create();
        let waiter = gate.clone();
        let done = executor.spawn(async move {
            waiter.await;
            "through"
        });

        assert_eq!(executor.run_until_stalled(), 1);
        assert_eq!(executor.tick(), 0);
        assert!(!done.is_completed());

        gate.set_result(()).unwrap();
        assert_eq!(executor.run_until_stalled(), 1);
        assert_eq!(done.try_result(), Some("through"));
    }

    #[test]
    fn spawn_from_inside_a_task() {
        let executor = Rc::new(LocalExecutor::new());
        let inner = Rc::clone(&executor);
        let outer = executor.spawn(async move { inner.spawn(async { 3 }) });

        executor.run_until_stalled();
        let nested = outer.try_result().unwrap();
        assert_eq!(nested.try_result(), Some(3));
    }

    #[test]
    fn spawn_logged_swallows_error() {
        let executor = LocalExecutor::new();
        executor.spawn_logged(async { Err::<(), _>("boom") });
        executor.run_until_stalled();
        assert_eq!(executor.pending_count(), 0);
    }

    #[test]
    fn join_all_preserves_order() {
        let executor = LocalExecutor::new();
        let first = Task::<u32>::create();
        let second = Task::<u32>::create();
        let (a, b) = (first.clone(), second.clone());
        let joined = executor.spawn(async move {
            join_all(vec![Box::pin(a) as LocalBoxFuture<'_, u32>, Box::pin(b)]).await
        });

        second.set_result(2).unwrap();
        executor.run_until_stalled();
        assert!(!joined.is_completed());

        first.set_result(1).unwrap();
        executor.run_until_stalled();
        assert_eq!(joined.try_result(), Some(vec![1, 2]));
    }

    #[test]
    fn clear_drops_pending() {
        let executor = LocalExecutor::new();
        let never = Task::<()>::create();
        let _ = executor.spawn(never.clone());
        executor.run_until_stalled();
        assert_eq!(executor.pending_count(), 1);
        executor.clear();
        assert_eq!(executor.pending_count(), 0);
    }
}
