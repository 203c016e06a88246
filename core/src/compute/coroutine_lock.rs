use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fmt::{self, Display};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use super::task::Task;
use crate::error::{CoreError, CoreResult};
use crate::pool::{ObjectPool, Poolable};
use crate::timer::TimerScheduler;

const WATCHDOG_INFO: &str = "CoroutineLock timeout";

/// One waiter's position in a key's queue.
#[derive(Default)]
pub struct CoroutineLockItem {
    key: String,
    serial: u64,
    task: Task<()>,
    timer_id: Option<u64>,
}

impl Poolable for CoroutineLockItem {
    fn reset(&mut self) {
        self.key.clear();
        self.serial = 0;
        self.task = Task::create();
        self.timer_id = None;
    }
}

struct Waiter {
    serial: u64,
    task: Task<()>,
}

struct LockInner {
    timers: TimerScheduler,
    pool: Rc<ObjectPool>,
    watchdog_ms: Option<i64>,
    queues: RefCell<HashMap<String, VecDeque<Waiter>>>,
    next_serial: Cell<u64>,
}

/// Keyed async mutex with FIFO hand-off.
///
/// Critical sections are identified by a composite key built from a lock
/// type and a key (`"{lock_type}_{key}"`). Waiters on one key are granted
/// strictly in arrival order; different keys never block each other.
///
/// With a watchdog configured, every waiter schedules a once-timer that
/// logs a warning if the lock is still held or awaited when it fires.
///
/// Acquiring a key again from a flow that already holds it deadlocks that
/// flow.
///
/// # Example
///
/// ```
/// use std::rc::Rc;
/// use std::sync::Arc;
/// use moye_core::compute::{CoroutineLock, LocalExecutor};
/// use moye_core::pool::ObjectPool;
/// use moye_core::time::TimeInfo;
/// use moye_core::timer::TimerScheduler;
///
/// let pool = Rc::new(ObjectPool::new());
/// let timers = TimerScheduler::new(Arc::new(TimeInfo::default()), Rc::clone(&pool));
/// let lock = CoroutineLock::new(timers, pool, None);
/// let executor = LocalExecutor::new();
///
/// let first = lock.clone();
/// let done = executor.spawn(async move {
///     let mut handle = first.wait(1, "player").await;
///     handle.dispose().is_ok()
/// });
/// executor.run_until_stalled();
/// assert_eq!(done.try_result(), Some(true));
/// assert_eq!(lock.key_count(), 0);
/// ```
#[derive(Clone)]
pub struct CoroutineLock {
    inner: Rc<LockInner>,
}

impl CoroutineLock {
    /// Creates a lock table. `watchdog_ms` enables the stuck-lock warning.
    pub fn new(timers: TimerScheduler, pool: Rc<ObjectPool>, watchdog_ms: Option<i64>) -> Self {
        Self {
            inner: Rc::new(LockInner {
                timers,
                pool,
                watchdog_ms,
                queues: RefCell::new(HashMap::new()),
                next_serial: Cell::new(0),
            }),
        }
    }

    /// Queues for the lock on `(lock_type, key)`.
    ///
    /// The returned future resolves to a handle once every earlier waiter
    /// on the same key has released. The first waiter on a free key is
    /// granted without suspending.
    pub fn wait(&self, lock_type: impl Display, key: impl Display) -> LockWait {
        let key = format!("{lock_type}_{key}");
        let serial = self.inner.next_serial.get() + 1;
        self.inner.next_serial.set(serial);

        let mut item = self.inner.pool.fetch::<CoroutineLockItem>();
        item.key.push_str(&key);
        item.serial = serial;
        item.task = Task::create();
        if let Some(timeout_ms) = self.inner.watchdog_ms {
            item.timer_id = Some(self.start_watchdog(&key, timeout_ms, WATCHDOG_INFO.to_owned()));
        }

        let granted = {
            let mut queues = self.inner.queues.borrow_mut();
            let queue = queues.entry(key).or_default();
            queue.push_back(Waiter {
                serial,
                task: item.task.clone(),
            });
            queue.len() == 1
        };
        if granted {
            // Fresh task: cannot fail.
            let _ = item.task.set_result(());
        }

        LockWait {
            lock: self.clone(),
            item: Some(item),
        }
    }

    /// Number of waiters, the holder included, on `(lock_type, key)`.
    pub fn waiter_count(&self, lock_type: impl Display, key: impl Display) -> usize {
        let key = format!("{lock_type}_{key}");
        self.inner.queues.borrow().get(&key).map_or(0, VecDeque::len)
    }

    /// Number of keys that are held or awaited.
    pub fn key_count(&self) -> usize {
        self.inner.queues.borrow().len()
    }

    fn start_watchdog(&self, key: &str, timeout_ms: i64, info: String) -> u64 {
        let key = key.to_owned();
        self.inner.timers.new_once_timer(timeout_ms, move || {
            log::warn!("CoroutineLock timeout key: {key}, info: {info}");
        })
    }

    /// Removes `item` from its queue and hands the lock to the next waiter
    /// if `item` was holding it.
    fn release(&self, mut item: CoroutineLockItem) {
        if let Some(timer_id) = item.timer_id.take() {
            self.inner.timers.remove(timer_id);
        }

        let next = {
            let mut queues = self.inner.queues.borrow_mut();
            let mut next = None;
            let mut emptied = false;
            if let Some(queue) = queues.get_mut(&item.key) {
                let was_head = queue.front().is_some_and(|w| w.serial == item.serial);
                queue.retain(|w| w.serial != item.serial);
                if was_head {
                    next = queue.front().map(|w| w.task.clone());
                }
                emptied = queue.is_empty();
            }
            if emptied {
                queues.remove(&item.key);
            }
            next
        };

        item.reset();
        self.inner.pool.recycle(item);

        if let Some(task) = next {
            let _ = task.set_result(());
        }
    }
}

impl fmt::Debug for CoroutineLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineLock")
            .field("keys", &self.key_count())
            .field("watchdog_ms", &self.inner.watchdog_ms)
            .finish()
    }
}

/// Future returned by [`CoroutineLock::wait`].
///
/// Dropping it before it resolves leaves the queue; if the lock had already
/// been granted to it, the next waiter is granted instead.
pub struct LockWait {
    lock: CoroutineLock,
    item: Option<CoroutineLockItem>,
}

impl Future for LockWait {
    type Output = CoroutineLockHandle;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoroutineLockHandle> {
        let this = &mut *self;
        let Some(item) = this.item.as_mut() else {
            return Poll::Pending;
        };
        if Pin::new(&mut item.task).poll(cx).is_pending() {
            return Poll::Pending;
        }
        match this.item.take() {
            Some(item) => Poll::Ready(CoroutineLockHandle {
                lock: this.lock.clone(),
                key: item.key.clone(),
                item: Some(item),
            }),
            None => Poll::Pending,
        }
    }
}

impl Drop for LockWait {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.lock.release(item);
        }
    }
}

/// A granted coroutine lock. Dropping it releases the lock.
pub struct CoroutineLockHandle {
    lock: CoroutineLock,
    key: String,
    item: Option<CoroutineLockItem>,
}

impl CoroutineLockHandle {
    /// Composite key of the held lock.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns `true` once the handle has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.item.is_none()
    }

    /// Releases the lock and grants the next waiter.
    ///
    /// A second call logs a warning and returns
    /// [`CoreError::LockAlreadyDisposed`].
    pub fn dispose(&mut self) -> CoreResult {
        match self.item.take() {
            Some(item) => {
                self.lock.release(item);
                Ok(())
            }
            None => {
                log::warn!("repeat dispose CoroutineLockItem {}", self.key);
                Err(CoreError::LockAlreadyDisposed(self.key.clone()))
            }
        }
    }

    /// Replaces the watchdog with one that fires after `timeout_ms` and
    /// logs `info`.
    pub fn set_timeout(&mut self, timeout_ms: i64, info: impl Into<String>) {
        let Some(item) = self.item.as_mut() else {
            log::warn!("set_timeout on disposed CoroutineLockItem {}", self.key);
            return;
        };
        if let Some(timer_id) = item.timer_id.take() {
            self.lock.inner.timers.remove(timer_id);
        }
        item.timer_id = Some(self.lock.start_watchdog(&self.key, timeout_ms, info.into()));
    }
}

impl Drop for CoroutineLockHandle {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.lock.release(item);
        }
    }
}

impl fmt::Debug for CoroutineLockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoroutineLockHandle")
            .field("key", &self.key)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
