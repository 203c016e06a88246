//! Expiring callback timers polled once per frame.
//!
//! [`TimerScheduler`] keeps an active list of timers and a lookup map from
//! timer id to timer. Removing a timer only zeroes its id and drops it from
//! the map; the sweep in [`update`](TimerScheduler::update) purges it from
//! the active list later. Expired once-timers retire in the sweep that
//! fires them; repeat timers advance their expiry by exactly one interval
//! per firing.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use crate::compute::{ActionId, CancellationToken, Cancelled, Task};
use crate::pool::{ObjectPool, Poolable};
use crate::time::TimeInfo;

/// First timer id handed out is one past this value.
const TIMER_ID_BASE: u64 = 1000;

/// Id of a timer that has been removed.
pub const REMOVED_TIMER_ID: u64 = 0;

/// Interval of a frame timer, in milliseconds.
pub const FRAME_INTERVAL_MS: i64 = 1;

/// How a timer behaves after it fires.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Fires once, then retires.
    #[default]
    Once,
    /// Fires, then moves its expiry forward by its interval.
    Repeat,
}

#[derive(Default)]
struct Timer {
    id: u64,
    kind: TimerKind,
    expire_time: i64,
    interval: i64,
    callback: Option<Box<dyn FnMut()>>,
    /// Resolved with `true` when the timer fires.
    task: Option<Task<bool>>,
}

impl Poolable for Timer {
    fn reset(&mut self) {
        self.id = REMOVED_TIMER_ID;
        self.kind = TimerKind::Once;
        self.expire_time = 0;
        self.interval = 0;
        self.callback = None;
        self.task = None;
    }
}

type TimerRef = Rc<RefCell<Timer>>;

struct TimerInner {
    time: Arc<TimeInfo>,
    pool: Rc<ObjectPool>,
    timers: RefCell<Vec<TimerRef>>,
    map: RefCell<HashMap<u64, TimerRef>>,
    next_id: Cell<u64>,
    sweeping: Cell<bool>,
}

/// Scheduler of once, repeat and frame timers.
///
/// Cloning yields another handle to the same scheduler, so callbacks and
/// async flows can hold one.
///
/// # Example
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::sync::Arc;
/// use moye_core::pool::ObjectPool;
/// use moye_core::time::{ManualClock, TimeInfo};
/// use moye_core::timer::TimerScheduler;
///
/// let clock = ManualClock::new(0);
/// let time = Arc::new(TimeInfo::new(Arc::new(clock.clone())));
/// let timers = TimerScheduler::new(time, Rc::new(ObjectPool::new()));
///
/// let fired = Rc::new(Cell::new(0));
/// let counter = Rc::clone(&fired);
/// timers.new_once_timer(100, move || counter.set(counter.get() + 1));
///
/// clock.advance(150);
/// timers.update();
/// timers.update();
/// assert_eq!(fired.get(), 1);
/// assert!(timers.is_empty());
/// ```
#[derive(Clone)]
pub struct TimerScheduler {
    inner: Rc<TimerInner>,
}

impl TimerScheduler {
    /// Creates a scheduler reading time from `time` and recycling timers
    /// through `pool`.
    pub fn new(time: Arc<TimeInfo>, pool: Rc<ObjectPool>) -> Self {
        Self {
            inner: Rc::new(TimerInner {
                time,
                pool,
                timers: RefCell::new(Vec::new()),
                map: RefCell::new(HashMap::new()),
                next_id: Cell::new(TIMER_ID_BASE),
                sweeping: Cell::new(false),
            }),
        }
    }

    /// Schedules `callback` to run once, `timeout_ms` from now.
    pub fn new_once_timer(&self, timeout_ms: i64, callback: impl FnOnce() + 'static) -> u64 {
        let mut callback = Some(callback);
        self.add_timer(
            TimerKind::Once,
            timeout_ms,
            0,
            Some(Box::new(move || {
                if let Some(callback) = callback.take() {
                    callback();
                }
            })),
            None,
        )
    }

    /// Schedules `callback` to run every `interval_ms`, starting one
    /// interval from now.
    pub fn new_repeated_timer(&self, interval_ms: i64, callback: impl FnMut() + 'static) -> u64 {
        self.add_timer(
            TimerKind::Repeat,
            interval_ms,
            interval_ms,
            Some(Box::new(callback)),
            None,
        )
    }

    /// Schedules `callback` to run on every sweep.
    pub fn new_frame_timer(&self, callback: impl FnMut() + 'static) -> u64 {
        self.new_repeated_timer(FRAME_INTERVAL_MS, callback)
    }

    fn add_timer(
        &self,
        kind: TimerKind,
        delay_ms: i64,
        interval: i64,
        callback: Option<Box<dyn FnMut()>>,
        task: Option<Task<bool>>,
    ) -> u64 {
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);

        let mut timer = self.inner.pool.fetch::<Timer>();
        timer.id = id;
        timer.kind = kind;
        timer.expire_time = self.inner.time.client_now() + delay_ms;
        timer.interval = interval;
        timer.callback = callback;
        timer.task = task;

        let timer = Rc::new(RefCell::new(timer));
        self.inner.map.borrow_mut().insert(id, Rc::clone(&timer));
        self.inner.timers.borrow_mut().push(timer);
        id
    }

    /// Removes a timer. Returns `false` if no live timer has this id.
    ///
    /// The timer stops firing immediately and is purged on the next sweep.
    pub fn remove(&self, id: u64) -> bool {
        let Some(timer) = self.inner.map.borrow_mut().remove(&id) else {
            return false;
        };
        timer.borrow_mut().id = REMOVED_TIMER_ID;
        true
    }

    /// Returns `true` if `id` names a live timer.
    pub fn contains(&self, id: u64) -> bool {
        self.inner.map.borrow().contains_key(&id)
    }

    /// Expiry time of a live timer, in client milliseconds.
    pub fn expire_time(&self, id: u64) -> Option<i64> {
        self.inner
            .map
            .borrow()
            .get(&id)
            .map(|timer| timer.borrow().expire_time)
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.inner.map.borrow().len()
    }

    /// Returns `true` if no timer is live.
    pub fn is_empty(&self) -> bool {
        self.inner.map.borrow().is_empty()
    }

    /// Drops every timer without firing it. Pending waits never complete.
    pub fn clear(&self) {
        let timers = std::mem::take(&mut *self.inner.timers.borrow_mut());
        let map = std::mem::take(&mut *self.inner.map.borrow_mut());
        // Callbacks may capture handles to this scheduler.
        drop(map);
        drop(timers);
    }

    /// Fires every expired timer once and purges removed ones.
    ///
    /// The active list is walked back to front. Timers created by a
    /// callback during the sweep are first considered by the next sweep.
    pub fn update(&self) {
        if self.inner.sweeping.replace(true) {
            log::warn!("TimerScheduler::update called during a sweep, ignored");
            return;
        }

        let now = self.inner.time.client_now();
        let mut index = self.inner.timers.borrow().len();
        while index > 0 {
            index -= 1;
            let Some(timer) = self.inner.timers.borrow().get(index).cloned() else {
                continue;
            };

            let (id, expired) = {
                let timer = timer.borrow();
                (timer.id, timer.expire_time <= now)
            };
            if id == REMOVED_TIMER_ID {
                self.purge(index, timer);
                continue;
            }
            if !expired {
                continue;
            }

            self.fire(&timer);

            let (id, kind) = {
                let timer = timer.borrow();
                (timer.id, timer.kind)
            };
            if id == REMOVED_TIMER_ID {
                // Removed by its own callback.
                self.purge(index, timer);
            } else if kind == TimerKind::Repeat {
                let mut timer = timer.borrow_mut();
                timer.expire_time += timer.interval;
            } else {
                self.inner.map.borrow_mut().remove(&id);
                self.purge(index, timer);
            }
        }

        self.inner.sweeping.set(false);
    }

    fn fire(&self, timer: &TimerRef) {
        // Taken out for the call: the callback may touch the scheduler.
        let callback = timer.borrow_mut().callback.take();
        if let Some(mut callback) = callback {
            callback();
            let mut timer = timer.borrow_mut();
            if timer.id != REMOVED_TIMER_ID && timer.kind == TimerKind::Repeat {
                timer.callback = Some(callback);
            }
        }

        let task = timer.borrow_mut().task.take();
        if let Some(task) = task {
            // Already resolved when the wait was cancelled first.
            let _ = task.set_result(true);
        }
    }

    /// Drops `timer` from the active list and recycles it.
    ///
    /// Does nothing to the list if a callback cleared it and `index` no
    /// longer holds `timer`.
    fn purge(&self, index: usize, timer: TimerRef) {
        {
            let mut timers = self.inner.timers.borrow_mut();
            if timers.get(index).is_some_and(|held| Rc::ptr_eq(held, &timer)) {
                timers.remove(index);
            }
        }
        if let Ok(cell) = Rc::try_unwrap(timer) {
            let mut timer = cell.into_inner();
            timer.reset();
            self.inner.pool.recycle(timer);
        }
    }

    /// Suspends the calling flow for `time_ms` milliseconds.
    ///
    /// Non-positive durations complete immediately. If `token` is cancelled
    /// first, the timer is removed and the wait ends with [`Cancelled`].
    /// The cancel action is unregistered on every exit path, including the
    /// future being dropped.
    pub async fn wait_async(
        &self,
        time_ms: i64,
        token: Option<&CancellationToken>,
    ) -> Result<(), Cancelled> {
        if time_ms <= 0 {
            return Ok(());
        }
        if token.is_some_and(CancellationToken::is_cancelled) {
            return Err(Cancelled);
        }

        let task = Task::<bool>::create();
        let id = self.add_timer(TimerKind::Once, time_ms, 0, None, Some(task.clone()));

        let mut guard = WaitGuard {
            timers: self,
            timer_id: id,
            task: task.clone(),
            cancel: None,
        };
        if let Some(token) = token {
            let timers = self.clone();
            let resolve = task.clone();
            let action = token.add(move || {
                if timers.remove(id) {
                    let _ = resolve.set_result(false);
                }
            });
            match action {
                Ok(action) => guard.cancel = Some((token, action)),
                Err(_) => return Err(Cancelled),
            }
        }

        if task.await { Ok(()) } else { Err(Cancelled) }
    }
}

/// Cleans up after [`TimerScheduler::wait_async`] however it ends.
struct WaitGuard<'a> {
    timers: &'a TimerScheduler,
    timer_id: u64,
    task: Task<bool>,
    cancel: Option<(&'a CancellationToken, ActionId)>,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        if let Some((token, action)) = self.cancel.take() {
            token.remove(action);
        }
        if !self.task.is_completed() {
            self.timers.remove(self.timer_id);
        }
    }
}

impl std::fmt::Debug for TimerScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerScheduler")
            .field("live", &self.len())
            .field("active", &self.inner.timers.borrow().len())
            .finish()
    }
}
