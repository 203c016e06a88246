use std::any::TypeId;
use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use moye_core::Options;
use moye_core::compute::{CoroutineLock, LocalBoxFuture, LocalExecutor, Task, join_all};
use moye_core::id_generator::IdGenerator;
use moye_core::pool::ObjectPool;
use moye_core::time::{Clock, TimeInfo};
use moye_core::timer::TimerScheduler;

use crate::entity::Entity;
use crate::entity_center::EntityCenter;
use crate::error::HandlerError;
use crate::event::{Event, EventSystem, Handler};
use crate::lifecycle::EntityLifecycleScheduler;
use crate::scene::SceneType;

/// Services shared by every entity of one game.
///
/// Entities hold a weak handle to their context; the [`Game`](crate::Game)
/// owns the strong one.
pub struct Context {
    options: Options,
    time: Arc<TimeInfo>,
    pool: Rc<ObjectPool>,
    ids: IdGenerator,
    timers: TimerScheduler,
    locks: CoroutineLock,
    entities: EntityCenter,
    lifecycle: EntityLifecycleScheduler,
    events: EventSystem,
    executor: LocalExecutor,
    frame_finish: RefCell<Vec<Task<()>>>,
}

impl Context {
    /// Creates a context reading time from `clock`.
    pub fn new(options: Options, clock: Arc<dyn Clock>, events: EventSystem) -> Rc<Self> {
        let time = Arc::new(TimeInfo::new(clock));
        let pool = Rc::new(ObjectPool::with_capacity(options.pool_capacity));
        let ids = IdGenerator::new(Arc::clone(&time), options.process);
        let timers = TimerScheduler::new(Arc::clone(&time), Rc::clone(&pool));
        let locks = CoroutineLock::new(timers.clone(), Rc::clone(&pool), options.lock_watchdog());
        Rc::new(Self {
            options,
            time,
            pool,
            ids,
            timers,
            locks,
            entities: EntityCenter::new(),
            lifecycle: EntityLifecycleScheduler::new(),
            events,
            executor: LocalExecutor::new(),
            frame_finish: RefCell::new(Vec::new()),
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn time(&self) -> &Arc<TimeInfo> {
        &self.time
    }

    pub fn pool(&self) -> &ObjectPool {
        &self.pool
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn timers(&self) -> &TimerScheduler {
        &self.timers
    }

    pub fn locks(&self) -> &CoroutineLock {
        &self.locks
    }

    pub fn entities(&self) -> &EntityCenter {
        &self.entities
    }

    pub fn lifecycle(&self) -> &EntityLifecycleScheduler {
        &self.lifecycle
    }

    pub fn events(&self) -> &EventSystem {
        &self.events
    }

    pub fn executor(&self) -> &LocalExecutor {
        &self.executor
    }

    /// Spawns a flow on the game executor.
    pub fn spawn<T, F>(&self, future: F) -> Task<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        self.executor.spawn(future)
    }

    /// Spawns a fallible flow whose error is logged.
    pub fn spawn_logged<E, F>(&self, future: F)
    where
        E: std::fmt::Display + 'static,
        F: Future<Output = Result<(), E>> + 'static,
    {
        self.executor.spawn_logged(future);
    }

    /// Fires expired timers, then runs the update phase.
    ///
    /// Flows resumed by a timer run before any update callback.
    pub fn update(&self) {
        self.timers.update();
        self.executor.run_until_stalled();
        self.lifecycle.update(&self.entities);
        self.executor.run_until_stalled();
    }

    /// Runs the late update phase, then completes the frame.
    pub fn late_update(&self) {
        self.lifecycle.late_update(&self.entities);
        self.executor.run_until_stalled();
        self.frame_finish_update();
    }

    /// Resolves every [`wait_frame_finish`](Self::wait_frame_finish) task
    /// taken before this call.
    pub fn frame_finish_update(&self) {
        let waiting = std::mem::take(&mut *self.frame_finish.borrow_mut());
        for task in waiting {
            // Only fails for tasks their owner disposed.
            let _ = task.set_result(());
        }
        self.executor.run_until_stalled();
    }

    /// Runs one full frame.
    pub fn tick(&self) {
        self.update();
        self.late_update();
    }

    /// A task resolved at the end of the current frame.
    pub fn wait_frame_finish(&self) -> Task<()> {
        let task = Task::create();
        self.frame_finish.borrow_mut().push(task.clone());
        task
    }

    /// Number of flows waiting for the end of the frame.
    pub fn frame_finish_waiters(&self) -> usize {
        self.frame_finish.borrow().len()
    }

    /// Creates an event, from the pool if `E` is pooled.
    pub fn fetch_event<E: Event + Default>(&self) -> E {
        if E::POOLED {
            self.pool.fetch::<E>()
        } else {
            E::default()
        }
    }

    /// Runs the synchronous handlers of `event` registered for the type of
    /// `scene` or for every scene type.
    ///
    /// Failing handlers are logged and do not stop the others. Their errors
    /// are returned in handler order. Asynchronous handlers are spawned on
    /// the executor and their errors are only logged.
    pub fn publish<E: Event>(&self, scene: &Entity, event: E) -> Vec<HandlerError> {
        let scene_type = scene.scene_type().unwrap_or(SceneType::NONE);
        let handlers = self.events.matching(TypeId::of::<E>(), Some(&scene_type));
        let event = Rc::new(event);
        let failures = self.dispatch(&handlers, Some(scene), &event);
        self.release_event(event);
        failures
    }

    /// Like [`publish`](Self::publish), for every handler of `E` whatever
    /// its scene type.
    pub fn publish_global<E: Event>(&self, event: E) -> Vec<HandlerError> {
        let handlers = self.events.matching(TypeId::of::<E>(), None);
        let event = Rc::new(event);
        let failures = self.dispatch(&handlers, None, &event);
        self.release_event(event);
        failures
    }

    /// Runs the matching handlers of `event`, awaiting the asynchronous
    /// ones concurrently.
    pub async fn publish_async<E: Event>(&self, scene: &Entity, event: E) -> Vec<HandlerError> {
        let scene_type = scene.scene_type().unwrap_or(SceneType::NONE);
        let handlers = self.events.matching(TypeId::of::<E>(), Some(&scene_type));
        let failures = {
            let futures: Vec<LocalBoxFuture<'_, Result<(), HandlerError>>> = handlers
                .iter()
                .map(|handler| handler.run_async(Some(scene), &event))
                .collect();
            let results = join_all(futures).await;
            handlers
                .iter()
                .zip(results)
                .filter_map(|(handler, result)| {
                    let err = result.err()?;
                    log::error!("event handler {} failed: {err}", handler.name());
                    Some(err)
                })
                .collect()
        };
        self.dispose_event(event);
        failures
    }

    fn dispatch<E: Event>(
        &self,
        handlers: &[Handler],
        scene: Option<&Entity>,
        event: &Rc<E>,
    ) -> Vec<HandlerError> {
        let mut failures = Vec::new();
        for handler in handlers {
            if let Handler::Async(erased) = handler {
                log::warn!(
                    "event handler {} is async, use publish_async for {}",
                    handler.name(),
                    std::any::type_name::<E>()
                );
                let name = handler.name();
                let erased = Rc::clone(erased);
                let scene = scene.cloned();
                let event = Rc::clone(event);
                self.executor.spawn_logged(async move {
                    erased
                        .run(scene.as_ref(), &*event)
                        .await
                        .map_err(|err| format!("event handler {name} failed: {err}"))
                });
                continue;
            }
            if let Some(Err(err)) = handler.run_sync(scene, &**event) {
                log::error!("event handler {} failed: {err}", handler.name());
                failures.push(err);
            }
        }
        failures
    }

    /// Recycles a shared event once no spawned handler holds it.
    fn release_event<E: Event>(&self, event: Rc<E>) {
        if let Ok(event) = Rc::try_unwrap(event) {
            self.dispose_event(event);
        }
    }

    fn dispose_event<E: Event>(&self, mut event: E) {
        if E::POOLED {
            event.reset();
            self.pool.recycle(event);
        }
    }

    /// Drops every queued flow, timer and pooled object.
    pub(crate) fn shutdown(&self) {
        self.frame_finish.borrow_mut().clear();
        self.executor.clear();
        self.timers.clear();
        self.lifecycle.clear();
        self.entities.clear();
        self.pool.clear();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("options", &self.options)
            .field("entities", &self.entities.len())
            .field("timers", &self.timers.len())
            .field("pending_flows", &self.executor.pending_count())
            .finish()
    }
}
