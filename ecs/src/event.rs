//! Typed events dispatched to handlers filtered by scene type.
//!
//! Handlers are registered on an [`EventSystem`] before the game is built
//! and are invoked through [`Context::publish`](crate::Context::publish)
//! and its variants. A handler registered for [`SceneType::NONE`] sees the
//! event whatever scene it is published on.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use moye_core::compute::LocalBoxFuture;

use crate::entity::Entity;
use crate::error::HandlerError;
use crate::scene::SceneType;

/// A value that can be published.
pub trait Event: Any {
    /// Pooled events are reset and recycled after dispatch.
    const POOLED: bool = false;

    /// Clears the event before it returns to the pool.
    fn reset(&mut self) {}
}

/// Synchronous event handler.
pub trait EventHandler<E: Event>: 'static {
    fn run(&self, scene: Option<&Entity>, event: &E) -> Result<(), HandlerError>;
}

/// Asynchronous event handler, awaited by
/// [`Context::publish_async`](crate::Context::publish_async).
pub trait AsyncEventHandler<E: Event>: 'static {
    fn run<'a>(
        &'a self,
        scene: Option<&'a Entity>,
        event: &'a E,
    ) -> LocalBoxFuture<'a, Result<(), HandlerError>>;
}

pub(crate) trait ErasedSync {
    fn run(&self, scene: Option<&Entity>, event: &dyn Any) -> Result<(), HandlerError>;
    fn name(&self) -> &'static str;
}

pub(crate) trait ErasedAsync {
    fn run<'a>(
        &'a self,
        scene: Option<&'a Entity>,
        event: &'a dyn Any,
    ) -> LocalBoxFuture<'a, Result<(), HandlerError>>;
    fn name(&self) -> &'static str;
}

struct SyncAdapter<E, H> {
    handler: H,
    _event: PhantomData<fn(&E)>,
}

impl<E: Event, H: EventHandler<E>> ErasedSync for SyncAdapter<E, H> {
    fn run(&self, scene: Option<&Entity>, event: &dyn Any) -> Result<(), HandlerError> {
        match event.downcast_ref::<E>() {
            Some(event) => self.handler.run(scene, event),
            None => Ok(()),
        }
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<H>()
    }
}

struct AsyncAdapter<E, H> {
    handler: H,
    _event: PhantomData<fn(&E)>,
}

impl<E: Event, H: AsyncEventHandler<E>> ErasedAsync for AsyncAdapter<E, H> {
    fn run<'a>(
        &'a self,
        scene: Option<&'a Entity>,
        event: &'a dyn Any,
    ) -> LocalBoxFuture<'a, Result<(), HandlerError>> {
        match event.downcast_ref::<E>() {
            Some(event) => self.handler.run(scene, event),
            None => Box::pin(async { Ok(()) }),
        }
    }

    fn name(&self) -> &'static str {
        std::any::type_name::<H>()
    }
}

/// Plain functions and closures as handlers.
struct FnHandler<F>(F);

impl<E, F> EventHandler<E> for FnHandler<F>
where
    E: Event,
    F: Fn(Option<&Entity>, &E) -> Result<(), HandlerError> + 'static,
{
    fn run(&self, scene: Option<&Entity>, event: &E) -> Result<(), HandlerError> {
        (self.0)(scene, event)
    }
}

#[derive(Clone)]
pub(crate) enum Handler {
    Sync(Rc<dyn ErasedSync>),
    Async(Rc<dyn ErasedAsync>),
}

impl Handler {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Handler::Sync(handler) => handler.name(),
            Handler::Async(handler) => handler.name(),
        }
    }

    pub(crate) fn run_sync(
        &self,
        scene: Option<&Entity>,
        event: &dyn Any,
    ) -> Option<Result<(), HandlerError>> {
        match self {
            Handler::Sync(handler) => Some(handler.run(scene, event)),
            Handler::Async(_) => None,
        }
    }

    pub(crate) fn run_async<'a>(
        &'a self,
        scene: Option<&'a Entity>,
        event: &'a dyn Any,
    ) -> LocalBoxFuture<'a, Result<(), HandlerError>> {
        match self {
            Handler::Sync(handler) => {
                let result = handler.run(scene, event);
                Box::pin(async move { result })
            }
            Handler::Async(handler) => handler.run(scene, event),
        }
    }
}

struct HandlerEntry {
    scene_type: SceneType,
    handler: Handler,
}

/// Registry of event handlers keyed by event type.
#[derive(Default)]
pub struct EventSystem {
    handlers: HashMap<TypeId, Vec<HandlerEntry>>,
}

impl EventSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for events of type `E` on scenes of
    /// `scene_type`.
    pub fn register_handler<E, H>(&mut self, scene_type: SceneType, handler: H) -> &mut Self
    where
        E: Event,
        H: EventHandler<E>,
    {
        self.push::<E>(
            scene_type,
            Handler::Sync(Rc::new(SyncAdapter {
                handler,
                _event: PhantomData,
            })),
        )
    }

    /// Registers a closure as a handler.
    pub fn register_fn<E, F>(&mut self, scene_type: SceneType, handler: F) -> &mut Self
    where
        E: Event,
        F: Fn(Option<&Entity>, &E) -> Result<(), HandlerError> + 'static,
    {
        self.register_handler::<E, _>(scene_type, FnHandler(handler))
    }

    /// Registers an asynchronous handler.
    pub fn register_async_handler<E, H>(&mut self, scene_type: SceneType, handler: H) -> &mut Self
    where
        E: Event,
        H: AsyncEventHandler<E>,
    {
        self.push::<E>(
            scene_type,
            Handler::Async(Rc::new(AsyncAdapter {
                handler,
                _event: PhantomData,
            })),
        )
    }

    fn push<E: Event>(&mut self, scene_type: SceneType, handler: Handler) -> &mut Self {
        log::debug!(
            "event handler {} registered for {} on {}",
            handler.name(),
            std::any::type_name::<E>(),
            scene_type
        );
        self.handlers
            .entry(TypeId::of::<E>())
            .or_default()
            .push(HandlerEntry {
                scene_type,
                handler,
            });
        self
    }

    /// Number of handlers registered for `E`.
    pub fn handler_count<E: Event>(&self) -> usize {
        self.handlers.get(&TypeId::of::<E>()).map_or(0, Vec::len)
    }

    /// Handlers of `event` matching `scene_type`, in registration order.
    /// `None` matches every handler.
    pub(crate) fn matching(&self, event: TypeId, scene_type: Option<&SceneType>) -> Vec<Handler> {
        let Some(entries) = self.handlers.get(&event) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter(|entry| match scene_type {
                Some(scene_type) => {
                    entry.scene_type == SceneType::NONE || entry.scene_type == *scene_type
                }
                None => true,
            })
            .map(|entry| entry.handler.clone())
            .collect()
    }
}

impl std::fmt::Debug for EventSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSystem")
            .field("event_types", &self.handlers.len())
            .finish()
    }
}

/// Published before the root scene is created.
#[derive(Debug, Default, Clone, Copy)]
pub struct BeforeProgramInit;

/// Published after the root scene is created.
#[derive(Debug, Default, Clone, Copy)]
pub struct AfterProgramInit;

/// Published first by [`Game::start`](crate::Game::start).
#[derive(Debug, Default, Clone, Copy)]
pub struct BeforeProgramStart;

/// Published last by [`Game::start`](crate::Game::start).
#[derive(Debug, Default, Clone, Copy)]
pub struct AfterProgramStart;

impl Event for BeforeProgramInit {}
impl Event for AfterProgramInit {}
impl Event for BeforeProgramStart {}
impl Event for AfterProgramStart {}
