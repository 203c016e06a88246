use std::cell::Cell;
use std::future::Future;
use std::rc::Rc;
use std::sync::Arc;

use moye_core::Options;
use moye_core::compute::Task;
use moye_core::time::{Clock, SystemClock};

use crate::context::Context;
use crate::entity::Entity;
use crate::error::EntityResult;
use crate::event::{
    AfterProgramInit, AfterProgramStart, BeforeProgramInit, BeforeProgramStart, EventSystem,
};
use crate::scene::{Scene, SceneInit, SceneType};

/// Builder for [`Game`].
///
/// # Example
///
/// ```
/// use moye_ecs::{Empty, GameBuilder};
///
/// let game = GameBuilder::new().build().unwrap();
/// let unit = game.root().add_child::<Empty>().unwrap();
/// game.tick();
/// assert_eq!(unit.domain(), Some(game.root().clone()));
/// ```
pub struct GameBuilder {
    options: Options,
    clock: Arc<dyn Clock>,
    events: EventSystem,
}

impl GameBuilder {
    pub fn new() -> Self {
        Self {
            options: Options::default(),
            clock: Arc::new(SystemClock),
            events: EventSystem::new(),
        }
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Reads time from `clock` instead of the system clock.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Uses `events` for every publish of the game.
    pub fn with_events(mut self, events: EventSystem) -> Self {
        self.events = events;
        self
    }

    /// Creates the context and the root process scene.
    ///
    /// [`BeforeProgramInit`] is published before the root scene exists and
    /// [`AfterProgramInit`] right after. The options' log level becomes the
    /// maximum level of the `log` facade.
    pub fn build(self) -> EntityResult<Game> {
        log::set_max_level(self.options.log_level);
        let ctx = Context::new(self.options, self.clock, self.events);
        ctx.publish_global(BeforeProgramInit);
        let root = Scene::create(&ctx, SceneInit::new(0, SceneType::PROCESS, "Process"))?;
        ctx.publish_global(AfterProgramInit);
        Ok(Game {
            ctx,
            root,
            disposed: Cell::new(false),
        })
    }
}

impl Default for GameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running game: the context plus the root scene.
///
/// The host drives it by calling [`update`](Self::update) and
/// [`late_update`](Self::late_update) once per frame, or
/// [`tick`](Self::tick) for both.
pub struct Game {
    ctx: Rc<Context>,
    root: Entity,
    disposed: Cell<bool>,
}

impl Game {
    pub fn builder() -> GameBuilder {
        GameBuilder::new()
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    /// The root process scene.
    pub fn root(&self) -> &Entity {
        &self.root
    }

    /// Publishes the start events and runs the flows they spawned.
    pub fn start(&self) {
        self.ctx.publish_global(BeforeProgramStart);
        self.ctx.publish_global(AfterProgramStart);
        self.ctx.executor().run_until_stalled();
    }

    pub fn update(&self) {
        self.ctx.update();
    }

    pub fn late_update(&self) {
        self.ctx.late_update();
    }

    pub fn tick(&self) {
        self.ctx.tick();
    }

    pub fn wait_frame_finish(&self) -> Task<()> {
        self.ctx.wait_frame_finish()
    }

    pub fn spawn<T, F>(&self, future: F) -> Task<T>
    where
        T: 'static,
        F: Future<Output = T> + 'static,
    {
        self.ctx.spawn(future)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Disposes the root scene and drops every pending flow and timer.
    /// Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.root.dispose();
        self.ctx.shutdown();
        log::info!("game disposed");
    }
}

impl Drop for Game {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Game {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("context", &self.ctx)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}
