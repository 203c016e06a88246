//! # Moye ECS
//!
//! Entity tree and frame loop of the Moye game runtime.
//!
//! ## Core Types
//!
//! - [`Entity`] — Node of the entity tree carrying one [`Behaviour`]
//! - [`Scene`] — Behaviour of domain roots; handlers filter on [`SceneType`]
//! - [`EntityCenter`] — Registry of live entities by instance id
//! - [`EntityLifecycleScheduler`] — Per-frame update and late update queues
//!
//! ## Frame Loop
//!
//! - [`Game`] — Owns the [`Context`] and the root process scene
//! - [`Context`] — Timers, locks, pool, ids, events and the flow executor
//! - [`EventSystem`] — Typed event handlers registered per scene type
//!
//! A frame is [`Game::update`] followed by [`Game::late_update`]: timers
//! fire first, then update callbacks, then late update callbacks, then
//! flows waiting on [`Game::wait_frame_finish`] resume.

mod behaviour;
mod context;
mod entity;
mod entity_center;
mod error;
mod event;
mod game;
mod lifecycle;
mod scene;
mod status;

pub use behaviour::{Awake, Behaviour, Destroy, Empty, LateUpdate, Update};
pub use context::Context;
pub use entity::Entity;
pub use entity_center::EntityCenter;
pub use error::{EntityError, EntityResult, HandlerError};
pub use event::{
    AfterProgramInit, AfterProgramStart, AsyncEventHandler, BeforeProgramInit, BeforeProgramStart,
    Event, EventHandler, EventSystem,
};
pub use game::{Game, GameBuilder};
pub use lifecycle::{EntityLifecycleScheduler, Phase};
pub use scene::{Scene, SceneInit, SceneType};
pub use status::EntityStatus;

pub use moye_core;

/// ECS library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;
    use moye_core::time::ManualClock;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Ticks(u32);

    impl Update for Ticks {
        fn update(&mut self, _entity: &Entity) {
            self.0 += 1;
        }
    }

    impl Behaviour for Ticks {
        fn as_update(&mut self) -> Option<&mut dyn Update> {
            Some(self)
        }
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn game_ticks_update_callbacks() {
        let game = Game::builder()
            .with_clock(ManualClock::new(1_700_000_000_000))
            .build()
            .unwrap();
        let entity = game.root().add_child::<Ticks>().unwrap();

        game.tick();
        game.tick();
        assert_eq!(entity.data::<Ticks>().unwrap().0, 2);
    }

    #[test]
    fn dispose_clears_the_context() {
        let game = Game::builder().build().unwrap();
        let ctx = Rc::clone(game.context());
        let entity = game.root().add_child::<Ticks>().unwrap();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        ctx.timers().new_once_timer(0, move || flag.set(true));

        game.dispose();
        game.dispose();

        assert!(game.is_disposed());
        assert!(entity.is_disposed());
        assert!(game.root().is_disposed());
        assert!(ctx.entities().is_empty());
        assert!(ctx.timers().is_empty());
        assert!(!fired.get());
    }
}
