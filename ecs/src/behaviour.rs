//! Behaviour data and per-entity callbacks.
//!
//! Every entity carries one value implementing [`Behaviour`]. The
//! behaviour opts into lifecycle callbacks by returning itself from the
//! matching `as_*` accessor; the scheduler probes these once, when the
//! entity is created, and only queues the capabilities it found.
//!
//! ```
//! use moye_ecs::{Behaviour, Entity, Update};
//!
//! #[derive(Default)]
//! struct Spinner {
//!     angle: f32,
//! }
//!
//! impl Update for Spinner {
//!     fn update(&mut self, _entity: &Entity) {
//!         self.angle += 1.0;
//!     }
//! }
//!
//! impl Behaviour for Spinner {
//!     fn as_update(&mut self) -> Option<&mut dyn Update> {
//!         Some(self)
//!     }
//! }
//! ```
//!
//! Callbacks receive the behaviour as `&mut self` and the owning entity
//! for structural work. Reading the same entity's data through
//! [`Entity::data`] inside its own callback finds it borrowed.

use std::any::Any;

use crate::entity::Entity;

/// Called once, right after the entity joins its parent.
pub trait Awake {
    /// Initializes the behaviour.
    fn awake(&mut self, entity: &Entity);
}

/// Called once per frame in the update phase.
pub trait Update {
    /// Runs one frame of logic.
    fn update(&mut self, entity: &Entity);
}

/// Called once per frame in the late update phase.
pub trait LateUpdate {
    /// Runs after every update callback of the frame.
    fn late_update(&mut self, entity: &Entity);
}

/// Called once while the entity is disposed, after its children and
/// components.
pub trait Destroy {
    /// Releases whatever the behaviour holds outside the tree.
    fn destroy(&mut self, entity: &Entity);
}

/// Data carried by an entity.
pub trait Behaviour: Any {
    /// Awake capability.
    fn as_awake(&mut self) -> Option<&mut dyn Awake> {
        None
    }

    /// Update capability.
    fn as_update(&mut self) -> Option<&mut dyn Update> {
        None
    }

    /// Late update capability.
    fn as_late_update(&mut self) -> Option<&mut dyn LateUpdate> {
        None
    }

    /// Destroy capability.
    fn as_destroy(&mut self) -> Option<&mut dyn Destroy> {
        None
    }
}

/// Capabilities found on a behaviour type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Capabilities {
    pub awake: bool,
    pub update: bool,
    pub late_update: bool,
    pub destroy: bool,
}

impl Capabilities {
    pub fn probe(behaviour: &mut dyn Behaviour) -> Self {
        Self {
            awake: behaviour.as_awake().is_some(),
            update: behaviour.as_update().is_some(),
            late_update: behaviour.as_late_update().is_some(),
            destroy: behaviour.as_destroy().is_some(),
        }
    }
}

/// Behaviour of an entity that only groups others.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Empty;

impl Behaviour for Empty {}
