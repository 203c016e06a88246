use std::cell::RefCell;
use std::collections::HashMap;

use crate::entity::Entity;

/// Registry of live entities keyed by instance id.
///
/// An entity is present from the moment it joins a tree until it is
/// disposed. Lookups through the registry are how the frame scheduler
/// tells live entities from vanished ones.
#[derive(Default)]
pub struct EntityCenter {
    entities: RefCell<HashMap<u64, Entity>>,
}

impl EntityCenter {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, entity: Entity) {
        let instance_id = entity.instance_id();
        self.entities.borrow_mut().insert(instance_id, entity);
    }

    pub(crate) fn remove(&self, instance_id: u64) -> Option<Entity> {
        self.entities.borrow_mut().remove(&instance_id)
    }

    /// Returns the live entity with this instance id.
    pub fn get(&self, instance_id: u64) -> Option<Entity> {
        self.entities.borrow().get(&instance_id).cloned()
    }

    /// Returns `true` if an entity with this instance id is live.
    pub fn contains(&self, instance_id: u64) -> bool {
        self.entities.borrow().contains_key(&instance_id)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.borrow().len()
    }

    /// Returns `true` if no entity is live.
    pub fn is_empty(&self) -> bool {
        self.entities.borrow().is_empty()
    }

    /// Forgets every entity without disposing it.
    pub(crate) fn clear(&self) {
        let entities = std::mem::take(&mut *self.entities.borrow_mut());
        drop(entities);
    }
}

impl std::fmt::Debug for EntityCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCenter")
            .field("len", &self.len())
            .finish()
    }
}
