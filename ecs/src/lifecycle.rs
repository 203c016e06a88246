use std::cell::{Cell, RefCell};

use crate::entity::Entity;
use crate::entity_center::EntityCenter;

/// Frame phase swept by the [`EntityLifecycleScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The update phase.
    Update,
    /// The late update phase, after every update callback.
    LateUpdate,
}

/// Per-frame update and late update queues.
///
/// Entities are queued by instance id once, when they register, for each
/// frame capability they have. A sweep walks its queue back to front and
/// looks every id up in the [`EntityCenter`]; ids whose entity is gone or
/// disposed are dropped from the queue at that point and never earlier.
#[derive(Default)]
pub struct EntityLifecycleScheduler {
    update: RefCell<Vec<u64>>,
    late_update: RefCell<Vec<u64>>,
    sweeping: Cell<bool>,
}

impl EntityLifecycleScheduler {
    /// Creates empty queues.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, entity: &Entity) {
        let caps = entity.capabilities();
        if caps.update {
            self.update.borrow_mut().push(entity.instance_id());
        }
        if caps.late_update {
            self.late_update.borrow_mut().push(entity.instance_id());
        }
    }

    /// Runs the update callback of every live queued entity.
    pub fn update(&self, center: &EntityCenter) {
        self.sweep(Phase::Update, center);
    }

    /// Runs the late update callback of every live queued entity.
    pub fn late_update(&self, center: &EntityCenter) {
        self.sweep(Phase::LateUpdate, center);
    }

    /// Number of ids queued for `phase`, stale ones included.
    pub fn queued(&self, phase: Phase) -> usize {
        self.queue(phase).borrow().len()
    }

    fn queue(&self, phase: Phase) -> &RefCell<Vec<u64>> {
        match phase {
            Phase::Update => &self.update,
            Phase::LateUpdate => &self.late_update,
        }
    }

    fn sweep(&self, phase: Phase, center: &EntityCenter) {
        if self.sweeping.replace(true) {
            log::warn!("{phase:?} sweep requested during a sweep, ignored");
            return;
        }

        let queue = self.queue(phase);
        let mut index = queue.borrow().len();
        while index > 0 {
            index -= 1;
            let Some(instance_id) = queue.borrow().get(index).copied() else {
                continue;
            };
            match center.get(instance_id) {
                Some(entity) if !entity.is_disposed() => match phase {
                    Phase::Update => entity.run_update(),
                    Phase::LateUpdate => entity.run_late_update(),
                },
                _ => {
                    queue.borrow_mut().remove(index);
                }
            }
        }

        self.sweeping.set(false);
    }

    pub(crate) fn clear(&self) {
        self.update.borrow_mut().clear();
        self.late_update.borrow_mut().clear();
    }
}

impl std::fmt::Debug for EntityLifecycleScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLifecycleScheduler")
            .field("update", &self.queued(Phase::Update))
            .field("late_update", &self.queued(Phase::LateUpdate))
            .finish()
    }
}
