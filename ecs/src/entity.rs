//! Entity tree nodes.
//!
//! An [`Entity`] owns its children (keyed by id) and its components (keyed
//! by behaviour type). Upward links (parent and domain) are weak. The
//! domain is the scene every node of a subtree answers to: the first time
//! an entity gets one, it receives an instance id and registers with the
//! [`EntityCenter`](crate::EntityCenter) and the frame scheduler.
//!
//! # Disposal
//!
//! [`Entity::dispose`] unregisters the entity, zeroes its instance id,
//! disposes children then components, runs the destroy callback, clears the
//! domain, detaches from the parent, and recycles the node if it came from
//! the pool. When an entity disposes itself from inside one of its own
//! callbacks, everything from the destroy callback on runs once that
//! callback returns.
//!
//! # Pooling
//!
//! Pooled entities recycle the whole node. A handle kept past disposal of
//! a pooled entity points at whatever entity reuses the node next.

use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::rc::{Rc, Weak};

use crate::behaviour::{Behaviour, Capabilities};
use crate::context::Context;
use crate::error::{EntityError, EntityResult};
use crate::scene::Scene;
use crate::status::EntityStatus;

type ChildMap = HashMap<u64, Entity>;
type ComponentMap = HashMap<TypeId, Entity>;

/// Pool key of recycled entities carrying a `T`.
struct EntitySlot<T>(PhantomData<T>);

struct EntityNode {
    ctx: Weak<Context>,
    id: Cell<u64>,
    instance_id: Cell<u64>,
    status: Cell<EntityStatus>,
    parent: RefCell<Weak<EntityNode>>,
    domain: RefCell<Weak<EntityNode>>,
    children: RefCell<Option<ChildMap>>,
    components: RefCell<Option<ComponentMap>>,
    type_tag: TypeId,
    type_name: &'static str,
    pool_key: TypeId,
    caps: Capabilities,
    data: RefCell<Box<dyn Behaviour>>,
    callback_depth: Cell<u32>,
    dispose_deferred: Cell<bool>,
}

/// Handle to a node of the entity tree.
///
/// Cloning is cheap and yields another handle to the same node. Two handles
/// are equal when they point at the same node.
#[derive(Clone)]
pub struct Entity {
    node: Rc<EntityNode>,
}

impl Entity {
    /// Creates a detached entity carrying `T::default()`.
    ///
    /// A detached entity has no instance id yet (so it reports itself as
    /// disposed) until it is attached with
    /// [`add_child_entity`](Self::add_child_entity) or
    /// [`add_component_entity`](Self::add_component_entity).
    pub fn create<T: Behaviour + Default>(ctx: &Rc<Context>) -> Entity {
        Self::create_with::<T>(ctx, false)
    }

    /// Like [`create`](Self::create), but reuses a recycled node when one
    /// is available. The entity returns to the pool when disposed.
    pub fn create_pooled<T: Behaviour + Default>(ctx: &Rc<Context>) -> Entity {
        Self::create_with::<T>(ctx, true)
    }

    fn create_with<T: Behaviour + Default>(ctx: &Rc<Context>, from_pool: bool) -> Entity {
        let recycled = if from_pool {
            ctx.pool()
                .fetch_erased(TypeId::of::<EntitySlot<T>>())
                .and_then(|boxed| boxed.downcast::<Entity>().ok())
        } else {
            None
        };
        let entity = match recycled {
            Some(entity) => {
                entity.reinit::<T>();
                *entity
            }
            None => Entity::with_data(ctx, T::default()),
        };

        let mut status = EntityStatus::CREATED | EntityStatus::NEW;
        status.set(EntityStatus::FROM_POOL, from_pool);
        entity.node.status.set(status);
        entity
    }

    pub(crate) fn with_data<T: Behaviour>(ctx: &Rc<Context>, mut data: T) -> Entity {
        let caps = Capabilities::probe(&mut data);
        Entity {
            node: Rc::new(EntityNode {
                ctx: Rc::downgrade(ctx),
                id: Cell::new(0),
                instance_id: Cell::new(0),
                status: Cell::new(EntityStatus::empty()),
                parent: RefCell::new(Weak::new()),
                domain: RefCell::new(Weak::new()),
                children: RefCell::new(None),
                components: RefCell::new(None),
                type_tag: TypeId::of::<T>(),
                type_name: std::any::type_name::<T>(),
                pool_key: TypeId::of::<EntitySlot<T>>(),
                caps,
                data: RefCell::new(Box::new(data)),
                callback_depth: Cell::new(0),
                dispose_deferred: Cell::new(false),
            }),
        }
    }

    /// Resets a recycled node for reuse.
    fn reinit<T: Behaviour + Default>(&self) {
        let node = &self.node;
        node.id.set(0);
        node.instance_id.set(0);
        node.status.set(EntityStatus::empty());
        *node.parent.borrow_mut() = Weak::new();
        *node.domain.borrow_mut() = Weak::new();
        node.children.borrow_mut().take();
        node.components.borrow_mut().take();
        node.callback_depth.set(0);
        node.dispose_deferred.set(false);
        if let Ok(mut data) = node.data.try_borrow_mut()
            && let Some(data) = (&mut **data as &mut dyn Any).downcast_mut::<T>()
        {
            *data = T::default();
        }
    }

    /// Domain-scoped id. Components share their owner's id.
    pub fn id(&self) -> u64 {
        self.node.id.get()
    }

    /// Process-unique id, or 0 once disposed.
    pub fn instance_id(&self) -> u64 {
        self.node.instance_id.get()
    }

    /// Returns `true` if the instance id is 0.
    pub fn is_disposed(&self) -> bool {
        self.instance_id() == 0
    }

    /// Current status flags.
    pub fn status(&self) -> EntityStatus {
        self.node.status.get()
    }

    /// Returns `true` if the entity came from the pool.
    pub fn is_from_pool(&self) -> bool {
        self.status().contains(EntityStatus::FROM_POOL)
    }

    /// Returns `true` if the entity is attached as a component.
    pub fn is_component(&self) -> bool {
        self.status().contains(EntityStatus::COMPONENT)
    }

    /// Returns `true` while the entity is in the entity center.
    pub fn is_registered(&self) -> bool {
        self.status().contains(EntityStatus::REGISTERED)
    }

    /// Returns `true` once the entity has been built by the factory.
    pub fn is_created(&self) -> bool {
        self.status().contains(EntityStatus::CREATED)
    }

    /// Returns `true` while the entity is freshly constructed.
    pub fn is_new(&self) -> bool {
        self.status().contains(EntityStatus::NEW)
    }

    /// Type name of the behaviour.
    pub fn type_name(&self) -> &'static str {
        self.node.type_name
    }

    /// Type tag of the behaviour. Components are keyed by it.
    pub fn type_tag(&self) -> TypeId {
        self.node.type_tag
    }

    /// Returns `true` if the behaviour is a `T`.
    pub fn is<T: Behaviour>(&self) -> bool {
        self.node.type_tag == TypeId::of::<T>()
    }

    pub(crate) fn is_scene(&self) -> bool {
        self.is::<Scene>()
    }

    pub(crate) fn capabilities(&self) -> Capabilities {
        self.node.caps
    }

    /// Borrows the behaviour as a `T`.
    ///
    /// Returns `None` for another type, or while the behaviour is mutably
    /// borrowed (for instance inside its own callback).
    pub fn data<T: Behaviour>(&self) -> Option<Ref<'_, T>> {
        let data = self.node.data.try_borrow().ok()?;
        Ref::filter_map(data, |data| (&**data as &dyn Any).downcast_ref::<T>()).ok()
    }

    /// Mutably borrows the behaviour as a `T`.
    pub fn data_mut<T: Behaviour>(&self) -> Option<RefMut<'_, T>> {
        let data = self.node.data.try_borrow_mut().ok()?;
        RefMut::filter_map(data, |data| (&mut **data as &mut dyn Any).downcast_mut::<T>()).ok()
    }

    /// The game context this entity belongs to.
    pub fn context(&self) -> EntityResult<Rc<Context>> {
        self.node.ctx.upgrade().ok_or(EntityError::ContextDropped)
    }

    /// The entity this one is attached to.
    pub fn parent(&self) -> Option<Entity> {
        self.node
            .parent
            .borrow()
            .upgrade()
            .map(|node| Entity { node })
    }

    /// The scene this entity's subtree answers to.
    pub fn domain(&self) -> Option<Entity> {
        self.node
            .domain
            .borrow()
            .upgrade()
            .map(|node| Entity { node })
    }

    /// Same as [`domain`](Self::domain): domains are always scenes.
    pub fn domain_scene(&self) -> Option<Entity> {
        self.domain()
    }

    /// Children, in no particular order.
    pub fn children(&self) -> Vec<Entity> {
        self.node
            .children
            .borrow()
            .as_ref()
            .map(|children| children.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Components, in no particular order.
    pub fn components(&self) -> Vec<Entity> {
        self.node
            .components
            .borrow()
            .as_ref()
            .map(|components| components.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.node.children.borrow().as_ref().map_or(0, HashMap::len)
    }

    /// Number of components.
    pub fn component_count(&self) -> usize {
        self.node.components.borrow().as_ref().map_or(0, HashMap::len)
    }

    /// Looks up a child by id.
    pub fn get_child(&self, id: u64) -> Option<Entity> {
        self.node.children.borrow().as_ref()?.get(&id).cloned()
    }

    /// Looks up the component carrying a `T`.
    pub fn get_component<T: Behaviour>(&self) -> Option<Entity> {
        self.component_by_tag(TypeId::of::<T>())
    }

    fn component_by_tag(&self, tag: TypeId) -> Option<Entity> {
        self.node.components.borrow().as_ref()?.get(&tag).cloned()
    }

    /// Creates a `T` child with a fresh id and runs its awake callback.
    pub fn add_child<T: Behaviour + Default>(&self) -> EntityResult<Entity> {
        self.create_child::<T>(None, false)
    }

    /// Like [`add_child`](Self::add_child), with a pooled node.
    pub fn add_child_pooled<T: Behaviour + Default>(&self) -> EntityResult<Entity> {
        self.create_child::<T>(None, true)
    }

    /// Creates a `T` child with the given id and runs its awake callback.
    pub fn add_child_with_id<T: Behaviour + Default>(&self, id: u64) -> EntityResult<Entity> {
        self.create_child::<T>(Some(id), false)
    }

    /// Like [`add_child_with_id`](Self::add_child_with_id), with a pooled
    /// node.
    pub fn add_child_with_id_pooled<T: Behaviour + Default>(
        &self,
        id: u64,
    ) -> EntityResult<Entity> {
        self.create_child::<T>(Some(id), true)
    }

    /// Attaches an existing entity as a child, moving it from its current
    /// parent. The awake callback is not run.
    pub fn add_child_entity(&self, entity: &Entity) -> EntityResult<Entity> {
        if entity.status().is_empty() {
            return Err(EntityError::Disposed(entity.type_name()));
        }
        entity.attach(self, false)?;
        Ok(entity.clone())
    }

    fn create_child<T: Behaviour + Default>(
        &self,
        id: Option<u64>,
        from_pool: bool,
    ) -> EntityResult<Entity> {
        let ctx = self.context()?;
        let child = Entity::create_with::<T>(&ctx, from_pool);
        child
            .node
            .id
            .set(id.unwrap_or_else(|| ctx.ids().generate_id()));
        child.attach(self, false)?;
        child.run_awake();
        Ok(child)
    }

    /// Creates a `T` component and runs its awake callback.
    ///
    /// Fails if a `T` component is already attached.
    pub fn add_component<T: Behaviour + Default>(&self) -> EntityResult<Entity> {
        self.create_component::<T>(false)
    }

    /// Like [`add_component`](Self::add_component), with a pooled node.
    pub fn add_component_pooled<T: Behaviour + Default>(&self) -> EntityResult<Entity> {
        self.create_component::<T>(true)
    }

    /// Returns the `T` component, adding one if there is none.
    pub fn try_add_component<T: Behaviour + Default>(&self) -> EntityResult<Entity> {
        match self.get_component::<T>() {
            Some(component) => Ok(component),
            None => self.add_component::<T>(),
        }
    }

    /// Attaches an existing entity as a component, moving it from its
    /// current parent. The awake callback is not run.
    pub fn add_component_entity(&self, entity: &Entity) -> EntityResult<Entity> {
        if entity.status().is_empty() {
            return Err(EntityError::Disposed(entity.type_name()));
        }
        entity.attach(self, true)?;
        entity.node.id.set(self.id());
        Ok(entity.clone())
    }

    fn create_component<T: Behaviour + Default>(&self, from_pool: bool) -> EntityResult<Entity> {
        if self.get_component::<T>().is_some() {
            return Err(EntityError::DuplicateComponent(std::any::type_name::<T>()));
        }
        let ctx = self.context()?;
        let component = Entity::create_with::<T>(&ctx, from_pool);
        component.node.id.set(self.id());
        component.attach(self, true)?;
        component.run_awake();
        Ok(component)
    }

    /// Detaches and disposes the `T` component. No-op if there is none or
    /// if this entity is disposed.
    pub fn remove_component<T: Behaviour>(&self) {
        if self.is_disposed() {
            return;
        }
        if let Some(component) = self.take_component(TypeId::of::<T>()) {
            component.dispose();
        }
    }

    /// Detaches and disposes the child with this id. No-op if there is
    /// none or if this entity is disposed.
    pub fn remove_child(&self, id: u64) {
        if self.is_disposed() {
            return;
        }
        if let Some(child) = self.take_child(id) {
            child.dispose();
        }
    }

    /// Makes `parent` the parent of this entity and adopts its domain.
    fn attach(&self, parent: &Entity, as_component: bool) -> EntityResult<()> {
        if self == parent {
            return Err(EntityError::SelfParent(self.type_name()));
        }
        let Some(domain) = parent.domain() else {
            return Err(EntityError::ParentWithoutDomain {
                child: self.type_name(),
                parent: parent.type_name(),
            });
        };
        if parent.is_disposed() {
            return Err(EntityError::Disposed(parent.type_name()));
        }
        let previous = self.parent();
        if previous.as_ref() == Some(parent) {
            return Err(EntityError::DuplicateParent {
                child: self.type_name(),
                parent: parent.type_name(),
            });
        }
        if as_component {
            if parent.component_by_tag(self.type_tag()).is_some() {
                return Err(EntityError::DuplicateComponent(self.type_name()));
            }
        } else if parent.get_child(self.id()).is_some() {
            return Err(EntityError::DuplicateChild(self.id()));
        }
        let ctx = self.context()?;

        if let Some(previous) = previous {
            previous.detach(self);
        }
        *self.node.parent.borrow_mut() = Rc::downgrade(&parent.node);
        let mut status = self.status();
        status.set(EntityStatus::COMPONENT, as_component);
        self.node.status.set(status);
        if as_component {
            parent.insert_component(self.clone(), &ctx);
        } else {
            parent.insert_child(self.clone(), &ctx);
        }

        self.set_domain(&domain, &ctx);
        Ok(())
    }

    /// Removes `entity` from this entity's children or components.
    fn detach(&self, entity: &Entity) {
        if entity.is_component() {
            let tag = entity.type_tag();
            if self.component_by_tag(tag).as_ref() == Some(entity) {
                self.take_component(tag);
            }
        } else if self.get_child(entity.id()).as_ref() == Some(entity) {
            self.take_child(entity.id());
        }
    }

    fn insert_child(&self, child: Entity, ctx: &Context) {
        self.node
            .children
            .borrow_mut()
            .get_or_insert_with(|| ctx.pool().fetch::<ChildMap>())
            .insert(child.id(), child);
    }

    fn insert_component(&self, component: Entity, ctx: &Context) {
        self.node
            .components
            .borrow_mut()
            .get_or_insert_with(|| ctx.pool().fetch::<ComponentMap>())
            .insert(component.type_tag(), component);
    }

    fn take_child(&self, id: u64) -> Option<Entity> {
        let (child, emptied) = {
            let mut slot = self.node.children.borrow_mut();
            let children = slot.as_mut()?;
            let child = children.remove(&id);
            let emptied = if children.is_empty() { slot.take() } else { None };
            (child, emptied)
        };
        if let Some(map) = emptied {
            self.recycle_map(map);
        }
        child
    }

    fn take_component(&self, tag: TypeId) -> Option<Entity> {
        let (component, emptied) = {
            let mut slot = self.node.components.borrow_mut();
            let components = slot.as_mut()?;
            let component = components.remove(&tag);
            let emptied = if components.is_empty() { slot.take() } else { None };
            (component, emptied)
        };
        if let Some(map) = emptied {
            self.recycle_map(map);
        }
        component
    }

    fn recycle_map<K: 'static>(&self, mut map: HashMap<K, Entity>) {
        map.clear();
        if let Some(ctx) = self.node.ctx.upgrade() {
            ctx.pool().recycle(map);
        }
    }

    /// Moves this subtree into `domain`.
    ///
    /// The first domain assigns the instance id and registers the entity.
    /// Scenes keep their own domain.
    fn set_domain(&self, domain: &Entity, ctx: &Context) {
        if self.is_scene() {
            if !self.is_registered() {
                *self.node.domain.borrow_mut() = Rc::downgrade(&self.node);
                self.node.instance_id.set(ctx.ids().generate_instance_id());
                self.set_registered(true, ctx);
            }
            return;
        }
        let current = self.domain();
        if current.as_ref() == Some(domain) {
            return;
        }
        *self.node.domain.borrow_mut() = Rc::downgrade(&domain.node);
        if !self.is_registered() {
            self.node.instance_id.set(ctx.ids().generate_instance_id());
            self.set_registered(true, ctx);
        }

        for child in self.children() {
            child.set_domain(domain, ctx);
        }
        for component in self.components() {
            component.set_domain(domain, ctx);
        }

        let mut status = self.status();
        status.insert(EntityStatus::CREATED);
        self.node.status.set(status);
    }

    fn set_registered(&self, registered: bool, ctx: &Context) {
        let mut status = self.status();
        if status.contains(EntityStatus::REGISTERED) == registered {
            return;
        }
        status.set(EntityStatus::REGISTERED, registered);
        self.node.status.set(status);
        if registered {
            ctx.entities().add(self.clone());
            ctx.lifecycle().register(self);
        } else {
            ctx.entities().remove(self.instance_id());
        }
    }

    /// Sets up a scene node: it is its own domain and registers at once.
    pub(crate) fn init_scene(
        &self,
        ctx: &Context,
        id: u64,
        instance_id: u64,
        parent: Option<&Entity>,
    ) -> EntityResult<()> {
        if let Some(parent) = parent
            && parent.get_child(id).is_some()
        {
            return Err(EntityError::DuplicateChild(id));
        }
        self.node.id.set(id);
        self.node.instance_id.set(instance_id);
        self.node.status.set(EntityStatus::CREATED | EntityStatus::NEW);
        if let Some(parent) = parent {
            *self.node.parent.borrow_mut() = Rc::downgrade(&parent.node);
            parent.insert_child(self.clone(), ctx);
        }
        *self.node.domain.borrow_mut() = Rc::downgrade(&self.node);
        self.set_registered(true, ctx);
        Ok(())
    }

    /// Disposes this entity and its whole subtree. Idempotent.
    pub fn dispose(&self) {
        if self.is_disposed() {
            return;
        }
        let ctx = self.node.ctx.upgrade();
        match &ctx {
            Some(ctx) => self.set_registered(false, ctx),
            None => {
                let mut status = self.status();
                status.remove(EntityStatus::REGISTERED);
                self.node.status.set(status);
            }
        }
        self.node.instance_id.set(0);

        let children = self.node.children.borrow_mut().take();
        if let Some(children) = children {
            for child in children.values() {
                child.dispose();
            }
            self.recycle_map(children);
        }
        let components = self.node.components.borrow_mut().take();
        if let Some(components) = components {
            for component in components.values() {
                component.dispose();
            }
            self.recycle_map(components);
        }

        if self.node.callback_depth.get() > 0 {
            self.node.dispose_deferred.set(true);
            return;
        }
        self.finish_dispose(ctx.as_deref());
    }

    fn finish_dispose(&self, ctx: Option<&Context>) {
        if self.node.caps.destroy {
            self.invoke(|data, entity| {
                if let Some(destroy) = data.as_destroy() {
                    destroy.destroy(entity);
                }
            });
        }

        *self.node.domain.borrow_mut() = Weak::new();
        let parent = std::mem::take(&mut *self.node.parent.borrow_mut()).upgrade();
        if let Some(node) = parent {
            let parent = Entity { node };
            if !parent.is_disposed() {
                parent.detach(self);
            }
        }

        let from_pool = self.is_from_pool();
        self.node.status.set(EntityStatus::empty());
        if from_pool && let Some(ctx) = ctx {
            ctx.pool().recycle_erased(
                self.node.pool_key,
                self.node.type_name,
                Box::new(self.clone()),
            );
        }
    }

    /// Runs `callback` on the behaviour, deferring a self-dispose requested
    /// inside it until it returns.
    fn invoke(&self, callback: impl FnOnce(&mut dyn Behaviour, &Entity)) {
        let depth = self.node.callback_depth.get();
        self.node.callback_depth.set(depth + 1);
        match self.node.data.try_borrow_mut() {
            Ok(mut data) => callback(&mut **data, self),
            Err(_) => log::error!("{}: callback skipped, data is borrowed", self.type_name()),
        }
        self.node.callback_depth.set(depth);

        if depth == 0 && self.node.dispose_deferred.replace(false) {
            let ctx = self.node.ctx.upgrade();
            self.finish_dispose(ctx.as_deref());
        }
    }

    fn run_awake(&self) {
        if self.node.caps.awake {
            self.invoke(|data, entity| {
                if let Some(awake) = data.as_awake() {
                    awake.awake(entity);
                }
            });
        }
    }

    pub(crate) fn run_update(&self) {
        self.invoke(|data, entity| {
            if let Some(update) = data.as_update() {
                update.update(entity);
            }
        });
    }

    pub(crate) fn run_late_update(&self) {
        self.invoke(|data, entity| {
            if let Some(late_update) = data.as_late_update() {
                late_update.late_update(entity);
            }
        });
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("type", &self.type_name())
            .field("id", &self.id())
            .field("instance_id", &self.instance_id())
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behaviour::{Awake, Destroy, Empty, Update};
    use crate::event::EventSystem;
    use moye_core::Options;
    use moye_core::time::ManualClock;
    use std::sync::Arc;

    fn test_root() -> (Rc<Context>, Entity) {
        let ctx = Context::new(
            Options::default(),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            EventSystem::new(),
        );
        let init = crate::SceneInit::new(0, crate::SceneType::PROCESS, "Process");
        let root = Scene::create(&ctx, init).unwrap();
        (ctx, root)
    }

    #[derive(Default)]
    struct Counter {
        awakes: u32,
        updates: u32,
        destroys: Rc<Cell<u32>>,
    }

    impl Awake for Counter {
        fn awake(&mut self, _entity: &Entity) {
            self.awakes += 1;
        }
    }

    impl Update for Counter {
        fn update(&mut self, _entity: &Entity) {
            self.updates += 1;
        }
    }

    impl Destroy for Counter {
        fn destroy(&mut self, _entity: &Entity) {
            self.destroys.set(self.destroys.get() + 1);
        }
    }

    impl Behaviour for Counter {
        fn as_awake(&mut self) -> Option<&mut dyn Awake> {
            Some(self)
        }

        fn as_update(&mut self) -> Option<&mut dyn Update> {
            Some(self)
        }

        fn as_destroy(&mut self) -> Option<&mut dyn Destroy> {
            Some(self)
        }
    }

    /// Disposes itself from its own update.
    #[derive(Default)]
    struct SelfDestruct {
        destroyed_while_parented: Rc<Cell<bool>>,
    }

    impl Update for SelfDestruct {
        fn update(&mut self, entity: &Entity) {
            entity.dispose();
        }
    }

    impl Destroy for SelfDestruct {
        fn destroy(&mut self, entity: &Entity) {
            self.destroyed_while_parented.set(entity.parent().is_some());
        }
    }

    impl Behaviour for SelfDestruct {
        fn as_update(&mut self) -> Option<&mut dyn Update> {
            Some(self)
        }

        fn as_destroy(&mut self) -> Option<&mut dyn Destroy> {
            Some(self)
        }
    }

    #[test]
    fn add_child_shares_domain_and_registers() {
        let (ctx, root) = test_root();
        let child = root.add_child::<Empty>().unwrap();

        assert_eq!(child.domain(), Some(root.clone()));
        assert_eq!(child.parent(), Some(root.clone()));
        assert!(child.is_registered());
        assert!(!child.is_disposed());
        assert_eq!(ctx.entities().get(child.instance_id()), Some(child.clone()));
        assert_eq!(root.get_child(child.id()), Some(child));
    }

    #[test]
    fn grandchildren_share_the_root_domain() {
        let (_ctx, root) = test_root();
        let child = root.add_child::<Empty>().unwrap();
        let grandchild = child.add_child::<Empty>().unwrap();
        assert_eq!(grandchild.domain(), Some(root));
        assert_ne!(grandchild.instance_id(), child.instance_id());
    }

    #[test]
    fn awake_runs_once_on_add() {
        let (_ctx, root) = test_root();
        let child = root.add_child::<Counter>().unwrap();
        assert_eq!(child.data::<Counter>().unwrap().awakes, 1);
    }

    #[test]
    fn component_shares_owner_id() {
        let (_ctx, root) = test_root();
        let owner = root.add_child::<Empty>().unwrap();
        let component = owner.add_component::<Counter>().unwrap();

        assert_eq!(component.id(), owner.id());
        assert_ne!(component.instance_id(), owner.instance_id());
        assert!(component.is_component());
        assert_eq!(owner.get_component::<Counter>(), Some(component));
    }

    #[test]
    fn duplicate_component_is_rejected() {
        let (_ctx, root) = test_root();
        let owner = root.add_child::<Empty>().unwrap();
        owner.add_component::<Counter>().unwrap();
        assert!(matches!(
            owner.add_component::<Counter>(),
            Err(EntityError::DuplicateComponent(_))
        ));
        let existing = owner.try_add_component::<Counter>().unwrap();
        assert_eq!(owner.get_component::<Counter>(), Some(existing));
        assert_eq!(owner.component_count(), 1);
    }

    #[test]
    fn duplicate_child_id_is_rejected() {
        let (_ctx, root) = test_root();
        root.add_child_with_id::<Empty>(7).unwrap();
        assert_eq!(
            root.add_child_with_id::<Empty>(7),
            Err(EntityError::DuplicateChild(7))
        );
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn self_and_duplicate_parenting_fail() {
        let (_ctx, root) = test_root();
        let child = root.add_child::<Empty>().unwrap();
        assert!(matches!(
            child.add_child_entity(&child),
            Err(EntityError::SelfParent(_))
        ));
        assert!(matches!(
            root.add_child_entity(&child),
            Err(EntityError::DuplicateParent { .. })
        ));
    }

    #[test]
    fn parent_without_domain_is_rejected() {
        let (ctx, _root) = test_root();
        let detached = Entity::create::<Empty>(&ctx);
        assert!(matches!(
            detached.add_child::<Empty>(),
            Err(EntityError::ParentWithoutDomain { .. })
        ));
    }

    #[test]
    fn reparenting_moves_between_parents() {
        let (_ctx, root) = test_root();
        let a = root.add_child::<Empty>().unwrap();
        let b = root.add_child::<Empty>().unwrap();
        let child = a.add_child::<Empty>().unwrap();
        let instance_id = child.instance_id();

        b.add_child_entity(&child).unwrap();
        assert_eq!(a.child_count(), 0);
        assert_eq!(b.get_child(child.id()), Some(child.clone()));
        // Same domain: no re-registration.
        assert_eq!(child.instance_id(), instance_id);
    }

    #[test]
    fn dispose_is_recursive_and_idempotent() {
        let (ctx, root) = test_root();
        let parent = root.add_child::<Empty>().unwrap();
        let child = parent.add_child::<Counter>().unwrap();
        let component = parent.add_component::<Counter>().unwrap();
        let destroys = Rc::clone(&child.data::<Counter>().unwrap().destroys);
        let before = ctx.entities().len();

        parent.dispose();
        parent.dispose();

        assert!(parent.is_disposed());
        assert!(child.is_disposed());
        assert!(component.is_disposed());
        assert_eq!(destroys.get(), 1);
        assert_eq!(ctx.entities().len(), before - 3);
        assert_eq!(root.get_child(parent.id()), None);
        assert!(parent.status().is_empty());
        assert_eq!(child.domain(), None);
    }

    #[test]
    fn remove_component_and_child_dispose_them() {
        let (_ctx, root) = test_root();
        let owner = root.add_child::<Empty>().unwrap();
        let component = owner.add_component::<Counter>().unwrap();
        let child = owner.add_child::<Empty>().unwrap();

        owner.remove_component::<Counter>();
        owner.remove_child(child.id());
        owner.remove_child(12345);

        assert!(component.is_disposed());
        assert!(child.is_disposed());
        assert_eq!(owner.component_count(), 0);
        assert_eq!(owner.child_count(), 0);
    }

    #[test]
    fn remove_on_disposed_owner_is_a_no_op() {
        let (ctx, root) = test_root();
        let owner = root.add_child::<Empty>().unwrap();
        owner.add_component::<Counter>().unwrap();
        owner.add_child::<Empty>().unwrap();
        owner.dispose();
        let registered = ctx.entities().len();

        owner.remove_component::<Counter>();
        owner.remove_child(owner.id());

        assert!(owner.status().is_empty());
        assert_eq!(ctx.entities().len(), registered);
    }

    #[test]
    fn pooled_entity_is_recycled_and_reset() {
        let (ctx, root) = test_root();
        let child = root.add_child_pooled::<Counter>().unwrap();
        assert!(child.is_from_pool());
        child.data_mut::<Counter>().unwrap().updates = 9;
        child.dispose();
        assert_eq!(ctx.pool().len_erased(TypeId::of::<EntitySlot<Counter>>()), 1);

        let reused = root.add_child_pooled::<Counter>().unwrap();
        assert_eq!(reused, child);
        assert_eq!(reused.data::<Counter>().unwrap().updates, 0);
        assert_eq!(reused.data::<Counter>().unwrap().awakes, 1);
        assert!(!reused.is_disposed());
    }

    #[test]
    fn self_dispose_in_callback_defers_destroy() {
        let (_ctx, root) = test_root();
        let entity = root.add_child::<SelfDestruct>().unwrap();
        let flag = Rc::clone(&entity.data::<SelfDestruct>().unwrap().destroyed_while_parented);

        entity.run_update();

        assert!(entity.is_disposed());
        // Destroy ran after the callback returned, before detaching.
        assert!(flag.get());
        assert_eq!(entity.parent(), None);
        assert_eq!(root.child_count(), 0);
    }

    #[test]
    fn data_is_typed() {
        let (_ctx, root) = test_root();
        let child = root.add_child::<Counter>().unwrap();
        assert!(child.is::<Counter>());
        assert!(child.data::<Empty>().is_none());
        assert!(child.type_name().ends_with("Counter"));
    }
}
