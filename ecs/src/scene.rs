use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use crate::behaviour::Behaviour;
use crate::context::Context;
use crate::entity::Entity;
use crate::error::EntityResult;

/// Category tag of a scene. Event handlers filter on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneType(Cow<'static, str>);

impl SceneType {
    /// Matches every scene when used as a handler filter.
    pub const NONE: Self = Self(Cow::Borrowed("None"));
    /// The root scene of a process.
    pub const PROCESS: Self = Self(Cow::Borrowed("Process"));
    /// A client scene.
    pub const CLIENT: Self = Self(Cow::Borrowed("Client"));
    /// The scene the client is currently in.
    pub const CURRENT: Self = Self(Cow::Borrowed("Current"));

    /// Creates a custom scene type.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The name of this type.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SceneType {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for SceneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Behaviour of a scene entity.
///
/// A scene is the domain of its subtree: entities attached below it share
/// it as their domain, and it keeps its own domain when attached under
/// another scene.
#[derive(Debug, Default, Clone)]
pub struct Scene {
    name: String,
    scene_type: SceneType,
}

impl Behaviour for Scene {}

/// Parameters of [`Scene::create`].
#[derive(Debug)]
pub struct SceneInit<'a> {
    pub id: u64,
    /// Generated when `None`.
    pub instance_id: Option<u64>,
    pub scene_type: SceneType,
    pub name: String,
    /// Scene inserted into this entity's children when set.
    pub parent: Option<&'a Entity>,
}

impl<'a> SceneInit<'a> {
    pub fn new(id: u64, scene_type: SceneType, name: impl Into<String>) -> Self {
        Self {
            id,
            instance_id: None,
            scene_type,
            name: name.into(),
            parent: None,
        }
    }

    pub fn with_instance_id(mut self, instance_id: u64) -> Self {
        self.instance_id = Some(instance_id);
        self
    }

    pub fn with_parent(mut self, parent: &'a Entity) -> Self {
        self.parent = Some(parent);
        self
    }
}

impl Scene {
    /// Creates a registered scene entity that is its own domain.
    ///
    /// Fails if the parent already has a child with this id.
    pub fn create(ctx: &Rc<Context>, init: SceneInit<'_>) -> EntityResult<Entity> {
        let instance_id = init
            .instance_id
            .unwrap_or_else(|| ctx.ids().generate_instance_id());
        log::info!(
            "scene created: type = {}, name = {}, id = {}",
            init.scene_type,
            init.name,
            init.id
        );
        let entity = Entity::with_data(
            ctx,
            Scene {
                name: init.name,
                scene_type: init.scene_type,
            },
        );
        entity.init_scene(ctx, init.id, instance_id, init.parent)?;
        Ok(entity)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scene_type(&self) -> &SceneType {
        &self.scene_type
    }
}

impl Entity {
    /// Scene type of this entity, if it is a scene.
    pub fn scene_type(&self) -> Option<SceneType> {
        self.data::<Scene>().map(|scene| scene.scene_type().clone())
    }
}
