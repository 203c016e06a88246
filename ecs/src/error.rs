use thiserror::Error;

/// Misuse of the entity tree.
///
/// Every variant is a logic defect in the calling code; nothing here is
/// retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EntityError {
    /// An entity was made its own parent.
    #[error("cant set parent self: {0}")]
    SelfParent(&'static str),
    /// The new parent is not part of a tree yet.
    #[error("cant set parent because parent domain is null: {child} {parent}")]
    ParentWithoutDomain {
        /// Type of the entity being attached.
        child: &'static str,
        /// Type of the intended parent.
        parent: &'static str,
    },
    /// The entity is already attached to this parent.
    #[error("parent set twice: {child} parent: {parent}")]
    DuplicateParent {
        /// Type of the entity being attached.
        child: &'static str,
        /// Type of the parent.
        parent: &'static str,
    },
    /// The entity already has a component of this type.
    #[error("entity already has component: {0}")]
    DuplicateComponent(&'static str),
    /// The entity already has a child with this id.
    #[error("entity already has child: {0}")]
    DuplicateChild(u64),
    /// The owning game context has been dropped.
    #[error("game context has been dropped")]
    ContextDropped,
    /// The entity has been disposed.
    #[error("entity has been disposed: {0}")]
    Disposed(&'static str),
}

/// Result type for entity tree operations.
pub type EntityResult<T> = Result<T, EntityError>;

/// Error returned by an event handler.
pub type HandlerError = Box<dyn std::error::Error>;
