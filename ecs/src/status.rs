use bitflags::bitflags;

bitflags! {
    /// Lifecycle flags of an entity.
    ///
    /// `FROM_POOL` and `COMPONENT` are tags fixed when the entity is created
    /// or attached; the others follow the entity through its lifecycle. A
    /// disposed entity has no flags set.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EntityStatus: u8 {
        /// Fetched from the object pool and recycled on dispose.
        const FROM_POOL = 1 << 0;
        /// Visible in the entity center and eligible for frame callbacks.
        const REGISTERED = 1 << 1;
        /// Attached as a component rather than as a child.
        const COMPONENT = 1 << 2;
        /// Constructed by the entity factory.
        const CREATED = 1 << 3;
        /// Freshly constructed.
        const NEW = 1 << 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_independent_bits() {
        let mut status = EntityStatus::CREATED | EntityStatus::NEW;
        assert_eq!(status.bits(), 8 | 16);
        status.insert(EntityStatus::REGISTERED);
        status.set(EntityStatus::NEW, false);
        assert!(status.contains(EntityStatus::REGISTERED | EntityStatus::CREATED));
        assert!(!status.contains(EntityStatus::NEW));
        assert_eq!(EntityStatus::default(), EntityStatus::empty());
    }
}
