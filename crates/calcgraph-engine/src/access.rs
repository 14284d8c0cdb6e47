//! Requester permissions.
//!
//! The engine never evaluates authorization rules itself; it asks an
//! [`AccessContext`] about each owning entity it needs to expose.

use std::collections::BTreeSet;

use calcgraph_core::Entity;

/// What the current requester may do with owning entities.
pub trait AccessContext {
    fn can_view(&self, entity: &Entity) -> bool;

    fn can_update(&self, entity: &Entity) -> bool {
        self.can_view(entity)
    }

    /// Superusers bypass masking and update checks.
    fn is_superuser(&self) -> bool {
        false
    }
}

/// Any closure over an entity acts as a view rule.
impl<F> AccessContext for F
where
    F: Fn(&Entity) -> bool,
{
    fn can_view(&self, entity: &Entity) -> bool {
        self(entity)
    }
}

/// Sees and updates everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Superuser;

impl AccessContext for Superuser {
    fn can_view(&self, _entity: &Entity) -> bool {
        true
    }

    fn is_superuser(&self) -> bool {
        true
    }
}

/// Grants access per collection.
#[derive(Debug, Clone, Default)]
pub struct CollectionAccess {
    viewable: BTreeSet<String>,
    updatable: BTreeSet<String>,
}

impl CollectionAccess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, collection: impl Into<String>) -> Self {
        self.viewable.insert(collection.into());
        self
    }

    /// Update access implies view access.
    pub fn update(mut self, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        self.viewable.insert(collection.clone());
        self.updatable.insert(collection);
        self
    }
}

impl AccessContext for CollectionAccess {
    fn can_view(&self, entity: &Entity) -> bool {
        self.viewable.contains(&entity.collection)
    }

    fn can_update(&self, entity: &Entity) -> bool {
        self.updatable.contains(&entity.collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_access_separates_view_and_update() {
        let ctx = CollectionAccess::new().view("orders").update("invoices");
        let order = Entity::new("orders", "o1");
        let invoice = Entity::new("invoices", "i1");
        let secret = Entity::new("salaries", "s1");
        assert!(ctx.can_view(&order) && !ctx.can_update(&order));
        assert!(ctx.can_view(&invoice) && ctx.can_update(&invoice));
        assert!(!ctx.can_view(&secret));
        assert!(!ctx.is_superuser());
    }

    #[test]
    fn closures_are_view_rules() {
        let ctx = |e: &Entity| e.id.starts_with("pub");
        assert!(ctx.can_view(&Entity::new("c", "public")));
        assert!(!ctx.can_update(&Entity::new("c", "private")));
        assert!(Superuser.can_update(&Entity::new("c", "private")));
    }
}
