//! The type-name registry: short logical names ↔ type descriptors.

use crate::DataObjectError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Describes one registered data-object type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    /// Structural identity of the concrete type (unique, e.g. a module
    /// path). What `to_type_name` is asked about.
    pub type_id: String,
    /// The short logical name used as the wire discriminator.
    pub type_name: String,
    pub type_version: Option<String>,
    /// Explicit attribute output order; attributes not listed here (and
    /// types without an explicit order) serialize alphabetically.
    pub declared_order: Option<Vec<String>>,
}

impl TypeDescriptor {
    pub fn new(type_id: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            type_name: type_name.into(),
            type_version: None,
            declared_order: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.type_version = Some(version.into());
        self
    }

    pub fn with_declared_order(mut self, order: Vec<String>) -> Self {
        self.declared_order = Some(order);
        self
    }
}

#[derive(Default)]
struct RegistryInner {
    /// type name -> type id currently resolving for it (replacement-aware)
    by_name: HashMap<String, String>,
    /// type id -> descriptor
    by_id: HashMap<String, TypeDescriptor>,
    /// type id -> the name it was registered (or replaces) under
    names: HashMap<String, String>,
}

/// Registry mapping logical type names to concrete type descriptors.
///
/// Subclass replacement: registering a replacement for an already
/// registered base keeps the base's logical name: `from_type_name` on that
/// name resolves to the replacement, while `to_type_name` keeps answering
/// the original name for both the base and the replacement. Reassigning a
/// replacement to a new name is an explicit, separate registration.
#[derive(Default)]
pub struct TypeRegistry {
    inner: RwLock<RegistryInner>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, descriptor: TypeDescriptor) -> Result<(), DataObjectError> {
        let mut inner = self.inner.write();
        if inner.by_name.contains_key(&descriptor.type_name) {
            return Err(DataObjectError::DuplicateTypeName {
                name: descriptor.type_name.clone(),
            });
        }
        inner
            .by_name
            .insert(descriptor.type_name.clone(), descriptor.type_id.clone());
        inner
            .names
            .insert(descriptor.type_id.clone(), descriptor.type_name.clone());
        inner.by_id.insert(descriptor.type_id.clone(), descriptor);
        Ok(())
    }

    /// Registers `replacement` as the project override of the type with id
    /// `base_id`. The base's registered name now resolves to the
    /// replacement; the replacement's own `type_name` field is ignored in
    /// favor of the base's name.
    pub fn register_replacement(
        &self,
        base_id: &str,
        mut replacement: TypeDescriptor,
    ) -> Result<(), DataObjectError> {
        let mut inner = self.inner.write();
        let name = inner
            .names
            .get(base_id)
            .cloned()
            .ok_or_else(|| DataObjectError::UnknownTypeId {
                id: base_id.to_string(),
            })?;
        replacement.type_name = name.clone();
        inner.by_name.insert(name.clone(), replacement.type_id.clone());
        inner.names.insert(replacement.type_id.clone(), name);
        inner
            .by_id
            .insert(replacement.type_id.clone(), replacement);
        Ok(())
    }

    /// Resolves a wire type name to its descriptor (replacement-aware).
    pub fn from_type_name(&self, name: &str) -> Option<TypeDescriptor> {
        let inner = self.inner.read();
        let id = inner.by_name.get(name)?;
        inner.by_id.get(id).cloned()
    }

    /// The wire name a concrete type serializes under.
    pub fn to_type_name(&self, type_id: &str) -> Option<String> {
        self.inner.read().names.get(type_id).cloned()
    }

    pub fn declared_order(&self, type_name: &str) -> Option<Vec<String>> {
        self.from_type_name(type_name)?.declared_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replacement_resolves_forward_but_keeps_the_registered_name() {
        let registry = TypeRegistry::new();
        registry
            .register(TypeDescriptor::new("core.Lorem", "Lorem"))
            .unwrap();
        registry
            .register_replacement(
                "core.Lorem",
                TypeDescriptor::new("project.LoremEx", "ignored"),
            )
            .unwrap();

        let resolved = registry.from_type_name("Lorem").unwrap();
        assert_eq!(resolved.type_id, "project.LoremEx");
        assert_eq!(registry.to_type_name("core.Lorem").as_deref(), Some("Lorem"));
        assert_eq!(
            registry.to_type_name("project.LoremEx").as_deref(),
            Some("Lorem")
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let registry = TypeRegistry::new();
        registry
            .register(TypeDescriptor::new("a.Thing", "Thing"))
            .unwrap();
        let err = registry
            .register(TypeDescriptor::new("b.Thing", "Thing"))
            .unwrap_err();
        assert!(matches!(
            err,
            crate::DataObjectError::DuplicateTypeName { .. }
        ));
    }

    #[test]
    fn replacing_an_unknown_base_fails() {
        let registry = TypeRegistry::new();
        let err = registry
            .register_replacement("missing.Type", TypeDescriptor::new("x.Y", "Y"))
            .unwrap_err();
        assert!(matches!(err, crate::DataObjectError::UnknownTypeId { .. }));
    }
}
