//! Declarative component schemas: field types, ranges, enums, defaults,
//! dependency/conflict lists, and lifecycle hooks.
//!
//! `world.rs`'s archetype storage is keyed by Rust types and knows nothing
//! about field-level validation -- it trusts whatever bytes a deserializer
//! produces. This module is the layer above it: it describes what valid JSON
//! for a component type looks like, fills in defaults, and checks
//! dependency/conflict relationships between component types *before* data
//! ever reaches [`crate::world::World::set_component_by_name`].

use std::collections::{HashMap, HashSet};

use crate::entity::EntityId;
use crate::world::World;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Field schema
// ---------------------------------------------------------------------------

/// The declared type (and constraints) of one field in a component.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    F32 { min: Option<f32>, max: Option<f32> },
    I32 { min: Option<i32>, max: Option<i32> },
    Bool,
    Str,
    /// Must be one of the listed strings.
    Enum(Vec<String>),
    /// A 3-element float array, e.g. position/scale.
    Vec3,
}

/// One field in a component's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
    pub default: serde_json::Value,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, kind: FieldKind, default: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            kind,
            default,
        }
    }

    /// Validate and normalize one value against this field's kind.
    fn validate(&self, value: &serde_json::Value) -> Result<(), String> {
        match &self.kind {
            FieldKind::F32 { min, max } => {
                let n = value
                    .as_f64()
                    .ok_or_else(|| "expected a number".to_owned())? as f32;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("{} is below minimum {}", n, min));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("{} is above maximum {}", n, max));
                    }
                }
                Ok(())
            }
            FieldKind::I32 { min, max } => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| "expected an integer".to_owned())? as i32;
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("{} is below minimum {}", n, min));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("{} is above maximum {}", n, max));
                    }
                }
                Ok(())
            }
            FieldKind::Bool => {
                if value.as_bool().is_none() {
                    return Err("expected a boolean".to_owned());
                }
                Ok(())
            }
            FieldKind::Str => {
                if value.as_str().is_none() {
                    return Err("expected a string".to_owned());
                }
                Ok(())
            }
            FieldKind::Enum(variants) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| "expected a string".to_owned())?;
                if !variants.iter().any(|v| v == s) {
                    return Err(format!("'{}' is not one of {:?}", s, variants));
                }
                Ok(())
            }
            FieldKind::Vec3 => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| "expected a 3-element array".to_owned())?;
                if arr.len() != 3 || arr.iter().any(|v| v.as_f64().is_none()) {
                    return Err("expected a 3-element array of numbers".to_owned());
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Broad grouping used for tooling and for the `find_by_tag`-style lookups
/// built on top of the component index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentCategory {
    Core,
    Rendering,
    Physics,
    Gameplay,
    Scripting,
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// A lifecycle hook run when a component is added or removed.
///
/// Hooks receive the world and the affected entity. A hook that returns `Err`
/// does not roll back the mutation -- the registry logs the failure and
/// reports it via [`EcsError::HookError`] to the caller, but the component
/// stays added/removed as requested. This matches the contract that a hook
/// must not be able to corrupt registry state.
pub type Hook = Box<dyn Fn(&mut World, EntityId) -> Result<(), String> + Send + Sync>;

// ---------------------------------------------------------------------------
// ComponentSchema
// ---------------------------------------------------------------------------

/// The full declaration for one component type: its fields, category,
/// dependency/conflict lists, and optional lifecycle hooks.
pub struct ComponentSchema {
    pub type_name: String,
    pub category: ComponentCategory,
    pub fields: Vec<FieldSchema>,
    /// Component type names that must already be present on an entity before
    /// this one can be added.
    pub dependencies: Vec<String>,
    /// Component type names that must be absent for this one to be added.
    pub conflicts: Vec<String>,
    pub on_add: Option<Hook>,
    pub on_remove: Option<Hook>,
}

impl std::fmt::Debug for ComponentSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentSchema")
            .field("type_name", &self.type_name)
            .field("category", &self.category)
            .field("fields", &self.fields)
            .field("dependencies", &self.dependencies)
            .field("conflicts", &self.conflicts)
            .field("on_add", &self.on_add.is_some())
            .field("on_remove", &self.on_remove.is_some())
            .finish()
    }
}

impl ComponentSchema {
    pub fn new(type_name: impl Into<String>, category: ComponentCategory) -> Self {
        Self {
            type_name: type_name.into(),
            category,
            fields: Vec::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            on_add: None,
            on_remove: None,
        }
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn depends_on(mut self, type_name: impl Into<String>) -> Self {
        self.dependencies.push(type_name.into());
        self
    }

    pub fn conflicts_with(mut self, type_name: impl Into<String>) -> Self {
        self.conflicts.push(type_name.into());
        self
    }

    pub fn on_add(mut self, hook: Hook) -> Self {
        self.on_add = Some(hook);
        self
    }

    pub fn on_remove(mut self, hook: Hook) -> Self {
        self.on_remove = Some(hook);
        self
    }

    /// Whether `other` declares the same fields, category, dependencies, and
    /// conflicts as `self`. Hooks are not compared -- a re-registration that
    /// only swaps hook closures is still considered the same definition.
    fn same_shape(&self, other: &ComponentSchema) -> bool {
        self.category == other.category
            && self.fields == other.fields
            && self.dependencies == other.dependencies
            && self.conflicts == other.conflicts
    }
}

// ---------------------------------------------------------------------------
// SchemaRegistry
// ---------------------------------------------------------------------------

/// Registry of declarative component schemas, keyed by type name.
///
/// This is distinct from [`crate::component::ComponentRegistry`], which maps
/// Rust types to archetype storage slots. `SchemaRegistry` sits above it and
/// validates the JSON a script or scene file supplies before it is ever
/// converted into the Rust value that storage expects.
#[derive(Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, ComponentSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: HashMap::new(),
        }
    }

    /// Register a schema. Re-registering the same `type_name` with an
    /// identical shape is a no-op; re-registering with a different shape
    /// fails with [`EcsError::DuplicateTypeMismatch`].
    ///
    /// Also validates that every declared field's default value actually
    /// matches that field's own `kind` (the schema's column widths must be
    /// internally consistent before anything is ever stored against it), and
    /// that every `dependencies`/`conflicts` entry names a type. A
    /// dependency/conflict on a type that has not been registered yet is
    /// tolerated as a forward reference -- schemas are commonly registered in
    /// declaration order, not dependency order -- and only logged with
    /// [`tracing::warn!`].
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateTypeMismatch`] on a conflicting
    /// re-registration, or [`EcsError::ValidationFailed`] if a field's
    /// default value does not match its own declared kind.
    pub fn register(&mut self, schema: ComponentSchema) -> Result<(), EcsError> {
        if let Some(existing) = self.schemas.get(&schema.type_name) {
            if !existing.same_shape(&schema) {
                return Err(EcsError::DuplicateTypeMismatch {
                    component: schema.type_name.clone(),
                    expected: format!("{:?}", existing.category),
                    found: format!("{:?}", schema.category),
                });
            }
            return Ok(());
        }

        let mut width_errors: Vec<String> = Vec::new();
        for field in &schema.fields {
            if let Err(detail) = field.validate(&field.default) {
                width_errors.push(format!("{}: {}", field.name, detail));
            }
        }
        if !width_errors.is_empty() {
            return Err(EcsError::ValidationFailed {
                component: schema.type_name.clone(),
                details: width_errors.join("; "),
            });
        }

        for dep in schema.dependencies.iter().chain(schema.conflicts.iter()) {
            if !self.schemas.contains_key(dep) {
                tracing::warn!(
                    component = %schema.type_name,
                    referenced = %dep,
                    "component schema references a type not yet registered; tolerated as a forward reference"
                );
            }
        }

        self.schemas.insert(schema.type_name.clone(), schema);
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<&ComponentSchema> {
        self.schemas.get(type_name)
    }

    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Validate `data` against the named schema, filling in defaults for any
    /// missing fields. Returns the normalized, fully-populated value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentType`] if no schema is registered
    /// for `type_name`, or [`EcsError::ValidationFailed`] listing every
    /// offending field path if validation fails.
    pub fn validate(
        &self,
        type_name: &str,
        data: &serde_json::Value,
    ) -> Result<serde_json::Value, EcsError> {
        let schema = self
            .schemas
            .get(type_name)
            .ok_or_else(|| EcsError::UnknownComponentType {
                name: type_name.to_owned(),
                registered: self.registered_names().join(", "),
            })?;

        let input = data.as_object().cloned().unwrap_or_default();
        let mut normalized = serde_json::Map::new();
        let mut errors: Vec<String> = Vec::new();

        for field in &schema.fields {
            let value = input
                .get(&field.name)
                .cloned()
                .unwrap_or_else(|| field.default.clone());
            if let Err(detail) = field.validate(&value) {
                errors.push(format!("{}: {}", field.name, detail));
                continue;
            }
            normalized.insert(field.name.clone(), value);
        }

        if !errors.is_empty() {
            return Err(EcsError::ValidationFailed {
                component: type_name.to_owned(),
                details: errors.join("; "),
            });
        }

        Ok(serde_json::Value::Object(normalized))
    }

    /// Check that every dependency of `type_name` is present in `existing`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DependencyUnmet`] naming the first missing
    /// dependency.
    pub fn check_dependencies(
        &self,
        entity: EntityId,
        type_name: &str,
        existing: &HashSet<String>,
    ) -> Result<(), EcsError> {
        if let Some(schema) = self.schemas.get(type_name) {
            for dep in &schema.dependencies {
                if !existing.contains(dep) {
                    return Err(EcsError::DependencyUnmet {
                        entity,
                        component: type_name.to_owned(),
                        dependency: dep.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that none of `type_name`'s declared conflicts are present in
    /// `existing`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ConflictPresent`] naming the first conflicting
    /// type found.
    pub fn check_conflicts(
        &self,
        entity: EntityId,
        type_name: &str,
        existing: &HashSet<String>,
    ) -> Result<(), EcsError> {
        if let Some(schema) = self.schemas.get(type_name) {
            for conflict in &schema.conflicts {
                if existing.contains(conflict) {
                    return Err(EcsError::ConflictPresent {
                        entity,
                        component: type_name.to_owned(),
                        conflict: conflict.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run the `onAdd` hook for `type_name`, if one is registered.
    ///
    /// A hook failure is reported but does not undo the mutation that already
    /// happened in the caller -- see [`Hook`]'s contract.
    pub fn run_on_add(
        &self,
        world: &mut World,
        entity: EntityId,
        type_name: &str,
    ) -> Result<(), EcsError> {
        if let Some(schema) = self.schemas.get(type_name) {
            if let Some(hook) = &schema.on_add {
                hook(world, entity).map_err(|details| EcsError::HookError {
                    component: type_name.to_owned(),
                    hook: "onAdd".to_owned(),
                    details,
                })?;
            }
        }
        Ok(())
    }

    /// Run the `onRemove` hook for `type_name`, if one is registered.
    pub fn run_on_remove(
        &self,
        world: &mut World,
        entity: EntityId,
        type_name: &str,
    ) -> Result<(), EcsError> {
        if let Some(schema) = self.schemas.get(type_name) {
            if let Some(hook) = &schema.on_remove {
                hook(world, entity).map_err(|details| EcsError::HookError {
                    component: type_name.to_owned(),
                    hook: "onRemove".to_owned(),
                    details,
                })?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn transform_schema() -> ComponentSchema {
        ComponentSchema::new("transform", ComponentCategory::Core)
            .field(FieldSchema::new(
                "position",
                FieldKind::Vec3,
                serde_json::json!([0.0, 0.0, 0.0]),
            ))
            .field(FieldSchema::new(
                "rotation",
                FieldKind::F32 {
                    min: None,
                    max: None,
                },
                serde_json::json!(0.0),
            ))
    }

    #[test]
    fn validate_fills_defaults_for_missing_fields() {
        let mut reg = SchemaRegistry::new();
        reg.register(transform_schema()).unwrap();

        let result = reg.validate("transform", &serde_json::json!({})).unwrap();
        assert_eq!(result["position"], serde_json::json!([0.0, 0.0, 0.0]));
        assert_eq!(result["rotation"], serde_json::json!(0.0));
    }

    #[test]
    fn validate_accepts_supplied_values() {
        let mut reg = SchemaRegistry::new();
        reg.register(transform_schema()).unwrap();

        let result = reg
            .validate("transform", &serde_json::json!({ "rotation": 1.57 }))
            .unwrap();
        assert_eq!(result["rotation"], serde_json::json!(1.57));
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let mut reg = SchemaRegistry::new();
        reg.register(transform_schema()).unwrap();

        let result = reg.validate("transform", &serde_json::json!({ "rotation": "oops" }));
        assert!(matches!(result, Err(EcsError::ValidationFailed { .. })));
    }

    #[test]
    fn validate_enforces_numeric_range() {
        let mut reg = SchemaRegistry::new();
        let mut schema = ComponentSchema::new("health", ComponentCategory::Gameplay);
        schema = schema.field(FieldSchema::new(
            "hp",
            FieldKind::I32 {
                min: Some(0),
                max: Some(100),
            },
            serde_json::json!(100),
        ));
        reg.register(schema).unwrap();

        assert!(reg.validate("health", &serde_json::json!({ "hp": 150 })).is_err());
        assert!(reg.validate("health", &serde_json::json!({ "hp": 50 })).is_ok());
    }

    #[test]
    fn validate_enforces_enum_membership() {
        let mut reg = SchemaRegistry::new();
        let schema = ComponentSchema::new("light", ComponentCategory::Rendering).field(
            FieldSchema::new(
                "kind",
                FieldKind::Enum(vec!["point".into(), "directional".into(), "spot".into()]),
                serde_json::json!("point"),
            ),
        );
        reg.register(schema).unwrap();

        assert!(reg
            .validate("light", &serde_json::json!({ "kind": "laser" }))
            .is_err());
        assert!(reg
            .validate("light", &serde_json::json!({ "kind": "spot" }))
            .is_ok());
    }

    #[test]
    fn register_same_shape_twice_is_idempotent() {
        let mut reg = SchemaRegistry::new();
        reg.register(transform_schema()).unwrap();
        assert!(reg.register(transform_schema()).is_ok());
    }

    #[test]
    fn register_different_shape_is_rejected() {
        let mut reg = SchemaRegistry::new();
        reg.register(transform_schema()).unwrap();

        let conflicting = ComponentSchema::new("transform", ComponentCategory::Rendering);
        assert!(matches!(
            reg.register(conflicting),
            Err(EcsError::DuplicateTypeMismatch { .. })
        ));
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let mut reg = SchemaRegistry::new();
        let schema =
            ComponentSchema::new("mesh_collider", ComponentCategory::Physics).depends_on("mesh_renderer");
        reg.register(schema).unwrap();

        let e = EntityId::new(0, 0);
        let existing = HashSet::new();
        assert!(matches!(
            reg.check_dependencies(e, "mesh_collider", &existing),
            Err(EcsError::DependencyUnmet { .. })
        ));
    }

    #[test]
    fn present_dependency_is_accepted() {
        let mut reg = SchemaRegistry::new();
        let schema =
            ComponentSchema::new("mesh_collider", ComponentCategory::Physics).depends_on("mesh_renderer");
        reg.register(schema).unwrap();

        let e = EntityId::new(0, 0);
        let mut existing = HashSet::new();
        existing.insert("mesh_renderer".to_owned());
        assert!(reg.check_dependencies(e, "mesh_collider", &existing).is_ok());
    }

    #[test]
    fn conflicting_component_is_rejected() {
        let mut reg = SchemaRegistry::new();
        let schema = ComponentSchema::new("rigid_body", ComponentCategory::Physics)
            .conflicts_with("static_collider");
        reg.register(schema).unwrap();

        let e = EntityId::new(0, 0);
        let mut existing = HashSet::new();
        existing.insert("static_collider".to_owned());
        assert!(matches!(
            reg.check_conflicts(e, "rigid_body", &existing),
            Err(EcsError::ConflictPresent { .. })
        ));
    }

    #[test]
    fn on_add_hook_runs_and_reports_failure() {
        let mut reg = SchemaRegistry::new();
        let schema = ComponentSchema::new("scripted", ComponentCategory::Scripting)
            .on_add(Box::new(|_world, _entity| Err("boom".to_owned())));
        reg.register(schema).unwrap();

        let mut world = World::new();
        let e = world.create_entity(None, None).unwrap();
        let result = reg.run_on_add(&mut world, e, "scripted");
        assert!(matches!(result, Err(EcsError::HookError { .. })));
    }

    #[test]
    fn unknown_component_type_reports_registered_names() {
        let mut reg = SchemaRegistry::new();
        reg.register(transform_schema()).unwrap();

        let err = reg.validate("nonexistent", &serde_json::json!({})).unwrap_err();
        match err {
            EcsError::UnknownComponentType { name, registered } => {
                assert_eq!(name, "nonexistent");
                assert_eq!(registered, "transform");
            }
            _ => panic!("expected UnknownComponentType"),
        }
    }
}
