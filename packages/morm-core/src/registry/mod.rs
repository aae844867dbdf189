//! Model registry: a build phase where models are registered in any order
//! (mirroring the teacher's `ServiceRegistry` by-name map), followed by a
//! one-shot freeze that resolves inheritance, validates relation targets
//! and inverses, and checks every model's computed-field graph is acyclic.
//! Once frozen the registry is immutable and implements
//! [`crate::domain::compile::FieldResolver`] so domain expressions can be
//! compiled against it directly.

pub mod meta;
pub mod relation_graph;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use meta::{CrossFieldValidator, ModelMeta};

use crate::domain::compile::FieldResolver;
use crate::error::{DomainError, RegistryError};
use crate::field::kinds::FieldKind;
use crate::field::Field;

/// A single declared index, in the same shape MongoDB's
/// `createIndexes` expects: an ordered list of `(field, direction)` key
/// parts plus the usual modifiers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IndexSpec {
    pub keys: Vec<(String, i32)>,
    pub unique: bool,
    pub name: Option<String>,
}

impl IndexSpec {
    #[must_use]
    pub fn new(keys: impl IntoIterator<Item = (impl Into<String>, i32)>) -> Self {
        Self {
            keys: keys.into_iter().map(|(f, d)| (f.into(), d)).collect(),
            unique: false,
            name: None,
        }
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A model as declared by the application, before freeze-time resolution.
pub struct Model {
    pub name: String,
    pub collection: String,
    pub parent: Option<String>,
    /// Delegation: `parent model name -> local relation field name`. For
    /// every field `f` on a delegated parent, freeze injects a virtual
    /// related field `f` resolving through the named relation, unless the
    /// child already declares (or inherits via `parent`) a field of that
    /// name (§4.5 step 4).
    pub delegates: HashMap<String, String>,
    pub fields: HashMap<String, Field>,
    /// Ordered sequence of index specs (§3's `indexes` attribute).
    /// Insertion order is preserved since it governs the order indexes are
    /// built at startup, not just their final set.
    pub indexes: Vec<IndexSpec>,
    pub cross_field_validators: Vec<Arc<dyn CrossFieldValidator>>,
    pub meta: ModelMeta,
}

impl Model {
    #[must_use]
    pub fn new(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            parent: None,
            delegates: HashMap::new(),
            fields: HashMap::new(),
            indexes: Vec::new(),
            cross_field_validators: Vec::new(),
            meta: ModelMeta::default(),
        }
    }

    #[must_use]
    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: Option<String>) -> Self {
        self.parent = parent;
        self
    }

    /// Declares delegation to `parent`, embedded through the relation field
    /// named `field` (which must itself be declared via [`Model::with_field`],
    /// typically a `many2one` pointing at `parent`).
    #[must_use]
    pub fn with_delegate(mut self, parent: impl Into<String>, field: impl Into<String>) -> Self {
        self.delegates.insert(parent.into(), field.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    #[must_use]
    pub fn with_cross_field_validator(mut self, validator: Arc<dyn CrossFieldValidator>) -> Self {
        self.cross_field_validators.push(validator);
        self
    }
}

/// Accumulates models before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    models: HashMap<String, Model>,
    order: Vec<String>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns [`RegistryError::DuplicateModel`] if a model with the same
    /// name was already registered.
    pub fn register(&mut self, model: Model) -> Result<(), RegistryError> {
        if self.models.contains_key(&model.name) {
            return Err(RegistryError::DuplicateModel(model.name));
        }
        self.order.push(model.name.clone());
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    /// Resolves inheritance, validates relation targets/inverses, checks
    /// every model's compute dependency graph is acyclic, and produces an
    /// immutable [`FrozenRegistry`].
    ///
    /// # Errors
    /// See [`RegistryError`].
    pub fn freeze(self) -> Result<FrozenRegistry, RegistryError> {
        let resolved = relation_graph::resolve_inheritance(&self.models)?;
        relation_graph::validate_relations(&resolved)?;

        for (model_name, fields) in &resolved {
            let mut deps: HashMap<String, Vec<String>> = HashMap::new();
            for (field_name, field) in fields {
                if let Some(compute) = &field.compute {
                    deps.insert(field_name.clone(), compute.depends_on.clone());
                }
            }
            let all_names: HashSet<String> = fields.keys().cloned().collect();
            crate::field::compute::check_acyclic(model_name, &deps, &all_names)?;
        }

        let collections = self
            .models
            .iter()
            .map(|(name, model)| (name.clone(), model.collection.clone()))
            .collect();
        let metas = self
            .models
            .iter()
            .map(|(name, model)| (name.clone(), model.meta.clone()))
            .collect();
        let indexes = self
            .models
            .iter()
            .map(|(name, model)| (name.clone(), model.indexes.clone()))
            .collect();
        let cross_field_validators = self
            .models
            .into_iter()
            .map(|(name, model)| (name, model.cross_field_validators))
            .collect();

        Ok(FrozenRegistry {
            fields: resolved,
            collections,
            cross_field_validators,
            metas,
            indexes,
            order: self.order,
        })
    }
}

/// An immutable, validated model registry.
pub struct FrozenRegistry {
    fields: HashMap<String, HashMap<String, Field>>,
    collections: HashMap<String, String>,
    cross_field_validators: HashMap<String, Vec<Arc<dyn CrossFieldValidator>>>,
    metas: HashMap<String, ModelMeta>,
    indexes: HashMap<String, Vec<IndexSpec>>,
    /// Registration order, preserved for deterministic migration/index
    /// bootstrap ordering at startup.
    order: Vec<String>,
}

impl FrozenRegistry {
    /// # Errors
    /// Returns [`RegistryError::UnknownModel`] if `model` was never
    /// registered.
    pub fn fields(&self, model: &str) -> Result<&HashMap<String, Field>, RegistryError> {
        self.fields
            .get(model)
            .ok_or_else(|| RegistryError::UnknownModel(model.to_string()))
    }

    /// # Errors
    /// Returns [`RegistryError::UnknownModel`] / [`RegistryError::UnknownField`].
    pub fn field(&self, model: &str, field: &str) -> Result<&Field, RegistryError> {
        self.fields(model)?
            .get(field)
            .ok_or_else(|| RegistryError::UnknownField {
                model: model.to_string(),
                field: field.to_string(),
            })
    }

    /// # Errors
    /// Returns [`RegistryError::UnknownModel`] if `model` was never
    /// registered.
    pub fn collection(&self, model: &str) -> Result<&str, RegistryError> {
        self.collections
            .get(model)
            .map(String::as_str)
            .ok_or_else(|| RegistryError::UnknownModel(model.to_string()))
    }

    #[must_use]
    pub fn cross_field_validators(&self, model: &str) -> &[Arc<dyn CrossFieldValidator>] {
        self.cross_field_validators
            .get(model)
            .map_or(&[], Vec::as_slice)
    }

    /// # Errors
    /// Returns [`RegistryError::UnknownModel`] if `model` was never
    /// registered.
    pub fn meta(&self, model: &str) -> Result<&ModelMeta, RegistryError> {
        self.metas
            .get(model)
            .ok_or_else(|| RegistryError::UnknownModel(model.to_string()))
    }

    #[must_use]
    pub fn models_in_registration_order(&self) -> &[String] {
        &self.order
    }

    /// Declared indexes for `model`, in declaration order, for whatever
    /// startup step issues `createIndexes` against the backing store.
    #[must_use]
    pub fn indexes(&self, model: &str) -> &[IndexSpec] {
        self.indexes.get(model).map_or(&[], Vec::as_slice)
    }
}

impl FieldResolver for FrozenRegistry {
    fn field_kind(&self, model: &str, field: &str) -> Result<FieldKind, DomainError> {
        self.field(model, field)
            .map(|f| f.kind.clone())
            .map_err(|_| DomainError::FieldNotFound(format!("{model}.{field}")))
    }

    fn collection_name(&self, model: &str) -> Result<String, DomainError> {
        self.collection(model)
            .map(ToString::to_string)
            .map_err(|_| DomainError::UnknownRelationTarget(model.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(Model::new("person", "people")).unwrap();
        assert!(matches!(
            builder.register(Model::new("person", "people")),
            Err(RegistryError::DuplicateModel(_))
        ));
    }

    #[test]
    fn freeze_exposes_merged_fields_and_collection_names() {
        let mut builder = RegistryBuilder::new();
        builder
            .register(Model::new("person", "people").with_field(Field::new("name", FieldKind::String)))
            .unwrap();
        let registry = builder.freeze().unwrap();
        assert_eq!(registry.collection("person").unwrap(), "people");
        assert!(registry.field("person", "name").is_ok());
        assert!(matches!(
            registry.field("person", "ghost"),
            Err(RegistryError::UnknownField { .. })
        ));
    }

    #[test]
    fn registration_order_is_preserved() {
        let mut builder = RegistryBuilder::new();
        builder.register(Model::new("b", "bs")).unwrap();
        builder.register(Model::new("a", "as")).unwrap();
        let registry = builder.freeze().unwrap();
        assert_eq!(registry.models_in_registration_order(), &["b", "a"]);
    }
}
