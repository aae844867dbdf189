//! Freeze-time graph checks run once, over the whole set of registered
//! models: inheritance resolution (a model may declare at most one parent,
//! whose fields it inherits and may override) and relation-target/inverse
//! validation.

use std::collections::{HashMap, HashSet};

use crate::error::RegistryError;
use crate::field::{Field, FieldKind};

use super::Model;

/// Resolves every model's full field set by merging in its parent chain,
/// depth-first, detecting inheritance cycles along the way. A child's own
/// field declarations override a parent's field of the same name.
pub fn resolve_inheritance(
    models: &HashMap<String, Model>,
) -> Result<HashMap<String, HashMap<String, Field>>, RegistryError> {
    let mut resolved: HashMap<String, HashMap<String, Field>> = HashMap::new();
    let mut visiting: HashSet<String> = HashSet::new();

    fn resolve_one(
        name: &str,
        models: &HashMap<String, Model>,
        resolved: &mut HashMap<String, HashMap<String, Field>>,
        visiting: &mut HashSet<String>,
    ) -> Result<(), RegistryError> {
        if resolved.contains_key(name) {
            return Ok(());
        }
        if visiting.contains(name) {
            return Err(RegistryError::InheritanceCycle(name.to_string()));
        }
        visiting.insert(name.to_string());

        let model = models
            .get(name)
            .ok_or_else(|| RegistryError::UnknownModel(name.to_string()))?;

        let mut fields = HashMap::new();
        if let Some(parent) = &model.parent {
            if !models.contains_key(parent) {
                return Err(RegistryError::UnknownParent {
                    model: name.to_string(),
                    parent: parent.clone(),
                });
            }
            resolve_one(parent, models, resolved, visiting)?;
            fields.extend(resolved[parent].clone());
        }
        for (field_name, field) in &model.fields {
            fields.insert(field_name.clone(), field.clone());
        }

        for (delegate_parent, relation_field) in &model.delegates {
            if !models.contains_key(delegate_parent) {
                return Err(RegistryError::UnknownParent {
                    model: name.to_string(),
                    parent: delegate_parent.clone(),
                });
            }
            resolve_one(delegate_parent, models, resolved, visiting)?;
            for (field_name, field) in &resolved[delegate_parent] {
                fields.entry(field_name.clone()).or_insert_with(|| {
                    let mut virtual_field = field.clone();
                    virtual_field.related_path = Some(format!("{relation_field}.{field_name}"));
                    virtual_field
                });
            }
        }

        visiting.remove(name);
        resolved.insert(name.to_string(), fields);
        Ok(())
    }

    for name in models.keys() {
        resolve_one(name, models, &mut resolved, &mut visiting)?;
    }
    Ok(resolved)
}

/// Validates that every relation field's target model is registered, and
/// that any declared inverse field actually exists on the target.
pub fn validate_relations(
    resolved: &HashMap<String, HashMap<String, Field>>,
) -> Result<(), RegistryError> {
    for (model_name, fields) in resolved {
        for (field_name, field) in fields {
            let Some(rel) = field.kind.relation_spec() else {
                continue;
            };
            let target_fields = resolved.get(&rel.target).ok_or_else(|| {
                RegistryError::UnknownRelationTarget {
                    model: model_name.clone(),
                    field: field_name.clone(),
                    target: rel.target.clone(),
                }
            })?;
            if let Some(inverse) = &rel.inverse {
                if !target_fields.contains_key(inverse) {
                    return Err(RegistryError::UnknownInverse {
                        model: model_name.clone(),
                        field: field_name.clone(),
                        target: rel.target.clone(),
                        inverse: inverse.clone(),
                    });
                }
            }
            if matches!(field.kind, FieldKind::Embedded(_)) {
                // Embedded targets are addressed by name only, not through
                // the registry (they have no standalone collection), so no
                // further check applies here.
            }
        }
    }
    Ok(())
}
