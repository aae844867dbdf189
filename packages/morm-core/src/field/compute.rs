//! Computed field specification and dependency-cycle detection.
//!
//! Computed fields declare the (possibly dotted, possibly cross-model)
//! paths they depend on; the registry freeze step builds a dependency graph
//! over a model's computed fields and rejects cycles, mirroring the
//! acyclicity check the teacher's registry performs over service
//! registration order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::RegistryError;
use crate::field::RecordLike;
use crate::value::Value;

/// A function computing a field's value for a batch of records at once, so
/// a single compute pass can share cross-record I/O (e.g. one prefetch).
pub type ComputeFn = Arc<dyn Fn(&[&dyn RecordLike]) -> Vec<Value> + Send + Sync>;

/// A function recovering the inverse write: given the new field value and
/// the record it was set on, returns the writes to apply to the fields this
/// computed field depends on. `None` means the field is not invertible
/// (read-only computed field).
pub type InverseFn = Arc<dyn Fn(&Value, &dyn RecordLike) -> Vec<(String, Value)> + Send + Sync>;

#[derive(Clone)]
pub struct ComputeSpec {
    /// Field paths (same-model only; cross-model dependencies are expressed
    /// via `related_path` on the field itself) this computation reads.
    pub depends_on: Vec<String>,
    /// Whether the computed value is persisted to the store or derived
    /// on every read.
    pub store: bool,
    pub compute: ComputeFn,
    pub inverse: Option<InverseFn>,
}

impl ComputeSpec {
    #[must_use]
    pub fn new(depends_on: Vec<String>, store: bool, compute: ComputeFn) -> Self {
        Self {
            depends_on,
            store,
            compute,
            inverse: None,
        }
    }

    #[must_use]
    pub fn with_inverse(mut self, inverse: InverseFn) -> Self {
        self.inverse = Some(inverse);
        self
    }

    #[must_use]
    pub fn is_invertible(&self) -> bool {
        self.inverse.is_some()
    }
}

/// Verifies that a model's computed-field dependency graph has no cycles.
/// `fields` maps field name to its declared dependency list (only computed
/// fields need an entry; plain fields are implicit leaves).
///
/// # Errors
/// Returns [`RegistryError::ComputeCycle`] on the first cycle found (in
/// field declaration order), or [`RegistryError::UnknownComputeDependency`]
/// if a computed field depends on a name the model does not declare.
pub fn check_acyclic(
    model: &str,
    fields: &HashMap<String, Vec<String>>,
    all_field_names: &HashSet<String>,
) -> Result<(), RegistryError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    fn visit<'a>(
        model: &str,
        node: &'a str,
        fields: &'a HashMap<String, Vec<String>>,
        all_field_names: &HashSet<String>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Result<(), RegistryError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(RegistryError::ComputeCycle {
                    model: model.to_string(),
                    field: node.to_string(),
                })
            }
            None => {}
        }
        marks.insert(node, Mark::Visiting);
        if let Some(deps) = fields.get(node) {
            for dep in deps {
                if !all_field_names.contains(dep) {
                    return Err(RegistryError::UnknownComputeDependency {
                        model: model.to_string(),
                        field: node.to_string(),
                        dependency: dep.clone(),
                    });
                }
                visit(model, dep, fields, all_field_names, marks)?;
            }
        }
        marks.insert(node, Mark::Done);
        Ok(())
    }

    for field in fields.keys() {
        visit(model, field, fields, all_field_names, &mut marks)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_acyclic_graph() {
        let mut fields = HashMap::new();
        fields.insert("full_name".to_string(), vec!["first".to_string(), "last".to_string()]);
        let names: HashSet<String> = ["full_name", "first", "last"].iter().map(|s| s.to_string()).collect();
        assert!(check_acyclic("person", &fields, &names).is_ok());
    }

    #[test]
    fn rejects_direct_cycle() {
        let mut fields = HashMap::new();
        fields.insert("a".to_string(), vec!["b".to_string()]);
        fields.insert("b".to_string(), vec!["a".to_string()]);
        let names: HashSet<String> = ["a", "b"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(
            check_acyclic("m", &fields, &names),
            Err(RegistryError::ComputeCycle { .. })
        ));
    }

    #[test]
    fn rejects_unknown_dependency() {
        let mut fields = HashMap::new();
        fields.insert("a".to_string(), vec!["ghost".to_string()]);
        let names: HashSet<String> = ["a"].iter().map(|s| s.to_string()).collect();
        assert!(matches!(
            check_acyclic("m", &fields, &names),
            Err(RegistryError::UnknownComputeDependency { .. })
        ));
    }
}
