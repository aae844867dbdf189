//! The field descriptor: per-field storage kind, validation chain, and the
//! cache/store/wire conversions described in §4.4.
//!
//! Kept as a single statically-typed descriptor (a sum type over
//! [`FieldKind`] plus a converter implemented once per variant) rather than a
//! trait-object per kind, per the open question in spec §9 on a registry of
//! field descriptors over a closed kind enum.

pub mod compute;
pub mod file;
pub mod kinds;
pub mod validators;

use std::sync::Arc;

use bson::Bson;

pub use compute::ComputeSpec;
pub use file::{FileConstraints, FileValidator};
pub use kinds::{FieldKind, RelationSpec};
pub use validators::Validator;

use crate::error::{ValidationError, ValidationReason};
use crate::value::Value;

/// Minimal view of a record a validator or computed field needs: lookup of
/// sibling field values by name. Implemented by `morm-runtime::Record` so
/// this crate stays free of any store/cache dependency.
pub trait RecordLike {
    fn get(&self, field: &str) -> Option<&Value>;
    fn model_name(&self) -> &str;
}

/// A declared field on a model.
#[derive(Clone)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
    pub unique: bool,
    pub indexed: bool,
    pub readonly: bool,
    pub default: Option<Value>,
    pub validators: Vec<Arc<dyn Validator>>,
    pub compute: Option<ComputeSpec>,
    pub related_path: Option<String>,
    /// Always included as a prefetch companion when a relation traversal
    /// through this field's model triggers a batched load (§4.6).
    pub prefetch: bool,
}

impl Field {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            unique: false,
            indexed: false,
            readonly: false,
            default: None,
            validators: Vec::new(),
            compute: None,
            related_path: None,
            prefetch: false,
        }
    }

    #[must_use]
    pub fn prefetch(mut self) -> Self {
        self.prefetch = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validators.push(validator);
        self
    }

    #[must_use]
    pub fn computed(mut self, compute: ComputeSpec) -> Self {
        self.compute = Some(compute);
        self
    }

    /// Attaches a [`FileValidator`] enforcing `allowed_types`/`max_size` on
    /// a `file`-kind field's stored metadata document (§4.4).
    #[must_use]
    pub fn file_constraints(mut self, constraints: FileConstraints) -> Self {
        self.validators.push(Arc::new(FileValidator::new(constraints)));
        self
    }

    /// Is `value`'s discriminant compatible with this field's declared kind?
    /// `Value::Null` is always type-compatible; required-ness is checked
    /// separately.
    #[must_use]
    pub fn type_matches(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match (&self.kind, value) {
            (FieldKind::String, Value::String(_))
            | (FieldKind::Integer, Value::Int(_))
            | (FieldKind::Float, Value::Float(_))
            | (FieldKind::Decimal, Value::Decimal(_))
            | (FieldKind::Boolean, Value::Bool(_))
            | (FieldKind::DateTime, Value::DateTime(_))
            | (FieldKind::Date, Value::Date(_))
            | (FieldKind::Time, Value::Time(_))
            | (FieldKind::Uuid, Value::Uuid(_))
            | (FieldKind::ObjectId, Value::ObjectId(_))
            | (FieldKind::Json, Value::Document(_) | Value::Array(_)) => true,
            (FieldKind::File, Value::Document(_)) => true,
            (FieldKind::Enum(choices), Value::String(s)) => choices.contains(s),
            (FieldKind::List(_) | FieldKind::Set(_), Value::Array(_)) => true,
            (FieldKind::Tuple(kinds), Value::Array(items)) => kinds.len() == items.len(),
            (FieldKind::Dict(_, _), Value::Document(_)) => true,
            (FieldKind::Embedded(_), Value::Document(_)) => true,
            (FieldKind::Many2One(_) | FieldKind::One2One(_), Value::ObjectId(_)) => true,
            (FieldKind::One2Many(_) | FieldKind::Many2Many(_), Value::Array(_)) => true,
            _ => false,
        }
    }

    /// Full validation chain for a single field: required, type, declared
    /// validators in order, then field-level custom validators. Model-level
    /// cross-field validators run separately (see `registry::meta`).
    pub fn validate(&self, value: &Value, record: &dyn RecordLike) -> Result<(), ValidationError> {
        if value.is_null() {
            if self.required {
                return Err(ValidationError::new(&self.name, ValidationReason::Required));
            }
            return Ok(());
        }
        if !self.type_matches(value) {
            return Err(ValidationError::new(
                &self.name,
                ValidationReason::TypeMismatch {
                    expected: self.kind.name(),
                    actual: value.type_name(),
                },
            ));
        }
        for validator in &self.validators {
            validator
                .validate(value, record)
                .map_err(|reason| ValidationError::new(&self.name, reason))?;
        }
        Ok(())
    }

    /// Converts a validated value to its wire (BSON) representation.
    pub fn convert_to_store(&self, value: &Value) -> Result<Bson, ValidationError> {
        Bson::try_from(value).map_err(|e| {
            ValidationError::new(&self.name, ValidationReason::Custom(e.to_string()))
        })
    }

    /// Converts a raw wire value back to the in-process representation.
    pub fn convert_from_store(&self, raw: Bson) -> Result<Value, ValidationError> {
        Value::try_from(raw).map_err(|e| {
            ValidationError::new(&self.name, ValidationReason::Custom(e.to_string()))
        })
    }
}
