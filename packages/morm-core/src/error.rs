//! Error taxonomy for the pure (I/O-free) half of the crate: registry
//! build/freeze failures, per-field validation failures, and domain
//! expression parse/normalize/compile failures.

use thiserror::Error;

/// Raised while building or freezing the model registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("model `{0}` is already registered")]
    DuplicateModel(String),
    #[error("model `{0}` is unknown")]
    UnknownModel(String),
    #[error("field `{field}` on model `{model}` is already declared")]
    DuplicateField { model: String, field: String },
    #[error("field `{field}` on model `{model}` is unknown")]
    UnknownField { model: String, field: String },
    #[error("model `{model}` inherits from unknown parent `{parent}`")]
    UnknownParent { model: String, parent: String },
    #[error("inheritance cycle detected starting at model `{0}`")]
    InheritanceCycle(String),
    #[error("compute dependency cycle detected on model `{model}`, field `{field}`")]
    ComputeCycle { model: String, field: String },
    #[error("field `{field}` on model `{model}` depends on unknown field `{dependency}`")]
    UnknownComputeDependency {
        model: String,
        field: String,
        dependency: String,
    },
    #[error("relation field `{field}` on model `{model}` targets unknown model `{target}`")]
    UnknownRelationTarget {
        model: String,
        field: String,
        target: String,
    },
    #[error(
        "inverse field `{inverse}` declared by `{model}.{field}` does not exist on `{target}`"
    )]
    UnknownInverse {
        model: String,
        field: String,
        target: String,
        inverse: String,
    },
    #[error("registry is already frozen; no further models may be registered")]
    AlreadyFrozen,
    #[error("registry is not frozen; this operation requires a frozen registry")]
    NotFrozen,
}

/// Raised while validating a value against a field's declared contract.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: ValidationReason,
}

impl ValidationError {
    #[must_use]
    pub fn new(field: impl Into<String>, reason: ValidationReason) -> Self {
        Self {
            field: field.into(),
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationReason {
    #[error("value is required")]
    Required,
    #[error("expected a value of type `{expected}`, got `{actual}`")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{0}")]
    Custom(String),
    #[error("value is not one of the declared choices")]
    NotInChoices,
    #[error("value outside declared range")]
    OutOfRange,
    #[error("value does not match declared length constraint")]
    LengthConstraint,
    #[error("value does not match declared pattern")]
    PatternMismatch,
}

/// Raised while parsing, normalizing, or compiling a domain expression.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("domain token list ended unexpectedly while expecting an operand")]
    UnexpectedEnd,
    #[error("field path `{0}` does not resolve on the target model")]
    FieldNotFound(String),
    #[error("operator `{operator}` is not supported on field `{field}` of kind `{kind}`")]
    OperatorNotSupported {
        operator: String,
        field: String,
        kind: String,
    },
    #[error("value `{value}` could not be coerced to the type of field `{field}`")]
    ValueCoercion { field: String, value: String },
    #[error("`child_of` requires a runtime-expanded id list; compile was called directly")]
    UnexpandedChildOf,
    #[error("relation traversal through `{0}` requires `$lookup`, but the target model is not registered")]
    UnknownRelationTarget(String),
}
