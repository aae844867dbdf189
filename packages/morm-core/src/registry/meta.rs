//! Model-level metadata: cross-field validators (the last stage of the
//! validation chain in §4.4, run after every individual field has already
//! passed its own checks) and descriptive metadata used by the adapter and
//! security layers.

use std::collections::HashMap;

use crate::error::ValidationReason;
use crate::field::RecordLike;
use crate::value::Value;

/// A validator spanning more than one field on the same record, e.g.
/// "`end_date` must be after `start_date`".
pub trait CrossFieldValidator: Send + Sync {
    fn validate(&self, record: &dyn RecordLike) -> Result<(), ValidationReason>;
}

/// Wraps an arbitrary closure as a cross-field validator.
pub struct FnCrossFieldValidator<F>(pub F)
where
    F: Fn(&dyn RecordLike) -> Result<(), String> + Send + Sync;

impl<F> CrossFieldValidator for FnCrossFieldValidator<F>
where
    F: Fn(&dyn RecordLike) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, record: &dyn RecordLike) -> Result<(), ValidationReason> {
        (self.0)(record).map_err(ValidationReason::Custom)
    }
}

/// Security-relevant and descriptive metadata attached to a model at
/// registration time.
#[derive(Debug, Clone, Default)]
pub struct ModelMeta {
    /// Human-readable label, e.g. for audit log messages.
    pub label: Option<String>,
    /// Arbitrary string tags consumed by the security layer's ACL rules
    /// (see `morm-runtime::security::acl`), e.g. `"pii"` on a field's model.
    pub tags: Vec<String>,
    /// Operations (`"create"`, `"read"`, `"update"`, `"delete"`) that must
    /// produce an audit entry for this model (§4.10). Kept as plain
    /// strings rather than `morm-runtime::security::acl::Operation` so
    /// this crate stays free of any runtime dependency.
    pub audit_spec: Vec<String>,
    /// Extra key/value metadata the application layer may stash (mirrors
    /// the free-form `HashMap<String, String>` the teacher's service
    /// registry context carries).
    pub extra: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestRecord;
    impl RecordLike for TestRecord {
        fn get(&self, _field: &str) -> Option<&Value> {
            None
        }
        fn model_name(&self) -> &str {
            "test"
        }
    }

    #[test]
    fn fn_cross_field_validator_wraps_closure() {
        let v = FnCrossFieldValidator(|_record: &dyn RecordLike| Err("bad".to_string()));
        assert_eq!(
            v.validate(&TestRecord),
            Err(ValidationReason::Custom("bad".to_string()))
        );
    }
}
