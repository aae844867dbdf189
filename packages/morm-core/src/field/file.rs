//! File field support (§4.4): content lives out-of-band in whatever blob
//! store the application wires up; the field itself only ever holds the
//! small in-document metadata envelope plus the constraints enforced on it.

use crate::error::ValidationReason;
use crate::field::RecordLike;
use crate::field::validators::Validator;
use crate::value::Value;

/// The four keys a `file` field's document always carries.
pub const FILENAME_KEY: &str = "filename";
pub const CONTENT_TYPE_KEY: &str = "content_type";
pub const SIZE_KEY: &str = "size";
pub const STORAGE_REF_KEY: &str = "storage_ref";

/// Declared constraints on a `file` field, checked by [`FileValidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConstraints {
    /// Allowed `content_type` values (exact match; empty means unrestricted).
    pub allowed_types: Vec<String>,
    /// Maximum `size` in bytes (`None` means unrestricted).
    pub max_size: Option<u64>,
}

impl FileConstraints {
    #[must_use]
    pub fn new() -> Self {
        Self {
            allowed_types: Vec::new(),
            max_size: None,
        }
    }

    #[must_use]
    pub fn allowed_types(mut self, types: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }
}

impl Default for FileConstraints {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates a `file` field's document against its declared
/// [`FileConstraints`]. Runs as an ordinary entry in the field's validator
/// chain (§4.4's "declared validators" step), after the base type check has
/// already confirmed the value is a [`Value::Document`].
pub struct FileValidator {
    pub constraints: FileConstraints,
}

impl FileValidator {
    #[must_use]
    pub fn new(constraints: FileConstraints) -> Self {
        Self { constraints }
    }
}

impl Validator for FileValidator {
    fn validate(&self, value: &Value, _record: &dyn RecordLike) -> Result<(), ValidationReason> {
        let Value::Document(map) = value else {
            return Ok(());
        };
        if !self.constraints.allowed_types.is_empty() {
            if let Some(Value::String(ct)) = map.get(CONTENT_TYPE_KEY) {
                if !self.constraints.allowed_types.iter().any(|t| t == ct) {
                    return Err(ValidationReason::Custom(format!(
                        "content_type {ct:?} is not among the allowed file types"
                    )));
                }
            }
        }
        if let Some(max) = self.constraints.max_size {
            if let Some(size_value) = map.get(SIZE_KEY) {
                let size = match size_value {
                    Value::Int(n) => Some(*n as u64),
                    Value::Float(f) => Some(*f as u64),
                    _ => None,
                };
                if let Some(size) = size {
                    if size > max {
                        return Err(ValidationReason::Custom(format!(
                            "file size {size} exceeds max_size {max}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    struct EmptyRecord;
    impl RecordLike for EmptyRecord {
        fn get(&self, _field: &str) -> Option<&Value> {
            None
        }
        fn model_name(&self) -> &str {
            "test"
        }
    }

    fn file_doc(content_type: &str, size: i64) -> Value {
        let mut m = BTreeMap::new();
        m.insert(FILENAME_KEY.to_string(), Value::String("a.png".to_string()));
        m.insert(CONTENT_TYPE_KEY.to_string(), Value::String(content_type.to_string()));
        m.insert(SIZE_KEY.to_string(), Value::Int(size));
        m.insert(STORAGE_REF_KEY.to_string(), Value::String("blob://1".to_string()));
        Value::Document(m)
    }

    #[test]
    fn accepts_allowed_type_within_size() {
        let v = FileValidator::new(
            FileConstraints::new().allowed_types(["image/png"]).max_size(1024),
        );
        assert!(v.validate(&file_doc("image/png", 512), &EmptyRecord).is_ok());
    }

    #[test]
    fn rejects_disallowed_type() {
        let v = FileValidator::new(FileConstraints::new().allowed_types(["image/png"]));
        assert!(v.validate(&file_doc("image/gif", 1), &EmptyRecord).is_err());
    }

    #[test]
    fn rejects_oversized_file() {
        let v = FileValidator::new(FileConstraints::new().max_size(100));
        assert!(v.validate(&file_doc("image/png", 200), &EmptyRecord).is_err());
    }
}
