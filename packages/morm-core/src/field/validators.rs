//! Declared and custom validators, run in declaration order after the
//! required/type checks baked into `Field::validate`.

use regex::Regex;

use super::RecordLike;
use crate::error::ValidationReason;
use crate::value::Value;

/// A single validation rule over an already type-checked value.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &Value, record: &dyn RecordLike) -> Result<(), ValidationReason>;
}

/// Numeric (or decimal) value must fall within `[min, max]` inclusive.
pub struct RangeValidator {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Validator for RangeValidator {
    fn validate(&self, value: &Value, _record: &dyn RecordLike) -> Result<(), ValidationReason> {
        let n = match value {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Decimal(d) => d.to_string().parse::<f64>().unwrap_or(f64::NAN),
            _ => return Ok(()),
        };
        let in_range = self.min.map_or(true, |min| n >= min) && self.max.map_or(true, |max| n <= max);
        if in_range {
            Ok(())
        } else {
            Err(ValidationReason::OutOfRange)
        }
    }
}

/// String length (or array length, for list/set) must fall within
/// `[min, max]` inclusive.
pub struct LengthValidator {
    pub min: Option<usize>,
    pub max: Option<usize>,
}

impl Validator for LengthValidator {
    fn validate(&self, value: &Value, _record: &dyn RecordLike) -> Result<(), ValidationReason> {
        let len = match value {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            _ => return Ok(()),
        };
        let ok = self.min.map_or(true, |min| len >= min) && self.max.map_or(true, |max| len <= max);
        if ok {
            Ok(())
        } else {
            Err(ValidationReason::LengthConstraint)
        }
    }
}

/// String must match a compiled regular expression.
pub struct RegexValidator {
    pub pattern: Regex,
}

impl RegexValidator {
    /// # Errors
    /// Returns the underlying `regex` parse error if `pattern` is malformed.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl Validator for RegexValidator {
    fn validate(&self, value: &Value, _record: &dyn RecordLike) -> Result<(), ValidationReason> {
        if let Value::String(s) = value {
            if !self.pattern.is_match(s) {
                return Err(ValidationReason::PatternMismatch);
            }
        }
        Ok(())
    }
}

/// Value must equal one of a fixed allow-list (distinct from `Enum` kind
/// membership, which is checked as part of type matching).
pub struct ChoicesValidator {
    pub choices: Vec<Value>,
}

impl Validator for ChoicesValidator {
    fn validate(&self, value: &Value, _record: &dyn RecordLike) -> Result<(), ValidationReason> {
        if self.choices.iter().any(|c| c == value) {
            Ok(())
        } else {
            Err(ValidationReason::NotInChoices)
        }
    }
}

/// Wraps an arbitrary closure as a field-level custom validator.
pub struct FnValidator<F>(pub F)
where
    F: Fn(&Value, &dyn RecordLike) -> Result<(), String> + Send + Sync;

impl<F> Validator for FnValidator<F>
where
    F: Fn(&Value, &dyn RecordLike) -> Result<(), String> + Send + Sync,
{
    fn validate(&self, value: &Value, record: &dyn RecordLike) -> Result<(), ValidationReason> {
        (self.0)(value, record).map_err(ValidationReason::Custom)
    }
}
