//! Dynamic value type flowing between fields, domains, and the adapter.
//!
//! `Value` is the in-process representation; conversion to/from `bson::Bson`
//! implements the wire type mapping from the external interfaces section:
//! string<->UTF-8 string, integer<->int64, float<->double,
//! decimal<->Decimal128, datetime<->UTC date, uuid<->binary subtype 4,
//! objectid<->ObjectId, enum<->string, json<->embedded document.

use std::collections::BTreeMap;
use std::str::FromStr;

use bson::spec::BinarySubtype;
use bson::{oid::ObjectId, Binary, Bson};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dynamically typed value carried by fields, domain leaves, and records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    String(String),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Uuid(Uuid),
    ObjectId(ObjectId),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Document(BTreeMap<String, Value>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::{
            Array, Binary, Bool, Date, DateTime, Decimal, Document, Float, Int, Null, ObjectId,
            String, Time, Uuid,
        };
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (String(a), String(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Uuid(a), Uuid(b)) => a == b,
            (ObjectId(a), ObjectId(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Document(a), Document(b)) => a == b,
            _ => false,
        }
    }
}

/// Error converting between `Value` and the BSON wire representation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValueCoercionError {
    #[error("cannot represent BSON variant {0} as a Value")]
    UnsupportedBson(&'static str),
    #[error("malformed decimal128 value: {0}")]
    MalformedDecimal(String),
}

impl Value {
    /// Returns `true` if this value is [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Best-effort discriminant name, used for type-check error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Uuid(_) => "uuid",
            Value::ObjectId(_) => "objectid",
            Value::Binary(_) => "binary",
            Value::Array(_) => "array",
            Value::Document(_) => "document",
        }
    }
}

impl TryFrom<&Value> for Bson {
    type Error = ValueCoercionError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(i) => Bson::Int64(*i),
            Value::Float(f) => Bson::Double(*f),
            Value::Decimal(d) => {
                let text = d.to_string();
                Bson::Decimal128(
                    bson::Decimal128::from_str(&text)
                        .map_err(|_| ValueCoercionError::MalformedDecimal(text))?,
                )
            }
            Value::String(s) => Bson::String(s.clone()),
            Value::DateTime(dt) => Bson::DateTime(bson::DateTime::from_chrono(*dt)),
            Value::Date(d) => Bson::String(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => Bson::String(t.format("%H:%M:%S%.f").to_string()),
            Value::Uuid(u) => Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes: u.as_bytes().to_vec(),
            }),
            Value::ObjectId(id) => Bson::ObjectId(*id),
            Value::Binary(bytes) => Bson::Binary(Binary {
                subtype: BinarySubtype::Generic,
                bytes: bytes.clone(),
            }),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Bson::try_from(item)?);
                }
                Bson::Array(out)
            }
            Value::Document(map) => {
                let mut doc = bson::Document::new();
                for (k, v) in map {
                    doc.insert(k.clone(), Bson::try_from(v)?);
                }
                Bson::Document(doc)
            }
        })
    }
}

impl TryFrom<Bson> for Value {
    type Error = ValueCoercionError;

    fn try_from(bson: Bson) -> Result<Self, Self::Error> {
        Ok(match bson {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(b) => Value::Bool(b),
            Bson::Int32(i) => Value::Int(i64::from(i)),
            Bson::Int64(i) => Value::Int(i),
            Bson::Double(f) => Value::Float(f),
            Bson::Decimal128(d) => {
                let text = d.to_string();
                Value::Decimal(
                    Decimal::from_str(&text)
                        .map_err(|_| ValueCoercionError::MalformedDecimal(text))?,
                )
            }
            Bson::String(s) => Value::String(s),
            Bson::DateTime(dt) => Value::DateTime(dt.to_chrono()),
            Bson::ObjectId(id) => Value::ObjectId(id),
            Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid | BinarySubtype::UuidOld,
                bytes,
            }) => {
                let arr: [u8; 16] = bytes
                    .try_into()
                    .map_err(|_| ValueCoercionError::UnsupportedBson("binary(uuid, bad len)"))?;
                Value::Uuid(Uuid::from_bytes(arr))
            }
            Bson::Binary(Binary { bytes, .. }) => Value::Binary(bytes),
            Bson::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(Value::try_from(item)?);
                }
                Value::Array(out)
            }
            Bson::Document(doc) => {
                let mut map = BTreeMap::new();
                for (k, v) in doc {
                    map.insert(k, Value::try_from(v)?);
                }
                Value::Document(map)
            }
            other => return Err(ValueCoercionError::UnsupportedBson(bson_type_name(&other))),
        })
    }
}

fn bson_type_name(bson: &Bson) -> &'static str {
    match bson {
        Bson::RegularExpression(_) => "regex",
        Bson::JavaScriptCode(_) => "javascript",
        Bson::JavaScriptCodeWithScope(_) => "javascript_with_scope",
        Bson::Timestamp(_) => "timestamp",
        Bson::Symbol(_) => "symbol",
        Bson::MaxKey => "max_key",
        Bson::MinKey => "min_key",
        Bson::DbPointer(_) => "db_pointer",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_roundtrips() {
        let v = Value::Null;
        let bson = Bson::try_from(&v).unwrap();
        assert_eq!(Value::try_from(bson).unwrap(), Value::Null);
    }

    #[test]
    fn int_roundtrips() {
        let v = Value::Int(42);
        let bson = Bson::try_from(&v).unwrap();
        assert_eq!(bson, Bson::Int64(42));
        assert_eq!(Value::try_from(bson).unwrap(), v);
    }

    #[test]
    fn string_roundtrips() {
        let v = Value::String("hello".to_string());
        let bson = Bson::try_from(&v).unwrap();
        assert_eq!(Value::try_from(bson).unwrap(), v);
    }

    #[test]
    fn uuid_roundtrips_as_binary_subtype_4() {
        let uuid = Uuid::new_v4();
        let v = Value::Uuid(uuid);
        let bson = Bson::try_from(&v).unwrap();
        match &bson {
            Bson::Binary(b) => assert_eq!(b.subtype, BinarySubtype::Uuid),
            other => panic!("expected binary, got {other:?}"),
        }
        assert_eq!(Value::try_from(bson).unwrap(), v);
    }

    #[test]
    fn objectid_roundtrips() {
        let id = ObjectId::new();
        let v = Value::ObjectId(id);
        let bson = Bson::try_from(&v).unwrap();
        assert_eq!(bson, Bson::ObjectId(id));
        assert_eq!(Value::try_from(bson).unwrap(), v);
    }

    #[test]
    fn array_roundtrips() {
        let v = Value::Array(vec![Value::Int(1), Value::String("a".to_string())]);
        let bson = Bson::try_from(&v).unwrap();
        assert_eq!(Value::try_from(bson).unwrap(), v);
    }

    #[test]
    fn document_roundtrips() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        let v = Value::Document(map);
        let bson = Bson::try_from(&v).unwrap();
        assert_eq!(Value::try_from(bson).unwrap(), v);
    }

    #[test]
    fn regex_bson_is_unsupported() {
        let bson = Bson::RegularExpression(bson::Regex {
            pattern: "a".to_string(),
            options: String::new(),
        });
        assert!(Value::try_from(bson).is_err());
    }
}
