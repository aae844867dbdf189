//! A fully materialized row, split into wire-relevant data and
//! server-internal bookkeeping, mirroring the teacher's
//! `storage::record::{Record, RecordMetadata}` split.

use std::collections::HashMap;

use bson::Bson;
use chrono::{DateTime, Utc};
use morm_core::{RecordLike, Value};

/// Bookkeeping that never leaves the server: when this snapshot was taken
/// and the cache generation it was read at, for staleness checks the wire
/// format has no use for.
#[derive(Debug, Clone)]
pub struct RecordMetadata {
    pub loaded_at: DateTime<Utc>,
    pub version: u64,
}

/// One record's fields, materialized from the cache for every field
/// declared on its model.
#[derive(Debug, Clone)]
pub struct Record {
    pub id: Bson,
    pub model: String,
    pub fields: HashMap<String, Value>,
    pub metadata: RecordMetadata,
}

impl Record {
    #[must_use]
    pub fn new(model: impl Into<String>, id: Bson, fields: HashMap<String, Value>) -> Self {
        Self {
            id,
            model: model.into(),
            fields,
            metadata: RecordMetadata {
                loaded_at: Utc::now(),
                version: 0,
            },
        }
    }
}

impl RecordLike for Record {
    fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_reads_materialized_fields() {
        let record = Record::new("person", Bson::Int64(1), HashMap::from([("name".to_string(), Value::String("Ada".to_string()))]));
        assert_eq!(record.get("name"), Some(&Value::String("Ada".to_string())));
        assert_eq!(record.get("missing"), None);
    }
}
