//! Per-environment `(model, id, field)` value cache. Owned by exactly one
//! `Environment`; sub-environments sharing a transaction share one `Cache`
//! (§4.7). Transaction rollback discards entries by key, per §4.8's cache
//! policy, rather than snapshotting the whole cache.

use bson::Bson;
use dashmap::DashMap;
use morm_core::Value;

type Key = (String, String, String);

fn key(model: &str, id: &Bson, field: &str) -> Key {
    (model.to_string(), id.to_string(), field.to_string())
}

#[derive(Default)]
pub struct Cache {
    entries: DashMap<Key, Value>,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, model: &str, id: &Bson, field: &str) -> Option<Value> {
        self.entries.get(&key(model, id, field)).map(|v| v.clone())
    }

    pub fn put(&self, model: &str, id: &Bson, field: &str, value: Value) {
        self.entries.insert(key(model, id, field), value);
    }

    pub fn put_many(&self, model: &str, id: &Bson, values: &std::collections::HashMap<String, Value>) {
        for (field, value) in values {
            self.put(model, id, field, value.clone());
        }
    }

    pub fn remove(&self, model: &str, id: &Bson, field: &str) {
        self.entries.remove(&key(model, id, field));
    }

    /// Drops every cached field for `(model, id)`, e.g. after a delete or
    /// a rolled-back write.
    pub fn remove_record(&self, model: &str, id: &Bson) {
        let id_str = id.to_string();
        self.entries.retain(|(m, i, _), _| !(m == model && i == &id_str));
    }

    pub fn has(&self, model: &str, id: &Bson, field: &str) -> bool {
        self.entries.contains_key(&key(model, id, field))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = Cache::new();
        let id = Bson::Int64(1);
        cache.put("person", &id, "name", Value::String("Ada".to_string()));
        assert_eq!(cache.get("person", &id, "name"), Some(Value::String("Ada".to_string())));
    }

    #[test]
    fn remove_record_clears_every_field_for_that_id_only() {
        let cache = Cache::new();
        let id1 = Bson::Int64(1);
        let id2 = Bson::Int64(2);
        cache.put("person", &id1, "name", Value::String("Ada".to_string()));
        cache.put("person", &id1, "age", Value::Int(30));
        cache.put("person", &id2, "name", Value::String("Bea".to_string()));
        cache.remove_record("person", &id1);
        assert!(cache.get("person", &id1, "name").is_none());
        assert!(cache.get("person", &id1, "age").is_none());
        assert_eq!(cache.get("person", &id2, "name"), Some(Value::String("Bea".to_string())));
    }

    #[test]
    fn miss_returns_none() {
        let cache = Cache::new();
        assert_eq!(cache.get("person", &Bson::Int64(99), "name"), None);
    }
}
