//! An in-process, `DashMap`-backed fake collection store implementing
//! [`Adapter`], so the recordset/environment/transaction/event-bus layers
//! above it can be exercised in tests without a running MongoDB instance.
//!
//! Grounded on the teacher's `storage::engines::hashmap::HashMapStorage`
//! (an in-memory `StorageEngine` used the same way in the teacher's own
//! test suite), generalized from single-key-value storage to a filtered,
//! multi-document collection store with a minimal BSON query-operator
//! matcher covering exactly the operators `morm_core::domain::compile`
//! emits.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use async_trait::async_trait;
use bson::{oid::ObjectId, Bson, Document};
use dashmap::DashMap;
use futures::stream;
use parking_lot::Mutex;
use regex::RegexBuilder;

use super::{Adapter, BoxCursor, StoreTransaction, WriteOutcome};
use crate::error::RuntimeError;

/// In-memory store, one `Vec<Document>` per collection name.
///
/// Counts `find`/`aggregate` calls per collection so tests can assert the
/// batched-prefetch invariant (§8 property 9, scenario E): reading one
/// field across an `n`-id recordset issues at most one store call per
/// target collection, not `n`.
#[derive(Default)]
pub struct MemoryAdapter {
    collections: Arc<DashMap<String, Mutex<Vec<Document>>>>,
    find_calls: DashMap<String, AtomicU64>,
    unique_fields: DashMap<String, Vec<String>>,
}

impl MemoryAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `find` calls issued against `collection` since
    /// construction.
    #[must_use]
    pub fn find_call_count(&self, collection: &str) -> u64 {
        self.find_calls
            .get(collection)
            .map_or(0, |counter| counter.load(AtomicOrdering::SeqCst))
    }

    /// Declares `field` as store-enforced-unique on `collection`: a
    /// subsequent `insert_one`/`insert_many` that would duplicate an
    /// existing value raises [`RuntimeError::Conflict`] rather than
    /// silently inserting (§4.4 "unique", scenario B).
    pub fn declare_unique(&self, collection: &str, field: &str) {
        self.unique_fields.entry(collection.to_string()).or_default().push(field.to_string());
    }

    fn check_unique(&self, collection: &str, doc: &Document) -> Result<(), RuntimeError> {
        let Some(fields) = self.unique_fields.get(collection) else {
            return Ok(());
        };
        let existing = self.collection(collection).lock();
        for field in fields.value() {
            let Some(value) = doc.get(field) else { continue };
            if matches!(value, Bson::Null) {
                continue;
            }
            if existing.iter().any(|d| d.get(field) == Some(value)) {
                return Err(RuntimeError::Conflict {
                    model: collection.to_string(),
                    fields: vec![field.clone()],
                });
            }
        }
        Ok(())
    }

    fn collection(&self, name: &str) -> dashmap::mapref::one::Ref<'_, String, Mutex<Vec<Document>>> {
        self.collections.entry(name.to_string()).or_default();
        self.collections.get(name).expect("just inserted above")
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn insert_one(&self, collection: &str, mut doc: Document) -> Result<Bson, RuntimeError> {
        self.check_unique(collection, &doc)?;
        let id = doc.get("_id").cloned().unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
        doc.insert("_id", id.clone());
        self.collection(collection).lock().push(doc);
        Ok(id)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>, RuntimeError> {
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            ids.push(self.insert_one(collection, doc).await?);
        }
        Ok(ids)
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<BoxCursor, RuntimeError> {
        self.find_calls
            .entry(collection.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, AtomicOrdering::SeqCst);
        let mut matched: Vec<Document> = self
            .collection(collection)
            .lock()
            .iter()
            .filter(|d| matches_filter(d, &filter))
            .cloned()
            .collect();

        if let Some(sort) = sort {
            sort_documents(&mut matched, &sort);
        }
        let skip = skip.unwrap_or(0) as usize;
        let matched: Vec<Document> = matched.into_iter().skip(skip).collect();
        let matched: Vec<Document> = match limit {
            Some(n) if n >= 0 => matched.into_iter().take(n as usize).collect(),
            _ => matched,
        };
        Ok(Box::pin(stream::iter(matched.into_iter().map(Ok))))
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>, RuntimeError> {
        Ok(self
            .collection(collection)
            .lock()
            .iter()
            .find(|d| matches_filter(d, &filter))
            .cloned())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<WriteOutcome, RuntimeError> {
        let mut guard = self.collection(collection).lock();
        if let Some(doc) = guard.iter_mut().find(|d| matches_filter(d, &filter)) {
            apply_update(doc, &update);
            return Ok(WriteOutcome {
                matched: 1,
                modified: 1,
                upserted_id: None,
            });
        }
        if upsert {
            let mut doc = filter_as_seed_document(&filter);
            apply_update(&mut doc, &update);
            let id = doc.get("_id").cloned().unwrap_or_else(|| Bson::ObjectId(ObjectId::new()));
            doc.insert("_id", id.clone());
            guard.push(doc);
            return Ok(WriteOutcome {
                matched: 0,
                modified: 0,
                upserted_id: Some(id),
            });
        }
        Ok(WriteOutcome::default())
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> Result<WriteOutcome, RuntimeError> {
        let mut guard = self.collection(collection).lock();
        let mut matched = 0u64;
        for doc in guard.iter_mut().filter(|d| matches_filter(d, &filter)) {
            apply_update(doc, &update);
            matched += 1;
        }
        Ok(WriteOutcome {
            matched,
            modified: matched,
            upserted_id: None,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError> {
        let mut guard = self.collection(collection).lock();
        if let Some(pos) = guard.iter().position(|d| matches_filter(d, &filter)) {
            guard.remove(pos);
            return Ok(1);
        }
        Ok(0)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError> {
        let mut guard = self.collection(collection).lock();
        let before = guard.len();
        guard.retain(|d| !matches_filter(d, &filter));
        Ok((before - guard.len()) as u64)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<BoxCursor, RuntimeError> {
        let mut docs: Vec<Document> = self.collection(collection).lock().clone();
        for stage in pipeline {
            docs = self.run_stage(docs, &stage)?;
        }
        Ok(Box::pin(stream::iter(docs.into_iter().map(Ok))))
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError> {
        Ok(self
            .collection(collection)
            .lock()
            .iter()
            .filter(|d| matches_filter(d, &filter))
            .count() as u64)
    }

    /// Snapshots every collection's current contents so [`StoreTransaction::rollback`]
    /// can restore them verbatim; writes made through this adapter during
    /// the transaction apply in place immediately (there is no isolation
    /// between a transaction and a concurrent reader, unlike a real
    /// MongoDB session), matching this adapter's role as a test double
    /// rather than a faithful concurrency model.
    async fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction>, RuntimeError> {
        let snapshot: HashMap<String, Vec<Document>> = self
            .collections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().lock().clone()))
            .collect();
        Ok(Box::new(MemoryStoreTransaction {
            collections: Arc::clone(&self.collections),
            snapshot,
        }))
    }
}

impl MemoryAdapter {
    fn run_stage(&self, docs: Vec<Document>, stage: &Document) -> Result<Vec<Document>, RuntimeError> {
        if let Some(filter) = stage.get_document("$match").ok() {
            return Ok(docs.into_iter().filter(|d| matches_filter(d, filter)).collect());
        }
        if let Some(lookup) = stage.get_document("$lookup").ok() {
            let from = lookup.get_str("from").unwrap_or_default();
            let local_field = lookup.get_str("localField").unwrap_or_default();
            let foreign_field = lookup.get_str("foreignField").unwrap_or("_id");
            let alias = lookup.get_str("as").unwrap_or_default();
            let foreign = self.collection(from).lock().clone();
            return Ok(docs
                .into_iter()
                .map(|mut d| {
                    let local_value = d.get(local_field).cloned();
                    let matches: Vec<Bson> = foreign
                        .iter()
                        .filter(|f| match &local_value {
                            Some(lv) => f.get(foreign_field) == Some(lv),
                            None => false,
                        })
                        .map(|f| Bson::Document(f.clone()))
                        .collect();
                    d.insert(alias, Bson::Array(matches));
                    d
                })
                .collect());
        }
        if let Some(unwind) = stage.get("$unwind") {
            let path = match unwind {
                Bson::String(s) => s.trim_start_matches('$').to_string(),
                Bson::Document(d) => d
                    .get_str("path")
                    .unwrap_or_default()
                    .trim_start_matches('$')
                    .to_string(),
                _ => return Ok(docs),
            };
            let preserve_empty = matches!(
                unwind,
                Bson::Document(d) if matches!(d.get("preserveNullAndEmptyArrays"), Some(Bson::Boolean(true)))
            );
            let mut out = Vec::new();
            for d in docs {
                match d.get(&path).cloned() {
                    Some(Bson::Array(items)) if !items.is_empty() => {
                        for item in items {
                            let mut clone = d.clone();
                            clone.insert(path.clone(), item);
                            out.push(clone);
                        }
                    }
                    _ if preserve_empty => out.push(d),
                    _ => {}
                }
            }
            return Ok(out);
        }
        if let Some(add_fields) = stage.get_document("$addFields").ok() {
            return Ok(docs
                .into_iter()
                .map(|mut d| {
                    for (key, expr) in add_fields {
                        let value = eval_expr(&d, expr);
                        d.insert(key.clone(), value);
                    }
                    d
                })
                .collect());
        }
        Ok(docs)
    }
}

fn eval_expr(doc: &Document, expr: &Bson) -> Bson {
    if let Bson::Document(d) = expr {
        if let Some(target) = d.get("$size") {
            let path = match target {
                Bson::String(s) => s.trim_start_matches('$'),
                _ => return Bson::Null,
            };
            return match doc.get(path) {
                Some(Bson::Array(items)) => Bson::Int64(items.len() as i64),
                _ => Bson::Int64(0),
            };
        }
    }
    expr.clone()
}

/// Restores the collection snapshot taken at `begin_transaction` on
/// rollback; commit is a no-op since every write already applied in
/// place.
struct MemoryStoreTransaction {
    collections: Arc<DashMap<String, Mutex<Vec<Document>>>>,
    snapshot: HashMap<String, Vec<Document>>,
}

#[async_trait]
impl StoreTransaction for MemoryStoreTransaction {
    async fn commit(self: Box<Self>) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), RuntimeError> {
        for (name, docs) in &self.snapshot {
            *self.collections.entry(name.clone()).or_default().lock() = docs.clone();
        }
        for entry in self.collections.iter() {
            if !self.snapshot.contains_key(entry.key()) {
                entry.value().lock().clear();
            }
        }
        Ok(())
    }
}

fn filter_as_seed_document(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (k, v) in filter {
        if !k.starts_with('$') && !matches!(v, Bson::Document(inner) if inner.keys().any(|k| k.starts_with('$'))) {
            seed.insert(k.clone(), v.clone());
        }
    }
    seed
}

fn apply_update(doc: &mut Document, update: &Document) {
    if let Some(set) = update.get_document("$set").ok() {
        for (k, v) in set {
            doc.insert(k.clone(), v.clone());
        }
    }
    if let Some(unset) = update.get_document("$unset").ok() {
        for k in unset.keys() {
            doc.remove(k);
        }
    }
    if let Some(inc) = update.get_document("$inc").ok() {
        for (k, v) in inc {
            let current = doc.get_i64(k).unwrap_or(0);
            let delta = v.as_i64().or_else(|| v.as_i32().map(i64::from)).unwrap_or(0);
            doc.insert(k.clone(), Bson::Int64(current + delta));
        }
    }
    if update.keys().all(|k| !k.starts_with('$')) {
        for (k, v) in update {
            doc.insert(k.clone(), v.clone());
        }
    }
}

fn sort_documents(docs: &mut [Document], sort: &Document) {
    docs.sort_by(|a, b| {
        for (field, direction) in sort {
            let ord = bson_cmp(a.get(field).unwrap_or(&Bson::Null), b.get(field).unwrap_or(&Bson::Null))
                .unwrap_or(Ordering::Equal);
            let descending = matches!(direction, Bson::Int32(-1) | Bson::Int64(-1));
            let ord = if descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

fn get_path(doc: &Document, path: &str) -> Vec<Bson> {
    let parts: Vec<&str> = path.split('.').collect();
    collect(Bson::Document(doc.clone()), &parts)
}

fn collect(value: Bson, parts: &[&str]) -> Vec<Bson> {
    if parts.is_empty() {
        return vec![value];
    }
    match value {
        Bson::Document(d) => d.get(parts[0]).map(|v| collect(v.clone(), &parts[1..])).unwrap_or_default(),
        Bson::Array(items) => items.into_iter().flat_map(|item| collect(item, parts)).collect(),
        _ => vec![],
    }
}

fn bson_cmp(a: &Bson, b: &Bson) -> Option<Ordering> {
    use Bson::{DateTime as BDate, Double, Int32, Int64, String as BStr};
    match (a, b) {
        (Int32(x), Int32(y)) => x.partial_cmp(y),
        (Int64(x), Int64(y)) => x.partial_cmp(y),
        (Double(x), Double(y)) => x.partial_cmp(y),
        (Int64(x), Int32(y)) => x.partial_cmp(&i64::from(*y)),
        (Int32(x), Int64(y)) => i64::from(*x).partial_cmp(y),
        (Double(x), Int64(y)) => x.partial_cmp(&(*y as f64)),
        (Int64(x), Double(y)) => (*x as f64).partial_cmp(y),
        (Double(x), Int32(y)) => x.partial_cmp(&f64::from(*y)),
        (Int32(x), Double(y)) => f64::from(*x).partial_cmp(y),
        (BStr(x), BStr(y)) => x.partial_cmp(y),
        (BDate(x), BDate(y)) => x.partial_cmp(y),
        _ => None,
    }
}

fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| match key.as_str() {
        "$and" => as_doc_array(value).iter().all(|f| matches_filter(doc, f)),
        "$or" => as_doc_array(value).iter().any(|f| matches_filter(doc, f)),
        "$nor" => !as_doc_array(value).iter().any(|f| matches_filter(doc, f)),
        "$expr" => matches!(value, Bson::Boolean(true)),
        _ => matches_field(doc, key, value),
    })
}

fn as_doc_array(value: &Bson) -> Vec<Document> {
    match value {
        Bson::Array(items) => items
            .iter()
            .filter_map(|v| if let Bson::Document(d) = v { Some(d.clone()) } else { None })
            .collect(),
        _ => Vec::new(),
    }
}

fn matches_field(doc: &Document, path: &str, expected: &Bson) -> bool {
    let candidates = get_path(doc, path);
    if let Bson::Document(ops) = expected {
        if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) {
            return ops.iter().all(|(op, arg)| match op.as_str() {
                "$eq" => candidates.iter().any(|c| c == arg),
                "$ne" => !candidates.iter().any(|c| c == arg),
                "$gt" => candidates.iter().any(|c| bson_cmp(c, arg) == Some(Ordering::Greater)),
                "$gte" => candidates
                    .iter()
                    .any(|c| matches!(bson_cmp(c, arg), Some(Ordering::Greater | Ordering::Equal))),
                "$lt" => candidates.iter().any(|c| bson_cmp(c, arg) == Some(Ordering::Less)),
                "$lte" => candidates
                    .iter()
                    .any(|c| matches!(bson_cmp(c, arg), Some(Ordering::Less | Ordering::Equal))),
                "$in" => {
                    let arr = arg.as_array().map(Vec::as_slice).unwrap_or(&[]);
                    candidates.iter().any(|c| arr.contains(c))
                }
                "$nin" => {
                    let arr = arg.as_array().map(Vec::as_slice).unwrap_or(&[]);
                    !candidates.iter().any(|c| arr.contains(c))
                }
                "$regex" => {
                    let pattern = arg.as_str().unwrap_or_default();
                    let case_insensitive = matches!(ops.get_str("$options"), Ok(o) if o.contains('i'));
                    let Ok(re) = RegexBuilder::new(pattern).case_insensitive(case_insensitive).build() else {
                        return false;
                    };
                    candidates.iter().any(|c| c.as_str().is_some_and(|s| re.is_match(s)))
                }
                "$options" => true,
                "$not" => {
                    if let Bson::Document(inner) = arg {
                        !matches_field(doc, path, &Bson::Document(inner.clone()))
                    } else {
                        true
                    }
                }
                "$exists" => matches!(arg, Bson::Boolean(true)) == !candidates.is_empty(),
                _ => true,
            });
        }
    }
    if matches!(expected, Bson::Null) {
        return candidates.is_empty() || candidates.iter().any(|c| matches!(c, Bson::Null));
    }
    candidates.iter().any(|c| c == expected)
}
