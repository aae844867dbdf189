//! Recordset: an identity-bearing, lazily materialized sequence of record
//! ids tied to one model and one environment (§4.6). Grounded on the
//! teacher's `storage::record_store` CRUD contract plus
//! `storage::mutation_observer`'s fan-out-on-write idiom, generalized here
//! to fan out lifecycle events instead of CRDT merge notifications.

pub mod algebra;
pub mod cache;
pub mod prefetch;
pub mod record;

use std::collections::HashMap;

use bson::{doc, Bson, Document};
use futures::future::BoxFuture;
use futures::stream::StreamExt;
use morm_core::{compile_domain, Domain, FieldKind, Operator, RecordLike, RegistryError, Value, ValidationError, ValidationReason};

use self::prefetch::PrefetchConfig;
pub use self::record::{Record, RecordMetadata};
use crate::adapter::BoxCursor;
use crate::env::Environment;
use crate::error::{RuntimeError, SecurityError};
use crate::events::Event;
use crate::security::acl::Operation;
use crate::security::audit::AuditEntry;

/// `search`'s sort/limit/offset knobs. Projection is not modeled: a
/// recordset only ever materializes ids, never field values, per §4.6.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub sort: Option<(String, bool)>,
    pub limit: Option<i64>,
    pub offset: Option<u64>,
}

/// A minimal `RecordLike` view over the values being written/created in one
/// call, for validators and compute dependencies that only need sibling
/// values from the same write (cross-field validators spanning already
/// *stored* fields read through `Recordset::get` instead).
struct WriteContext<'a> {
    model: &'a str,
    values: &'a HashMap<String, Value>,
}

impl RecordLike for WriteContext<'_> {
    fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    fn model_name(&self) -> &str {
        self.model
    }
}

/// An ordered, possibly-empty sequence of record ids tied to one model and
/// one environment. Cheap to clone: `ids` and `env` are the only state, and
/// `env` is itself a handle of `Arc`s.
#[derive(Clone)]
pub struct Recordset {
    model: String,
    ids: Vec<Bson>,
    env: Environment,
}

impl Recordset {
    /// Constructs an empty-shell recordset over `ids` with no store access.
    #[must_use]
    pub fn browse(env: &Environment, model: impl Into<String>, ids: Vec<Bson>) -> Self {
        Self {
            model: model.into(),
            ids,
            env: env.clone(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[must_use]
    pub fn ids(&self) -> &[Bson] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Operations that only make sense on a singleton (e.g. `read_one`
    /// convenience wrappers built on top of this) fail with
    /// [`RuntimeError::SingletonExpected`] when this recordset is not
    /// exactly one id long.
    ///
    /// # Errors
    /// [`RuntimeError::SingletonExpected`] if `len() != 1`.
    pub fn ensure_one(&self) -> Result<&Bson, RuntimeError> {
        if self.ids.len() == 1 {
            Ok(&self.ids[0])
        } else {
            Err(RuntimeError::SingletonExpected {
                model: self.model.clone(),
                found: self.ids.len(),
            })
        }
    }

    /// Materializes ids by querying the adapter: runs the ACL check,
    /// conjoins the caller's record-rule domain, expands any `child_of`
    /// leaves against the store, compiles to a filter/pipeline, and
    /// dispatches to `find` or `aggregate` depending on whether the
    /// compiled query needs pre-stages.
    ///
    /// # Errors
    /// [`RuntimeError::Security`] if the ACL denies read access;
    /// [`RuntimeError::Domain`]/[`RuntimeError::Registry`] on a malformed
    /// domain; [`RuntimeError::Adapter`] on a backend failure.
    pub async fn search(
        env: &Environment,
        model: &str,
        domain: Domain,
        options: SearchOptions,
    ) -> Result<Self, RuntimeError> {
        require_access(env, model, Operation::Read)?;

        let rule_domain = env.record_rules.domain_for(&env.user, model, Operation::Read);
        let combined = domain.and(rule_domain);
        let expanded = expand_child_of(combined, model.to_string(), env.clone()).await?;
        let compiled = compile_domain(&expanded, model, env.registry.as_ref())?;
        let collection = env.registry.collection(model)?.to_string();

        let sort_doc = options
            .sort
            .as_ref()
            .map(|(field, ascending)| doc! { field.clone(): if *ascending { 1 } else { -1 } });

        let mut cursor = if compiled.pre_stages.is_empty() {
            env.adapter
                .find(&collection, compiled.filter, sort_doc, options.offset, options.limit)
                .await?
        } else {
            let mut pipeline = compiled.pre_stages;
            pipeline.push(doc! { "$match": compiled.filter });
            if let Some(sort) = sort_doc {
                pipeline.push(doc! { "$sort": sort });
            }
            if let Some(offset) = options.offset {
                pipeline.push(doc! { "$skip": offset as i64 });
            }
            if let Some(limit) = options.limit {
                pipeline.push(doc! { "$limit": limit });
            }
            env.adapter.aggregate(&collection, pipeline).await?
        };

        let ids = collect_ids(&mut cursor).await?;
        Ok(Self {
            model: model.to_string(),
            ids,
            env: env.clone(),
        })
    }

    /// Reads field `field` on record `id`. A cache miss triggers a batched
    /// prefetch across every id in this recordset still missing `field`
    /// (§4.6 "Lazy load").
    ///
    /// # Errors
    /// [`RuntimeError::Security`] if the ACL denies read access;
    /// [`RuntimeError::NotFound`] if `id` has no value for `field` after the
    /// prefetch (the id does not exist, or the field is not set).
    pub async fn get(&self, id: &Bson, field: &str) -> Result<Value, RuntimeError> {
        require_access(&self.env, &self.model, Operation::Read)?;
        if let Some(value) = self.env.cache.get(&self.model, id, field) {
            self.env.prefetch.record_access(&self.model, field);
            return Ok(value);
        }
        self.load_batch(field).await?;
        self.env.prefetch.record_access(&self.model, field);
        self.env
            .cache
            .get(&self.model, id, field)
            .ok_or(RuntimeError::NotFound)
    }

    async fn load_batch(&self, field: &str) -> Result<(), RuntimeError> {
        let missing: Vec<Bson> = self
            .ids
            .iter()
            .filter(|id| !self.env.cache.has(&self.model, id, field))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let declared_prefetch: Vec<String> = self
            .env
            .registry
            .fields(&self.model)?
            .values()
            .filter(|f| f.prefetch)
            .map(|f| f.name.clone())
            .collect();
        let mut wanted = vec![field.to_string()];
        wanted.extend(self.env.prefetch.companions(&self.model, field, &declared_prefetch));

        let collection = self.env.registry.collection(&self.model)?.to_string();
        let batch_size = PrefetchConfig::default().batch_size;
        for chunk in missing.chunks(batch_size) {
            let filter = doc! { "_id": { "$in": chunk.to_vec() } };
            let mut cursor = self.env.adapter.find(&collection, filter, None, None, None).await?;
            while let Some(doc) = cursor.next().await {
                let doc = doc?;
                let Some(id) = doc.get("_id").cloned() else { continue };
                for name in &wanted {
                    let Some(raw) = doc.get(name) else { continue };
                    let Ok(decl) = self.env.registry.field(&self.model, name) else { continue };
                    if let Ok(value) = decl.convert_from_store(raw.clone()) {
                        self.env.cache.put(&self.model, &id, name, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Materializes every declared field of `id` into a [`Record`] snapshot,
    /// triggering a batched prefetch for any field not already cached.
    /// Fields with no stored value are simply absent from `fields`.
    ///
    /// # Errors
    /// Same as [`Recordset::get`], except a missing field is tolerated
    /// rather than surfaced as [`RuntimeError::NotFound`].
    pub async fn record(&self, id: &Bson) -> Result<Record, RuntimeError> {
        let field_names: Vec<String> = self.env.registry.fields(&self.model)?.keys().cloned().collect();
        let mut fields = HashMap::new();
        for name in &field_names {
            match self.get(id, name).await {
                Ok(value) => {
                    fields.insert(name.clone(), value);
                }
                Err(RuntimeError::NotFound) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(Record::new(&self.model, id.clone(), fields))
    }

    /// [`Recordset::record`] applied to every id in this recordset, in
    /// order.
    ///
    /// # Errors
    /// Same as [`Recordset::record`].
    pub async fn records(&self) -> Result<Vec<Record>, RuntimeError> {
        let mut out = Vec::with_capacity(self.ids.len());
        for id in &self.ids {
            out.push(self.record(id).await?);
        }
        Ok(out)
    }

    /// Validates and writes `values` through the adapter against this
    /// recordset's ids, updates the cache, invalidates dependent computed
    /// fields, and publishes `{model}.after_write`.
    ///
    /// # Errors
    /// [`RuntimeError::Security`] if the ACL denies update access;
    /// [`RuntimeError::Validation`] if a value fails its field's contract or
    /// targets a readonly field; [`RuntimeError::Adapter`] on a backend
    /// failure.
    pub async fn write(&self, values: HashMap<String, Value>) -> Result<(), RuntimeError> {
        if self.ids.is_empty() || values.is_empty() {
            return Ok(());
        }
        require_access(&self.env, &self.model, Operation::Update)?;

        let fields = self.env.registry.fields(&self.model)?;
        let context = WriteContext {
            model: &self.model,
            values: &values,
        };
        let mut set_doc = Document::new();
        for (name, value) in &values {
            let field = fields.get(name).ok_or_else(|| RegistryError::UnknownField {
                model: self.model.clone(),
                field: name.clone(),
            })?;
            if field.readonly {
                return Err(
                    ValidationError::new(name, ValidationReason::Custom("field is readonly".to_string())).into(),
                );
            }
            field.validate(value, &context)?;
            set_doc.insert(name.clone(), field.convert_to_store(value)?);
        }

        let collection = self.env.registry.collection(&self.model)?.to_string();
        let filter = doc! { "_id": { "$in": self.ids.clone() } };
        let update = doc! { "$set": set_doc };
        self.env.adapter.update_many(&collection, filter, update).await?;

        let audited = self.env.registry.meta(&self.model)?.audit_spec.iter().any(|op| op == "update");
        for id in &self.ids {
            let before: HashMap<String, Value> = if audited {
                values
                    .keys()
                    .filter_map(|name| self.env.cache.get(&self.model, id, name).map(|v| (name.clone(), v)))
                    .collect()
            } else {
                HashMap::new()
            };
            for (name, value) in &values {
                self.env.cache.put(&self.model, id, name, value.clone());
                if let Some(txn) = &self.env.transaction {
                    txn.record_write(&self.model, id, name);
                }
            }
            self.invalidate_dependents(id, &values)?;
            if audited {
                record_audit(&self.env, &self.model, id, Operation::Update, before, values.clone()).await?;
            }
        }
        for id in &self.ids {
            self.publish(Event::new(format!("{}.after_write", self.model), serde_json::json!({ "id": id.to_string() })))
                .await?;
        }
        Ok(())
    }

    fn invalidate_dependents(&self, id: &Bson, changed: &HashMap<String, Value>) -> Result<(), RuntimeError> {
        let fields = self.env.registry.fields(&self.model)?;
        for (name, field) in fields {
            if let Some(compute) = &field.compute {
                if compute.depends_on.iter().any(|dep| changed.contains_key(dep)) {
                    self.env.cache.remove(&self.model, id, name);
                }
            }
        }
        Ok(())
    }

    /// Inserts one document per entry of `values_list`, assigns ids,
    /// populates the cache, and publishes `{model}.after_create` per id.
    ///
    /// # Errors
    /// Same as [`Recordset::write`], plus [`RuntimeError::Conflict`] on a
    /// unique-index violation.
    pub async fn create(
        env: &Environment,
        model: &str,
        values_list: Vec<HashMap<String, Value>>,
    ) -> Result<Self, RuntimeError> {
        if values_list.is_empty() {
            return Ok(Self::browse(env, model, Vec::new()));
        }
        require_access(env, model, Operation::Create)?;

        let fields = env.registry.fields(model)?;
        let mut docs = Vec::with_capacity(values_list.len());
        let mut resolved: Vec<HashMap<String, Value>> = Vec::with_capacity(values_list.len());
        for values in &values_list {
            let context = WriteContext { model, values };
            let mut doc = Document::new();
            let mut materialized = HashMap::new();
            for (name, field) in fields {
                let value = values.get(name).cloned().or_else(|| field.default.clone()).unwrap_or(Value::Null);
                field.validate(&value, &context)?;
                if !value.is_null() {
                    doc.insert(name.clone(), field.convert_to_store(&value)?);
                }
                materialized.insert(name.clone(), value);
            }
            docs.push(doc);
            resolved.push(materialized);
        }

        let collection = env.registry.collection(model)?.to_string();
        let ids = env.adapter.insert_many(&collection, docs).await?;

        let audited = env.registry.meta(model)?.audit_spec.iter().any(|op| op == "create");
        for (id, values) in ids.iter().zip(resolved.iter()) {
            env.cache.put_many(model, id, values);
            if let Some(txn) = &env.transaction {
                for name in values.keys() {
                    txn.record_write(model, id, name);
                }
            }
            if audited {
                record_audit(env, model, id, Operation::Create, HashMap::new(), values.clone()).await?;
            }
        }
        for id in &ids {
            publish(env, Event::new(format!("{model}.after_create"), serde_json::json!({ "id": id.to_string() }))).await?;
        }

        Ok(Self {
            model: model.to_string(),
            ids,
            env: env.clone(),
        })
    }

    /// Removes every record in this recordset from the store, drops their
    /// cache entries, and publishes `{model}.after_delete` per id.
    ///
    /// # Errors
    /// [`RuntimeError::Security`] if the ACL denies delete access;
    /// [`RuntimeError::Adapter`] on a backend failure.
    pub async fn delete(&self) -> Result<(), RuntimeError> {
        if self.ids.is_empty() {
            return Ok(());
        }
        require_access(&self.env, &self.model, Operation::Delete)?;

        let collection = self.env.registry.collection(&self.model)?.to_string();
        let filter = doc! { "_id": { "$in": self.ids.clone() } };
        self.env.adapter.delete_many(&collection, filter).await?;

        let audited = self.env.registry.meta(&self.model)?.audit_spec.iter().any(|op| op == "delete");
        for id in &self.ids {
            if audited {
                let before: HashMap<String, Value> = self
                    .env
                    .registry
                    .fields(&self.model)?
                    .keys()
                    .filter_map(|name| self.env.cache.get(&self.model, id, name).map(|v| (name.clone(), v)))
                    .collect();
                record_audit(&self.env, &self.model, id, Operation::Delete, before, HashMap::new()).await?;
            }
            self.env.cache.remove_record(&self.model, id);
        }
        for id in &self.ids {
            self.publish(Event::new(format!("{}.after_delete", self.model), serde_json::json!({ "id": id.to_string() })))
                .await?;
        }
        Ok(())
    }

    async fn publish(&self, event: Event) -> Result<(), RuntimeError> {
        publish(&self.env, event).await
    }

    /// Left-first union, ids deduplicated, of this recordset with `other`.
    /// Both must be over the same model.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.combine(other, algebra::union)
    }

    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        self.combine(other, algebra::intersection)
    }

    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.combine(other, algebra::difference)
    }

    #[must_use]
    pub fn concat(&self, other: &Self) -> Self {
        self.combine(other, algebra::concat)
    }

    fn combine(&self, other: &Self, op: fn(&[Bson], &[Bson]) -> Vec<Bson>) -> Self {
        Self {
            model: self.model.clone(),
            ids: op(&self.ids, &other.ids),
            env: self.env.clone(),
        }
    }

    /// In-memory filter over this recordset's ids (§4.6 "Algebra").
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&Bson) -> bool) -> Self {
        Self {
            model: self.model.clone(),
            ids: self.ids.iter().filter(|id| predicate(id)).cloned().collect(),
            env: self.env.clone(),
        }
    }

    /// In-memory sort over this recordset's ids (§4.6 "Algebra").
    #[must_use]
    pub fn sorted<K: Ord>(&self, key: impl Fn(&Bson) -> K) -> Self {
        let mut ids = self.ids.clone();
        ids.sort_by_key(|id| key(id));
        Self {
            model: self.model.clone(),
            ids,
            env: self.env.clone(),
        }
    }
}

fn require_access(env: &Environment, model: &str, operation: Operation) -> Result<(), RuntimeError> {
    if env.acl.can(&env.user, model, operation) {
        Ok(())
    } else {
        Err(SecurityError::AccessDenied {
            user: env.user.user_id.clone(),
            model: model.to_string(),
            action: format!("{operation:?}"),
        }
        .into())
    }
}

async fn publish(env: &Environment, event: Event) -> Result<(), RuntimeError> {
    if let Some(txn) = &env.transaction {
        txn.buffer_event(event);
        Ok(())
    } else {
        env.events.publish(event).await.map_err(Into::into)
    }
}

/// Records one audit entry for a model whose `audit_spec` declares
/// `operation`. Buffered into the active transaction if there is one, so
/// it is discarded on rollback alongside lifecycle events (§9, open
/// question 3); otherwise written straight to the audit sink.
async fn record_audit(
    env: &Environment,
    model: &str,
    id: &Bson,
    operation: Operation,
    before: HashMap<String, Value>,
    after: HashMap<String, Value>,
) -> Result<(), RuntimeError> {
    let entry = AuditEntry {
        user_id: env.user.user_id.clone(),
        operation,
        timestamp: chrono::Utc::now(),
        model: model.to_string(),
        id: id.clone(),
        before,
        after,
    };
    if let Some(txn) = &env.transaction {
        txn.buffer_audit(entry);
        Ok(())
    } else {
        env.audit.record(entry).await
    }
}

async fn collect_ids(cursor: &mut BoxCursor) -> Result<Vec<Bson>, RuntimeError> {
    let mut ids = Vec::new();
    while let Some(doc) = cursor.next().await {
        let doc = doc?;
        if let Some(id) = doc.get("_id") {
            ids.push(id.clone());
        }
    }
    Ok(ids)
}

/// Rewrites every `child_of` leaf in `domain` to an `In` leaf over the
/// transitive id closure under the self-referential `many2one` relation
/// named by the leaf's path (§9, open question 2). A path that does not
/// name a `many2one` relation targeting `model` itself is rejected with
/// [`morm_core::DomainError::FieldNotFound`].
fn expand_child_of(domain: Domain, model: String, env: Environment) -> BoxFuture<'static, Result<Domain, RuntimeError>> {
    Box::pin(async move {
        match domain {
            Domain::True | Domain::False => Ok(domain),
            Domain::Leaf {
                path,
                op: Operator::ChildOf,
                value,
            } => {
                let ids = child_of_closure(&model, &path, &value, &env).await?;
                Ok(Domain::leaf(path, Operator::In, Value::Array(ids)))
            }
            Domain::Leaf { .. } => Ok(domain),
            Domain::And(l, r) => {
                let l = expand_child_of(*l, model.clone(), env.clone()).await?;
                let r = expand_child_of(*r, model, env).await?;
                Ok(l.and(r))
            }
            Domain::Or(l, r) => {
                let l = expand_child_of(*l, model.clone(), env.clone()).await?;
                let r = expand_child_of(*r, model, env).await?;
                Ok(l.or(r))
            }
            Domain::Not(inner) => {
                let inner = expand_child_of(*inner, model, env).await?;
                Ok(inner.not())
            }
        }
    })
}

async fn child_of_closure(model: &str, path: &str, value: &Value, env: &Environment) -> Result<Vec<Value>, RuntimeError> {
    let field = env.registry.field(model, path)?;
    let is_self_referential = matches!(&field.kind, FieldKind::Many2One(rel) if rel.target == model);
    if !is_self_referential {
        return Err(morm_core::DomainError::FieldNotFound(format!("{model}.{path}")).into());
    }

    let roots: Vec<Bson> = match value {
        Value::Array(items) => items.iter().map(Bson::try_from).collect::<Result<_, _>>(),
        single => Bson::try_from(single).map(|b| vec![b]),
    }
    .map_err(|e| morm_core::DomainError::ValueCoercion {
        field: path.to_string(),
        value: e.to_string(),
    })?;

    let collection = env.registry.collection(model)?.to_string();
    let mut seen: std::collections::HashSet<String> = roots.iter().map(std::string::ToString::to_string).collect();
    let mut all = roots.clone();
    let mut frontier = roots;

    while !frontier.is_empty() {
        let filter = doc! { path.to_string(): { "$in": frontier.clone() } };
        let mut cursor = env.adapter.find(&collection, filter, None, None, None).await?;
        let mut next_frontier = Vec::new();
        while let Some(doc) = cursor.next().await {
            let doc = doc?;
            if let Some(id) = doc.get("_id") {
                if seen.insert(id.to_string()) {
                    next_frontier.push(id.clone());
                }
            }
        }
        all.extend(next_frontier.iter().cloned());
        frontier = next_frontier;
    }

    all.into_iter()
        .map(Value::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RuntimeError::Adapter(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use crate::adapter::Adapter as _;
    use crate::events::{EventBus, MemoryQueue};
    use crate::security::acl::{AclTable, UserContext};
    use crate::security::audit::NullAuditLog;
    use crate::security::record_rules::RecordRuleSet;
    use morm_core::{Field, FieldKind, Model, RegistryBuilder, RelationSpec};
    use std::sync::Arc;

    fn person_model() -> Model {
        Model::new("person", "people")
            .with_field(Field::new("name", FieldKind::String))
            .with_field(Field::new("age", FieldKind::Integer))
            .with_field(Field::new("manager_id", FieldKind::Many2One(RelationSpec::new("person"))))
    }

    async fn env_with_full_access() -> Environment {
        let adapter: Arc<dyn Adapter> = Arc::new(MemoryAdapter::default());
        let mut builder = RegistryBuilder::new();
        builder.register(person_model()).unwrap();
        let registry = Arc::new(builder.freeze().unwrap());
        let mut acl = AclTable::new();
        acl.allow("person", Operation::Create, ["staff".to_string()]);
        acl.allow("person", Operation::Read, ["staff".to_string()]);
        acl.allow("person", Operation::Update, ["staff".to_string()]);
        acl.allow("person", Operation::Delete, ["staff".to_string()]);
        let queue = Arc::new(MemoryQueue::new());
        let bus: Arc<dyn crate::events::EventPublisher> =
            Arc::new(EventBus::new(queue, "events", crate::config::EventBusConfig::default()));
        Environment::new(
            adapter,
            registry,
            UserContext::new("u1").with_group("staff"),
            Arc::new(acl),
            Arc::new(RecordRuleSet::new()),
            Arc::new(NullAuditLog),
            bus,
        )
    }

    #[tokio::test]
    async fn create_then_search_round_trips() {
        let env = env_with_full_access().await;
        let created = Recordset::create(
            &env,
            "person",
            vec![HashMap::from([("name".to_string(), Value::String("Ada".to_string()))])],
        )
        .await
        .unwrap();
        assert_eq!(created.len(), 1);

        let found = Recordset::search(&env, "person", Domain::True, SearchOptions::default()).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn get_reads_through_cache_after_create() {
        let env = env_with_full_access().await;
        let created = Recordset::create(
            &env,
            "person",
            vec![HashMap::from([("name".to_string(), Value::String("Ada".to_string()))])],
        )
        .await
        .unwrap();
        let id = created.ids()[0].clone();
        assert_eq!(created.get(&id, "name").await.unwrap(), Value::String("Ada".to_string()));
    }

    #[tokio::test]
    async fn write_updates_store_and_cache() {
        let env = env_with_full_access().await;
        let created = Recordset::create(
            &env,
            "person",
            vec![HashMap::from([("name".to_string(), Value::String("Ada".to_string()))])],
        )
        .await
        .unwrap();
        created
            .write(HashMap::from([("age".to_string(), Value::Int(31))]))
            .await
            .unwrap();
        let id = created.ids()[0].clone();
        assert_eq!(created.get(&id, "age").await.unwrap(), Value::Int(31));
    }

    #[tokio::test]
    async fn delete_clears_cache_and_removes_from_store() {
        let env = env_with_full_access().await;
        let created = Recordset::create(
            &env,
            "person",
            vec![HashMap::from([("name".to_string(), Value::String("Ada".to_string()))])],
        )
        .await
        .unwrap();
        created.delete().await.unwrap();
        let found = Recordset::search(&env, "person", Domain::True, SearchOptions::default()).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn ensure_one_rejects_non_singleton() {
        let env = env_with_full_access().await;
        let rs = Recordset::browse(&env, "person", Vec::new());
        assert!(matches!(rs.ensure_one(), Err(RuntimeError::SingletonExpected { .. })));
    }

    #[tokio::test]
    async fn search_denies_read_without_acl_grant() {
        let env = env_with_full_access().await;
        let stranger = env.with_user(UserContext::new("u2"));
        let err = Recordset::search(&stranger, "person", Domain::True, SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Security(_)));
    }

    #[tokio::test]
    async fn child_of_expands_to_transitive_descendants() {
        let env = env_with_full_access().await;
        let root = Recordset::create(
            &env,
            "person",
            vec![HashMap::from([("name".to_string(), Value::String("Root".to_string()))])],
        )
        .await
        .unwrap();
        let root_id = root.ids()[0].clone();
        let root_id_value = Value::try_from(root_id.clone()).unwrap();

        let child = Recordset::create(
            &env,
            "person",
            vec![HashMap::from([
                ("name".to_string(), Value::String("Child".to_string())),
                ("manager_id".to_string(), root_id_value.clone()),
            ])],
        )
        .await
        .unwrap();
        let child_id = child.ids()[0].clone();

        let domain = Domain::leaf("manager_id", Operator::ChildOf, root_id_value);
        let found = Recordset::search(&env, "person", domain, SearchOptions::default()).await.unwrap();
        let found_ids: std::collections::HashSet<String> = found.ids().iter().map(std::string::ToString::to_string).collect();
        assert!(found_ids.contains(&root_id.to_string()));
        assert!(found_ids.contains(&child_id.to_string()));
    }

    #[tokio::test]
    async fn record_materializes_every_declared_field() {
        let env = env_with_full_access().await;
        let created = Recordset::create(
            &env,
            "person",
            vec![HashMap::from([("name".to_string(), Value::String("Ada".to_string()))])],
        )
        .await
        .unwrap();
        let id = created.ids()[0].clone();
        let record = created.record(&id).await.unwrap();
        assert_eq!(record.get("name"), Some(&Value::String("Ada".to_string())));
    }

    #[tokio::test]
    async fn union_dedups_with_left_first_order() {
        let env = env_with_full_access().await;
        let id1 = Bson::Int64(1);
        let id2 = Bson::Int64(2);
        let a = Recordset::browse(&env, "person", vec![id1.clone(), id2.clone()]);
        let b = Recordset::browse(&env, "person", vec![id2.clone()]);
        assert_eq!(a.union(&b).ids(), &[id1, id2]);
    }
}
