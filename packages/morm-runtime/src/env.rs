//! Environment: the per-operation context a recordset carries (§4.7).
//!
//! Generalizes the teacher's `service::registry::ServiceContext` (a small
//! struct bundling shared, cloneable handles) from "config + hlc" to the
//! full set of collaborators a record operation needs: adapter, registry,
//! identity, security tables, event publisher, audit sink, and the
//! cache/prefetch state a transaction's derived environments must share.

use std::collections::HashMap;
use std::sync::Arc;

use morm_core::FrozenRegistry;
use serde_json::Value as JsonValue;
use tracing::instrument;

use crate::adapter::Adapter;
use crate::error::RuntimeError;
use crate::events::EventPublisher;
use crate::recordset::cache::Cache;
use crate::recordset::prefetch::PrefetchRegistry;
use crate::security::acl::{AclTable, UserContext};
use crate::security::audit::AuditLog;
use crate::security::record_rules::RecordRuleSet;
use crate::txn::Transaction;

/// Per-operation context: everything a `Recordset` needs to resolve fields,
/// enforce security, and reach the store. Cheap to clone — every field is
/// an `Arc` or small value — so `with_user`/`with_context`/`with_env`
/// produce a derived environment without copying the cache or prefetch
/// state itself.
#[derive(Clone)]
pub struct Environment {
    pub adapter: Arc<dyn Adapter>,
    pub registry: Arc<FrozenRegistry>,
    pub user: UserContext,
    pub acl: Arc<AclTable>,
    pub record_rules: Arc<RecordRuleSet>,
    pub audit: Arc<dyn AuditLog>,
    pub events: Arc<dyn EventPublisher>,
    pub cache: Arc<Cache>,
    pub prefetch: Arc<PrefetchRegistry>,
    pub context: Arc<HashMap<String, JsonValue>>,
    pub transaction: Option<Arc<Transaction>>,
}

impl Environment {
    #[must_use]
    pub fn new(
        adapter: Arc<dyn Adapter>,
        registry: Arc<FrozenRegistry>,
        user: UserContext,
        acl: Arc<AclTable>,
        record_rules: Arc<RecordRuleSet>,
        audit: Arc<dyn AuditLog>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            adapter,
            registry,
            user,
            acl,
            record_rules,
            audit,
            events,
            cache: Arc::new(Cache::new()),
            prefetch: Arc::new(PrefetchRegistry::new()),
            context: Arc::new(HashMap::new()),
            transaction: None,
        }
    }

    /// A derived environment acting as `user`, sharing this environment's
    /// cache and transaction but with an independent identity for security
    /// decisions (§4.7).
    #[must_use]
    #[instrument(name = "env.with_user", skip(self, user), fields(user_id = %user.user_id))]
    pub fn with_user(&self, user: UserContext) -> Self {
        Self {
            user,
            ..self.clone()
        }
    }

    /// A derived environment with `context` merged over this one's, sharing
    /// cache, identity, and transaction.
    #[must_use]
    pub fn with_context(&self, context: HashMap<String, JsonValue>) -> Self {
        let mut merged = (*self.context).clone();
        merged.extend(context);
        Self {
            context: Arc::new(merged),
            ..self.clone()
        }
    }

    /// A derived environment running inside `transaction`, sharing cache
    /// and identity with this one.
    #[must_use]
    #[instrument(name = "env.with_env", skip(self, transaction))]
    pub fn with_env(&self, transaction: Arc<Transaction>) -> Self {
        Self {
            transaction: Some(transaction),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn context_value(&self, key: &str) -> Option<&JsonValue> {
        self.context.get(key)
    }

    /// Begins a store transaction and returns a derived environment scoped
    /// to it (sharing cache and identity, per §4.7) alongside the handle
    /// the caller commits or rolls back via [`Environment::commit_transaction`]
    /// / [`Environment::rollback_transaction`].
    ///
    /// # Errors
    /// Whatever [`Adapter::begin_transaction`] returns.
    pub async fn begin_transaction(&self) -> Result<(Self, Arc<Transaction>), RuntimeError> {
        let store = self.adapter.begin_transaction().await?;
        let txn = Arc::new(Transaction::begin(store, Arc::clone(&self.cache)));
        Ok((self.with_env(Arc::clone(&txn)), txn))
    }

    /// Commits `txn` and releases its buffered lifecycle events and audit
    /// entries (§4.8 "Interaction with events").
    ///
    /// # Errors
    /// [`RuntimeError::Transaction`] if already finished or the store
    /// rejects the commit; otherwise whatever publishing the buffered
    /// events/audits returns.
    pub async fn commit_transaction(&self, txn: &Transaction) -> Result<(), RuntimeError> {
        let (events, audits) = txn.commit().await?;
        for event in events {
            self.events.publish(event).await?;
        }
        for audit in audits {
            self.audit.record(audit).await?;
        }
        Ok(())
    }

    /// Rolls back `txn`, discarding its cache writes and buffered
    /// events/audits.
    ///
    /// # Errors
    /// [`RuntimeError::Transaction`] if already finished or the store
    /// rejects the rollback.
    pub async fn rollback_transaction(&self, txn: &Transaction) -> Result<(), RuntimeError> {
        txn.rollback().await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::memory::MemoryAdapter;
    use crate::events::{EventBus, MemoryQueue};
    use crate::security::audit::NullAuditLog;
    use morm_core::RegistryBuilder;

    fn test_env() -> Environment {
        let adapter: Arc<dyn Adapter> = Arc::new(MemoryAdapter::default());
        let registry = Arc::new(RegistryBuilder::new().freeze().unwrap());
        let queue = Arc::new(MemoryQueue::new());
        let bus: Arc<dyn EventPublisher> =
            Arc::new(EventBus::new(queue, "events", crate::config::EventBusConfig::default()));
        Environment::new(
            adapter,
            registry,
            UserContext::new("u1"),
            Arc::new(AclTable::new()),
            Arc::new(RecordRuleSet::new()),
            Arc::new(NullAuditLog),
            bus,
        )
    }

    #[tokio::test]
    async fn rollback_transaction_discards_writes_made_through_it() {
        let env = test_env();
        let (txn_env, txn) = env.begin_transaction().await.unwrap();
        let id = bson::Bson::Int64(1);
        txn_env.cache.put("person", &id, "name", morm_core::Value::String("Ada".to_string()));
        txn.record_write("person", &id, "name");
        env.rollback_transaction(&txn).await.unwrap();
        assert!(env.cache.get("person", &id, "name").is_none());
    }

    #[tokio::test]
    async fn commit_transaction_releases_buffered_events() {
        let env = test_env();
        let (txn_env, txn) = env.begin_transaction().await.unwrap();
        txn.buffer_event(crate::events::Event::new("person.created", serde_json::json!({})));
        drop(txn_env);
        env.commit_transaction(&txn).await.unwrap();
    }

    #[test]
    fn with_user_shares_cache_but_changes_identity() {
        let env = test_env();
        env.cache.put("person", &bson::Bson::Int64(1), "name", morm_core::Value::String("Ada".to_string()));
        let derived = env.with_user(UserContext::superuser("root"));
        assert_eq!(derived.user.user_id, "root");
        assert!(derived.user.is_superuser);
        assert!(Arc::ptr_eq(&env.cache, &derived.cache));
    }

    #[test]
    fn with_context_merges_over_existing_keys() {
        let env = test_env();
        let env = env.with_context(HashMap::from([("lang".to_string(), JsonValue::String("en".to_string()))]));
        let env = env.with_context(HashMap::from([("tz".to_string(), JsonValue::String("UTC".to_string()))]));
        assert_eq!(env.context_value("lang"), Some(&JsonValue::String("en".to_string())));
        assert_eq!(env.context_value("tz"), Some(&JsonValue::String("UTC".to_string())));
    }
}
