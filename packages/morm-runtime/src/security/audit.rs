//! Audit log: before/after values of tracked fields plus call metadata,
//! recorded after the adapter call succeeds and before the lifecycle
//! event fires (§4.10). `NullAuditLog` mirrors the teacher's
//! `storage::datastores::null::NullDataStore` no-op idiom for deployments
//! that don't declare `audit_spec` on any model.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bson::Bson;
use chrono::{DateTime, Utc};
use morm_core::Value;
use parking_lot::Mutex;

use super::acl::Operation;
use crate::error::RuntimeError;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub user_id: String,
    pub operation: Operation,
    pub timestamp: DateTime<Utc>,
    pub model: String,
    pub id: Bson,
    pub before: HashMap<String, Value>,
    pub after: HashMap<String, Value>,
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), RuntimeError>;
}

/// No-op sink for deployments with no `audit_spec` declared anywhere.
pub struct NullAuditLog;

#[async_trait]
impl AuditLog for NullAuditLog {
    async fn record(&self, _entry: AuditEntry) -> Result<(), RuntimeError> {
        Ok(())
    }
}

/// In-process sink used by tests to assert on recorded entries.
#[derive(Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[must_use]
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), RuntimeError> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_audit_log_retains_recorded_entries() {
        let log = MemoryAuditLog::new();
        log.record(AuditEntry {
            user_id: "u1".to_string(),
            operation: Operation::Update,
            timestamp: Utc::now(),
            model: "orders".to_string(),
            id: Bson::Int64(1),
            before: HashMap::new(),
            after: HashMap::new(),
        })
        .await
        .unwrap();
        assert_eq!(log.entries().len(), 1);
    }

    #[tokio::test]
    async fn null_audit_log_discards_everything() {
        let log = NullAuditLog;
        log.record(AuditEntry {
            user_id: "u1".to_string(),
            operation: Operation::Delete,
            timestamp: Utc::now(),
            model: "orders".to_string(),
            id: Bson::Int64(1),
            before: HashMap::new(),
            after: HashMap::new(),
        })
        .await
        .unwrap();
    }
}
