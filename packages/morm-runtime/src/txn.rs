//! Transaction: atomic scope over adapter operations with cache coherence
//! and savepoints, per §4.8.
//!
//! MongoDB sessions have no native nested-savepoint primitive, so
//! savepoints are emulated with an in-process undo log: every cache write
//! made after a transaction begins is recorded as `(model, id, field)`;
//! `savepoint(name)` marks the current log length, `rollback_to(name)`
//! discards every cache entry recorded since that mark. See `DESIGN.md`
//! for why this lives above the store boundary instead of inside
//! `StoreTransaction`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bson::Bson;
use parking_lot::Mutex;

use crate::adapter::StoreTransaction;
use crate::error::TransactionError;
use crate::events::Event;
use crate::recordset::cache::Cache;
use crate::security::audit::AuditEntry;

pub struct Transaction {
    store: Mutex<Option<Box<dyn StoreTransaction>>>,
    cache: Arc<Cache>,
    writes: Mutex<Vec<(String, Bson, String)>>,
    savepoints: Mutex<Vec<(String, usize)>>,
    pending_events: Mutex<Vec<Event>>,
    pending_audits: Mutex<Vec<AuditEntry>>,
    finished: AtomicBool,
}

impl Transaction {
    #[must_use]
    pub fn begin(store: Box<dyn StoreTransaction>, cache: Arc<Cache>) -> Self {
        Self {
            store: Mutex::new(Some(store)),
            cache,
            writes: Mutex::new(Vec::new()),
            savepoints: Mutex::new(Vec::new()),
            pending_events: Mutex::new(Vec::new()),
            pending_audits: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        }
    }

    /// Records that `(model, id, field)` was written through this
    /// transaction's cache, so a rollback can discard it.
    pub fn record_write(&self, model: &str, id: &Bson, field: &str) {
        if !self.finished.load(Ordering::Acquire) {
            self.writes.lock().push((model.to_string(), id.clone(), field.to_string()));
        }
    }

    /// Lifecycle events produced while this transaction is open are
    /// buffered and released only on commit (§4.8 "Interaction with
    /// events").
    pub fn buffer_event(&self, event: Event) {
        self.pending_events.lock().push(event);
    }

    /// Audit entries are part of the same transactional set as lifecycle
    /// events: buffered here, released on commit, discarded on rollback
    /// (§9, open question 3).
    pub fn buffer_audit(&self, entry: AuditEntry) {
        self.pending_audits.lock().push(entry);
    }

    /// # Errors
    /// [`TransactionError::AlreadyFinished`] if the transaction already
    /// committed or rolled back.
    pub fn savepoint(&self, name: impl Into<String>) -> Result<(), TransactionError> {
        self.ensure_active()?;
        let mark = self.writes.lock().len();
        self.savepoints.lock().push((name.into(), mark));
        Ok(())
    }

    /// Discards every cache entry written since `name` was marked, and
    /// pops every savepoint created after it. `name` itself remains on
    /// the stack, so it can be rolled back to again.
    ///
    /// # Errors
    /// [`TransactionError::UnknownSavepoint`] if no savepoint with that
    /// name is on the stack; [`TransactionError::AlreadyFinished`] if the
    /// transaction already committed or rolled back.
    pub fn rollback_to(&self, name: &str) -> Result<(), TransactionError> {
        self.ensure_active()?;
        let mark = {
            let savepoints = self.savepoints.lock();
            savepoints
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, mark)| *mark)
                .ok_or_else(|| TransactionError::UnknownSavepoint(name.to_string()))?
        };
        let discarded: Vec<(String, Bson, String)> = {
            let mut writes = self.writes.lock();
            writes.split_off(mark)
        };
        for (model, id, field) in discarded {
            self.cache.remove(&model, &id, &field);
        }
        self.savepoints.lock().retain(|(_, m)| *m <= mark);
        Ok(())
    }

    /// Merges `name` into its parent scope without discarding its writes.
    ///
    /// # Errors
    /// Same as [`Transaction::rollback_to`].
    pub fn release(&self, name: &str) -> Result<(), TransactionError> {
        self.ensure_active()?;
        let mut savepoints = self.savepoints.lock();
        let pos = savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| TransactionError::UnknownSavepoint(name.to_string()))?;
        savepoints.remove(pos);
        Ok(())
    }

    /// Commits the underlying store transaction and returns the buffered
    /// lifecycle events and audit entries for the caller to release (publish
    /// to the event bus / write to the audit log).
    ///
    /// # Errors
    /// [`TransactionError::AlreadyFinished`] if already committed/rolled
    /// back; [`TransactionError::StoreRejected`] if the store refuses the
    /// commit.
    pub async fn commit(&self) -> Result<(Vec<Event>, Vec<AuditEntry>), TransactionError> {
        self.finish()?;
        let store = self.store.lock().take().ok_or(TransactionError::AlreadyFinished)?;
        store.commit().await.map_err(|e| TransactionError::StoreRejected(e.to_string()))?;
        Ok((
            std::mem::take(&mut *self.pending_events.lock()),
            std::mem::take(&mut *self.pending_audits.lock()),
        ))
    }

    /// Rolls back the underlying store transaction and discards every
    /// cache entry, lifecycle event, and audit entry recorded since `begin`.
    ///
    /// # Errors
    /// Same as [`Transaction::commit`].
    pub async fn rollback(&self) -> Result<(), TransactionError> {
        self.finish()?;
        let store = self.store.lock().take().ok_or(TransactionError::AlreadyFinished)?;
        store.rollback().await.map_err(|e| TransactionError::StoreRejected(e.to_string()))?;
        for (model, id, field) in self.writes.lock().drain(..) {
            self.cache.remove(&model, &id, &field);
        }
        self.pending_events.lock().clear();
        self.pending_audits.lock().clear();
        Ok(())
    }

    fn finish(&self) -> Result<(), TransactionError> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Err(TransactionError::AlreadyFinished);
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), TransactionError> {
        if self.finished.load(Ordering::Acquire) {
            return Err(TransactionError::AlreadyFinished);
        }
        Ok(())
    }
}
