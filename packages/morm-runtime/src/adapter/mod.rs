//! The adapter layer: a storage-agnostic CRUD/aggregate/transaction
//! contract over BSON documents, per §4.2. Grounded on the teacher's
//! `storage::record_store::RecordStore` trait (an object-safe async trait
//! covering get/put/remove/batch/iteration/transaction-adjacent concerns),
//! generalized from a single-record CRDT store to a collection-oriented
//! document store.

pub mod cursor;
pub mod memory;
#[cfg(feature = "mongo")]
pub mod mongo;

use async_trait::async_trait;
use bson::{Bson, Document};

pub use cursor::BoxCursor;

use crate::error::RuntimeError;

/// Outcome of an update operation, mirroring the fields MongoDB's
/// `update_one`/`update_many` results carry.
#[derive(Debug, Clone, Default)]
pub struct WriteOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// A storage-agnostic CRUD/aggregate/transaction contract. One instance is
/// shared across the process; callers never see the underlying driver
/// type.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// # Errors
    /// [`RuntimeError::Conflict`] on a unique-index violation,
    /// [`RuntimeError::Adapter`] for any other backend failure.
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, RuntimeError>;

    /// # Errors
    /// Same as [`Adapter::insert_one`].
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>, RuntimeError>;

    /// # Errors
    /// [`RuntimeError::Adapter`] on a backend failure.
    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<BoxCursor, RuntimeError>;

    /// # Errors
    /// [`RuntimeError::Adapter`] on a backend failure.
    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>, RuntimeError>;

    /// # Errors
    /// [`RuntimeError::Conflict`] if the update would violate a unique
    /// index, [`RuntimeError::Adapter`] otherwise.
    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<WriteOutcome, RuntimeError>;

    /// # Errors
    /// Same as [`Adapter::update_one`].
    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> Result<WriteOutcome, RuntimeError>;

    /// # Errors
    /// [`RuntimeError::Adapter`] on a backend failure.
    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError>;

    /// # Errors
    /// Same as [`Adapter::delete_one`].
    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError>;

    /// # Errors
    /// [`RuntimeError::Adapter`] on a backend failure.
    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<BoxCursor, RuntimeError>;

    /// # Errors
    /// [`RuntimeError::Adapter`] on a backend failure.
    async fn count(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError>;

    /// Begins a store-level transaction. The returned handle is owned by
    /// the runtime's `Transaction` (see `crate::txn`), which layers
    /// savepoints and buffered side effects on top.
    ///
    /// # Errors
    /// [`RuntimeError::Transaction`] if the backend cannot start one.
    async fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction>, RuntimeError>;
}

/// A store-level transaction handle: commit or roll back the whole thing.
/// The backend need not support nested savepoints; `crate::txn::Transaction`
/// emulates those with an in-process undo log.
#[async_trait]
pub trait StoreTransaction: Send + Sync {
    async fn commit(self: Box<Self>) -> Result<(), RuntimeError>;
    async fn rollback(self: Box<Self>) -> Result<(), RuntimeError>;
}
