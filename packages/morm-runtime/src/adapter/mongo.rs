//! The real `Adapter`, backed by the official `mongodb` driver.
//!
//! CRUD operations go straight through `mongodb::Client`'s own internal
//! connection pooling rather than through `crate::pool::Pool` — the
//! driver already multiplexes a single `Client` over a pooled set of
//! sockets, so layering our own `Pool<C>` underneath every CRUD call
//! would just double-pool. `Pool<MongoConnector>` exists only to gate
//! and retry `client.start_session()` calls for `begin_transaction`,
//! where the circuit breaker and backoff policy matter most (a session
//! start is the one call that talks to the topology before any command
//! is issued). See `DESIGN.md` for the tradeoff this simplification
//! accepts: transactions are not traced through the same `Session<C>`
//! RAII guard as pooled connections are.

use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::StreamExt;
use mongodb::options::FindOptions;
use mongodb::{Client, ClientSession, Database};

use super::{Adapter, BoxCursor, StoreTransaction, WriteOutcome};
use crate::error::{PoolError, RuntimeError};
use crate::pool::Connector;

/// Opens `mongodb::ClientSession`s for transactional use.
pub struct MongoConnector {
    client: Client,
}

impl MongoConnector {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Connection = ClientSession;

    async fn connect(&self) -> Result<Self::Connection, PoolError> {
        self.client
            .start_session()
            .await
            .map_err(|e| PoolError::ConnectFailed(e.to_string()))
    }
}

/// `Adapter` over a single Mongo `Database`.
pub struct MongoAdapter {
    db: Database,
    sessions: Arc<crate::pool::Pool<MongoConnector>>,
}

impl MongoAdapter {
    #[must_use]
    pub fn new(db: Database, sessions: Arc<crate::pool::Pool<MongoConnector>>) -> Self {
        Self { db, sessions }
    }

    fn to_adapter_err(err: mongodb::error::Error) -> RuntimeError {
        if let Some(code) = err.code() {
            if code == 11000 {
                return RuntimeError::Conflict {
                    model: String::new(),
                    fields: Vec::new(),
                };
            }
        }
        RuntimeError::Adapter(err.to_string())
    }
}

#[async_trait]
impl Adapter for MongoAdapter {
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Bson, RuntimeError> {
        let result = self
            .db
            .collection::<Document>(collection)
            .insert_one(doc)
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<Vec<Bson>, RuntimeError> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let result = self
            .db
            .collection::<Document>(collection)
            .insert_many(docs)
            .await
            .map_err(Self::to_adapter_err)?;
        let mut ids: Vec<(i64, Bson)> = result.inserted_ids.into_iter().map(|(idx, id)| (idx as i64, id)).collect();
        ids.sort_by_key(|(idx, _)| *idx);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn find(
        &self,
        collection: &str,
        filter: Document,
        sort: Option<Document>,
        skip: Option<u64>,
        limit: Option<i64>,
    ) -> Result<BoxCursor, RuntimeError> {
        let mut options = FindOptions::default();
        options.sort = sort;
        options.skip = skip;
        options.limit = limit;
        let cursor = self
            .db
            .collection::<Document>(collection)
            .find(filter)
            .with_options(options)
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(Box::pin(cursor.map(|r| r.map_err(Self::to_adapter_err))))
    }

    async fn find_one(&self, collection: &str, filter: Document) -> Result<Option<Document>, RuntimeError> {
        self.db
            .collection::<Document>(collection)
            .find_one(filter)
            .await
            .map_err(Self::to_adapter_err)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: Document,
        update: Document,
        upsert: bool,
    ) -> Result<WriteOutcome, RuntimeError> {
        let result = self
            .db
            .collection::<Document>(collection)
            .update_one(filter, update)
            .upsert(upsert)
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(WriteOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn update_many(&self, collection: &str, filter: Document, update: Document) -> Result<WriteOutcome, RuntimeError> {
        let result = self
            .db
            .collection::<Document>(collection)
            .update_many(filter, update)
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(WriteOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete_one(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError> {
        let result = self
            .db
            .collection::<Document>(collection)
            .delete_one(filter)
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(result.deleted_count)
    }

    async fn delete_many(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError> {
        let result = self
            .db
            .collection::<Document>(collection)
            .delete_many(filter)
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(result.deleted_count)
    }

    async fn aggregate(&self, collection: &str, pipeline: Vec<Document>) -> Result<BoxCursor, RuntimeError> {
        let cursor = self
            .db
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(Box::pin(cursor.map(|r| r.map_err(Self::to_adapter_err))))
    }

    async fn count(&self, collection: &str, filter: Document) -> Result<u64, RuntimeError> {
        self.db
            .collection::<Document>(collection)
            .count_documents(filter)
            .await
            .map_err(Self::to_adapter_err)
    }

    async fn begin_transaction(&self) -> Result<Box<dyn StoreTransaction>, RuntimeError> {
        let mut session = self.sessions.acquire().await?;
        session
            .connection()
            .start_transaction()
            .await
            .map_err(Self::to_adapter_err)?;
        Ok(Box::new(MongoTransaction { session }))
    }
}

struct MongoTransaction {
    session: crate::pool::Session<MongoConnector>,
}

#[async_trait]
impl StoreTransaction for MongoTransaction {
    async fn commit(mut self: Box<Self>) -> Result<(), RuntimeError> {
        self.session
            .connection()
            .commit_transaction()
            .await
            .map_err(MongoAdapter::to_adapter_err)
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), RuntimeError> {
        self.session
            .connection()
            .abort_transaction()
            .await
            .map_err(MongoAdapter::to_adapter_err)
    }
}
