//! Lazy forward-only cursor over query results, generalizing the teacher's
//! `storage::engine::IterationCursor`/`FetchResult` (sync, in-memory
//! paging) into an async `Stream` over store-backed results.

use bson::Document;
use futures::stream::BoxStream;

use crate::error::RuntimeError;

/// A boxed, owned stream of documents, as returned by `Adapter::find`
/// and `Adapter::aggregate`. Boxed so every backend (Mongo driver cursor,
/// in-memory `Vec` iterator) can be returned behind one concrete type.
pub type BoxCursor = BoxStream<'static, Result<Document, RuntimeError>>;
