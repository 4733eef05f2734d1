//! Document store capability.
//!
//! The catalog consumes its backing store through the [`DocStore`] trait:
//! atomic single-document writes, uniqueness-enforcing indexes, and
//! cursor-producing queries over three logical collections. Application
//! pre-checks give precise conflict messages in the sequential case; the
//! unique indexes behind this trait are the correctness backstop under
//! races, and their violations must come out as [`StoreError::DuplicateKey`]
//! so the engine can surface the same conflict either way.

use crate::document::Document;
use crate::filter::Filter;
use async_trait::async_trait;
use filecatalog_common::CatalogError;
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Lazy stream of documents in the store's natural order
pub type DocCursor = BoxStream<'static, StoreResult<Document>>;

/// Unique index names reported in duplicate key errors
pub mod index {
    pub const FILES_UUID: &str = "files.uuid";
    pub const FILES_LOGICAL_NAME: &str = "files.logical_name";
    pub const FILES_LOCATIONS: &str = "files.locations";
    pub const COLLECTIONS_UUID: &str = "collections.uuid";
    pub const SNAPSHOTS_UUID: &str = "snapshots.uuid";
}

/// Error type for document store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A write violated a uniqueness index. `holder` is the uuid of the
    /// record currently holding the key.
    #[error("duplicate key on index {index}: {value:?} (held by {holder})")]
    DuplicateKey {
        index: String,
        value: String,
        holder: String,
    },
    #[error("document rejected: {0}")]
    InvalidDocument(String),
    #[error("redb error: {0}")]
    Redb(#[from] redb::DatabaseError),
    #[error("redb storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("redb table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("redb transaction error: {0}")]
    Transaction(Box<redb::TransactionError>),
    #[error("redb commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupted store: {0}")]
    Corruption(String),
}

impl From<redb::TransactionError> for StoreError {
    fn from(e: redb::TransactionError) -> Self {
        Self::Transaction(Box::new(e))
    }
}

impl From<StoreError> for CatalogError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey {
                index,
                value,
                holder,
            } => duplicate_key_conflict(&index, value, &holder),
            StoreError::InvalidDocument(msg) => Self::Validation(msg),
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

/// Translate a duplicate key report into the domain conflict it represents.
///
/// A race that slips past an application pre-check surfaces here; callers
/// must see the same conflict shape as the pre-check would have produced.
#[must_use]
pub fn duplicate_key_conflict(index_name: &str, value: String, holder: &str) -> CatalogError {
    match index_name {
        index::FILES_LOGICAL_NAME => CatalogError::LogicalNameTaken(value),
        index::FILES_LOCATIONS => match value.split_once('\0') {
            Some((site, path)) => CatalogError::LocationTaken {
                site: site.to_string(),
                path: path.to_string(),
                owner_uuid: holder.to_string(),
            },
            None => CatalogError::internal(format!("malformed location index key: {value:?}")),
        },
        index::FILES_UUID | index::COLLECTIONS_UUID | index::SNAPSHOTS_UUID => {
            CatalogError::UuidExists(value)
        }
        other => CatalogError::internal(format!("duplicate key on unknown index {other}: {value:?}")),
    }
}

/// The three logical catalog collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    Files,
    Collections,
    Snapshots,
}

impl CollectionKind {
    /// Collection name as used in logs and index names
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Files => "files",
            Self::Collections => "collections",
            Self::Snapshots => "snapshots",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single-document write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Documents matched by the filter
    pub matched: u64,
    /// Documents actually changed; `None` when the backend cannot tell
    pub modified: Option<u64>,
}

/// Document store capability consumed by the catalog.
///
/// Each write is atomic for the one document it touches; no multi-document
/// transaction is offered or assumed. Implementations enforce the unique
/// indexes named in [`index`] and keep them consistent with every write in
/// the same atomic step.
#[async_trait]
pub trait DocStore: Send + Sync {
    /// Insert a document, failing on any uniqueness violation
    async fn insert_unique(&self, kind: CollectionKind, doc: Document) -> StoreResult<()>;

    /// First document matching the filter, in natural order
    async fn find_one(&self, kind: CollectionKind, filter: &Filter)
    -> StoreResult<Option<Document>>;

    /// All documents matching the filter, as a lazy cursor in natural order
    async fn find(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<DocCursor>;

    /// Number of documents matching the filter
    async fn count(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<u64>;

    /// Merge fields into the first matching document
    async fn update_merge(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        partial: Document,
    ) -> StoreResult<WriteOutcome>;

    /// Replace the first matching document wholesale
    async fn replace_one(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        doc: Document,
    ) -> StoreResult<WriteOutcome>;

    /// Delete the first matching document, returning the deleted count
    async fn delete_one(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<u64>;

    /// Atomic set-union of values into an array field of the first matching
    /// document, merging the `stamp` fields in the same write
    async fn add_to_set(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        field: &str,
        values: Vec<Value>,
        stamp: Document,
    ) -> StoreResult<WriteOutcome>;
}
