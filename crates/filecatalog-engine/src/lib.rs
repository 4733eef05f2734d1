//! File catalog business logic.
//!
//! This crate implements the catalog's domain layer on top of the
//! document store:
//! - File record lifecycle (create-or-replica, update, replace, delete)
//! - Replica location bookkeeping with global uniqueness
//! - Collections (saved queries) and frozen snapshots
//! - Metadata validation

pub mod collections;
pub mod files;
pub mod records;
pub mod snapshots;
pub mod validate;

use filecatalog_common::{CatalogConfig, Result};
use filecatalog_store::CatalogDb;
use std::sync::Arc;

// Re-exports
pub use collections::CollectionManager;
pub use files::{CreateOutcome, FileRecordManager};
pub use records::{CollectionRecord, FileRecord, SnapshotRecord};
pub use snapshots::SnapshotEngine;
pub use validate::{MetadataValidator, SchemaValidator};

/// The assembled catalog: one manager per record kind, sharing a database.
#[derive(Clone)]
pub struct Catalog {
    pub files: FileRecordManager,
    pub collections: CollectionManager,
    pub snapshots: SnapshotEngine,
}

impl Catalog {
    /// Open the catalog at the configured path with schema validation.
    pub fn open(config: &CatalogConfig) -> Result<Self> {
        let db = CatalogDb::open(config)?;
        Ok(Self::with_db(db, Arc::new(SchemaValidator)))
    }

    /// Assemble the managers over an already-open database.
    pub fn with_db(db: CatalogDb, validator: Arc<dyn MetadataValidator>) -> Self {
        let files = FileRecordManager::new(db.clone(), validator);
        let collections = CollectionManager::new(db.clone());
        let snapshots = SnapshotEngine::new(db, files.clone());
        Self {
            files,
            collections,
            snapshots,
        }
    }
}
