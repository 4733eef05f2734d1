//! FileCatalog Store - embedded document storage
//!
//! This crate implements schema-open document storage for the catalog on
//! top of redb, with uniqueness indexes enforced transactionally.

pub mod backend;
pub mod catalog;
pub mod document;
pub mod filter;
pub mod projection;
pub mod store;
pub mod tables;

// Re-exports
pub use backend::RedbDocStore;
pub use catalog::{CatalogDb, FILE_DEFAULT_FIELDS, IndexSpec, require_modified};
pub use document::{Document, RID_FIELD};
pub use filter::Filter;
pub use projection::{Keys, Page, Projection, window};
pub use store::{CollectionKind, DocCursor, DocStore, StoreError, StoreResult, WriteOutcome};
