//! Redb table definitions for the catalog backend.
//!
//! Each logical collection gets a primary table keyed by row id (`rid`, a
//! monotonically increasing counter that defines natural order) plus a
//! `uuid -> rid` lookup table. The `files` collection additionally carries
//! the two uniqueness index tables the catalog invariants depend on.

use redb::TableDefinition;

// Files
// Key: rid, Value: JSON-encoded document
pub const FILES: TableDefinition<u64, &[u8]> = TableDefinition::new("files");
pub const FILES_BY_UUID: TableDefinition<&str, u64> = TableDefinition::new("files_by_uuid");
pub const FILES_BY_LOGICAL_NAME: TableDefinition<&str, u64> =
    TableDefinition::new("files_by_logical_name");
// Key: "site\x00path" (one entry per location held by any file)
pub const FILES_BY_LOCATION: TableDefinition<&str, u64> =
    TableDefinition::new("files_by_location");

// Collections
pub const COLLECTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("collections");
pub const COLLECTIONS_BY_UUID: TableDefinition<&str, u64> =
    TableDefinition::new("collections_by_uuid");

// Snapshots
pub const SNAPSHOTS: TableDefinition<u64, &[u8]> = TableDefinition::new("snapshots");
pub const SNAPSHOTS_BY_UUID: TableDefinition<&str, u64> =
    TableDefinition::new("snapshots_by_uuid");

// Counters
// Key: "next_rid/{collection}", Value: next row id to hand out
pub const COUNTERS: TableDefinition<&str, u64> = TableDefinition::new("counters");
