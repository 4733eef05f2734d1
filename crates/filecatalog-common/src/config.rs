//! Configuration types for FileCatalog
//!
//! This module defines configuration structures used across components.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for FileCatalog
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Store configuration
    pub store: StoreConfig,
    /// Query and listing configuration
    pub query: QueryConfig,
}

/// Store configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Data directory holding the catalog database
    pub data_dir: PathBuf,
    /// Database file name within the data directory
    pub db_file: String,
}

impl StoreConfig {
    /// Full path to the catalog database file
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/filecatalog"),
            db_file: "catalog.redb".to_string(),
        }
    }
}

/// Query and listing configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Hard cap on a single file listing window (default: 10000)
    pub file_list_limit: usize,
    /// Hard cap on a single collection or snapshot listing window (default: 1000)
    pub group_list_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            file_list_limit: 10_000,
            group_list_limit: 1_000,
        }
    }
}
