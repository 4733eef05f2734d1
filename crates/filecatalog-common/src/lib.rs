//! FileCatalog Common - Shared types and utilities
//!
//! This crate provides common types, error definitions, and configuration
//! used across all catalog components.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CatalogConfig, QueryConfig, StoreConfig};
pub use error::{CatalogError, Result};
pub use types::*;
