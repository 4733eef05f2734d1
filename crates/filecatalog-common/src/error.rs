//! Error types for FileCatalog
//!
//! This module defines the common error type used throughout the catalog.

use crate::types::{ChecksumError, LocationError, LogicalNameError};
use thiserror::Error;

/// Common result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Common error type for FileCatalog
#[derive(Debug, Error)]
pub enum CatalogError {
    // Not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    // Conflicts
    #[error("uuid already exists with a different checksum: {uuid}")]
    ChecksumConflict { uuid: String },

    #[error("replica already registered on file {uuid}: {site}:{path}")]
    ReplicaExists {
        uuid: String,
        site: String,
        path: String,
    },

    #[error("location already registered to file {owner_uuid}: {site}:{path}")]
    LocationTaken {
        site: String,
        path: String,
        owner_uuid: String,
    },

    #[error("logical_name already in the catalog: {0}")]
    LogicalNameTaken(String),

    #[error("uuid already exists: {0}")]
    UuidExists(String),

    // Invalid input
    #[error("not a valid uuid: {0}")]
    InvalidUuid(String),

    #[error("invalid location: {0}")]
    InvalidLocation(#[from] LocationError),

    #[error("invalid logical_name: {0}")]
    InvalidLogicalName(#[from] LogicalNameError),

    #[error("invalid checksum: {0}")]
    InvalidChecksum(#[from] ChecksumError),

    #[error("invalid query filter: {0}")]
    InvalidFilter(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("field is immutable: {0}")]
    ImmutableField(String),

    #[error("validation failed: {0}")]
    Validation(String),

    // Store errors
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    // Internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl CatalogError {
    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid filter error
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Self::InvalidFilter(msg.into())
    }

    /// Create a missing field error
    pub fn missing_field(name: impl Into<String>) -> Self {
        Self::MissingField(name.into())
    }

    /// Create a store unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::CollectionNotFound(_) | Self::SnapshotNotFound(_)
        )
    }

    /// Check if this is a uniqueness conflict
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ChecksumConflict { .. }
                | Self::ReplicaExists { .. }
                | Self::LocationTaken { .. }
                | Self::LogicalNameTaken(_)
                | Self::UuidExists(_)
        )
    }

    /// Check if this is a caller input error
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidUuid(_)
                | Self::InvalidLocation(_)
                | Self::InvalidLogicalName(_)
                | Self::InvalidChecksum(_)
                | Self::InvalidFilter(_)
                | Self::MissingField(_)
                | Self::ImmutableField(_)
                | Self::Validation(_)
        )
    }

    /// Get HTTP status code for API layers built on top of the catalog
    #[must_use]
    pub fn http_status_code(&self) -> u16 {
        match self {
            // 400 Bad Request
            Self::InvalidUuid(_)
            | Self::InvalidLocation(_)
            | Self::InvalidLogicalName(_)
            | Self::InvalidChecksum(_)
            | Self::InvalidFilter(_)
            | Self::MissingField(_)
            | Self::ImmutableField(_)
            | Self::Validation(_) => 400,

            // 404 Not Found
            Self::FileNotFound(_) | Self::CollectionNotFound(_) | Self::SnapshotNotFound(_) => 404,

            // 409 Conflict
            Self::ChecksumConflict { .. }
            | Self::ReplicaExists { .. }
            | Self::LocationTaken { .. }
            | Self::LogicalNameTaken(_)
            | Self::UuidExists(_) => 409,

            // 500 Internal Server Error
            Self::Internal(_) => 500,

            // 503 Service Unavailable
            Self::StoreUnavailable(_) => 503,
        }
    }
}
