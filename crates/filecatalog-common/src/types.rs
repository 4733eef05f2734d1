//! Core type definitions for FileCatalog
//!
//! This module defines the fundamental types used throughout the catalog:
//! identifiers, replica locations, logical names, and content checksums.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a file record
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileUuid(Uuid);

impl FileUuid {
    /// Generate a new random file uuid
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from the canonical hyphenated string form
    pub fn parse(text: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(text).map(Self)
    }
}

impl Default for FileUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileUuid({})", self.0)
    }
}

impl fmt::Display for FileUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a collection
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionUuid(Uuid);

impl CollectionUuid {
    /// Generate a new random collection uuid
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from the canonical hyphenated string form
    pub fn parse(text: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(text).map(Self)
    }
}

impl Default for CollectionUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CollectionUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionUuid({})", self.0)
    }
}

impl fmt::Display for CollectionUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a snapshot
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotUuid(Uuid);

impl SnapshotUuid {
    /// Generate a new random snapshot uuid
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parse from the canonical hyphenated string form
    pub fn parse(text: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(text).map(Self)
    }
}

impl Default for SnapshotUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SnapshotUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotUuid({})", self.0)
    }
}

impl fmt::Display for SnapshotUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validated logical file name
///
/// The stable external name of a file, unique across the whole catalog.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct LogicalName(String);

impl LogicalName {
    /// Maximum accepted length in bytes
    pub const MAX_LEN: usize = 4096;

    /// Create a new logical name (validates shape)
    pub fn new(name: impl Into<String>) -> Result<Self, LogicalNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the logical name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validate a logical name
    fn validate(name: &str) -> Result<(), LogicalNameError> {
        if name.is_empty() {
            return Err(LogicalNameError::Empty);
        }
        if name.len() > Self::MAX_LEN {
            return Err(LogicalNameError::TooLong(name.len()));
        }
        if name.contains('\0') {
            return Err(LogicalNameError::ContainsNul);
        }
        Ok(())
    }
}

impl fmt::Debug for LogicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicalName({:?})", self.0)
    }
}

/// Errors that can occur when creating a logical name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogicalNameError {
    #[error("logical_name must not be empty")]
    Empty,
    #[error("logical_name too long: {0} bytes (maximum {max})", max = LogicalName::MAX_LEN)]
    TooLong(usize),
    #[error("logical_name must not contain NUL bytes")]
    ContainsNul,
}

/// A physical replica location: a site plus a path at that site
///
/// Two locations denote the same place when site and path match; `archive`
/// is a descriptive flag and does not participate in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub site: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<bool>,
}

impl Location {
    /// Create a new location (validates shape)
    pub fn new(
        site: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Self, LocationError> {
        let location = Self {
            site: site.into(),
            path: path.into(),
            archive: None,
        };
        location.validate()?;
        Ok(location)
    }

    /// Set the archive flag
    #[must_use]
    pub const fn with_archive(mut self, archive: bool) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Validate site and path shape
    pub fn validate(&self) -> Result<(), LocationError> {
        if self.site.is_empty() {
            return Err(LocationError::EmptySite);
        }
        if self.path.is_empty() {
            return Err(LocationError::EmptyPath);
        }
        if self.site.contains('\0') || self.path.contains('\0') {
            return Err(LocationError::ContainsNul);
        }
        Ok(())
    }

    /// Whether two locations denote the same place (site and path equal)
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.site == other.site && self.path == other.path
    }

    /// Catalog-wide uniqueness key for this location
    ///
    /// Key: `{site}\x00{path}`. NUL is rejected by validation, so the
    /// separator cannot collide with either component.
    #[must_use]
    pub fn unique_key(&self) -> String {
        format!("{}\x00{}", self.site, self.path)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.site, self.path)
    }
}

/// Errors that can occur when creating a location
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("location site must not be empty")]
    EmptySite,
    #[error("location path must not be empty")]
    EmptyPath,
    #[error("location site and path must not contain NUL bytes")]
    ContainsNul,
}

/// Content digests keyed by algorithm name
///
/// Compared as a whole map: two records describe the same content only when
/// every recorded digest matches. A `sha512` digest is required for file
/// creation; further algorithms are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(BTreeMap<String, String>);

impl Checksum {
    /// Hex digest length of a sha512 checksum
    pub const SHA512_HEX_LEN: usize = 128;

    /// Create an empty checksum map
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Create a checksum map holding a single sha512 digest
    #[must_use]
    pub fn with_sha512(digest: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("sha512".to_string(), digest.into());
        Self(map)
    }

    /// Record a digest for an algorithm
    pub fn insert(&mut self, algorithm: impl Into<String>, digest: impl Into<String>) {
        self.0.insert(algorithm.into(), digest.into());
    }

    /// Get the digest recorded for an algorithm
    #[must_use]
    pub fn get(&self, algorithm: &str) -> Option<&str> {
        self.0.get(algorithm).map(String::as_str)
    }

    /// Get the sha512 digest, if recorded
    #[must_use]
    pub fn sha512(&self) -> Option<&str> {
        self.get("sha512")
    }

    /// Whether no digest is recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Validate that a sha512 digest is present and well-formed hex
    pub fn validate(&self) -> Result<(), ChecksumError> {
        let Some(digest) = self.sha512() else {
            return Err(ChecksumError::MissingSha512);
        };
        if digest.len() != Self::SHA512_HEX_LEN || hex::decode(digest).is_err() {
            return Err(ChecksumError::InvalidDigest {
                algorithm: "sha512".to_string(),
            });
        }
        Ok(())
    }
}

/// Errors that can occur when validating a checksum map
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChecksumError {
    #[error("checksum must contain a sha512 digest")]
    MissingSha512,
    #[error("checksum digest for {algorithm} is not a valid hex digest")]
    InvalidDigest { algorithm: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_uuid_roundtrip() {
        let id = FileUuid::new();
        let parsed = FileUuid::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert_eq!(format!("{id:?}"), format!("FileUuid({})", id.as_uuid()));
    }

    #[test]
    fn test_file_uuid_parse_rejects_garbage() {
        assert!(FileUuid::parse("not-a-uuid").is_err());
    }

    #[test]
    fn test_logical_name_validation() {
        assert!(LogicalName::new("/data/exp/run1/file.dat").is_ok());
        assert_eq!(LogicalName::new(""), Err(LogicalNameError::Empty));
        assert_eq!(
            LogicalName::new("bad\0name"),
            Err(LogicalNameError::ContainsNul)
        );
        let long = "x".repeat(LogicalName::MAX_LEN + 1);
        assert!(matches!(
            LogicalName::new(long),
            Err(LogicalNameError::TooLong(_))
        ));
    }

    #[test]
    fn test_location_identity_ignores_archive() {
        let a = Location::new("WIPAC", "/data/file.dat").unwrap();
        let b = Location::new("WIPAC", "/data/file.dat")
            .unwrap()
            .with_archive(true);
        assert!(a.matches(&b));
        assert_ne!(a, b);
        assert_eq!(a.unique_key(), b.unique_key());
    }

    #[test]
    fn test_location_validation() {
        assert_eq!(
            Location::new("", "/data/file.dat"),
            Err(LocationError::EmptySite)
        );
        assert_eq!(Location::new("WIPAC", ""), Err(LocationError::EmptyPath));
        assert_eq!(
            Location::new("WI\0PAC", "/data"),
            Err(LocationError::ContainsNul)
        );
    }

    #[test]
    fn test_location_unique_key_separates_components() {
        let a = Location::new("site", "a/b").unwrap();
        let b = Location::new("site-a", "/b").unwrap();
        assert_ne!(a.unique_key(), b.unique_key());
    }

    #[test]
    fn test_checksum_validation() {
        let good = Checksum::with_sha512("ab".repeat(64));
        assert!(good.validate().is_ok());

        let missing = Checksum::new();
        assert_eq!(missing.validate(), Err(ChecksumError::MissingSha512));

        let short = Checksum::with_sha512("abcd");
        assert!(matches!(
            short.validate(),
            Err(ChecksumError::InvalidDigest { .. })
        ));

        let nonhex = Checksum::with_sha512("zz".repeat(64));
        assert!(matches!(
            nonhex.validate(),
            Err(ChecksumError::InvalidDigest { .. })
        ));
    }

    #[test]
    fn test_checksum_whole_map_equality() {
        let mut a = Checksum::with_sha512("ab".repeat(64));
        let b = Checksum::with_sha512("ab".repeat(64));
        assert_eq!(a, b);
        a.insert("md5", "d41d8cd98f00b204e9800998ecf8427e");
        assert_ne!(a, b);
    }

    #[test]
    fn test_location_serde_skips_absent_archive() {
        let location = Location::new("WIPAC", "/data/file.dat").unwrap();
        let json = serde_json::to_value(&location).unwrap();
        assert!(json.get("archive").is_none());
    }
}
