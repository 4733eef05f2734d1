//! Typed views of the stored catalog documents.
//!
//! File records keep a fixed core field set plus an open map for domain
//! metadata, so uniqueness and required-field rules stay type-checked
//! while experiment-specific fields pass through untouched.

use chrono::{SecondsFormat, Utc};
use filecatalog_common::{
    CatalogError, Checksum, CollectionUuid, FileUuid, Location, Result, SnapshotUuid,
};
use filecatalog_store::Document;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields every file ingest must carry
pub const REQUIRED_FILE_FIELDS: &[&str] = &["logical_name", "checksum", "file_size", "locations"];

/// Catalog timestamp: RFC 3339 in UTC with microsecond precision.
/// Plain string comparison orders these correctly.
pub(crate) fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn decode_record<T: DeserializeOwned>(doc: &Document, what: &str) -> Result<T> {
    serde_json::from_value(Value::Object(doc.as_map().clone()))
        .map_err(|err| CatalogError::internal(format!("stored {what} record is malformed: {err}")))
}

pub(crate) fn encode_record<T: Serialize>(record: &T, what: &str) -> Result<Document> {
    let value = serde_json::to_value(record)
        .map_err(|err| CatalogError::internal(format!("cannot encode {what} record: {err}")))?;
    Document::from_value(value)
        .ok_or_else(|| CatalogError::internal(format!("{what} record did not encode as an object")))
}

/// A catalogued file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<FileUuid>,
    pub logical_name: String,
    pub checksum: Checksum,
    pub locations: Vec<Location>,
    pub file_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_modify_date: Option<String>,
    /// Domain metadata carried through unmodified
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FileRecord {
    /// Parse client-supplied metadata. Required fields are checked up
    /// front so the error names the first missing one.
    pub fn from_input(doc: &Document) -> Result<Self> {
        for field in REQUIRED_FILE_FIELDS {
            if !doc.contains_key(field) {
                return Err(CatalogError::missing_field(*field));
            }
        }
        serde_json::from_value(Value::Object(doc.as_map().clone()))
            .map_err(|err| CatalogError::validation(format!("malformed file metadata: {err}")))
    }

    /// Decode a stored document. Failure here means the store holds a
    /// record this version cannot read.
    pub fn from_document(doc: &Document) -> Result<Self> {
        decode_record(doc, "file")
    }

    pub fn to_document(&self) -> Result<Document> {
        encode_record(self, "file")
    }
}

/// A named, saved query over file records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRecord {
    pub uuid: CollectionUuid,
    pub collection_name: String,
    pub owner: String,
    /// Serialized filter captured at creation time
    pub query: String,
    pub creation_date: String,
    pub meta_modify_date: String,
}

impl CollectionRecord {
    pub fn from_document(doc: &Document) -> Result<Self> {
        decode_record(doc, "collection")
    }

    pub fn to_document(&self) -> Result<Document> {
        encode_record(self, "collection")
    }
}

/// An immutable list of file uuids frozen from a collection's query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub uuid: SnapshotUuid,
    pub collection_id: CollectionUuid,
    pub owner: String,
    pub files: Vec<FileUuid>,
    pub creation_date: String,
}

impl SnapshotRecord {
    pub fn from_document(doc: &Document) -> Result<Self> {
        decode_record(doc, "snapshot")
    }

    pub fn to_document(&self) -> Result<Document> {
        encode_record(self, "snapshot")
    }
}
