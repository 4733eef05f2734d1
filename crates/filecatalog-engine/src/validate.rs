//! Pluggable validation of file metadata.
//!
//! The engine invokes the validator on the would-be stored record: the
//! full incoming document for create and replace, the merged view for
//! partial updates, since completeness is only checkable post-merge.

use crate::records::FileRecord;
use async_trait::async_trait;
use filecatalog_common::{CatalogError, LogicalName, Result};

/// Field-level validation hook, invoked before any write
#[async_trait]
pub trait MetadataValidator: Send + Sync {
    async fn validate(&self, record: &FileRecord) -> Result<()>;
}

/// Built-in structural rules every deployment needs
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

#[async_trait]
impl MetadataValidator for SchemaValidator {
    async fn validate(&self, record: &FileRecord) -> Result<()> {
        LogicalName::new(record.logical_name.as_str())?;
        record.checksum.validate()?;
        if record.locations.is_empty() {
            return Err(CatalogError::validation("locations must not be empty"));
        }
        for location in &record.locations {
            location.validate()?;
        }
        if let Some(date) = &record.create_date {
            check_rfc3339("create_date", date)?;
        }
        if let Some(date) = &record.meta_modify_date {
            check_rfc3339("meta_modify_date", date)?;
        }
        Ok(())
    }
}

fn check_rfc3339(field: &str, value: &str) -> Result<()> {
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|_| ())
        .map_err(|_| CatalogError::validation(format!("{field} is not an RFC 3339 timestamp")))
}
