//! Named, reusable query definitions over file records.
//!
//! A collection stores its filter in serialized form; the filter is
//! validated at creation and re-parsed whenever the collection is resolved
//! into live membership.

use crate::files::FileRecordManager;
use crate::records::{CollectionRecord, now_stamp};
use filecatalog_common::{CatalogError, CollectionUuid, Result};
use filecatalog_store::{CatalogDb, Document, Filter, Keys, Page};
use tracing::info;

/// Owns collection creation and lookup
#[derive(Clone)]
pub struct CollectionManager {
    db: CatalogDb,
}

impl CollectionManager {
    pub const fn new(db: CatalogDb) -> Self {
        Self { db }
    }

    /// Create a collection from an already well-formed filter.
    pub async fn create(
        &self,
        uuid: Option<CollectionUuid>,
        name: &str,
        owner: &str,
        query: &Filter,
    ) -> Result<CollectionUuid> {
        if name.is_empty() {
            return Err(CatalogError::missing_field("collection_name"));
        }
        if owner.is_empty() {
            return Err(CatalogError::missing_field("owner"));
        }
        let uuid = uuid.unwrap_or_else(CollectionUuid::new);
        if self
            .db
            .get_collection(&Filter::eq("uuid", uuid.to_string()))
            .await?
            .is_some()
        {
            return Err(CatalogError::UuidExists(uuid.to_string()));
        }

        let stamp = now_stamp();
        let record = CollectionRecord {
            uuid,
            collection_name: name.to_string(),
            owner: owner.to_string(),
            query: query
                .to_json()
                .map_err(|err| CatalogError::internal(format!("cannot encode filter: {err}")))?,
            creation_date: stamp.clone(),
            meta_modify_date: stamp,
        };
        self.db.create_collection(record.to_document()?).await?;
        info!("created collection {uuid} ({name})");
        Ok(uuid)
    }

    /// Resolve by uuid first, then by `collection_name`.
    pub async fn get(&self, id_or_name: &str) -> Result<CollectionRecord> {
        resolve_collection(&self.db, id_or_name).await
    }

    pub async fn find(
        &self,
        filter: &Filter,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        self.db.find_collections(filter, keys, page).await
    }

    /// Files currently matching the collection's stored query
    pub async fn files_of(
        &self,
        id_or_name: &str,
        files: &FileRecordManager,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        let collection = self.get(id_or_name).await?;
        let filter = stored_query(&collection)?;
        files.find(&filter, keys, page).await
    }

    /// Snapshots taken of this collection
    pub async fn snapshots_of(
        &self,
        id_or_name: &str,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        let collection = self.get(id_or_name).await?;
        self.db
            .find_snapshots(
                &Filter::eq("collection_id", collection.uuid.to_string()),
                keys,
                page,
            )
            .await
    }
}

/// Shared id-then-name resolution. The raw text is tried as a uuid value
/// first, so a name that happens to look like a uuid cannot shadow one.
pub(crate) async fn resolve_collection(
    db: &CatalogDb,
    id_or_name: &str,
) -> Result<CollectionRecord> {
    if let Some(doc) = db.get_collection(&Filter::eq("uuid", id_or_name)).await? {
        return CollectionRecord::from_document(&doc);
    }
    if let Some(doc) = db
        .get_collection(&Filter::eq("collection_name", id_or_name))
        .await?
    {
        return CollectionRecord::from_document(&doc);
    }
    Err(CatalogError::CollectionNotFound(id_or_name.to_string()))
}

/// Parse the filter a collection was created with.
pub(crate) fn stored_query(collection: &CollectionRecord) -> Result<Filter> {
    Filter::from_json(&collection.query).map_err(|err| {
        CatalogError::internal(format!(
            "collection {} holds an unreadable query: {err}",
            collection.uuid
        ))
    })
}
