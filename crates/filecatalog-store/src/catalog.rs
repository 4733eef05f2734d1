//! Typed catalog surface over the document store.
//!
//! `CatalogDb` narrows the generic [`DocStore`] to the three catalog
//! collections, applies projections and listing windows, and translates
//! store failures into catalog errors so a duplicate key race surfaces
//! with the same shape as the engine's own pre-checks.

use crate::backend::RedbDocStore;
use crate::document::Document;
use crate::filter::Filter;
use crate::projection::{Keys, Page, Projection, window};
use crate::store::{CollectionKind, DocStore, WriteOutcome};
use filecatalog_common::{CatalogConfig, CatalogError, QueryConfig, Result};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Fields returned by file listings when the caller asks for nothing else
pub const FILE_DEFAULT_FIELDS: &[&str] = &["uuid", "logical_name"];

/// Index declaration, for provisioning backends that manage indexes out
/// of band. The embedded backend enforces the unique ones itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub collection: CollectionKind,
    pub field: &'static str,
    pub unique: bool,
    pub sparse: bool,
}

/// Handle to the catalog collections
#[derive(Clone)]
pub struct CatalogDb {
    store: Arc<dyn DocStore>,
    query: QueryConfig,
}

impl CatalogDb {
    /// Open the embedded store described by the configuration.
    pub fn open(config: &CatalogConfig) -> Result<Self> {
        let path = config.store.db_path();
        let store = RedbDocStore::open(&path)?;
        info!("catalog database ready at {}", path.display());
        Ok(Self {
            store: Arc::new(store),
            query: config.query.clone(),
        })
    }

    /// Wrap an already constructed store, for tests and embedding.
    pub fn with_store(store: Arc<dyn DocStore>, query: QueryConfig) -> Self {
        Self { store, query }
    }

    #[must_use]
    pub const fn query_config(&self) -> &QueryConfig {
        &self.query
    }

    pub async fn create_file(&self, doc: Document) -> Result<()> {
        Ok(self.store.insert_unique(CollectionKind::Files, doc).await?)
    }

    pub async fn get_file(&self, filter: &Filter, keys: Option<Keys>) -> Result<Option<Document>> {
        let projection = Projection::build(keys, None);
        let found = self.store.find_one(CollectionKind::Files, filter).await?;
        Ok(found.map(|doc| projection.apply(&doc)))
    }

    pub async fn find_files(
        &self,
        filter: &Filter,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        let projection = Projection::build(keys, Some(FILE_DEFAULT_FIELDS));
        let page = page.clamped(self.query.file_list_limit);
        let cursor = self.store.find(CollectionKind::Files, filter).await?;
        let docs = window(cursor, page).await?;
        Ok(docs.iter().map(|doc| projection.apply(doc)).collect())
    }

    pub async fn count_files(&self, filter: &Filter) -> Result<u64> {
        Ok(self.store.count(CollectionKind::Files, filter).await?)
    }

    /// Every file uuid matching the filter, in natural order. Snapshot
    /// capture must see the whole result, so this read is not windowed.
    pub async fn collect_file_uuids(&self, filter: &Filter) -> Result<Vec<String>> {
        let mut cursor = self.store.find(CollectionKind::Files, filter).await?;
        let mut uuids = Vec::new();
        while let Some(doc) = cursor.next().await {
            if let Some(uuid) = doc?.get_str("uuid") {
                uuids.push(uuid.to_string());
            }
        }
        Ok(uuids)
    }

    pub async fn update_file(&self, filter: &Filter, partial: Document) -> Result<WriteOutcome> {
        Ok(self
            .store
            .update_merge(CollectionKind::Files, filter, partial)
            .await?)
    }

    pub async fn replace_file(&self, filter: &Filter, doc: Document) -> Result<WriteOutcome> {
        Ok(self
            .store
            .replace_one(CollectionKind::Files, filter, doc)
            .await?)
    }

    pub async fn delete_file(&self, filter: &Filter) -> Result<u64> {
        Ok(self.store.delete_one(CollectionKind::Files, filter).await?)
    }

    /// Append locations the record does not already hold, in one write
    /// together with the modification stamp.
    pub async fn append_distinct_locations(
        &self,
        filter: &Filter,
        values: Vec<Value>,
        stamp: Document,
    ) -> Result<WriteOutcome> {
        Ok(self
            .store
            .add_to_set(CollectionKind::Files, filter, "locations", values, stamp)
            .await?)
    }

    pub async fn create_collection(&self, doc: Document) -> Result<()> {
        Ok(self
            .store
            .insert_unique(CollectionKind::Collections, doc)
            .await?)
    }

    pub async fn get_collection(&self, filter: &Filter) -> Result<Option<Document>> {
        let found = self
            .store
            .find_one(CollectionKind::Collections, filter)
            .await?;
        Ok(found.map(|doc| Projection::all().apply(&doc)))
    }

    pub async fn find_collections(
        &self,
        filter: &Filter,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        let projection = Projection::build(keys, None);
        let page = page.clamped(self.query.group_list_limit);
        let cursor = self
            .store
            .find(CollectionKind::Collections, filter)
            .await?;
        let docs = window(cursor, page).await?;
        Ok(docs.iter().map(|doc| projection.apply(doc)).collect())
    }

    pub async fn create_snapshot(&self, doc: Document) -> Result<()> {
        Ok(self
            .store
            .insert_unique(CollectionKind::Snapshots, doc)
            .await?)
    }

    pub async fn get_snapshot(
        &self,
        filter: &Filter,
        keys: Option<Keys>,
    ) -> Result<Option<Document>> {
        let projection = Projection::build(keys, None);
        let found = self
            .store
            .find_one(CollectionKind::Snapshots, filter)
            .await?;
        Ok(found.map(|doc| projection.apply(&doc)))
    }

    pub async fn find_snapshots(
        &self,
        filter: &Filter,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        let projection = Projection::build(keys, None);
        let page = page.clamped(self.query.group_list_limit);
        let cursor = self.store.find(CollectionKind::Snapshots, filter).await?;
        let docs = window(cursor, page).await?;
        Ok(docs.iter().map(|doc| projection.apply(doc)).collect())
    }

    /// Indexes the catalog relies on. Location uniqueness covers the
    /// `(site, path)` pair of each element.
    #[must_use]
    pub fn declared_indexes() -> Vec<IndexSpec> {
        use CollectionKind::{Collections, Files, Snapshots};
        let spec = |collection, field, unique, sparse| IndexSpec {
            collection,
            field,
            unique,
            sparse,
        };
        vec![
            spec(Files, "uuid", true, false),
            spec(Files, "logical_name", true, false),
            spec(Files, "locations", true, false),
            spec(Files, "create_date", false, false),
            spec(Files, "content_status", false, false),
            spec(Files, "processing_level", false, true),
            spec(Files, "data_type", false, true),
            spec(Files, "run_number", false, true),
            spec(Files, "start_datetime", false, true),
            spec(Files, "end_datetime", false, true),
            spec(Files, "offline_processing_metadata.first_event", false, true),
            spec(Files, "offline_processing_metadata.last_event", false, true),
            spec(Files, "offline_processing_metadata.season", false, true),
            spec(Files, "iceprod.dataset", false, true),
            spec(Collections, "uuid", true, false),
            spec(Collections, "collection_name", false, false),
            spec(Collections, "owner", false, false),
            spec(Snapshots, "uuid", true, false),
            spec(Snapshots, "collection_id", false, false),
            spec(Snapshots, "owner", false, false),
        ]
    }
}

/// Enforce that a write the caller believes matched actually changed the
/// record. Backends that cannot report a modified count get a warning and
/// the benefit of the doubt.
pub fn require_modified(op: &str, outcome: &WriteOutcome) -> Result<()> {
    match outcome.modified {
        None => {
            warn!("{op}: backend reported no modified count, assuming success");
            Ok(())
        }
        Some(0) => Err(CatalogError::internal(format!("{op} modified no records"))),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::RID_FIELD;
    use serde_json::json;
    use tempfile::TempDir;

    fn catalog() -> (CatalogDb, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RedbDocStore::open(dir.path().join("catalog.redb")).unwrap();
        let db = CatalogDb::with_store(Arc::new(store), QueryConfig::default());
        (db, dir)
    }

    fn file_doc(uuid: &str, name: &str, path: &str) -> Document {
        Document::from_value(json!({
            "uuid": uuid,
            "logical_name": name,
            "checksum": {"sha512": "ab"},
            "file_size": 1,
            "locations": [{"site": "WIPAC", "path": path}],
            "content_status": "good"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_files_default_projection() {
        let (db, _dir) = catalog();
        db.create_file(file_doc("u1", "/a", "/p1")).await.unwrap();
        let docs = db
            .find_files(&Filter::Empty, None, Page::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("uuid"), Some("u1"));
        assert_eq!(docs[0].get_str("logical_name"), Some("/a"));
        assert!(!docs[0].contains_key("content_status"));
        assert!(!docs[0].contains_key(RID_FIELD));
    }

    #[tokio::test]
    async fn test_find_files_dotted_keys_narrow_locations() {
        let (db, _dir) = catalog();
        db.create_file(file_doc("u1", "/a", "/p1")).await.unwrap();
        let docs = db
            .find_files(
                &Filter::Empty,
                Some(Keys::fields(["uuid", "locations.site"])),
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("uuid"), Some("u1"));
        assert_eq!(docs[0].get("locations"), Some(&json!([{"site": "WIPAC"}])));
    }

    #[tokio::test]
    async fn test_get_file_full_record_without_rid() {
        let (db, _dir) = catalog();
        db.create_file(file_doc("u1", "/a", "/p1")).await.unwrap();
        let doc = db
            .get_file(&Filter::eq("uuid", "u1"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.get_str("content_status"), Some("good"));
        assert!(!doc.contains_key(RID_FIELD));
    }

    #[tokio::test]
    async fn test_find_files_window_is_clamped() {
        let dir = TempDir::new().unwrap();
        let store = RedbDocStore::open(dir.path().join("catalog.redb")).unwrap();
        let query = QueryConfig {
            file_list_limit: 2,
            group_list_limit: 2,
        };
        let db = CatalogDb::with_store(Arc::new(store), query);
        for i in 0..4 {
            db.create_file(file_doc(
                &format!("u{i}"),
                &format!("/f{i}"),
                &format!("/p{i}"),
            ))
            .await
            .unwrap();
        }
        let docs = db
            .find_files(&Filter::Empty, None, Page::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        let docs = db
            .find_files(&Filter::Empty, None, Page::new(None, 3))
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("uuid"), Some("u3"));
    }

    #[tokio::test]
    async fn test_duplicate_create_surfaces_conflict() {
        let (db, _dir) = catalog();
        db.create_file(file_doc("u1", "/a", "/p1")).await.unwrap();
        let err = db
            .create_file(file_doc("u2", "/a", "/p2"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::LogicalNameTaken(name) if name == "/a"));
    }

    #[tokio::test]
    async fn test_collection_listing_keeps_all_fields() {
        let (db, _dir) = catalog();
        db.create_collection(
            Document::from_value(json!({
                "uuid": "c1",
                "collection_name": "north",
                "owner": "icecube",
                "query": "{\"Empty\":null}"
            }))
            .unwrap(),
        )
        .await
        .unwrap();
        let docs = db
            .find_collections(&Filter::Empty, None, Page::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get_str("owner"), Some("icecube"));
        assert!(!docs[0].contains_key(RID_FIELD));
    }

    #[test]
    fn test_require_modified() {
        assert!(
            require_modified(
                "update",
                &WriteOutcome {
                    matched: 1,
                    modified: Some(1)
                }
            )
            .is_ok()
        );
        assert!(
            require_modified(
                "update",
                &WriteOutcome {
                    matched: 1,
                    modified: None
                }
            )
            .is_ok()
        );
        let err = require_modified(
            "update",
            &WriteOutcome {
                matched: 1,
                modified: Some(0),
            },
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::Internal(_)));
    }

    #[test]
    fn test_declared_indexes_cover_uniqueness() {
        let indexes = CatalogDb::declared_indexes();
        for (collection, field) in [
            (CollectionKind::Files, "uuid"),
            (CollectionKind::Files, "logical_name"),
            (CollectionKind::Files, "locations"),
            (CollectionKind::Collections, "uuid"),
            (CollectionKind::Snapshots, "uuid"),
        ] {
            assert!(
                indexes
                    .iter()
                    .any(|i| i.collection == collection && i.field == field && i.unique)
            );
        }
    }
}
