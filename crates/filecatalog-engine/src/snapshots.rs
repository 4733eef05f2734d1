//! Snapshot engine: freezes a collection's membership at a point in time.
//!
//! Capture re-issues the collection's stored query against the file
//! manager and stores the resulting uuid list verbatim. The list is never
//! recomputed; later file mutations cannot change an existing snapshot.

use crate::collections::{resolve_collection, stored_query};
use crate::files::FileRecordManager;
use crate::records::{SnapshotRecord, now_stamp};
use filecatalog_common::{CatalogError, Result, SnapshotUuid};
use filecatalog_store::{CatalogDb, Document, Filter, Keys, Page};
use serde_json::Value;
use tracing::info;

/// Materializes and serves frozen collection memberships
#[derive(Clone)]
pub struct SnapshotEngine {
    db: CatalogDb,
    files: FileRecordManager,
}

impl SnapshotEngine {
    pub const fn new(db: CatalogDb, files: FileRecordManager) -> Self {
        Self { db, files }
    }

    /// Freeze the collection's current query result into a new snapshot.
    ///
    /// Membership is a best-effort point-in-time read; concurrent file
    /// mutations during capture may or may not be reflected.
    pub async fn create(
        &self,
        collection_id_or_name: &str,
        uuid: Option<SnapshotUuid>,
        owner: Option<&str>,
    ) -> Result<SnapshotUuid> {
        let collection = resolve_collection(&self.db, collection_id_or_name).await?;
        let filter = stored_query(&collection)?;
        let members = self.files.collect_uuids(&filter).await?;

        let uuid = uuid.unwrap_or_else(SnapshotUuid::new);
        if self
            .db
            .get_snapshot(&Filter::eq("uuid", uuid.to_string()), None)
            .await?
            .is_some()
        {
            return Err(CatalogError::UuidExists(uuid.to_string()));
        }

        let record = SnapshotRecord {
            uuid,
            collection_id: collection.uuid,
            owner: owner.map_or_else(|| collection.owner.clone(), ToString::to_string),
            files: members,
            creation_date: now_stamp(),
        };
        self.db.create_snapshot(record.to_document()?).await?;
        info!(
            "created snapshot {uuid} of collection {} ({} files)",
            collection.uuid,
            record.files.len()
        );
        Ok(uuid)
    }

    pub async fn get(&self, uuid: SnapshotUuid) -> Result<SnapshotRecord> {
        let doc = self.get_document(uuid, None).await?;
        SnapshotRecord::from_document(&doc)
    }

    /// Raw document by uuid, optionally narrowed to selected fields
    pub async fn get_document(&self, uuid: SnapshotUuid, keys: Option<Keys>) -> Result<Document> {
        self.db
            .get_snapshot(&Filter::eq("uuid", uuid.to_string()), keys)
            .await?
            .ok_or_else(|| CatalogError::SnapshotNotFound(uuid.to_string()))
    }

    pub async fn find(
        &self,
        filter: &Filter,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        self.db.find_snapshots(filter, keys, page).await
    }

    /// Read-time join: the frozen membership as live file documents.
    /// Files deleted since capture simply no longer appear.
    pub async fn files_of(
        &self,
        uuid: SnapshotUuid,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        let snapshot = self.get(uuid).await?;
        let members: Vec<Value> = snapshot
            .files
            .iter()
            .map(|member| Value::String(member.to_string()))
            .collect();
        self.files
            .find(&Filter::is_in("uuid", members), keys, page)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::CollectionManager;
    use crate::validate::SchemaValidator;
    use filecatalog_common::{FileUuid, QueryConfig};
    use filecatalog_store::RedbDocStore;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        files: FileRecordManager,
        collections: CollectionManager,
        snapshots: SnapshotEngine,
        _dir: TempDir,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = RedbDocStore::open(dir.path().join("catalog.redb")).unwrap();
        let db = CatalogDb::with_store(Arc::new(store), QueryConfig::default());
        let files = FileRecordManager::new(db.clone(), Arc::new(SchemaValidator));
        Fixture {
            collections: CollectionManager::new(db.clone()),
            snapshots: SnapshotEngine::new(db, files.clone()),
            files,
            _dir: dir,
        }
    }

    fn metadata(name: &str, level: &str) -> Document {
        Document::from_value(json!({
            "logical_name": name,
            "checksum": {"sha512": "ab".repeat(64)},
            "file_size": 1024,
            "locations": [{"site": "WIPAC", "path": name}],
            "processing_level": level
        }))
        .unwrap()
    }

    async fn l2_collection(fx: &Fixture) -> String {
        fx.collections
            .create(None, "l2-only", "icecube", &Filter::eq("processing_level", "L2"))
            .await
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_snapshot_freezes_membership() {
        let fx = fixture();
        let a = fx.files.create(metadata("/a", "L2")).await.unwrap().uuid();
        let b = fx.files.create(metadata("/b", "L2")).await.unwrap().uuid();
        fx.files.create(metadata("/x", "L3")).await.unwrap();
        let collection = l2_collection(&fx).await;

        let frozen = fx.snapshots.create(&collection, None, None).await.unwrap();

        // mutate the world: drop b, add c which also matches
        fx.files.delete(b).await.unwrap();
        fx.files.create(metadata("/c", "L2")).await.unwrap();

        let snapshot = fx.snapshots.get(frozen).await.unwrap();
        assert_eq!(snapshot.files, vec![a, b]);

        // a fresh capture sees the new state
        let second = fx.snapshots.create(&collection, None, None).await.unwrap();
        let snapshot = fx.snapshots.get(second).await.unwrap();
        assert_eq!(snapshot.files.len(), 2);
        assert!(snapshot.files.contains(&a));
        assert!(!snapshot.files.contains(&b));
    }

    #[tokio::test]
    async fn test_snapshot_owner_defaulting() {
        let fx = fixture();
        let collection = l2_collection(&fx).await;

        let inherited = fx.snapshots.create(&collection, None, None).await.unwrap();
        assert_eq!(fx.snapshots.get(inherited).await.unwrap().owner, "icecube");

        let overridden = fx
            .snapshots
            .create(&collection, None, Some("ops"))
            .await
            .unwrap();
        assert_eq!(fx.snapshots.get(overridden).await.unwrap().owner, "ops");
    }

    #[tokio::test]
    async fn test_snapshot_of_missing_collection() {
        let fx = fixture();
        let err = fx
            .snapshots
            .create("no-such", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::CollectionNotFound(_)));
    }

    #[tokio::test]
    async fn test_snapshot_get_with_selected_fields() {
        let fx = fixture();
        let collection = l2_collection(&fx).await;
        let frozen = fx.snapshots.create(&collection, None, None).await.unwrap();

        let doc = fx
            .snapshots
            .get_document(frozen, Some(Keys::fields(["uuid", "owner"])))
            .await
            .unwrap();
        assert_eq!(doc.get_str("owner"), Some("icecube"));
        assert!(!doc.contains_key("files"));
    }

    #[tokio::test]
    async fn test_snapshot_duplicate_uuid_conflicts() {
        let fx = fixture();
        let collection = l2_collection(&fx).await;
        let uuid = SnapshotUuid::new();
        fx.snapshots
            .create(&collection, Some(uuid), None)
            .await
            .unwrap();
        let err = fx
            .snapshots
            .create(&collection, Some(uuid), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::UuidExists(_)));
    }

    #[tokio::test]
    async fn test_files_of_snapshot_joins_live_records() {
        let fx = fixture();
        let a = fx.files.create(metadata("/a", "L2")).await.unwrap().uuid();
        let b = fx.files.create(metadata("/b", "L2")).await.unwrap().uuid();
        let collection = l2_collection(&fx).await;
        let frozen = fx.snapshots.create(&collection, None, None).await.unwrap();

        let docs = fx
            .snapshots
            .files_of(frozen, None, Page::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        // default listing projection applies to the join as well
        assert!(docs[0].contains_key("logical_name"));
        assert!(!docs[0].contains_key("checksum"));

        // deleted members drop out of the join but stay in the frozen list
        fx.files.delete(b).await.unwrap();
        let docs = fx
            .snapshots
            .files_of(frozen, None, Page::default())
            .await
            .unwrap();
        let seen: Vec<_> = docs
            .iter()
            .map(|doc| doc.get_str("uuid").unwrap().to_string())
            .collect();
        assert_eq!(seen, vec![a.to_string()]);
        assert_eq!(fx.snapshots.get(frozen).await.unwrap().files, vec![a, b]);
    }

    #[tokio::test]
    async fn test_snapshots_of_collection_listing() {
        let fx = fixture();
        let collection = l2_collection(&fx).await;
        fx.snapshots.create(&collection, None, None).await.unwrap();
        fx.snapshots.create(&collection, None, None).await.unwrap();

        let docs = fx
            .collections
            .snapshots_of("l2-only", None, Page::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].contains_key("files"));
        assert!(docs[0].contains_key("creation_date"));
    }

    #[tokio::test]
    async fn test_empty_collection_snapshots_to_empty_list() {
        let fx = fixture();
        let collection = l2_collection(&fx).await;
        let frozen = fx.snapshots.create(&collection, None, None).await.unwrap();
        let snapshot = fx.snapshots.get(frozen).await.unwrap();
        assert!(snapshot.files.is_empty());

        let docs = fx
            .snapshots
            .files_of(frozen, None, Page::default())
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_membership_ignores_later_uuid_reuse() {
        let fx = fixture();
        let a = fx.files.create(metadata("/a", "L2")).await.unwrap().uuid();
        let collection = l2_collection(&fx).await;
        let frozen = fx.snapshots.create(&collection, None, None).await.unwrap();

        // delete and recreate under a different uuid; the frozen list
        // still names the original
        fx.files.delete(a).await.unwrap();
        let replacement = FileUuid::new();
        let mut doc = metadata("/a", "L2");
        doc.set("uuid", replacement.to_string());
        fx.files.create(doc).await.unwrap();

        let snapshot = fx.snapshots.get(frozen).await.unwrap();
        assert_eq!(snapshot.files, vec![a]);
    }
}
