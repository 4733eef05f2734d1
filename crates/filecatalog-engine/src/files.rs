//! File record management: creation, replica accumulation, mutation and
//! lookup.
//!
//! Every uniqueness rule is enforced twice. An optimistic pre-check runs
//! first so the common sequential case gets a precise conflict naming the
//! offending uuid or location; the store's uniqueness indexes are the
//! correctness backstop when two writers pass the pre-check concurrently,
//! and a duplicate-key failure from the store surfaces as the very same
//! conflict shape.

use crate::records::{FileRecord, now_stamp};
use crate::validate::MetadataValidator;
use filecatalog_common::{CatalogError, FileUuid, Location, Result};
use filecatalog_store::{CatalogDb, Document, Filter, Keys, Page, require_modified};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// How a create call landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    /// A new record was inserted
    Created(FileUuid),
    /// The uuid was already present with identical content; the incoming
    /// locations were appended instead
    ReplicaAdded(FileUuid),
}

impl CreateOutcome {
    #[must_use]
    pub const fn uuid(&self) -> FileUuid {
        match self {
            Self::Created(uuid) | Self::ReplicaAdded(uuid) => *uuid,
        }
    }
}

/// Owns all file-record mutation paths
#[derive(Clone)]
pub struct FileRecordManager {
    db: CatalogDb,
    validator: Arc<dyn MetadataValidator>,
}

impl FileRecordManager {
    pub fn new(db: CatalogDb, validator: Arc<dyn MetadataValidator>) -> Self {
        Self { db, validator }
    }

    /// Register metadata for a file. A payload whose uuid already exists
    /// with identical content turns into replica accumulation, so the
    /// common ingestion path needs no separate add-replica call.
    pub async fn create(&self, input: Document) -> Result<CreateOutcome> {
        let mut record = FileRecord::from_input(&input)?;
        self.validator.validate(&record).await?;
        dedupe_locations(&mut record.locations);

        match self.try_create(record.clone()).await {
            // lost a uuid race to a concurrent writer: the rerun sees the
            // winner's record and re-evaluates the payload as a replica
            Err(CatalogError::UuidExists(_)) => self.try_create(record).await,
            outcome => outcome,
        }
    }

    async fn try_create(&self, mut record: FileRecord) -> Result<CreateOutcome> {
        if let Some(uuid) = record.uuid {
            if let Some(existing) = self.load(uuid).await? {
                return self.merge_replica(&existing, &record).await;
            }
        }

        self.check_logical_name_free(&record.logical_name, None)
            .await?;
        for location in &record.locations {
            self.check_location_free(location, None).await?;
        }

        let uuid = record.uuid.unwrap_or_else(FileUuid::new);
        record.uuid = Some(uuid);
        let stamp = now_stamp();
        record.create_date = Some(stamp.clone());
        record.meta_modify_date = Some(stamp);

        self.db.create_file(record.to_document()?).await?;
        info!("created file record {uuid}");
        Ok(CreateOutcome::Created(uuid))
    }

    /// Create-path replica merge: an existing uuid must mean identical
    /// content, and none of the incoming locations may be registered yet.
    async fn merge_replica(
        &self,
        existing: &FileRecord,
        incoming: &FileRecord,
    ) -> Result<CreateOutcome> {
        let Some(uuid) = existing.uuid else {
            return Err(CatalogError::internal("stored file record has no uuid"));
        };
        if existing.checksum != incoming.checksum {
            return Err(CatalogError::ChecksumConflict {
                uuid: uuid.to_string(),
            });
        }
        for location in &incoming.locations {
            if existing.locations.iter().any(|held| held.matches(location)) {
                return Err(CatalogError::ReplicaExists {
                    uuid: uuid.to_string(),
                    site: location.site.clone(),
                    path: location.path.clone(),
                });
            }
        }
        for location in &incoming.locations {
            self.check_location_free(location, Some(uuid)).await?;
        }

        self.append_locations(uuid, &incoming.locations).await?;
        info!("added replica of file record {uuid}");
        Ok(CreateOutcome::ReplicaAdded(uuid))
    }

    /// Explicit replica addition, independent of content metadata.
    ///
    /// The whole batch is validated before anything is written: a location
    /// held by another record aborts the call, one already held by this
    /// record is skipped, and whatever remains is committed in a single
    /// set-union write. Retrying an identical request is a no-op.
    pub async fn add_locations(
        &self,
        uuid: FileUuid,
        locations: &[Location],
    ) -> Result<FileRecord> {
        for location in locations {
            location.validate()?;
        }
        let existing = self.require(uuid).await?;

        let mut fresh: Vec<Location> = Vec::new();
        for location in locations {
            if existing.locations.iter().any(|held| held.matches(location)) {
                continue;
            }
            if fresh.iter().any(|seen| seen.matches(location)) {
                continue;
            }
            self.check_location_free(location, Some(uuid)).await?;
            fresh.push(location.clone());
        }

        if !fresh.is_empty() {
            self.append_locations(uuid, &fresh).await?;
        }
        self.require(uuid).await
    }

    /// Merge a partial metadata payload into an existing record. Only the
    /// partial payload is persisted, so concurrently written unrelated
    /// fields survive.
    pub async fn update(&self, uuid: FileUuid, mut partial: Document) -> Result<FileRecord> {
        let existing = self.require(uuid).await?;

        // validate the merged view: completeness is only checkable post-merge
        let mut merged_doc = existing.to_document()?;
        merged_doc.merge_from(&partial);
        let merged = FileRecord::from_input(&merged_doc)?;
        check_immutable(&existing, &merged)?;
        self.validator.validate(&merged).await?;

        if merged.logical_name != existing.logical_name {
            self.check_logical_name_free(&merged.logical_name, Some(uuid))
                .await?;
        }
        for location in &merged.locations {
            if !existing.locations.iter().any(|held| held.matches(location)) {
                self.check_location_free(location, Some(uuid)).await?;
            }
        }

        partial.set("meta_modify_date", now_stamp());
        let outcome = self.db.update_file(&uuid_filter(uuid), partial).await?;
        if outcome.matched == 0 {
            return Err(CatalogError::FileNotFound(uuid.to_string()));
        }
        require_modified("update file", &outcome)?;
        self.require(uuid).await
    }

    /// Replace the whole record. The payload must carry the target uuid;
    /// an absent `create_date` is carried forward from the stored record.
    pub async fn replace(&self, input: Document) -> Result<FileRecord> {
        let mut record = FileRecord::from_input(&input)?;
        let Some(uuid) = record.uuid else {
            return Err(CatalogError::missing_field("uuid"));
        };
        let existing = self.require(uuid).await?;

        if record.create_date.is_none() {
            record.create_date = existing.create_date.clone();
        }
        check_immutable(&existing, &record)?;
        self.validator.validate(&record).await?;
        dedupe_locations(&mut record.locations);

        if record.logical_name != existing.logical_name {
            self.check_logical_name_free(&record.logical_name, Some(uuid))
                .await?;
        }
        for location in &record.locations {
            if !existing.locations.iter().any(|held| held.matches(location)) {
                self.check_location_free(location, Some(uuid)).await?;
            }
        }

        record.meta_modify_date = Some(now_stamp());
        let outcome = self
            .db
            .replace_file(&uuid_filter(uuid), record.to_document()?)
            .await?;
        if outcome.matched == 0 {
            return Err(CatalogError::FileNotFound(uuid.to_string()));
        }
        require_modified("replace file", &outcome)?;
        self.require(uuid).await
    }

    /// Remove exactly one record by uuid.
    pub async fn delete(&self, uuid: FileUuid) -> Result<()> {
        let deleted = self.db.delete_file(&uuid_filter(uuid)).await?;
        if deleted == 0 {
            return Err(CatalogError::FileNotFound(uuid.to_string()));
        }
        info!("deleted file record {uuid}");
        Ok(())
    }

    /// Full record by uuid
    pub async fn get(&self, uuid: FileUuid) -> Result<FileRecord> {
        self.require(uuid).await
    }

    /// Raw document by uuid, optionally narrowed to selected fields
    pub async fn get_document(&self, uuid: FileUuid, keys: Option<Keys>) -> Result<Document> {
        self.db
            .get_file(&uuid_filter(uuid), keys)
            .await?
            .ok_or_else(|| CatalogError::FileNotFound(uuid.to_string()))
    }

    /// First record matching an arbitrary filter, full document
    pub async fn get_by(&self, filter: &Filter) -> Result<Option<FileRecord>> {
        let found = self.db.get_file(filter, None).await?;
        found.as_ref().map(FileRecord::from_document).transpose()
    }

    /// Listing read; defaults to the identity projection when the caller
    /// requests no fields.
    pub async fn find(
        &self,
        filter: &Filter,
        keys: Option<Keys>,
        page: Page,
    ) -> Result<Vec<Document>> {
        self.db.find_files(filter, keys, page).await
    }

    pub async fn count(&self, filter: &Filter) -> Result<u64> {
        self.db.count_files(filter).await
    }

    /// Every uuid matching the filter, unwindowed, for snapshot capture.
    pub async fn collect_uuids(&self, filter: &Filter) -> Result<Vec<FileUuid>> {
        let raw = self.db.collect_file_uuids(filter).await?;
        raw.iter()
            .map(|text| {
                FileUuid::parse(text)
                    .map_err(|_| CatalogError::internal(format!("stored uuid is malformed: {text}")))
            })
            .collect()
    }

    async fn load(&self, uuid: FileUuid) -> Result<Option<FileRecord>> {
        let found = self.db.get_file(&uuid_filter(uuid), None).await?;
        found.as_ref().map(FileRecord::from_document).transpose()
    }

    async fn require(&self, uuid: FileUuid) -> Result<FileRecord> {
        self.load(uuid)
            .await?
            .ok_or_else(|| CatalogError::FileNotFound(uuid.to_string()))
    }

    async fn check_logical_name_free(&self, name: &str, owner: Option<FileUuid>) -> Result<()> {
        let holder = self
            .db
            .get_file(&Filter::eq("logical_name", name), Some(Keys::fields(["uuid"])))
            .await?;
        let Some(doc) = holder else {
            return Ok(());
        };
        if is_owned_by(&doc, owner) {
            return Ok(());
        }
        Err(CatalogError::LogicalNameTaken(name.to_string()))
    }

    async fn check_location_free(&self, location: &Location, owner: Option<FileUuid>) -> Result<()> {
        let holder = self
            .db
            .get_file(&Filter::location(location), Some(Keys::fields(["uuid"])))
            .await?;
        let Some(doc) = holder else {
            return Ok(());
        };
        if is_owned_by(&doc, owner) {
            return Ok(());
        }
        Err(CatalogError::LocationTaken {
            site: location.site.clone(),
            path: location.path.clone(),
            owner_uuid: doc.get_str("uuid").unwrap_or_default().to_string(),
        })
    }

    /// One atomic set-union write carrying the modification stamp.
    async fn append_locations(&self, uuid: FileUuid, locations: &[Location]) -> Result<()> {
        let values = locations
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<Value>, _>>()
            .map_err(|err| CatalogError::internal(format!("cannot encode location: {err}")))?;
        let mut stamp = Document::new();
        stamp.set("meta_modify_date", now_stamp());

        let outcome = self
            .db
            .append_distinct_locations(&uuid_filter(uuid), values, stamp)
            .await?;
        if outcome.matched == 0 {
            return Err(CatalogError::FileNotFound(uuid.to_string()));
        }
        require_modified("add locations", &outcome)
    }
}

fn uuid_filter(uuid: FileUuid) -> Filter {
    Filter::eq("uuid", uuid.to_string())
}

fn is_owned_by(doc: &Document, owner: Option<FileUuid>) -> bool {
    match (doc.get_str("uuid"), owner) {
        (Some(held), Some(uuid)) => held == uuid.to_string(),
        _ => false,
    }
}

/// Fields a mutation is never allowed to change
fn check_immutable(existing: &FileRecord, incoming: &FileRecord) -> Result<()> {
    if incoming.uuid != existing.uuid {
        return Err(CatalogError::ImmutableField("uuid".to_string()));
    }
    if incoming.create_date != existing.create_date {
        return Err(CatalogError::ImmutableField("create_date".to_string()));
    }
    Ok(())
}

/// Collapse request-side duplicates on the (site, path) identity
fn dedupe_locations(locations: &mut Vec<Location>) {
    let mut seen: Vec<Location> = Vec::new();
    locations.retain(|location| {
        if seen.iter().any(|kept| kept.matches(location)) {
            false
        } else {
            seen.push(location.clone());
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::SchemaValidator;
    use filecatalog_common::QueryConfig;
    use filecatalog_store::RedbDocStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn manager() -> (FileRecordManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RedbDocStore::open(dir.path().join("catalog.redb")).unwrap();
        let db = CatalogDb::with_store(Arc::new(store), QueryConfig::default());
        (FileRecordManager::new(db, Arc::new(SchemaValidator)), dir)
    }

    fn digest(seed: u8) -> String {
        format!("{seed:02x}").repeat(64)
    }

    fn metadata(name: &str, seed: u8, site: &str, path: &str) -> Document {
        Document::from_value(json!({
            "logical_name": name,
            "checksum": {"sha512": digest(seed)},
            "file_size": 1024,
            "locations": [{"site": site, "path": path}]
        }))
        .unwrap()
    }

    fn with_uuid(mut doc: Document, uuid: FileUuid) -> Document {
        doc.set("uuid", uuid.to_string());
        doc
    }

    fn location(site: &str, path: &str) -> Location {
        Location::new(site, path).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_uuid_and_stamps() {
        let (files, _dir) = manager();
        let outcome = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap();
        let CreateOutcome::Created(uuid) = outcome else {
            panic!("expected a fresh record");
        };

        let record = files.get(uuid).await.unwrap();
        assert_eq!(record.uuid, Some(uuid));
        assert_eq!(record.logical_name, "/data/a.dat");
        assert!(record.create_date.is_some());
        assert_eq!(record.create_date, record.meta_modify_date);
    }

    #[tokio::test]
    async fn test_create_round_trip_keeps_domain_metadata() {
        let (files, _dir) = manager();
        let mut input = metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat");
        input.set("run_number", 117);
        input.set("processing_level", "L2");
        let uuid = files.create(input).await.unwrap().uuid();

        let doc = files.get_document(uuid, None).await.unwrap();
        assert_eq!(doc.get("run_number"), Some(&json!(117)));
        assert_eq!(doc.get_str("processing_level"), Some("L2"));
    }

    #[tokio::test]
    async fn test_get_by_filter() {
        let (files, _dir) = manager();
        let uuid = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();

        let record = files
            .get_by(&Filter::eq("logical_name", "/data/a.dat"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.uuid, Some(uuid));

        let missing = files
            .get_by(&Filter::eq("logical_name", "/data/other.dat"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_create_never_trusts_client_stamps() {
        let (files, _dir) = manager();
        let mut input = metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat");
        input.set("create_date", "1999-01-01T00:00:00.000000Z");
        input.set("meta_modify_date", "1999-01-01T00:00:00.000000Z");
        let uuid = files.create(input).await.unwrap().uuid();

        let record = files.get(uuid).await.unwrap();
        assert_ne!(
            record.create_date.as_deref(),
            Some("1999-01-01T00:00:00.000000Z")
        );
    }

    #[tokio::test]
    async fn test_create_missing_required_field() {
        let (files, _dir) = manager();
        let mut input = metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat");
        input.remove("checksum");
        let err = files.create(input).await.unwrap_err();
        assert!(matches!(err, CatalogError::MissingField(field) if field == "checksum"));
    }

    #[tokio::test]
    async fn test_create_duplicate_logical_name() {
        let (files, _dir) = manager();
        files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap();
        let err = files
            .create(metadata("/data/a.dat", 2, "WIPAC", "/data/other.dat"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::LogicalNameTaken(name) if name == "/data/a.dat"));
    }

    #[tokio::test]
    async fn test_create_duplicate_location_names_owner() {
        let (files, _dir) = manager();
        let owner = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();
        let err = files
            .create(metadata("/data/b.dat", 2, "WIPAC", "/data/a.dat"))
            .await
            .unwrap_err();
        match err {
            CatalogError::LocationTaken {
                site,
                path,
                owner_uuid,
            } => {
                assert_eq!(site, "WIPAC");
                assert_eq!(path, "/data/a.dat");
                assert_eq!(owner_uuid, owner.to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_same_uuid_different_checksum_conflicts() {
        let (files, _dir) = manager();
        let uuid = FileUuid::new();
        files
            .create(with_uuid(
                metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"),
                uuid,
            ))
            .await
            .unwrap();
        // the location overlap alone would be ReplicaExists; the
        // checksum check comes first
        let err = files
            .create(with_uuid(
                metadata("/data/a.dat", 2, "WIPAC", "/data/a.dat"),
                uuid,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ChecksumConflict { uuid: u } if u == uuid.to_string()));
    }

    #[tokio::test]
    async fn test_create_replica_merges_locations() {
        let (files, _dir) = manager();
        let uuid = FileUuid::new();
        files
            .create(with_uuid(
                metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"),
                uuid,
            ))
            .await
            .unwrap();

        // same checksum, one new location listed twice in the request
        let mut replica = Document::from_value(json!({
            "uuid": uuid.to_string(),
            "logical_name": "/data/a.dat",
            "checksum": {"sha512": digest(1)},
            "file_size": 1024,
            "locations": [
                {"site": "NERSC", "path": "/tape/a.dat"},
                {"site": "NERSC", "path": "/tape/a.dat"}
            ]
        }))
        .unwrap();
        replica.set("run_number", 9);
        let outcome = files.create(replica).await.unwrap();
        assert_eq!(outcome, CreateOutcome::ReplicaAdded(uuid));

        let record = files.get(uuid).await.unwrap();
        assert_eq!(record.locations.len(), 2);
        assert!(
            record
                .locations
                .iter()
                .any(|held| held.matches(&location("NERSC", "/tape/a.dat")))
        );
        // replica merge only appends locations, never other metadata
        assert!(!record.extra.contains_key("run_number"));
    }

    #[tokio::test]
    async fn test_create_replica_existing_location_conflicts() {
        let (files, _dir) = manager();
        let uuid = FileUuid::new();
        files
            .create(with_uuid(
                metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"),
                uuid,
            ))
            .await
            .unwrap();
        let err = files
            .create(with_uuid(
                metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"),
                uuid,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::ReplicaExists { .. }));
    }

    #[tokio::test]
    async fn test_add_locations_is_idempotent() {
        let (files, _dir) = manager();
        let uuid = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();

        let batch = [
            location("WIPAC", "/data/a.dat"),
            location("NERSC", "/tape/a.dat"),
        ];
        let record = files.add_locations(uuid, &batch).await.unwrap();
        assert_eq!(record.locations.len(), 2);

        // identical retry: no error, same final set
        let record = files.add_locations(uuid, &batch).await.unwrap();
        assert_eq!(record.locations.len(), 2);
    }

    #[tokio::test]
    async fn test_add_locations_conflict_aborts_whole_batch() {
        let (files, _dir) = manager();
        let owner = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();
        let victim = files
            .create(metadata("/data/b.dat", 2, "WIPAC", "/data/b.dat"))
            .await
            .unwrap()
            .uuid();

        // the fresh location comes first; the conflicting one must still
        // prevent it from landing
        let err = files
            .add_locations(
                victim,
                &[
                    location("NERSC", "/tape/b.dat"),
                    location("WIPAC", "/data/a.dat"),
                ],
            )
            .await
            .unwrap_err();
        match err {
            CatalogError::LocationTaken { owner_uuid, .. } => {
                assert_eq!(owner_uuid, owner.to_string());
            }
            other => panic!("unexpected error: {other}"),
        }

        let record = files.get(victim).await.unwrap();
        assert_eq!(record.locations.len(), 1);
    }

    #[tokio::test]
    async fn test_add_locations_missing_file() {
        let (files, _dir) = manager();
        let err = files
            .add_locations(FileUuid::new(), &[location("WIPAC", "/data/x.dat")])
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_merges_and_preserves_unrelated_fields() {
        let (files, _dir) = manager();
        let mut input = metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat");
        input.set("run_number", 117);
        let uuid = files.create(input).await.unwrap().uuid();

        let partial = Document::from_value(json!({"content_status": "good"})).unwrap();
        let record = files.update(uuid, partial).await.unwrap();

        assert_eq!(record.extra.get("content_status"), Some(&json!("good")));
        assert_eq!(record.extra.get("run_number"), Some(&json!(117)));
        assert_eq!(record.logical_name, "/data/a.dat");
        assert!(record.meta_modify_date.is_some());
    }

    #[tokio::test]
    async fn test_update_rejects_immutable_fields() {
        let (files, _dir) = manager();
        let uuid = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();

        let partial = Document::from_value(json!({"uuid": FileUuid::new().to_string()})).unwrap();
        let err = files.update(uuid, partial).await.unwrap_err();
        assert!(matches!(err, CatalogError::ImmutableField(field) if field == "uuid"));

        let partial =
            Document::from_value(json!({"create_date": "1999-01-01T00:00:00.000000Z"})).unwrap();
        let err = files.update(uuid, partial).await.unwrap_err();
        assert!(matches!(err, CatalogError::ImmutableField(field) if field == "create_date"));
    }

    #[tokio::test]
    async fn test_update_missing_file() {
        let (files, _dir) = manager();
        let partial = Document::from_value(json!({"content_status": "good"})).unwrap();
        let err = files.update(FileUuid::new(), partial).await.unwrap_err();
        assert!(matches!(err, CatalogError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_update_rename_onto_taken_name_conflicts() {
        let (files, _dir) = manager();
        files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap();
        let uuid = files
            .create(metadata("/data/b.dat", 2, "WIPAC", "/data/b.dat"))
            .await
            .unwrap()
            .uuid();

        let partial = Document::from_value(json!({"logical_name": "/data/a.dat"})).unwrap();
        let err = files.update(uuid, partial).await.unwrap_err();
        assert!(matches!(err, CatalogError::LogicalNameTaken(_)));
    }

    #[tokio::test]
    async fn test_update_validates_merged_document() {
        let (files, _dir) = manager();
        let uuid = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();

        let partial = Document::from_value(json!({"checksum": {"md5": "ab"}})).unwrap();
        let err = files.update(uuid, partial).await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidChecksum(_)));
    }

    #[tokio::test]
    async fn test_replace_drops_unlisted_fields_and_keeps_create_date() {
        let (files, _dir) = manager();
        let mut input = metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat");
        input.set("content_status", "bad");
        let uuid = files.create(input).await.unwrap().uuid();
        let created = files.get(uuid).await.unwrap();

        let replacement = with_uuid(metadata("/data/a.dat", 3, "WIPAC", "/data/a.dat"), uuid);
        let record = files.replace(replacement).await.unwrap();

        assert!(!record.extra.contains_key("content_status"));
        assert_eq!(record.checksum.sha512(), Some(digest(3).as_str()));
        assert_eq!(record.create_date, created.create_date);
    }

    #[tokio::test]
    async fn test_replace_requires_uuid() {
        let (files, _dir) = manager();
        let err = files
            .replace(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::MissingField(field) if field == "uuid"));
    }

    #[tokio::test]
    async fn test_delete_then_not_found() {
        let (files, _dir) = manager();
        let uuid = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();

        files.delete(uuid).await.unwrap();
        assert!(matches!(
            files.get(uuid).await.unwrap_err(),
            CatalogError::FileNotFound(_)
        ));
        assert!(matches!(
            files.delete(uuid).await.unwrap_err(),
            CatalogError::FileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_frees_name_and_location() {
        let (files, _dir) = manager();
        let uuid = files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap()
            .uuid();
        files.delete(uuid).await.unwrap();

        files
            .create(metadata("/data/a.dat", 2, "WIPAC", "/data/a.dat"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_defaults_to_identity_projection() {
        let (files, _dir) = manager();
        files
            .create(metadata("/data/a.dat", 1, "WIPAC", "/data/a.dat"))
            .await
            .unwrap();

        let docs = files
            .find(&Filter::Empty, None, Page::default())
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].contains_key("uuid"));
        assert!(docs[0].contains_key("logical_name"));
        assert!(!docs[0].contains_key("checksum"));
    }

    #[tokio::test]
    async fn test_find_pagination_window() {
        let (files, _dir) = manager();
        let mut uuids = Vec::new();
        for i in 0..5 {
            uuids.push(
                files
                    .create(metadata(
                        &format!("/data/f{i}.dat"),
                        1,
                        "WIPAC",
                        &format!("/data/f{i}.dat"),
                    ))
                    .await
                    .unwrap()
                    .uuid(),
            );
        }

        let docs = files
            .find(&Filter::Empty, None, Page::new(Some(2), 1))
            .await
            .unwrap();
        let seen: Vec<_> = docs
            .iter()
            .map(|doc| doc.get_str("uuid").unwrap().to_string())
            .collect();
        assert_eq!(seen, vec![uuids[1].to_string(), uuids[2].to_string()]);

        let docs = files
            .find(&Filter::Empty, None, Page::new(Some(2), 10))
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_count_with_filter() {
        let (files, _dir) = manager();
        for (i, level) in ["L2", "L3", "L2"].iter().enumerate() {
            let mut input = metadata(
                &format!("/data/f{i}.dat"),
                1,
                "WIPAC",
                &format!("/data/f{i}.dat"),
            );
            input.set("processing_level", *level);
            files.create(input).await.unwrap();
        }
        assert_eq!(
            files
                .count(&Filter::eq("processing_level", "L2"))
                .await
                .unwrap(),
            2
        );
    }
}
