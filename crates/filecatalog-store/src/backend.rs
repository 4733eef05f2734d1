//! Embedded document store backed by redb.
//!
//! Documents are stored as JSON in per-collection primary tables keyed by a
//! monotonically increasing row id, which defines natural order. Uniqueness
//! indexes are plain lookup tables maintained in the same write transaction
//! as the document write; redb serializes write transactions, so a probe
//! inside the transaction is authoritative and probe-then-insert here is
//! the backstop behind the engine's optimistic pre-checks.
//!
//! Cursors never hold a read transaction across polls: they scan in rid
//! batches and resume from the last scanned row, so a long listing sees a
//! best-effort point-in-time view per batch.

use crate::document::{Document, RID_FIELD};
use crate::filter::Filter;
use crate::store::{
    CollectionKind, DocCursor, DocStore, StoreError, StoreResult, WriteOutcome, index,
};
use crate::tables;
use async_trait::async_trait;
use futures::stream;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Rows buffered per cursor refill
const SCAN_BATCH: usize = 256;

type PrimaryDef = TableDefinition<'static, u64, &'static [u8]>;
type LookupDef = TableDefinition<'static, &'static str, u64>;
type KeyTable<'txn> = redb::Table<'txn, &'static str, u64>;

const fn primary_table(kind: CollectionKind) -> PrimaryDef {
    match kind {
        CollectionKind::Files => tables::FILES,
        CollectionKind::Collections => tables::COLLECTIONS,
        CollectionKind::Snapshots => tables::SNAPSHOTS,
    }
}

const fn uuid_table(kind: CollectionKind) -> LookupDef {
    match kind {
        CollectionKind::Files => tables::FILES_BY_UUID,
        CollectionKind::Collections => tables::COLLECTIONS_BY_UUID,
        CollectionKind::Snapshots => tables::SNAPSHOTS_BY_UUID,
    }
}

const fn uuid_index_name(kind: CollectionKind) -> &'static str {
    match kind {
        CollectionKind::Files => index::FILES_UUID,
        CollectionKind::Collections => index::COLLECTIONS_UUID,
        CollectionKind::Snapshots => index::SNAPSHOTS_UUID,
    }
}

const fn counter_key(kind: CollectionKind) -> &'static str {
    match kind {
        CollectionKind::Files => "next_rid/files",
        CollectionKind::Collections => "next_rid/collections",
        CollectionKind::Snapshots => "next_rid/snapshots",
    }
}

/// Embedded catalog store
pub struct RedbDocStore {
    db: Arc<Database>,
}

impl RedbDocStore {
    /// Open (or create) the catalog database at the given path.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Create all tables eagerly so later read txns don't fail
        let write_txn = db.begin_write()?;
        {
            let _t = write_txn.open_table(tables::FILES)?;
            let _t = write_txn.open_table(tables::FILES_BY_UUID)?;
            let _t = write_txn.open_table(tables::FILES_BY_LOGICAL_NAME)?;
            let _t = write_txn.open_table(tables::FILES_BY_LOCATION)?;
            let _t = write_txn.open_table(tables::COLLECTIONS)?;
            let _t = write_txn.open_table(tables::COLLECTIONS_BY_UUID)?;
            let _t = write_txn.open_table(tables::SNAPSHOTS)?;
            let _t = write_txn.open_table(tables::SNAPSHOTS_BY_UUID)?;
            let _t = write_txn.open_table(tables::COUNTERS)?;
        }
        write_txn.commit()?;

        debug!("opened catalog store at {}", path.display());
        Ok(Self { db: Arc::new(db) })
    }

    fn lookup_by_uuid_sync(
        &self,
        kind: CollectionKind,
        uuid: &str,
    ) -> StoreResult<Option<Document>> {
        let txn = self.db.begin_read()?;
        let primary = txn.open_table(primary_table(kind))?;
        let by_uuid = txn.open_table(uuid_table(kind))?;
        let Some(entry) = by_uuid.get(uuid)? else {
            return Ok(None);
        };
        let rid = entry.value();
        fetch_row(&primary, rid).map(Some)
    }

    fn find_one_sync(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<Option<Document>> {
        if let Some(uuid) = filter.exact_uuid() {
            return self.lookup_by_uuid_sync(kind, uuid);
        }
        let txn = self.db.begin_read()?;
        let primary = txn.open_table(primary_table(kind))?;
        for entry in primary.iter()? {
            let (_, bytes) = entry?;
            let doc: Document = serde_json::from_slice(bytes.value())?;
            if filter.matches(&doc) {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    fn count_sync(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<u64> {
        if let Some(uuid) = filter.exact_uuid() {
            return Ok(u64::from(self.lookup_by_uuid_sync(kind, uuid)?.is_some()));
        }
        let txn = self.db.begin_read()?;
        let primary = txn.open_table(primary_table(kind))?;
        let mut count = 0u64;
        for entry in primary.iter()? {
            let (_, bytes) = entry?;
            let doc: Document = serde_json::from_slice(bytes.value())?;
            if filter.matches(&doc) {
                count += 1;
            }
        }
        Ok(count)
    }

    fn cursor_sync(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<DocCursor> {
        if let Some(uuid) = filter.exact_uuid() {
            let hits: Vec<StoreResult<Document>> = self
                .lookup_by_uuid_sync(kind, uuid)?
                .into_iter()
                .map(Ok)
                .collect();
            return Ok(Box::pin(stream::iter(hits)));
        }
        let state = ScanState {
            db: Arc::clone(&self.db),
            kind,
            filter: filter.clone(),
            resume_from: 0,
            done: false,
            buffered: VecDeque::new(),
        };
        let cursor = stream::unfold(state, |mut state| async move {
            loop {
                if let Some(doc) = state.buffered.pop_front() {
                    return Some((Ok(doc), state));
                }
                if state.done {
                    return None;
                }
                if let Err(err) = fill_batch(&mut state) {
                    state.done = true;
                    return Some((Err(err), state));
                }
            }
        });
        Ok(Box::pin(cursor))
    }

    fn insert_sync(&self, kind: CollectionKind, mut doc: Document) -> StoreResult<()> {
        let uuid = require_uuid(kind, &doc)?;

        let txn = self.db.begin_write()?;
        {
            let mut primary = txn.open_table(primary_table(kind))?;
            let mut by_uuid = txn.open_table(uuid_table(kind))?;
            let mut counters = txn.open_table(tables::COUNTERS)?;

            let rid = counters
                .get(counter_key(kind))?
                .map_or(1, |guard| guard.value());
            counters.insert(counter_key(kind), rid + 1)?;

            probe_taken(&primary, &by_uuid, uuid_index_name(kind), &uuid, rid)?;

            if kind == CollectionKind::Files {
                let mut by_name = txn.open_table(tables::FILES_BY_LOGICAL_NAME)?;
                let mut by_location = txn.open_table(tables::FILES_BY_LOCATION)?;

                if let Some(name) = doc.get_str("logical_name") {
                    probe_taken(&primary, &by_name, index::FILES_LOGICAL_NAME, name, rid)?;
                }
                for key in location_keys(&doc) {
                    probe_taken(&primary, &by_location, index::FILES_LOCATIONS, &key, rid)?;
                }

                if let Some(name) = doc.get_str("logical_name") {
                    by_name.insert(name, rid)?;
                }
                for key in location_keys(&doc) {
                    by_location.insert(key.as_str(), rid)?;
                }
            }

            doc.set(RID_FIELD, rid);
            let bytes = serde_json::to_vec(&doc)?;
            primary.insert(rid, bytes.as_slice())?;
            by_uuid.insert(uuid.as_str(), rid)?;
        }
        txn.commit()?;
        debug!("inserted {kind} document {uuid}");
        Ok(())
    }

    fn update_merge_sync(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        partial: Document,
    ) -> StoreResult<WriteOutcome> {
        let txn = self.db.begin_write()?;
        let outcome;
        {
            let mut primary = txn.open_table(primary_table(kind))?;
            let mut by_uuid = txn.open_table(uuid_table(kind))?;
            let Some((rid, stored)) = resolve_first(&primary, &by_uuid, filter)? else {
                return Ok(WriteOutcome {
                    matched: 0,
                    modified: Some(0),
                });
            };
            let mut merged = stored.clone();
            merged.merge_from(&partial);
            merged.set(RID_FIELD, rid);

            reindex_uuid(&primary, &mut by_uuid, kind, rid, &stored, &merged)?;
            if kind == CollectionKind::Files {
                let mut by_name = txn.open_table(tables::FILES_BY_LOGICAL_NAME)?;
                let mut by_location = txn.open_table(tables::FILES_BY_LOCATION)?;
                reindex_files(&primary, &mut by_name, &mut by_location, rid, &stored, &merged)?;
            }

            let changed = merged != stored;
            let bytes = serde_json::to_vec(&merged)?;
            primary.insert(rid, bytes.as_slice())?;
            outcome = WriteOutcome {
                matched: 1,
                modified: Some(u64::from(changed)),
            };
        }
        txn.commit()?;
        Ok(outcome)
    }

    fn replace_one_sync(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        mut doc: Document,
    ) -> StoreResult<WriteOutcome> {
        require_uuid(kind, &doc)?;
        let txn = self.db.begin_write()?;
        let outcome;
        {
            let mut primary = txn.open_table(primary_table(kind))?;
            let mut by_uuid = txn.open_table(uuid_table(kind))?;
            let Some((rid, stored)) = resolve_first(&primary, &by_uuid, filter)? else {
                return Ok(WriteOutcome {
                    matched: 0,
                    modified: Some(0),
                });
            };
            doc.set(RID_FIELD, rid);

            reindex_uuid(&primary, &mut by_uuid, kind, rid, &stored, &doc)?;
            if kind == CollectionKind::Files {
                let mut by_name = txn.open_table(tables::FILES_BY_LOGICAL_NAME)?;
                let mut by_location = txn.open_table(tables::FILES_BY_LOCATION)?;
                reindex_files(&primary, &mut by_name, &mut by_location, rid, &stored, &doc)?;
            }

            let changed = doc != stored;
            let bytes = serde_json::to_vec(&doc)?;
            primary.insert(rid, bytes.as_slice())?;
            outcome = WriteOutcome {
                matched: 1,
                modified: Some(u64::from(changed)),
            };
        }
        txn.commit()?;
        Ok(outcome)
    }

    fn delete_one_sync(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<u64> {
        let txn = self.db.begin_write()?;
        {
            let mut primary = txn.open_table(primary_table(kind))?;
            let mut by_uuid = txn.open_table(uuid_table(kind))?;
            let Some((rid, stored)) = resolve_first(&primary, &by_uuid, filter)? else {
                return Ok(0);
            };
            if kind == CollectionKind::Files {
                let mut by_name = txn.open_table(tables::FILES_BY_LOGICAL_NAME)?;
                let mut by_location = txn.open_table(tables::FILES_BY_LOCATION)?;
                if let Some(name) = stored.get_str("logical_name") {
                    by_name.remove(name)?;
                }
                for key in location_keys(&stored) {
                    by_location.remove(key.as_str())?;
                }
            }
            if let Some(uuid) = stored.get_str("uuid") {
                by_uuid.remove(uuid)?;
            }
            primary.remove(rid)?;
        }
        txn.commit()?;
        Ok(1)
    }

    fn add_to_set_sync(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        field: &str,
        values: Vec<Value>,
        stamp: Document,
    ) -> StoreResult<WriteOutcome> {
        let txn = self.db.begin_write()?;
        let outcome;
        {
            let mut primary = txn.open_table(primary_table(kind))?;
            let by_uuid = txn.open_table(uuid_table(kind))?;
            let Some((rid, stored)) = resolve_first(&primary, &by_uuid, filter)? else {
                return Ok(WriteOutcome {
                    matched: 0,
                    modified: Some(0),
                });
            };
            let mut by_location = if kind == CollectionKind::Files && field == "locations" {
                Some(txn.open_table(tables::FILES_BY_LOCATION)?)
            } else {
                None
            };

            let mut updated = stored.clone();
            let mut items = match updated.remove(field) {
                Some(Value::Array(items)) => items,
                None => Vec::new(),
                Some(_) => {
                    return Err(StoreError::InvalidDocument(format!(
                        "field {field} is not an array"
                    )));
                }
            };
            for value in values {
                if items.contains(&value) {
                    continue;
                }
                if let Some(by_location) = by_location.as_mut() {
                    if let Some(key) = location_key(&value) {
                        probe_taken(&primary, &*by_location, index::FILES_LOCATIONS, &key, rid)?;
                        by_location.insert(key.as_str(), rid)?;
                    }
                }
                items.push(value);
            }
            updated.set(field, Value::Array(items));
            updated.merge_from(&stamp);
            updated.set(RID_FIELD, rid);

            let changed = updated != stored;
            let bytes = serde_json::to_vec(&updated)?;
            primary.insert(rid, bytes.as_slice())?;
            outcome = WriteOutcome {
                matched: 1,
                modified: Some(u64::from(changed)),
            };
        }
        txn.commit()?;
        Ok(outcome)
    }
}

#[async_trait]
impl DocStore for RedbDocStore {
    async fn insert_unique(&self, kind: CollectionKind, doc: Document) -> StoreResult<()> {
        self.insert_sync(kind, doc)
    }

    async fn find_one(
        &self,
        kind: CollectionKind,
        filter: &Filter,
    ) -> StoreResult<Option<Document>> {
        self.find_one_sync(kind, filter)
    }

    async fn find(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<DocCursor> {
        self.cursor_sync(kind, filter)
    }

    async fn count(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<u64> {
        self.count_sync(kind, filter)
    }

    async fn update_merge(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        partial: Document,
    ) -> StoreResult<WriteOutcome> {
        self.update_merge_sync(kind, filter, partial)
    }

    async fn replace_one(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        doc: Document,
    ) -> StoreResult<WriteOutcome> {
        self.replace_one_sync(kind, filter, doc)
    }

    async fn delete_one(&self, kind: CollectionKind, filter: &Filter) -> StoreResult<u64> {
        self.delete_one_sync(kind, filter)
    }

    async fn add_to_set(
        &self,
        kind: CollectionKind,
        filter: &Filter,
        field: &str,
        values: Vec<Value>,
        stamp: Document,
    ) -> StoreResult<WriteOutcome> {
        self.add_to_set_sync(kind, filter, field, values, stamp)
    }
}

struct ScanState {
    db: Arc<Database>,
    kind: CollectionKind,
    filter: Filter,
    resume_from: u64,
    done: bool,
    buffered: VecDeque<Document>,
}

/// Refill the cursor buffer with the next batch of matching rows.
fn fill_batch(state: &mut ScanState) -> StoreResult<()> {
    let txn = state.db.begin_read()?;
    let primary = txn.open_table(primary_table(state.kind))?;
    let mut exhausted = true;
    for entry in primary.range(state.resume_from..)? {
        let (rid, bytes) = entry?;
        state.resume_from = rid.value() + 1;
        let doc: Document = serde_json::from_slice(bytes.value())?;
        if state.filter.matches(&doc) {
            state.buffered.push_back(doc);
            if state.buffered.len() >= SCAN_BATCH {
                exhausted = false;
                break;
            }
        }
    }
    if exhausted {
        state.done = true;
    }
    Ok(())
}

fn require_uuid(kind: CollectionKind, doc: &Document) -> StoreResult<String> {
    doc.get_str("uuid").map(ToString::to_string).ok_or_else(|| {
        StoreError::InvalidDocument(format!("{kind} document missing uuid"))
    })
}

fn fetch_row(
    primary: &impl ReadableTable<u64, &'static [u8]>,
    rid: u64,
) -> StoreResult<Document> {
    let Some(bytes) = primary.get(rid)? else {
        return Err(StoreError::Corruption(format!(
            "index entry points at missing row {rid}"
        )));
    };
    Ok(serde_json::from_slice(bytes.value())?)
}

fn holder_uuid(
    primary: &impl ReadableTable<u64, &'static [u8]>,
    rid: u64,
) -> StoreResult<String> {
    let doc = fetch_row(primary, rid)?;
    doc.get_str("uuid")
        .map(ToString::to_string)
        .ok_or_else(|| StoreError::Corruption(format!("stored row {rid} missing uuid")))
}

/// Error out when `key` is claimed by a row other than `self_rid`.
fn probe_taken(
    primary: &impl ReadableTable<u64, &'static [u8]>,
    lookup: &impl ReadableTable<&'static str, u64>,
    index_name: &str,
    key: &str,
    self_rid: u64,
) -> StoreResult<()> {
    if let Some(entry) = lookup.get(key)? {
        let rid = entry.value();
        if rid != self_rid {
            return Err(StoreError::DuplicateKey {
                index: index_name.to_string(),
                value: key.to_string(),
                holder: holder_uuid(primary, rid)?,
            });
        }
    }
    Ok(())
}

/// First row matching the filter, with its rid. Point filters go through
/// the uuid lookup table; anything else scans in natural order.
fn resolve_first(
    primary: &impl ReadableTable<u64, &'static [u8]>,
    by_uuid: &impl ReadableTable<&'static str, u64>,
    filter: &Filter,
) -> StoreResult<Option<(u64, Document)>> {
    if let Some(uuid) = filter.exact_uuid() {
        let Some(entry) = by_uuid.get(uuid)? else {
            return Ok(None);
        };
        let rid = entry.value();
        return fetch_row(primary, rid).map(|doc| Some((rid, doc)));
    }
    for entry in primary.iter()? {
        let (rid, bytes) = entry?;
        let doc: Document = serde_json::from_slice(bytes.value())?;
        if filter.matches(&doc) {
            return Ok(Some((rid.value(), doc)));
        }
    }
    Ok(None)
}

/// Re-point the uuid lookup entry when a write changes the uuid.
fn reindex_uuid(
    primary: &impl ReadableTable<u64, &'static [u8]>,
    by_uuid: &mut KeyTable<'_>,
    kind: CollectionKind,
    rid: u64,
    old: &Document,
    new: &Document,
) -> StoreResult<()> {
    let old_uuid = old.get_str("uuid").map(ToString::to_string);
    let new_uuid = new.get_str("uuid").map(ToString::to_string);
    if old_uuid == new_uuid {
        return Ok(());
    }
    let Some(new_uuid) = new_uuid else {
        return Err(StoreError::InvalidDocument(format!(
            "{kind} document missing uuid"
        )));
    };
    probe_taken(primary, &*by_uuid, uuid_index_name(kind), &new_uuid, rid)?;
    if let Some(old_uuid) = old_uuid {
        by_uuid.remove(old_uuid.as_str())?;
    }
    by_uuid.insert(new_uuid.as_str(), rid)?;
    Ok(())
}

/// Diff old vs new row content and re-point the files uniqueness indexes,
/// probing every newly claimed key.
fn reindex_files(
    primary: &impl ReadableTable<u64, &'static [u8]>,
    by_name: &mut KeyTable<'_>,
    by_location: &mut KeyTable<'_>,
    rid: u64,
    old: &Document,
    new: &Document,
) -> StoreResult<()> {
    let old_name = old.get_str("logical_name").map(ToString::to_string);
    let new_name = new.get_str("logical_name").map(ToString::to_string);
    if old_name != new_name {
        if let Some(name) = &new_name {
            probe_taken(primary, &*by_name, index::FILES_LOGICAL_NAME, name, rid)?;
        }
        if let Some(name) = &old_name {
            by_name.remove(name.as_str())?;
        }
        if let Some(name) = &new_name {
            by_name.insert(name.as_str(), rid)?;
        }
    }

    let old_keys = location_keys(old);
    let new_keys = location_keys(new);
    if old_keys != new_keys {
        for key in &new_keys {
            if !old_keys.contains(key) {
                probe_taken(primary, &*by_location, index::FILES_LOCATIONS, key, rid)?;
            }
        }
        for key in &old_keys {
            if !new_keys.contains(key) {
                by_location.remove(key.as_str())?;
            }
        }
        for key in &new_keys {
            if !old_keys.contains(key) {
                by_location.insert(key.as_str(), rid)?;
            }
        }
    }
    Ok(())
}

/// Uniqueness key for one location element, when it is well-formed
fn location_key(value: &Value) -> Option<String> {
    let map = value.as_object()?;
    let site = map.get("site")?.as_str()?;
    let path = map.get("path")?.as_str()?;
    Some(format!("{site}\x00{path}"))
}

/// Distinct uniqueness keys for every location element of a document
fn location_keys(doc: &Document) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(items) = doc.get_array("locations") {
        for item in items {
            if let Some(key) = location_key(item) {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
    }
    keys
}
