//! RocksDB-backed persistence for collaborative documents.
//!
//! Every room owns one column family (its namespace), named by the room id.
//! A namespace is an append-only log of Yrs updates:
//!
//! ```text
//! CF "<room id>"
//! ┌────────────────────┬─────────────────────────────┐
//! │ clock (8 bytes BE) │ LZ4-compressed Yrs update    │
//! ├────────────────────┼─────────────────────────────┤
//! │ 17                 │ baseline (empty doc state)   │
//! │ 18                 │ delta                        │
//! │ ...                │ ...                          │
//! └────────────────────┴─────────────────────────────┘
//! ```
//!
//! Once a namespace holds `flush_size` updates the log is compacted: the
//! entries read are merged into one full-state update, which is written
//! under a freshly drawn clock while the merged entries are deleted, all in
//! one write batch. A compaction only ever deletes keys it has read, and no
//! two writes share a clock, so appends and compactions may overlap freely.
//! Two overlapping compactions leave two merged updates; applying the same
//! Yrs operations twice is a no-op.
//!
//! Appends and compactions hold their namespace's lock shared. Creating or
//! dropping a namespace holds it exclusively, so a drop waits for in-flight
//! appends and an append never lands in a dropped column family.
//!
//! All namespaces share one block cache, and memtables are capped store-wide
//! (see [`StoreConfig`]).
//!
//! Reading a document (`get_doc`) replays the log into a fresh `yrs::Doc`
//! and never writes.

use dashmap::DashMap;
use interview_core::RoomId;
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, Cache, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode,
    MultiThreaded, WriteBatch, WriteOptions, DEFAULT_COLUMN_FAMILY_NAME,
};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use yrs::updates::decoder::Decode;
use yrs::{Doc, ReadTxn, StateVector, Transact, Update};

use crate::config::StoreConfig;
use crate::error::{CollabError, CollabResult, StoreKind};

type Db = DBWithThreadMode<MultiThreaded>;
type NamespaceLock = RwLock<()>;

/// Driver for the Yrs document engine over the document store.
pub struct DocumentPersistence {
    db: Db,
    config: StoreConfig,
    cache: Cache,
    flush_size: usize,
    /// Next update clock, shared by all namespaces.
    clock: AtomicU64,
    /// Present only while some caller is using or has used the namespace
    /// since it was last dropped.
    locks: DashMap<RoomId, Arc<NamespaceLock>>,
}

impl DocumentPersistence {
    /// Open the document store, reattaching every existing namespace.
    pub fn open(config: StoreConfig, flush_size: usize) -> CollabResult<Self> {
        let db_opts = config.db_options();
        let cache = config.block_cache();
        let names = Db::list_cf(&db_opts, &config.path)
            .unwrap_or_else(|_| vec![DEFAULT_COLUMN_FAMILY_NAME.to_string()]);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name.as_str(), config.cf_options(&cache)))
            .collect();

        let db = Db::open_cf_descriptors(&db_opts, &config.path, cf_descriptors).map_err(|e| {
            CollabError::Connection {
                store: StoreKind::Documents,
                reason: e.to_string(),
            }
        })?;

        let clock = recover_clock(&db, &names);
        log::debug!(
            "document store at {} holds {} namespaces, next clock {clock}",
            config.path.display(),
            names.len().saturating_sub(1)
        );

        Ok(Self {
            db,
            config,
            cache,
            flush_size: flush_size.max(1),
            clock: AtomicU64::new(clock),
            locks: DashMap::new(),
        })
    }

    pub fn flush_size(&self) -> usize {
        self.flush_size
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Bytes currently held by the shared block cache.
    pub fn cache_usage(&self) -> usize {
        self.cache.get_usage()
    }

    // ─── Namespaces ───────────────────────────────────────────────────

    pub fn namespace_exists(&self, room_id: RoomId) -> bool {
        self.namespace(room_id).is_some()
    }

    /// Create the namespace for `room_id`. Returns `false` if it already
    /// existed, including when a concurrent caller created it first.
    pub fn create_namespace(&self, room_id: RoomId) -> CollabResult<bool> {
        let _exclusive = self.lock_namespace(room_id, |lock| lock.write_arc());
        let name = room_id.to_string();
        if self.db.cf_handle(&name).is_some() {
            return Ok(false);
        }
        self.db.create_cf(&name, &self.config.cf_options(&self.cache))?;
        Ok(true)
    }

    /// Drop the namespace and its whole update log, after any in-flight
    /// append finishes. Returns `false` if there was nothing to drop.
    pub fn drop_namespace(&self, room_id: RoomId) -> CollabResult<bool> {
        let _exclusive = self.lock_namespace(room_id, |lock| lock.write_arc());
        let name = room_id.to_string();
        let dropped = if self.db.cf_handle(&name).is_some() {
            self.db.drop_cf(&name)?;
            true
        } else {
            false
        };
        // Later callers start from a fresh lock; holders of this one re-check.
        self.locks.remove(&room_id);
        Ok(dropped)
    }

    // ─── Documents ────────────────────────────────────────────────────

    /// Rebuild the document for `room_id` from its update log.
    ///
    /// `None` if the namespace does not exist. Read-only.
    pub fn get_doc(&self, room_id: RoomId) -> CollabResult<Option<Doc>> {
        let Some(cf) = self.namespace(room_id) else {
            return Ok(None);
        };
        let updates = self.read_log(&cf)?;
        let doc = Doc::new();
        apply_updates(&doc, updates.iter().map(|(_, u)| u.as_slice()))?;
        Ok(Some(doc))
    }

    /// Append one update to the namespace log, compacting once the log
    /// reaches the flush size. Returns the clock assigned to the update.
    pub fn store_update(&self, room_id: RoomId, update: &[u8]) -> CollabResult<u64> {
        let _shared = self.lock_namespace(room_id, |lock| lock.read_arc());
        let cf = self
            .namespace(room_id)
            .ok_or_else(|| CollabError::document_not_found(room_id))?;

        let clock = self.clock.fetch_add(1, Ordering::SeqCst);
        let compressed = lz4_flex::compress_prepend_size(update);
        self.db
            .put_cf_opt(&cf, clock.to_be_bytes(), compressed, &self.write_options())?;

        if self.count_log(&cf)? >= self.flush_size {
            self.compact(room_id, &cf)?;
        }
        Ok(clock)
    }

    /// Merge the namespace log into a single update. Returns how many log
    /// entries were merged (0 when there was nothing to compact).
    pub fn flush_document(&self, room_id: RoomId) -> CollabResult<usize> {
        let _shared = self.lock_namespace(room_id, |lock| lock.read_arc());
        let cf = self
            .namespace(room_id)
            .ok_or_else(|| CollabError::document_not_found(room_id))?;
        self.compact(room_id, &cf)
    }

    /// Number of updates currently in the namespace log.
    pub fn update_count(&self, room_id: RoomId) -> CollabResult<Option<usize>> {
        match self.namespace(room_id) {
            Some(cf) => self.count_log(&cf).map(Some),
            None => Ok(None),
        }
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn compact(&self, room_id: RoomId, cf: &Arc<BoundColumnFamily<'_>>) -> CollabResult<usize> {
        let updates = self.read_log(cf)?;
        if updates.len() < 2 {
            return Ok(0);
        }

        let doc = Doc::new();
        apply_updates(&doc, updates.iter().map(|(_, u)| u.as_slice()))?;
        let merged = doc
            .transact()
            .encode_state_as_update_v1(&StateVector::default());

        let merged_clock = self.clock.fetch_add(1, Ordering::SeqCst);
        let mut batch = WriteBatch::default();
        for (clock, _) in &updates {
            batch.delete_cf(cf, clock.to_be_bytes());
        }
        batch.put_cf(cf, merged_clock.to_be_bytes(), lz4_flex::compress_prepend_size(&merged));
        self.db.write_opt(batch, &self.write_options())?;

        log::info!(
            "Flushed document {room_id}: {} updates merged into {} bytes",
            updates.len(),
            merged.len()
        );
        Ok(updates.len())
    }

    /// Acquire the current lock of `room_id` with `acquire`. If the
    /// namespace was dropped while waiting, the lock is stale and the
    /// current one is taken instead.
    fn lock_namespace<G>(&self, room_id: RoomId, acquire: impl Fn(&Arc<NamespaceLock>) -> G) -> G {
        loop {
            let lock = Arc::clone(self.locks.entry(room_id).or_default().value());
            let guard = acquire(&lock);
            let current = self
                .locks
                .get(&room_id)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &lock));
            if current {
                return guard;
            }
        }
    }

    fn namespace(&self, room_id: RoomId) -> Option<Arc<BoundColumnFamily<'_>>> {
        self.db.cf_handle(&room_id.to_string())
    }

    fn read_log(&self, cf: &Arc<BoundColumnFamily<'_>>) -> CollabResult<Vec<(u64, Vec<u8>)>> {
        let mut updates = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let clock = decode_clock(&key)?;
            let update = lz4_flex::decompress_size_prepended(&value)
                .map_err(|e| CollabError::Corrupt(format!("update {clock}: {e}")))?;
            updates.push((clock, update));
        }
        Ok(updates)
    }

    fn count_log(&self, cf: &Arc<BoundColumnFamily<'_>>) -> CollabResult<usize> {
        let mut count = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.config.sync_writes);
        opts
    }
}

/// Apply encoded v1 updates to `doc` in one transaction.
pub(crate) fn apply_updates<'a>(
    doc: &Doc,
    updates: impl IntoIterator<Item = &'a [u8]>,
) -> CollabResult<()> {
    let mut txn = doc.transact_mut();
    for bytes in updates {
        let update = Update::decode_v1(bytes)
            .map_err(|e| CollabError::Corrupt(format!("undecodable update: {e}")))?;
        txn.apply_update(update)
            .map_err(|e| CollabError::Corrupt(format!("update rejected: {e}")))?;
    }
    Ok(())
}

fn decode_clock(key: &[u8]) -> CollabResult<u64> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| CollabError::Corrupt(format!("invalid update key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

/// One past the highest clock found in any namespace.
fn recover_clock(db: &Db, names: &[String]) -> u64 {
    names
        .iter()
        .filter(|name| name.as_str() != DEFAULT_COLUMN_FAMILY_NAME)
        .filter_map(|name| {
            let cf = db.cf_handle(name)?;
            let last = db.iterator_cf(&cf, IteratorMode::End).next()?;
            let (key, _) = last.ok()?;
            decode_clock(&key).ok()
        })
        .max()
        .map_or(0, |clock| clock + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use yrs::{GetString, Map, Text, WriteTxn};

    fn open(path: &Path, flush_size: usize) -> DocumentPersistence {
        DocumentPersistence::open(StoreConfig::for_testing(path), flush_size).unwrap()
    }

    /// Append `text` to the editor field of `doc` and return the delta.
    fn type_text(doc: &Doc, text: &str) -> Vec<u8> {
        let mut txn = doc.transact_mut();
        let field = txn.get_or_insert_text("editorText");
        let len = field.get_string(&txn).len() as u32;
        field.insert(&mut txn, len, text);
        txn.encode_update_v1()
    }

    fn editor_text(doc: &Doc) -> String {
        let txn = doc.transact();
        txn.get_text("editorText")
            .map(|t| t.get_string(&txn))
            .unwrap_or_default()
    }

    #[test]
    fn test_namespace_lifecycle() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 100);
        let room = RoomId::generate();

        assert!(!store.namespace_exists(room));
        assert!(store.create_namespace(room).unwrap());
        assert!(!store.create_namespace(room).unwrap());
        assert!(store.namespace_exists(room));

        assert!(store.drop_namespace(room).unwrap());
        assert!(!store.drop_namespace(room).unwrap());
        assert!(store.get_doc(room).unwrap().is_none());
    }

    #[test]
    fn test_store_update_requires_namespace() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 100);
        let err = store.store_update(RoomId::generate(), &[0, 0]).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_updates_replay_into_doc() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 100);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();

        let client = Doc::new();
        store.store_update(room, &type_text(&client, "fn main() {")).unwrap();
        store.store_update(room, &type_text(&client, "}")).unwrap();

        let doc = store.get_doc(room).unwrap().unwrap();
        assert_eq!(editor_text(&doc), "fn main() {}");
        assert_eq!(store.update_count(room).unwrap(), Some(2));
    }

    #[test]
    fn test_flush_at_threshold() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 10);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();

        let client = Doc::new();
        for i in 0..9 {
            store.store_update(room, &type_text(&client, &i.to_string())).unwrap();
        }
        assert_eq!(store.update_count(room).unwrap(), Some(9));

        // The tenth update triggers compaction.
        store.store_update(room, &type_text(&client, "9")).unwrap();
        assert_eq!(store.update_count(room).unwrap(), Some(1));

        let doc = store.get_doc(room).unwrap().unwrap();
        assert_eq!(editor_text(&doc), "0123456789");
    }

    #[test]
    fn test_get_doc_does_not_write() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 3);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();

        let client = Doc::new();
        store.store_update(room, &type_text(&client, "a")).unwrap();
        store.store_update(room, &type_text(&client, "b")).unwrap();

        for _ in 0..5 {
            store.get_doc(room).unwrap().unwrap();
        }
        assert_eq!(store.update_count(room).unwrap(), Some(2));
    }

    #[test]
    fn test_flush_single_entry_is_noop() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 100);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();
        store.store_update(room, &type_text(&Doc::new(), "x")).unwrap();
        assert_eq!(store.flush_document(room).unwrap(), 0);
    }

    #[test]
    fn test_reopen_recovers_namespaces_and_clock() {
        let dir = tempdir().unwrap();
        let room = RoomId::generate();
        let last_clock = {
            let store = open(dir.path(), 100);
            store.create_namespace(room).unwrap();
            let client = Doc::new();
            store.store_update(room, &type_text(&client, "persist")).unwrap();
            store.store_update(room, &type_text(&client, "ed")).unwrap()
        };

        let store = open(dir.path(), 100);
        assert!(store.namespace_exists(room));
        let doc = store.get_doc(room).unwrap().unwrap();
        assert_eq!(editor_text(&doc), "persisted");

        let next = store.store_update(room, &type_text(&Doc::new(), "!")).unwrap();
        assert!(next > last_clock);
    }

    #[test]
    fn test_corrupt_update_is_reported() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 100);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();
        store.store_update(room, &[0xff, 0xff, 0xff]).unwrap();

        let err = store.get_doc(room).err().unwrap();
        assert!(matches!(err, CollabError::Corrupt(_)));
    }

    /// Append `key` to the shared `entries` map of `doc` and return the delta.
    fn put_entry(doc: &Doc, key: &str) -> Vec<u8> {
        let mut txn = doc.transact_mut();
        let entries = txn.get_or_insert_map("entries");
        entries.insert(&mut txn, key, true);
        txn.encode_update_v1()
    }

    #[test]
    fn test_concurrent_appends_keep_every_update() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 4);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();

        std::thread::scope(|scope| {
            for writer in 0..8 {
                let store = &store;
                scope.spawn(move || {
                    let replica = Doc::new();
                    for i in 0..50 {
                        let update = put_entry(&replica, &format!("{writer}-{i}"));
                        store.store_update(room, &update).unwrap();
                    }
                });
            }
        });

        let doc = store.get_doc(room).unwrap().unwrap();
        let txn = doc.transact();
        let entries = txn.get_map("entries").unwrap();
        assert_eq!(entries.len(&txn), 400);
        for writer in 0..8 {
            for i in 0..50 {
                assert!(entries.contains_key(&txn, &format!("{writer}-{i}")));
            }
        }
        assert!(store.update_count(room).unwrap().unwrap() < 400);
    }

    #[test]
    fn test_compaction_never_reuses_a_clock() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 100);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();

        let client = Doc::new();
        let mut last = 0;
        for chunk in ["a", "b", "c"] {
            last = store.store_update(room, &type_text(&client, chunk)).unwrap();
        }
        assert_eq!(store.flush_document(room).unwrap(), 3);

        // The merged update sits above every clock it replaced.
        let next = store.store_update(room, &type_text(&client, "d")).unwrap();
        assert!(next > last + 1);
        let doc = store.get_doc(room).unwrap().unwrap();
        assert_eq!(editor_text(&doc), "abcd");
    }

    #[test]
    fn test_drop_waits_for_in_flight_append() {
        let dir = tempdir().unwrap();
        let store = open(dir.path(), 100);
        let room = RoomId::generate();
        store.create_namespace(room).unwrap();

        // Stand in for an append that has passed its existence check.
        let in_flight = store.lock_namespace(room, |lock| lock.read_arc());

        std::thread::scope(|scope| {
            let dropper = scope.spawn(|| store.drop_namespace(room).unwrap());
            std::thread::sleep(std::time::Duration::from_millis(50));
            assert!(store.namespace_exists(room));
            assert!(!dropper.is_finished());

            drop(in_flight);
            assert!(dropper.join().unwrap());
        });

        assert!(!store.namespace_exists(room));
        let err = store.store_update(room, &type_text(&Doc::new(), "late")).unwrap_err();
        assert!(err.is_not_found());

        // A recreated namespace starts empty and takes appends again.
        assert!(store.create_namespace(room).unwrap());
        store.store_update(room, &type_text(&Doc::new(), "new")).unwrap();
        assert_eq!(store.update_count(room).unwrap(), Some(1));
    }

    #[test]
    fn test_namespaces_share_one_block_cache() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::for_testing(dir.path());
        let capacity = config.block_cache_size;
        let rooms: Vec<RoomId> = (0..64).map(|_| RoomId::generate()).collect();
        {
            let store = DocumentPersistence::open(config.clone(), 100).unwrap();
            for &room in &rooms {
                store.create_namespace(room).unwrap();
                store.store_update(room, &type_text(&Doc::new(), "x")).unwrap();
            }
        }

        let store = DocumentPersistence::open(config, 100).unwrap();
        for &room in &rooms {
            let doc = store.get_doc(room).unwrap().unwrap();
            assert_eq!(editor_text(&doc), "x");
        }
        assert!(store.cache_usage() <= capacity);
    }
}
