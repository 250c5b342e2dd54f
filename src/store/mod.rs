pub mod file;
pub mod locks;
pub mod memory;
pub mod record;

use std::fmt;
use std::time::Duration;

use crate::error::KeyStoreError;
use crate::ledger::{IntegrityLedger, Stamp};
use locks::LockTable;
pub use record::{KeyStoreMetadata, KeyStoreRecord, SealedField};

pub type Result<T> = std::result::Result<T, KeyStoreError>;

pub type TenantId = u32;

/// Unique identity of a key store: `(tenant, name)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub tenant_id: TenantId,
    pub name: String,
}

impl RecordKey {
    pub fn new(tenant_id: TenantId, name: &str) -> Self {
        Self {
            tenant_id,
            name: name.to_string(),
        }
    }

    pub fn storage_key(&self) -> String {
        format!("{}{}", tenant_prefix(self.tenant_id), self.name)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

pub fn tenant_prefix(tenant_id: TenantId) -> String {
    format!("{tenant_id}/")
}

/// Underlying key-value storage. Each call must be atomic on its own.
pub trait StorageBackend: Send + Sync {
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Returns `false` if the key was absent.
    fn delete(&self, key: &str) -> Result<bool>;
    fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
}

impl<T: StorageBackend + ?Sized> StorageBackend for Box<T> {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        (**self).put(key, value)
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> Result<bool> {
        (**self).delete(key)
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        (**self).list_prefix(prefix)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutMode {
    /// Key must be absent.
    Create,
    /// Key must be present.
    Replace,
    /// Key must be present at exactly this revision.
    ReplaceIfRevision(u64),
}

/// Tenant-partitioned record store. Owns persistence, per-key locking and the
/// integrity ledger; every mutation stamps and writes under the key's write lock.
pub struct TenantStore<B: StorageBackend> {
    backend: B,
    ledger: IntegrityLedger,
    locks: LockTable,
}

impl<B: StorageBackend> TenantStore<B> {
    /// Open a store over `backend`, loading ledger stamps for existing records.
    pub fn open(backend: B, lock_timeout: Duration) -> Result<Self> {
        Self::open_with_ledger(backend, lock_timeout, IntegrityLedger::new())
    }

    pub fn open_with_ledger(
        backend: B,
        lock_timeout: Duration,
        ledger: IntegrityLedger,
    ) -> Result<Self> {
        let mut stamps = Vec::new();
        for (storage_key, bytes) in backend.list_prefix("")? {
            if let Some(record) = decode_listed(&storage_key, &bytes) {
                stamps.push((record.key(), record.stamp));
            }
        }
        tracing::debug!(records = stamps.len(), "opened tenant store");
        ledger.hydrate(stamps);

        Ok(Self {
            backend,
            ledger,
            locks: LockTable::new(lock_timeout),
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Write `record` under its own key. The record's stamp is replaced with the
    /// ledger's next stamp, which is returned.
    pub fn put(&self, record: KeyStoreRecord, mode: PutMode) -> Result<Stamp> {
        let key = record.key();
        self.locks.with_write(&key, || {
            let current = self.load(&key)?;
            check_mode(&key, current.as_ref(), mode)?;
            self.commit(&key, record)
        })
    }

    /// Read-modify-write under the key's write lock. `f` receives the current
    /// record and returns its replacement; the replacement keeps the same key.
    pub fn update_with<F>(&self, key: &RecordKey, expected_revision: Option<u64>, f: F) -> Result<Stamp>
    where
        F: FnOnce(&KeyStoreRecord) -> Result<KeyStoreRecord>,
    {
        let mode = match expected_revision {
            Some(revision) => PutMode::ReplaceIfRevision(revision),
            None => PutMode::Replace,
        };
        self.locks.with_write(key, || {
            let current = self.load(key)?;
            check_mode(key, current.as_ref(), mode)?;
            let Some(current) = current else {
                return Err(not_found(key));
            };
            let mut next = f(&current)?;
            next.tenant_id = key.tenant_id;
            next.name = key.name.clone();
            self.commit(key, next)
        })
    }

    pub fn get(&self, key: &RecordKey) -> Result<KeyStoreRecord> {
        self.locks
            .with_read(key, || self.load(key)?.ok_or_else(|| not_found(key)))
    }

    pub fn contains(&self, key: &RecordKey) -> Result<bool> {
        self.locks.with_read(key, || Ok(self.load(key)?.is_some()))
    }

    /// Metadata for every readable record of `tenant_id`, ordered by name.
    /// Corrupted records are skipped; reading them by key reports the damage.
    pub fn list(&self, tenant_id: TenantId) -> Result<Vec<KeyStoreMetadata>> {
        let mut out = Vec::new();
        for (storage_key, bytes) in self.backend.list_prefix(&tenant_prefix(tenant_id))? {
            if let Some(record) = decode_listed(&storage_key, &bytes) {
                out.push(record.metadata());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    /// Remove a record and its ledger entry. Deleting an absent key is an error.
    pub fn delete(&self, key: &RecordKey) -> Result<()> {
        self.locks.with_write(key, || {
            if !self.backend.delete(&key.storage_key())? {
                return Err(not_found(key));
            }
            self.ledger.forget(key);
            Ok(())
        })
    }

    pub fn last_modified(&self, key: &RecordKey) -> Result<Stamp> {
        self.locks.with_read(key, || self.ledger.last_modified(key))
    }

    fn load(&self, key: &RecordKey) -> Result<Option<KeyStoreRecord>> {
        let storage_key = key.storage_key();
        match self.backend.get(&storage_key)? {
            Some(bytes) => Ok(Some(decode_record(&storage_key, &bytes)?)),
            None => Ok(None),
        }
    }

    // Caller holds the write lock for `key`.
    fn commit(&self, key: &RecordKey, mut record: KeyStoreRecord) -> Result<Stamp> {
        let stamp = self.ledger.next_stamp(key);
        record.stamp = stamp;
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| KeyStoreError::storage(format!("encoding record '{key}': {e}")))?;
        self.backend.put(&key.storage_key(), &bytes)?;
        self.ledger.commit(key, stamp);
        Ok(stamp)
    }
}

fn check_mode(key: &RecordKey, current: Option<&KeyStoreRecord>, mode: PutMode) -> Result<()> {
    match (mode, current) {
        (PutMode::Create, Some(_)) => Err(KeyStoreError::Conflict {
            tenant_id: key.tenant_id,
            name: key.name.clone(),
            detail: "record already exists".into(),
        }),
        (PutMode::Replace | PutMode::ReplaceIfRevision(_), None) => Err(not_found(key)),
        (PutMode::ReplaceIfRevision(expected), Some(current))
            if current.stamp.revision != expected =>
        {
            Err(KeyStoreError::Conflict {
                tenant_id: key.tenant_id,
                name: key.name.clone(),
                detail: format!(
                    "expected revision {expected}, found {}",
                    current.stamp.revision
                ),
            })
        }
        _ => Ok(()),
    }
}

fn decode_record(storage_key: &str, bytes: &[u8]) -> Result<KeyStoreRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| KeyStoreError::storage(format!("record '{storage_key}' is corrupted: {e}")))
}

// Decode a record found by a prefix scan. Undecodable records, and records
// stored under a key other than their own, are logged and skipped.
fn decode_listed(storage_key: &str, bytes: &[u8]) -> Option<KeyStoreRecord> {
    match decode_record(storage_key, bytes) {
        Ok(record) if record.key().storage_key() == storage_key => Some(record),
        Ok(record) => {
            tracing::warn!(
                storage_key,
                record_key = %record.key(),
                "skipping record stored under a foreign key"
            );
            None
        }
        Err(e) => {
            tracing::warn!(storage_key, error = %e, "skipping corrupted record");
            None
        }
    }
}

fn not_found(key: &RecordKey) -> KeyStoreError {
    KeyStoreError::NotFound {
        tenant_id: key.tenant_id,
        name: key.name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::file::FileBackend;
    use crate::store::memory::MemoryBackend;
    use crate::vault::SealedBlob;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(tenant_id: TenantId, name: &str, content: u8) -> KeyStoreRecord {
        KeyStoreRecord {
            tenant_id,
            name: name.to_string(),
            provider: "SUN".into(),
            store_type: "KSJSON".into(),
            content: SealedBlob::from_bytes(vec![content]),
            store_password: SealedBlob::from_bytes(vec![0xa]),
            private_key_password: SealedBlob::from_bytes(vec![0xb]),
            stamp: Stamp::default(),
        }
    }

    fn memory_store() -> TenantStore<MemoryBackend> {
        TenantStore::open(MemoryBackend::new(), Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn test_create_then_get() {
        let store = memory_store();
        let stamp = store.put(record(1, "a", 1), PutMode::Create).unwrap();
        let loaded = store.get(&RecordKey::new(1, "a")).unwrap();
        assert_eq!(loaded.content.as_bytes(), &[1]);
        assert_eq!(loaded.stamp, stamp);
        assert_eq!(stamp.revision, 1);
    }

    #[test]
    fn test_create_on_existing_key_conflicts() {
        let store = memory_store();
        store.put(record(1, "a", 1), PutMode::Create).unwrap();
        let err = store.put(record(1, "a", 2), PutMode::Create).unwrap_err();
        assert!(matches!(err, KeyStoreError::Conflict { .. }));
        assert_eq!(
            store.get(&RecordKey::new(1, "a")).unwrap().content.as_bytes(),
            &[1]
        );
    }

    #[test]
    fn test_replace_on_absent_key_is_not_found() {
        let store = memory_store();
        let err = store.put(record(1, "a", 1), PutMode::Replace).unwrap_err();
        assert!(matches!(err, KeyStoreError::NotFound { .. }));
    }

    #[test]
    fn test_replace_if_revision_detects_stale_writer() {
        let store = memory_store();
        let first = store.put(record(1, "a", 1), PutMode::Create).unwrap();
        store
            .put(record(1, "a", 2), PutMode::ReplaceIfRevision(first.revision))
            .unwrap();
        let err = store
            .put(record(1, "a", 3), PutMode::ReplaceIfRevision(first.revision))
            .unwrap_err();
        assert!(matches!(err, KeyStoreError::Conflict { .. }));
    }

    #[test]
    fn test_update_with_keeps_identity() {
        let store = memory_store();
        store.put(record(1, "a", 1), PutMode::Create).unwrap();
        let key = RecordKey::new(1, "a");
        store
            .update_with(&key, None, |current| {
                let mut next = current.clone();
                next.name = "hijack".into();
                next.content = SealedBlob::from_bytes(vec![9]);
                Ok(next)
            })
            .unwrap();
        assert_eq!(store.get(&key).unwrap().content.as_bytes(), &[9]);
        assert!(!store.contains(&RecordKey::new(1, "hijack")).unwrap());
    }

    #[test]
    fn test_failed_update_leaves_record_and_stamp_untouched() {
        let store = memory_store();
        let key = RecordKey::new(1, "a");
        let stamp = store.put(record(1, "a", 1), PutMode::Create).unwrap();
        let err = store
            .update_with(&key, None, |_| Err(KeyStoreError::codec("bad container")))
            .unwrap_err();
        assert!(matches!(err, KeyStoreError::Codec { .. }));
        assert_eq!(store.last_modified(&key).unwrap(), stamp);
        assert_eq!(store.get(&key).unwrap().content.as_bytes(), &[1]);
    }

    #[test]
    fn test_list_sorted_and_tenant_scoped() {
        let store = memory_store();
        store.put(record(1, "zebra", 1), PutMode::Create).unwrap();
        store.put(record(1, "apple", 1), PutMode::Create).unwrap();
        store.put(record(11, "mango", 1), PutMode::Create).unwrap();

        let names: Vec<String> = store.list(1).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["apple", "zebra"]);
        assert!(store.list(42).unwrap().is_empty());
    }

    #[test]
    fn test_delete_removes_record_and_ledger_entry() {
        let store = memory_store();
        let key = RecordKey::new(1, "a");
        store.put(record(1, "a", 1), PutMode::Create).unwrap();
        store.delete(&key).unwrap();

        assert!(matches!(store.get(&key), Err(KeyStoreError::NotFound { .. })));
        assert!(matches!(
            store.last_modified(&key),
            Err(KeyStoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete(&key),
            Err(KeyStoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_reopen_restores_ledger_from_disk() {
        let dir = TempDir::new().unwrap();
        let key = RecordKey::new(3, "persisted");
        let stamp = {
            let store =
                TenantStore::open(FileBackend::open(dir.path()).unwrap(), Duration::from_secs(1))
                    .unwrap();
            store.put(record(3, "persisted", 1), PutMode::Create).unwrap();
            store.put(record(3, "persisted", 2), PutMode::Replace).unwrap()
        };

        let store =
            TenantStore::open(FileBackend::open(dir.path()).unwrap(), Duration::from_secs(1))
                .unwrap();
        assert_eq!(store.last_modified(&key).unwrap(), stamp);
        let next = store.put(record(3, "persisted", 3), PutMode::Replace).unwrap();
        assert!(next.modified > stamp.modified);
        assert_eq!(next.revision, 3);
    }

    #[test]
    fn test_corrupted_record_is_a_storage_error() {
        let store = memory_store();
        store.backend().put("1/broken", b"{not json").unwrap();
        let err = store.get(&RecordKey::new(1, "broken")).unwrap_err();
        assert!(matches!(err, KeyStoreError::Storage { .. }));
    }

    #[test]
    fn test_corrupted_record_does_not_block_open_or_listing() {
        let dir = TempDir::new().unwrap();
        {
            let store =
                TenantStore::open(FileBackend::open(dir.path()).unwrap(), Duration::from_secs(1))
                    .unwrap();
            store.put(record(1, "good", 1), PutMode::Create).unwrap();
            store.put(record(2, "other", 2), PutMode::Create).unwrap();
            store.backend().put("1/broken", b"{not json").unwrap();
        }

        let store =
            TenantStore::open(FileBackend::open(dir.path()).unwrap(), Duration::from_secs(1))
                .unwrap();
        let names: Vec<String> = store.list(1).unwrap().into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["good"]);
        assert_eq!(
            store.get(&RecordKey::new(1, "good")).unwrap().content.as_bytes(),
            &[1]
        );
        assert_eq!(
            store.get(&RecordKey::new(2, "other")).unwrap().content.as_bytes(),
            &[2]
        );
        assert_eq!(store.last_modified(&RecordKey::new(1, "good")).unwrap().revision, 1);

        let err = store.get(&RecordKey::new(1, "broken")).unwrap_err();
        assert!(matches!(err, KeyStoreError::Storage { .. }));
    }

    #[test]
    fn test_record_under_foreign_key_is_skipped_by_listing() {
        let store = memory_store();
        let bytes = serde_json::to_vec(&record(2, "real", 1)).unwrap();
        store.backend().put("1/copied", &bytes).unwrap();
        assert!(store.list(1).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_creates_admit_exactly_one() {
        let store = Arc::new(memory_store());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.put(record(1, "race", i), PutMode::Create))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(wins, 1);
    }
}
