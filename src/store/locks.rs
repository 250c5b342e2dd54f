use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::error::KeyStoreError;
use crate::store::RecordKey;

pub type Result<T> = std::result::Result<T, KeyStoreError>;

/// Per-key reader/writer locks with a bounded wait.
///
/// Entries are created on first use and dropped again once no caller holds or
/// waits on them.
pub struct LockTable {
    locks: Mutex<HashMap<RecordKey, Arc<RwLock<()>>>>,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Run `f` holding the exclusive lock for `key`.
    pub fn with_write<T>(&self, key: &RecordKey, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.entry(key);
        let result = match lock.try_write_for(self.timeout) {
            Some(_guard) => f(),
            None => Err(self.timed_out(key)),
        };
        self.release(key, lock);
        result
    }

    /// Run `f` holding a shared lock for `key`.
    pub fn with_read<T>(&self, key: &RecordKey, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.entry(key);
        let result = match lock.try_read_for(self.timeout) {
            Some(_guard) => f(),
            None => Err(self.timed_out(key)),
        };
        self.release(key, lock);
        result
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().len()
    }

    fn entry(&self, key: &RecordKey) -> Arc<RwLock<()>> {
        self.locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn release(&self, key: &RecordKey, lock: Arc<RwLock<()>>) {
        let mut locks = self.locks.lock();
        // One reference in the table, one held here: nobody else is using it.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    fn timed_out(&self, key: &RecordKey) -> KeyStoreError {
        tracing::warn!(
            tenant_id = key.tenant_id,
            name = %key.name,
            "lock wait exceeded {:?}",
            self.timeout
        );
        KeyStoreError::Timeout {
            tenant_id: key.tenant_id,
            name: key.name.clone(),
            waited_ms: self.timeout.as_millis() as u64,
        }
    }
}
