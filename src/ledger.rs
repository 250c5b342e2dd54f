//! Last-modified bookkeeping per `(tenant, name)`.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::KeyStoreError;
use crate::store::RecordKey;

pub type Result<T> = std::result::Result<T, KeyStoreError>;

/// Modification stamp of one record. Both fields strictly increase on every
/// write to the same key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Stamp {
    pub modified: DateTime<Utc>,
    pub revision: u64,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct IntegrityLedger {
    entries: Mutex<HashMap<RecordKey, Stamp>>,
    clock: Clock,
}

impl Default for IntegrityLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityLedger {
    pub fn new() -> Self {
        Self::with_clock(Box::new(Utc::now))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Rebuild the ledger from persisted stamps.
    pub fn hydrate(&self, stamps: impl IntoIterator<Item = (RecordKey, Stamp)>) {
        let mut entries = self.entries.lock();
        for (key, stamp) in stamps {
            entries.insert(key, stamp);
        }
    }

    /// Compute the stamp the next write to `key` will carry, without publishing it.
    ///
    /// Callers must hold the key's write lock until [`IntegrityLedger::commit`],
    /// otherwise two writers can be handed the same stamp.
    pub fn next_stamp(&self, key: &RecordKey) -> Stamp {
        let entries = self.entries.lock();
        self.successor(entries.get(key).copied())
    }

    /// Publish a stamp obtained from [`IntegrityLedger::next_stamp`] once the data write succeeded.
    pub fn commit(&self, key: &RecordKey, stamp: Stamp) {
        self.entries.lock().insert(key.clone(), stamp);
    }

    /// Stamp and publish a write in one step.
    pub fn record_write(&self, key: &RecordKey) -> Stamp {
        let mut entries = self.entries.lock();
        let stamp = self.successor(entries.get(key).copied());
        entries.insert(key.clone(), stamp);
        stamp
    }

    pub fn last_modified(&self, key: &RecordKey) -> Result<Stamp> {
        self.entries
            .lock()
            .get(key)
            .copied()
            .ok_or_else(|| KeyStoreError::NotFound {
                tenant_id: key.tenant_id,
                name: key.name.clone(),
            })
    }

    pub fn forget(&self, key: &RecordKey) {
        self.entries.lock().remove(key);
    }

    fn successor(&self, previous: Option<Stamp>) -> Stamp {
        let now = (self.clock)();
        match previous {
            None => Stamp {
                modified: now,
                revision: 1,
            },
            Some(prev) => {
                // Clock may stall or step backwards; never reuse or rewind a stamp.
                let floor = prev.modified + Duration::microseconds(1);
                Stamp {
                    modified: now.max(floor),
                    revision: prev.revision + 1,
                }
            }
        }
    }
}
