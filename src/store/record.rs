use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::Stamp;
use crate::store::{RecordKey, TenantId};
use crate::vault::SealedBlob;

/// Persisted form of one key store. Secret fields are sealed; metadata is plain.
///
/// `stamp` is assigned by the store on every write; any value supplied by the
/// caller is overwritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStoreRecord {
    pub tenant_id: TenantId,
    pub name: String,
    pub provider: String,
    pub store_type: String,
    pub content: SealedBlob,
    pub store_password: SealedBlob,
    pub private_key_password: SealedBlob,
    #[serde(default)]
    pub stamp: Stamp,
}

impl KeyStoreRecord {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.tenant_id, &self.name)
    }

    pub fn metadata(&self) -> KeyStoreMetadata {
        KeyStoreMetadata {
            name: self.name.clone(),
            provider: self.provider.clone(),
            store_type: self.store_type.clone(),
            last_modified: self.stamp.modified,
            revision: self.stamp.revision,
        }
    }
}

/// Listing view of a key store. Carries no secret material.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct KeyStoreMetadata {
    pub name: String,
    pub provider: String,
    pub store_type: String,
    pub last_modified: DateTime<Utc>,
    pub revision: u64,
}

/// Sealed-field labels, used as associated data when sealing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SealedField {
    Content,
    StorePassword,
    PrivateKeyPassword,
}

impl SealedField {
    fn label(self) -> &'static str {
        match self {
            SealedField::Content => "content",
            SealedField::StorePassword => "store_password",
            SealedField::PrivateKeyPassword => "private_key_password",
        }
    }

    /// Associated data binding a sealed value to its record and field.
    pub fn binding(self, key: &RecordKey) -> Vec<u8> {
        format!("{}#{}", key.storage_key(), self.label()).into_bytes()
    }
}
