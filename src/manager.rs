//! Public key-store persistence contract.
//!
//! [`KeyStoreManager`] validates input, seals content and passwords through the
//! [`CipherVault`], and persists through the [`TenantStore`]. Plaintext passwords
//! only live inside zeroizing buffers for the duration of one call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, Zeroizing};

use crate::codec::KeyStoreCodec;
use crate::error::{KeyStoreError, Operation};
use crate::ledger::Stamp;
use crate::store::{
    KeyStoreMetadata, KeyStoreRecord, PutMode, RecordKey, SealedField, StorageBackend,
    TenantId, TenantStore,
};
use crate::vault::{CipherVault, MasterKeyProvider, SealedBlob};

pub type Result<T> = std::result::Result<T, KeyStoreError>;

const MAX_NAME_LEN: usize = 255;

/// Input for [`KeyStoreManager::add_keystore`].
pub struct NewKeyStore<'a> {
    pub name: &'a str,
    pub content: &'a [u8],
    pub provider: &'a str,
    pub store_type: &'a str,
    pub store_password: &'a SecretString,
    pub private_key_password: &'a SecretString,
}

pub struct KeyStoreManager<B: StorageBackend, C: KeyStoreCodec> {
    store: TenantStore<B>,
    vault: CipherVault,
    codec: C,
}

impl<B: StorageBackend, C: KeyStoreCodec> KeyStoreManager<B, C> {
    pub fn new(store: TenantStore<B>, vault: CipherVault, codec: C) -> Self {
        Self {
            store,
            vault,
            codec,
        }
    }

    /// Open a manager over `backend` with a default tenant store.
    pub fn open(
        backend: B,
        keys: Arc<dyn MasterKeyProvider>,
        codec: C,
        lock_timeout: Duration,
    ) -> Result<Self> {
        let store = TenantStore::open(backend, lock_timeout)?;
        Ok(Self::new(store, CipherVault::new(keys), codec))
    }

    pub fn store(&self) -> &TenantStore<B> {
        &self.store
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Add a new key store. The content must decode with the given type and store
    /// password; both passwords are sealed alongside it.
    pub fn add_keystore(&self, tenant_id: TenantId, new: NewKeyStore<'_>) -> Result<Stamp> {
        validate_name(new.name)?;
        validate_label("provider", new.provider)?;
        validate_label("store type", new.store_type)?;
        if new.content.is_empty() {
            return Err(KeyStoreError::validation("key store content is empty"));
        }

        self.codec
            .decode(new.content, new.store_type, new.store_password)
            .map_err(|e| {
                KeyStoreError::validation(format!(
                    "content is not a valid {} key store: {e}",
                    new.store_type
                ))
            })?;

        let key = RecordKey::new(tenant_id, new.name);
        let seal = |field, bytes: &[u8]| {
            self.seal_field(&key, field, bytes)
                .map_err(|e| e.in_operation(Operation::Add, tenant_id, new.name))
        };
        let record = KeyStoreRecord {
            tenant_id,
            name: new.name.to_string(),
            provider: new.provider.to_string(),
            store_type: new.store_type.to_string(),
            content: seal(SealedField::Content, new.content)?,
            store_password: seal(
                SealedField::StorePassword,
                new.store_password.expose_secret().as_bytes(),
            )?,
            private_key_password: seal(
                SealedField::PrivateKeyPassword,
                new.private_key_password.expose_secret().as_bytes(),
            )?,
            stamp: Stamp::default(),
        };

        let stamp = self
            .store
            .put(record, PutMode::Create)
            .map_err(|e| match e {
                KeyStoreError::Conflict { tenant_id, name, .. } => {
                    KeyStoreError::DuplicateKeyStore { tenant_id, name }
                }
                other => other.in_operation(Operation::Add, tenant_id, new.name),
            })?;

        tracing::info!(
            tenant_id,
            name = new.name,
            store_type = new.store_type,
            revision = stamp.revision,
            "key store added"
        );
        Ok(stamp)
    }

    /// Load and decode a key store.
    pub fn get_keystore(&self, name: &str, tenant_id: TenantId) -> Result<C::Handle> {
        let key = RecordKey::new(tenant_id, name);
        let wrap = |e: KeyStoreError| e.in_operation(Operation::Get, tenant_id, name);

        let record = self.store.get(&key).map_err(wrap)?;
        let password = self
            .unseal_secret(&key, SealedField::StorePassword, &record.store_password)
            .map_err(wrap)?;
        let content = self
            .unseal_field(&key, SealedField::Content, &record.content)
            .map_err(wrap)?;
        let handle = self
            .codec
            .decode(&content, &record.store_type, &password)
            .map_err(wrap)?;

        tracing::debug!(tenant_id, name, "key store loaded");
        Ok(handle)
    }

    /// Metadata of every key store of `tenant_id`, ordered by name. Never contains
    /// secret material. An unknown tenant yields an empty list.
    pub fn list_keystores(&self, tenant_id: TenantId) -> Result<Vec<KeyStoreMetadata>> {
        self.store.list(tenant_id).map_err(|e| match e {
            KeyStoreError::Storage { .. } | KeyStoreError::Io(_) => KeyStoreError::Operation {
                op: Operation::List,
                tenant_id,
                name: String::new(),
                source: Box::new(e),
            },
            other => other,
        })
    }

    /// Replace the content of an existing key store, re-encoding it with its
    /// stored store password.
    pub fn update_keystore(
        &self,
        name: &str,
        handle: &C::Handle,
        tenant_id: TenantId,
    ) -> Result<Stamp> {
        self.replace(name, handle, tenant_id, None)
    }

    /// Like [`KeyStoreManager::update_keystore`], but fails with a conflict if the
    /// key store was modified after `expected_revision`.
    pub fn update_keystore_if(
        &self,
        name: &str,
        handle: &C::Handle,
        tenant_id: TenantId,
        expected_revision: u64,
    ) -> Result<Stamp> {
        self.replace(name, handle, tenant_id, Some(expected_revision))
    }

    pub fn delete_keystore(&self, name: &str, tenant_id: TenantId) -> Result<()> {
        self.store
            .delete(&RecordKey::new(tenant_id, name))
            .map_err(|e| e.in_operation(Operation::Delete, tenant_id, name))?;
        tracing::info!(tenant_id, name, "key store deleted");
        Ok(())
    }

    pub fn get_keystore_last_modified(
        &self,
        name: &str,
        tenant_id: TenantId,
    ) -> Result<DateTime<Utc>> {
        Ok(self.get_keystore_stamp(name, tenant_id)?.modified)
    }

    /// Last-modified time and revision of a key store.
    pub fn get_keystore_stamp(&self, name: &str, tenant_id: TenantId) -> Result<Stamp> {
        self.store
            .last_modified(&RecordKey::new(tenant_id, name))
            .map_err(|e| e.in_operation(Operation::LastModified, tenant_id, name))
    }

    pub fn get_keystore_password(&self, name: &str, tenant_id: TenantId) -> Result<SecretString> {
        self.password(name, tenant_id, SealedField::StorePassword)
            .map_err(|e| e.in_operation(Operation::StorePassword, tenant_id, name))
    }

    pub fn get_private_key_password(
        &self,
        name: &str,
        tenant_id: TenantId,
    ) -> Result<SecretString> {
        self.password(name, tenant_id, SealedField::PrivateKeyPassword)
            .map_err(|e| e.in_operation(Operation::PrivateKeyPassword, tenant_id, name))
    }

    pub fn contains_keystore(&self, name: &str, tenant_id: TenantId) -> Result<bool> {
        self.store
            .contains(&RecordKey::new(tenant_id, name))
            .map_err(|e| e.in_operation(Operation::Get, tenant_id, name))
    }

    fn replace(
        &self,
        name: &str,
        handle: &C::Handle,
        tenant_id: TenantId,
        expected_revision: Option<u64>,
    ) -> Result<Stamp> {
        let key = RecordKey::new(tenant_id, name);
        let stamp = self
            .store
            .update_with(&key, expected_revision, |current| {
                let password =
                    self.unseal_secret(&key, SealedField::StorePassword, &current.store_password)?;
                let bytes = self.codec.encode(handle, &password)?;
                let content = self.seal_field(&key, SealedField::Content, &bytes)?;
                Ok(KeyStoreRecord {
                    content,
                    ..current.clone()
                })
            })
            .map_err(|e| e.in_operation(Operation::Update, tenant_id, name))?;

        tracing::info!(tenant_id, name, revision = stamp.revision, "key store updated");
        Ok(stamp)
    }

    fn password(&self, name: &str, tenant_id: TenantId, field: SealedField) -> Result<SecretString> {
        let key = RecordKey::new(tenant_id, name);
        let record = self.store.get(&key)?;
        let blob = match field {
            SealedField::StorePassword => &record.store_password,
            SealedField::PrivateKeyPassword => &record.private_key_password,
            SealedField::Content => {
                return Err(KeyStoreError::validation(
                    "key store content is not a password field",
                ))
            }
        };
        self.unseal_secret(&key, field, blob)
    }

    fn seal_field(&self, key: &RecordKey, field: SealedField, bytes: &[u8]) -> Result<SealedBlob> {
        self.vault.seal_bound(bytes, &field.binding(key))
    }

    fn unseal_field(
        &self,
        key: &RecordKey,
        field: SealedField,
        blob: &SealedBlob,
    ) -> Result<Zeroizing<Vec<u8>>> {
        self.vault.unseal_bound(blob, &field.binding(key))
    }

    fn unseal_secret(
        &self,
        key: &RecordKey,
        field: SealedField,
        blob: &SealedBlob,
    ) -> Result<SecretString> {
        let plain = self.unseal_field(key, field, blob)?;
        match String::from_utf8(plain.to_vec()) {
            Ok(s) => Ok(SecretString::new(s)),
            Err(e) => {
                e.into_bytes().zeroize();
                Err(KeyStoreError::crypto("sealed password is not valid UTF-8"))
            }
        }
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(KeyStoreError::validation("key store name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(KeyStoreError::validation(format!(
            "key store name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(KeyStoreError::validation(
            "key store name must not contain control characters",
        ));
    }
    Ok(())
}

fn validate_label(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(KeyStoreError::validation(format!("{what} must not be empty")));
    }
    Ok(())
}
