//! Multi-tenant key store persistence.
//!
//! Key-store containers and their passwords are sealed at rest with AES-256-GCM,
//! keyed by `(tenant, name)`, mutated under per-key locks and stamped with
//! strictly increasing modification times.

pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod store;
pub mod vault;

pub use codec::{EntryKind, EnvelopeCodec, KeyEntry, KeyStoreCodec, KeyStoreHandle};
pub use error::{ErrorKind, KeyStoreError, Operation};
pub use ledger::{IntegrityLedger, Stamp};
pub use manager::{KeyStoreManager, NewKeyStore};
pub use store::file::FileBackend;
pub use store::memory::MemoryBackend;
pub use store::{
    KeyStoreMetadata, KeyStoreRecord, PutMode, RecordKey, StorageBackend, TenantId, TenantStore,
};
pub use vault::{
    CipherVault, MasterKeyProvider, PassphraseKeyProvider, SealedBlob, StaticKeyProvider,
};
