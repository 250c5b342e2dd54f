pub mod add;
pub mod delete;
pub mod init;
pub mod list;
pub mod modified;
pub mod password;
pub mod show;
pub mod update;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use keystash::config::{self, BackendKind};
use keystash::{
    CipherVault, EnvelopeCodec, FileBackend, KeyStoreManager, MemoryBackend,
    PassphraseKeyProvider, SealedBlob, StorageBackend, TenantStore,
};
use secrecy::SecretString;

pub type Manager = KeyStoreManager<Box<dyn StorageBackend>, EnvelopeCodec>;

const PASSPHRASE_ENV: &str = "KEYSTASH_PASSPHRASE";
const CANARY: &[u8] = b"keystash-canary-v1";

/// Read the master passphrase from `KEYSTASH_PASSPHRASE`, or prompt for it.
pub fn read_passphrase() -> Result<SecretString> {
    if let Ok(passphrase) = std::env::var(PASSPHRASE_ENV) {
        return Ok(SecretString::new(passphrase));
    }
    let passphrase = rpassword::prompt_password("Master passphrase: ")
        .context("Failed to read master passphrase")?;
    Ok(SecretString::new(passphrase))
}

pub fn prompt_secret(prompt: &str) -> Result<SecretString> {
    let value = rpassword::prompt_password(prompt).with_context(|| format!("Failed to read {prompt}"))?;
    if value.is_empty() {
        bail!("Password must not be empty.");
    }
    Ok(SecretString::new(value))
}

pub fn seal_canary(vault: &CipherVault) -> Result<String> {
    let blob = vault.seal(CANARY)?;
    Ok(hex::encode(blob.as_bytes()))
}

/// Load config, derive the master key and open the configured backend.
pub fn open_manager() -> Result<Manager> {
    let root = config::project_root()?;
    let cfg = config::read(&root)?;

    let passphrase = read_passphrase()?;
    let keys = PassphraseKeyProvider::new(
        &passphrase,
        &cfg.salt_bytes()?,
        &cfg.kdf_params(),
        cfg.key_version,
    )?;
    let vault = CipherVault::new(Arc::new(keys));

    if let Some(canary) = &cfg.canary {
        let blob = SealedBlob::from_bytes(
            hex::decode(canary).context("Invalid canary hex in config.toml")?,
        );
        let plain = vault
            .unseal(&blob)
            .context("Failed to unlock store: wrong master passphrase?")?;
        if plain.as_slice() != CANARY {
            bail!("Failed to unlock store: canary mismatch.");
        }
    }

    let backend: Box<dyn StorageBackend> = match cfg.backend {
        BackendKind::File => Box::new(
            FileBackend::open(&config::records_path(&root))
                .context("Failed to open record directory")?,
        ),
        BackendKind::Memory => {
            tracing::warn!("memory backend configured; nothing will be persisted");
            Box::new(MemoryBackend::new())
        }
    };

    let store = TenantStore::open(backend, cfg.lock_timeout()).context("Failed to open store")?;
    Ok(KeyStoreManager::new(store, vault, EnvelopeCodec))
}
