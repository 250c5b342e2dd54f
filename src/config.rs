use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KeyStoreError;
use crate::vault::KdfParams;

const CONFIG_DIR: &str = ".keystash";
const CONFIG_FILE: &str = "config.toml";
const RECORDS_DIR: &str = "records";

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Memory,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    pub backend: BackendKind,
    pub kdf: String,
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
    /// Hex-encoded 32-byte salt for Argon2id.
    pub salt: String,
    /// Version tagged onto every sealed blob.
    #[serde(default = "default_key_version")]
    pub key_version: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Hex-encoded sealed canary used to check the master passphrase on open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canary: Option<String>,
}

fn default_key_version() -> u32 {
    1
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Config {
    pub fn default_new(salt_hex: String) -> Self {
        let kdf = KdfParams::default();
        Self {
            version: 1,
            backend: BackendKind::File,
            kdf: "argon2id".into(),
            m_cost: kdf.m_cost,
            t_cost: kdf.t_cost,
            p_cost: kdf.p_cost,
            salt: salt_hex,
            key_version: default_key_version(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            canary: None,
        }
    }

    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            m_cost: self.m_cost,
            t_cost: self.t_cost,
            p_cost: self.p_cost,
        }
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>, KeyStoreError> {
        hex::decode(&self.salt)
            .map_err(|_| KeyStoreError::Config("Invalid salt hex in config.toml".into()))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    fn validate(&self) -> Result<(), KeyStoreError> {
        if self.kdf != "argon2id" {
            return Err(KeyStoreError::Config(format!(
                "Unsupported kdf '{}' (only argon2id is supported)",
                self.kdf
            )));
        }
        if self.lock_timeout_ms == 0 {
            return Err(KeyStoreError::Config(
                "lock_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Returns the `.keystash` directory for a given project root.
pub fn keystash_dir(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR)
}

/// Returns the config file path for a given project root.
pub fn config_path(project_root: &Path) -> PathBuf {
    keystash_dir(project_root).join(CONFIG_FILE)
}

/// Returns the record directory used by the file backend.
pub fn records_path(project_root: &Path) -> PathBuf {
    keystash_dir(project_root).join(RECORDS_DIR)
}

/// Read and parse config from the given project root. Returns an error if not initialized.
pub fn read(project_root: &Path) -> Result<Config, KeyStoreError> {
    let path = config_path(project_root);
    if !path.exists() {
        return Err(KeyStoreError::Config(
            "keystash is not initialized here. Run `keystash init` first.".into(),
        ));
    }
    let raw = std::fs::read_to_string(&path)?;
    let config: Config = toml::from_str(&raw).map_err(|e| KeyStoreError::Config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Write config to the given project root. Creates the `.keystash` directory if needed.
pub fn write(project_root: &Path, config: &Config) -> Result<(), KeyStoreError> {
    let dir = keystash_dir(project_root);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(CONFIG_FILE);
    let raw = toml::to_string(config).map_err(|e| KeyStoreError::Config(e.to_string()))?;
    std::fs::write(path, raw)?;
    Ok(())
}

/// Returns the current project root (cwd).
pub fn project_root() -> Result<PathBuf, KeyStoreError> {
    std::env::current_dir().map_err(KeyStoreError::Io)
}
