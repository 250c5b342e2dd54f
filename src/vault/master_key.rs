use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyStoreError;

pub type Result<T> = std::result::Result<T, KeyStoreError>;

pub const KEY_LEN: usize = 32;

/// A versioned AES-256 master key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    #[zeroize(skip)]
    version: u32,
    bytes: [u8; KEY_LEN],
}

impl MasterKey {
    pub fn new(version: u32, bytes: [u8; KEY_LEN]) -> Self {
        Self { version, bytes }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

/// Source of master keys for the cipher vault.
///
/// `current_key` is used for every seal. `key` resolves the version tagged on an
/// existing blob, so older versions stay readable once rotation exists.
pub trait MasterKeyProvider: Send + Sync {
    fn current_key(&self) -> Result<MasterKey>;
    fn key(&self, version: u32) -> Result<MasterKey>;
}

/// Provider holding a single raw key.
pub struct StaticKeyProvider {
    key: MasterKey,
}

impl StaticKeyProvider {
    pub fn new(version: u32, bytes: [u8; KEY_LEN]) -> Self {
        Self {
            key: MasterKey::new(version, bytes),
        }
    }
}

impl MasterKeyProvider for StaticKeyProvider {
    fn current_key(&self) -> Result<MasterKey> {
        Ok(MasterKey::new(self.key.version, self.key.bytes))
    }

    fn key(&self, version: u32) -> Result<MasterKey> {
        if version != self.key.version {
            return Err(KeyStoreError::crypto(format!(
                "master key version {version} is not available"
            )));
        }
        self.current_key()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KdfParams {
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: 65536, // 64 MB
            t_cost: 3,
            p_cost: 4,
        }
    }
}

/// Provider deriving the master key from a passphrase with Argon2id.
/// The key is derived once at construction; the passphrase is not retained.
pub struct PassphraseKeyProvider {
    key: MasterKey,
}

impl PassphraseKeyProvider {
    pub fn new(
        passphrase: &SecretString,
        salt: &[u8],
        params: &KdfParams,
        version: u32,
    ) -> Result<Self> {
        let bytes = derive_key(passphrase.expose_secret().as_bytes(), salt, params)?;
        Ok(Self {
            key: MasterKey::new(version, *bytes),
        })
    }
}

impl MasterKeyProvider for PassphraseKeyProvider {
    fn current_key(&self) -> Result<MasterKey> {
        Ok(MasterKey::new(self.key.version, self.key.bytes))
    }

    fn key(&self, version: u32) -> Result<MasterKey> {
        if version != self.key.version {
            return Err(KeyStoreError::crypto(format!(
                "master key version {version} is not available"
            )));
        }
        self.current_key()
    }
}

/// Derive a 32-byte AES key from the given passphrase and salt using Argon2id.
/// The returned buffer is zeroized on drop.
fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let argon2_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| KeyStoreError::Config(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    argon2
        .hash_password_into(passphrase, salt, key.as_mut_slice())
        .map_err(|e| KeyStoreError::crypto(format!("key derivation failed: {e}")))?;

    Ok(key)
}
