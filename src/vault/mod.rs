//! Authenticated encryption of key-store material at rest.
//!
//! Sealed blob layout: `key version (u32 BE) || nonce (12 bytes) || ciphertext+tag`.

pub mod master_key;

use std::sync::Arc;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroizing;

use crate::error::KeyStoreError;
pub use master_key::{
    KdfParams, MasterKey, MasterKeyProvider, PassphraseKeyProvider, StaticKeyProvider, KEY_LEN,
};

pub type Result<T> = std::result::Result<T, KeyStoreError>;

pub const NONCE_LEN: usize = 12;
const VERSION_LEN: usize = 4;
const TAG_LEN: usize = 16;

/// Opaque sealed bytes. Serialized as a hex string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SealedBlob(Vec<u8>);

impl SealedBlob {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Version of the master key this blob was sealed with, if the header is intact.
    pub fn key_version(&self) -> Option<u32> {
        let header: [u8; VERSION_LEN] = self.0.get(..VERSION_LEN)?.try_into().ok()?;
        Some(u32::from_be_bytes(header))
    }
}

impl Serialize for SealedBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for SealedBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s)
            .map(SealedBlob)
            .map_err(serde::de::Error::custom)
    }
}

/// AES-256-GCM sealing with keys from a [`MasterKeyProvider`].
#[derive(Clone)]
pub struct CipherVault {
    keys: Arc<dyn MasterKeyProvider>,
}

impl CipherVault {
    pub fn new(keys: Arc<dyn MasterKeyProvider>) -> Self {
        Self { keys }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<SealedBlob> {
        self.seal_bound(plaintext, &[])
    }

    pub fn unseal(&self, blob: &SealedBlob) -> Result<Zeroizing<Vec<u8>>> {
        self.unseal_bound(blob, &[])
    }

    /// Seal `plaintext`, authenticating `aad` alongside it. The same `aad` must be
    /// presented to [`CipherVault::unseal_bound`].
    pub fn seal_bound(&self, plaintext: &[u8], aad: &[u8]) -> Result<SealedBlob> {
        let key = self.keys.current_key()?;
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| KeyStoreError::crypto("invalid master key length"))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| KeyStoreError::crypto("encryption failed"))?;

        let mut out = Vec::with_capacity(VERSION_LEN + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&key.version().to_be_bytes());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(SealedBlob(out))
    }

    /// Verify and decrypt a blob. Any header, key-version or tag mismatch is a
    /// `Crypto` error; no plaintext is returned unless the tag verifies.
    pub fn unseal_bound(&self, blob: &SealedBlob, aad: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = blob.as_bytes();
        if bytes.len() < VERSION_LEN + NONCE_LEN + TAG_LEN {
            return Err(KeyStoreError::crypto(
                "sealed blob too short to contain header and tag",
            ));
        }

        let (header, rest) = bytes.split_at(VERSION_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);
        let version = u32::from_be_bytes([header[0], header[1], header[2], header[3]]);

        let key = self.keys.key(version)?;
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| KeyStoreError::crypto("invalid master key length"))?;

        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| {
                tracing::warn!(key_version = version, "sealed blob failed authentication");
                KeyStoreError::crypto("authentication tag mismatch (wrong key or tampered data)")
            })?;

        Ok(Zeroizing::new(plaintext))
    }
}
