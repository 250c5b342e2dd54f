//! Conversion between key-store container bytes and an in-memory key store.
//!
//! The manager only depends on [`KeyStoreCodec`]. [`EnvelopeCodec`] is the
//! built-in container: a JSON document of entries guarded by a password-keyed
//! SHA-256 digest.

use std::collections::BTreeMap;
use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyStoreError;

pub type Result<T> = std::result::Result<T, KeyStoreError>;

pub trait KeyStoreCodec: Send + Sync {
    type Handle;

    /// Parse container bytes of the given store type, verifying them with `password`.
    fn decode(&self, bytes: &[u8], store_type: &str, password: &SecretString)
        -> Result<Self::Handle>;

    /// Serialize a key store, protecting it with `password`.
    fn encode(&self, handle: &Self::Handle, password: &SecretString) -> Result<Zeroizing<Vec<u8>>>;
}

pub const ENVELOPE_TYPE: &str = "KSJSON";
const ENVELOPE_FORMAT: &str = "keystash-envelope";
const ENVELOPE_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    PrivateKey,
    Certificate,
    SecretKey,
}

/// One aliased entry of a key store. Key bytes are zeroized on drop.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeyEntry {
    #[zeroize(skip)]
    pub kind: EntryKind,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl fmt::Debug for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyEntry")
            .field("kind", &self.kind)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

/// In-memory key store produced by [`EnvelopeCodec`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyStoreHandle {
    pub entries: BTreeMap<String, KeyEntry>,
}

impl KeyStoreHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, alias: &str, kind: EntryKind, data: &[u8]) -> Self {
        self.insert(alias, kind, data);
        self
    }

    pub fn insert(&mut self, alias: &str, kind: EntryKind, data: &[u8]) {
        self.entries.insert(
            alias.to_string(),
            KeyEntry {
                kind,
                data: data.to_vec(),
            },
        );
    }

    pub fn get(&self, alias: &str) -> Option<&KeyEntry> {
        self.entries.get(alias)
    }

    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: String,
    version: u32,
    entries: BTreeMap<String, KeyEntry>,
    digest: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    fn digest(password: &SecretString, entries: &BTreeMap<String, KeyEntry>) -> Result<Vec<u8>> {
        let body = Zeroizing::new(
            serde_json::to_vec(entries).map_err(|e| KeyStoreError::codec(e.to_string()))?,
        );
        let mut hasher = Sha256::new();
        hasher.update(password.expose_secret().as_bytes());
        hasher.update(ENVELOPE_FORMAT.as_bytes());
        hasher.update(body.as_slice());
        Ok(hasher.finalize().to_vec())
    }
}

impl KeyStoreCodec for EnvelopeCodec {
    type Handle = KeyStoreHandle;

    fn decode(
        &self,
        bytes: &[u8],
        store_type: &str,
        password: &SecretString,
    ) -> Result<KeyStoreHandle> {
        if !store_type.eq_ignore_ascii_case(ENVELOPE_TYPE) {
            return Err(KeyStoreError::codec(format!(
                "unsupported store type '{store_type}' (expected {ENVELOPE_TYPE})"
            )));
        }

        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| KeyStoreError::codec(format!("malformed container: {e}")))?;

        if envelope.format != ENVELOPE_FORMAT {
            return Err(KeyStoreError::codec(format!(
                "unknown container format '{}'",
                envelope.format
            )));
        }
        if envelope.version != ENVELOPE_VERSION {
            return Err(KeyStoreError::codec(format!(
                "unsupported container version {}",
                envelope.version
            )));
        }

        let stored = hex::decode(&envelope.digest)
            .map_err(|_| KeyStoreError::codec("container digest is not valid hex"))?;
        let expected = Self::digest(password, &envelope.entries)?;
        if !constant_time_eq(&stored, &expected) {
            return Err(KeyStoreError::codec(
                "container integrity check failed (wrong password or tampered content)",
            ));
        }

        Ok(KeyStoreHandle {
            entries: envelope.entries,
        })
    }

    fn encode(
        &self,
        handle: &KeyStoreHandle,
        password: &SecretString,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let envelope = Envelope {
            format: ENVELOPE_FORMAT.to_string(),
            version: ENVELOPE_VERSION,
            entries: handle.entries.clone(),
            digest: hex::encode(Self::digest(password, &handle.entries)?),
        };
        serde_json::to_vec(&envelope)
            .map(Zeroizing::new)
            .map_err(|e| KeyStoreError::codec(e.to_string()))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
