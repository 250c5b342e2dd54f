use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::KeyStoreError;
use crate::store::{Result, StorageBackend};

const TMP_PREFIX: &str = ".tmp.";
const KEY_LEN_BYTES: usize = 4;
const FILE_NAME_LEN: usize = 64;

/// Directory backend: one file per record.
///
/// Files are named by the hex SHA-256 of the storage key, so the name length is
/// fixed whatever the key. Each file starts with the key itself (u32 BE length,
/// then UTF-8 bytes) followed by the value, which lets prefix scans recover keys.
///
/// Writes go to a temp file which is fsynced and renamed over the target, so a
/// reader or a crash sees either the old or the new record, never a partial one.
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Open (and create if needed) a backend rooted at `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(file_name_for(key))
    }
}

fn file_name_for(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn frame(key: &str, value: &[u8]) -> Result<Vec<u8>> {
    let key_len = u32::try_from(key.len())
        .map_err(|_| KeyStoreError::storage(format!("key of {} bytes is too long", key.len())))?;
    let mut out = Vec::with_capacity(KEY_LEN_BYTES + key.len() + value.len());
    out.extend_from_slice(&key_len.to_be_bytes());
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(value);
    Ok(out)
}

/// Split a record file into its stored key and value.
fn unframe(mut bytes: Vec<u8>) -> Option<(String, Vec<u8>)> {
    let len_bytes: [u8; KEY_LEN_BYTES] = bytes.get(..KEY_LEN_BYTES)?.try_into().ok()?;
    let key_end = KEY_LEN_BYTES.checked_add(u32::from_be_bytes(len_bytes) as usize)?;
    let key = std::str::from_utf8(bytes.get(KEY_LEN_BYTES..key_end)?)
        .ok()?
        .to_string();
    let value = bytes.split_off(key_end);
    Some((key, value))
}

fn is_record_file_name(name: &str) -> bool {
    name.len() == FILE_NAME_LEN && name.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

impl StorageBackend for FileBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let framed = frame(key, value)?;
        let tmp_path = self
            .dir
            .join(format!("{TMP_PREFIX}{}", rand::random::<u64>()));

        let written = (|| -> std::io::Result<()> {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            tmp.write_all(&framed)?;
            tmp.sync_all()?;
            std::fs::rename(&tmp_path, self.path_for(key))
        })();

        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(KeyStoreError::storage(format!("write of '{key}' failed: {e}")));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(key)) {
            Ok(bytes) => match unframe(bytes) {
                Some((stored, value)) if stored == key => Ok(Some(value)),
                _ => Err(KeyStoreError::storage(format!(
                    "record file for '{key}' is corrupted"
                ))),
            },
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KeyStoreError::storage(format!("read of '{key}' failed: {e}"))),
        }
    }

    fn delete(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(KeyStoreError::storage(format!(
                "delete of '{key}' failed: {e}"
            ))),
        }
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            // Temp files and foreign files in the directory are ignored.
            if !is_record_file_name(file_name) {
                continue;
            }
            let bytes = match std::fs::read(entry.path()) {
                Ok(bytes) => bytes,
                // Deleted between read_dir and read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(KeyStoreError::storage(format!(
                        "read of '{file_name}' failed: {e}"
                    )))
                }
            };
            match unframe(bytes) {
                Some((key, value)) if file_name_for(&key) == file_name => {
                    if key.starts_with(prefix) {
                        out.push((key, value));
                    }
                }
                _ => tracing::warn!(file = file_name, "skipping unreadable record file"),
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_put_get_roundtrip_on_disk() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("5/ts1", b"record").unwrap();

        let reopened = FileBackend::open(dir.path()).unwrap();
        assert_eq!(reopened.get("5/ts1").unwrap().as_deref(), Some(&b"record"[..]));
    }

    #[test]
    fn test_put_overwrites_and_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("1/a", b"old").unwrap();
        backend.put("1/a", b"new").unwrap();

        assert_eq!(backend.get("1/a").unwrap().as_deref(), Some(&b"new"[..]));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].starts_with(TMP_PREFIX));
        assert_eq!(names[0].len(), FILE_NAME_LEN);
    }

    #[test]
    fn test_names_with_separators_are_safe() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("1/../../etc/passwd", b"x").unwrap();
        assert!(backend.get("1/../../etc/passwd").unwrap().is_some());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_long_multibyte_key_fits_in_a_file_name() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        let key = format!("1/{}", "é中".repeat(128));
        backend.put(&key, b"record").unwrap();

        assert_eq!(backend.get(&key).unwrap().as_deref(), Some(&b"record"[..]));
        assert_eq!(
            backend.list_prefix("1/").unwrap(),
            vec![(key.clone(), b"record".to_vec())]
        );
        assert!(backend.delete(&key).unwrap());
        assert!(backend.get(&key).unwrap().is_none());
    }

    #[test]
    fn test_delete_missing_returns_false() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        assert!(!backend.delete("1/missing").unwrap());
    }

    #[test]
    fn test_list_prefix_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("1/zebra", b"z").unwrap();
        backend.put("1/apple", b"a").unwrap();
        backend.put("11/apple", b"x").unwrap();
        std::fs::write(dir.path().join("README"), b"not a record").unwrap();

        let keys: Vec<String> = backend
            .list_prefix("1/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["1/apple", "1/zebra"]);
    }

    #[test]
    fn test_truncated_record_file_is_corrupted_and_skipped_by_listing() {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::open(dir.path()).unwrap();
        backend.put("1/good", b"ok").unwrap();
        std::fs::write(backend.path_for("1/bad"), [0, 0, 0, 9, b'1']).unwrap();

        let err = backend.get("1/bad").unwrap_err();
        assert!(matches!(err, KeyStoreError::Storage { .. }));
        let keys: Vec<String> = backend
            .list_prefix("1/")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["1/good"]);
    }
}
