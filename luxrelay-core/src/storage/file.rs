//! Filesystem-backed blob store
//!
//! Production backend for std targets (gateway builds, the desktop
//! simulator): one file per key under a directory the caller owns. Blob
//! writes go through a temp file followed by a rename, so a power cut during
//! a write leaves either the old value or the new one, never a torn blob.
//! That matches the per-call atomicity the NVS backend gives on-device.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::errors::StorageError;
use crate::storage::BlobStore;

const BLOB_EXT: &str = "blob";
const COUNTER_EXT: &str = "ctr";

/// Directory-per-store, file-per-key [`BlobStore`]
#[derive(Debug)]
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| StorageError::WriteFailed(format!("create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{key}.{ext}"))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)
            .map_err(|e| StorageError::WriteFailed(format!("create {}: {e}", tmp.display())))?;
        file.write_all(bytes)
            .and_then(|_| file.sync_all())
            .map_err(|e| StorageError::WriteFailed(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, path)
            .map_err(|e| StorageError::WriteFailed(format!("rename to {}: {e}", path.display())))
    }
}

impl BlobStore for FileBlobStore {
    fn set_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.write_atomic(&self.path_for(key, BLOB_EXT), bytes)
    }

    fn get_blob(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key, BLOB_EXT);
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::read(&path).map_err(|e| StorageError::WriteFailed(format!("read {}: {e}", path.display())))
    }

    fn blob_size(&self, key: &str) -> Result<usize, StorageError> {
        let path = self.path_for(key, BLOB_EXT);
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.len() as usize),
            Err(_) => Err(StorageError::NotFound(key.to_string())),
        }
    }

    fn erase(&mut self, key: &str) -> Result<(), StorageError> {
        for ext in [BLOB_EXT, COUNTER_EXT] {
            let path = self.path_for(key, ext);
            if path.exists() {
                fs::remove_file(&path).map_err(|e| {
                    StorageError::WriteFailed(format!("remove {}: {e}", path.display()))
                })?;
            }
        }
        Ok(())
    }

    fn get_counter(&self, key: &str) -> Result<Option<i64>, StorageError> {
        let path = self.path_for(key, COUNTER_EXT);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| StorageError::WriteFailed(format!("read {}: {e}", path.display())))?;
        text.trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| StorageError::Corrupt("counter file does not parse as an integer"))
    }

    fn set_counter(&mut self, key: &str, value: i64) -> Result<(), StorageError> {
        self.write_atomic(&self.path_for(key, COUNTER_EXT), value.to_string().as_bytes())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        // Each write already synced and renamed into place
        debug!("commit: nothing buffered");
        Ok(())
    }
}
