//! In-memory blob store
//!
//! Backing of choice for tests, the desktop simulator, and any deployment
//! that accepts losing the overflow backlog on power loss. Supports injected
//! write failures so failure paths can be exercised deterministically.

use std::collections::HashMap;

use crate::errors::StorageError;
use crate::storage::BlobStore;

/// HashMap-backed [`BlobStore`]
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, Vec<u8>>,
    counters: HashMap<String, i64>,
    write_failures: u32,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` mutating calls fail with `WriteFailed`
    pub fn fail_next_writes(&mut self, n: u32) {
        self.write_failures = n;
    }

    fn check_write(&mut self) -> Result<(), StorageError> {
        if self.write_failures > 0 {
            self.write_failures -= 1;
            return Err(StorageError::WriteFailed("injected failure".into()));
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn set_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.check_write()?;
        self.blobs.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get_blob(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn blob_size(&self, key: &str) -> Result<usize, StorageError> {
        self.blobs
            .get(key)
            .map(Vec::len)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    fn erase(&mut self, key: &str) -> Result<(), StorageError> {
        self.check_write()?;
        self.blobs.remove(key);
        self.counters.remove(key);
        Ok(())
    }

    fn get_counter(&self, key: &str) -> Result<Option<i64>, StorageError> {
        Ok(self.counters.get(key).copied())
    }

    fn set_counter(&mut self, key: &str, value: i64) -> Result<(), StorageError> {
        self.check_write()?;
        self.counters.insert(key.to_string(), value);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        // Nothing buffered; every write already landed
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let mut store = MemoryBlobStore::new();
        store.set_blob("k", &[1, 2, 3]).unwrap();

        assert_eq!(store.get_blob("k").unwrap(), vec![1, 2, 3]);
        assert_eq!(store.blob_size("k").unwrap(), 3);

        store.erase("k").unwrap();
        assert!(matches!(store.get_blob("k"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn counters_start_absent() {
        let mut store = MemoryBlobStore::new();
        assert_eq!(store.get_counter("c").unwrap(), None);

        store.set_counter("c", 7).unwrap();
        assert_eq!(store.get_counter("c").unwrap(), Some(7));
    }

    #[test]
    fn injected_failures_are_consumed() {
        let mut store = MemoryBlobStore::new();
        store.fail_next_writes(1);

        assert!(store.set_blob("k", &[0]).is_err());
        assert!(store.set_blob("k", &[0]).is_ok());
    }
}
