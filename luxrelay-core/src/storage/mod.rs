//! Durable Overflow Store for Undeliverable Readings
//!
//! ## Overview
//!
//! When a send cycle cannot deliver (no network, collector down, credentials
//! broken), the drained readings land here and survive power loss. The store
//! is append-only at batch granularity: each failed cycle's readings become
//! one blob under the next sequence number, plus a pair of committed
//! counters.
//!
//! ```text
//! durable keys:
//! ├── batch_first = 3      (oldest live sequence, advances on eviction)
//! ├── batch_count = 2      (number of live batches)
//! ├── batch_3 → [12-byte records ...]
//! └── batch_4 → [12-byte records ...]
//! ```
//!
//! ## Why append-only batches?
//!
//! Rewriting one giant blob on every save means a full read-modify-write
//! against a wear-leveled flash store: peak heap usage proportional to the
//! backlog and a window where a power cut corrupts everything already saved.
//! Appending a small blob and bumping a counter touches only new data.
//!
//! ## Capacity and eviction
//!
//! Total stored readings are bounded (default 960). When a save would exceed
//! the bound, the oldest live batches are erased and `batch_first` advances,
//! keeping live sequence numbers contiguous without renumbering a single
//! surviving blob. A full [`OverflowStore::clear`] after confirmed delivery
//! resets both counters so numbering restarts at 0.
//!
//! ## Collaborator contract
//!
//! The [`BlobStore`] implementation must make each call independently
//! atomic/committed (NVS-style semantics). The store itself is single-writer:
//! only the sender task touches it.

pub mod file;
pub mod memory;

pub use file::FileBlobStore;
pub use memory::MemoryBlobStore;

use log::{info, warn};

use crate::errors::StorageError;
use crate::reading::{decode_batch, encode_batch, Reading, RECORD_SIZE};

const KEY_BATCH_FIRST: &str = "batch_first";
const KEY_BATCH_COUNT: &str = "batch_count";
const KEY_BATCH_PREFIX: &str = "batch_";

/// Default bound on total stored readings
pub const DEFAULT_MAX_READINGS: usize = 960;

/// Durable key-value collaborator
///
/// Mirrors the narrow slice of an NVS-style store the pipeline needs. Every
/// call is independently atomic; `commit` flushes whatever the backend
/// buffers.
pub trait BlobStore {
    /// Write a blob under `key`, replacing any previous value
    fn set_blob(&mut self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Read the blob stored under `key`
    fn get_blob(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Size in bytes of the blob under `key`, without reading its contents
    fn blob_size(&self, key: &str) -> Result<usize, StorageError>;

    /// Remove the blob or counter stored under `key`; absent keys are fine
    fn erase(&mut self, key: &str) -> Result<(), StorageError>;

    /// Read a counter, `None` if never written
    fn get_counter(&self, key: &str) -> Result<Option<i64>, StorageError>;

    /// Write a counter
    fn set_counter(&mut self, key: &str, value: i64) -> Result<(), StorageError>;

    /// Flush buffered writes to the backing medium
    fn commit(&mut self) -> Result<(), StorageError>;
}

/// Append-only durable log of reading batches
pub struct OverflowStore<S: BlobStore> {
    store: S,
    max_readings: usize,
}

impl<S: BlobStore> OverflowStore<S> {
    /// Create a store with the default reading bound
    pub fn new(store: S) -> Self {
        Self::with_capacity(store, DEFAULT_MAX_READINGS)
    }

    /// Create a store bounding total stored readings at `max_readings`
    pub fn with_capacity(store: S, max_readings: usize) -> Self {
        Self {
            store,
            max_readings: max_readings.max(1),
        }
    }

    /// Bound on total stored readings
    pub fn max_readings(&self) -> usize {
        self.max_readings
    }

    /// Live sequence range as (first, count)
    fn counters(&self) -> Result<(i64, i64), StorageError> {
        let first = self.store.get_counter(KEY_BATCH_FIRST)?.unwrap_or(0);
        let count = self.store.get_counter(KEY_BATCH_COUNT)?.unwrap_or(0);
        Ok((first, count))
    }

    fn batch_key(sequence: i64) -> String {
        format!("{KEY_BATCH_PREFIX}{sequence}")
    }

    /// Append `readings` as the next sequence-numbered batch
    ///
    /// On any failure the previously committed state is unchanged and the
    /// caller keeps the readings in volatile memory for a later retry.
    pub fn save_batch(&mut self, readings: &[Reading]) -> Result<(), StorageError> {
        if readings.is_empty() {
            return Ok(());
        }

        let mut readings = readings;
        if readings.len() > self.max_readings {
            // A single batch larger than the whole store: keep the newest
            warn!(
                "batch of {} readings exceeds store bound {}; dropping the oldest {}",
                readings.len(),
                self.max_readings,
                readings.len() - self.max_readings
            );
            readings = &readings[readings.len() - self.max_readings..];
        }

        self.evict_until_fits(readings.len())?;

        let (first, count) = self.counters()?;
        let sequence = first + count;
        let key = Self::batch_key(sequence);

        if let Err(err) = self.store.set_blob(&key, &encode_batch(readings)) {
            // Counter was never bumped; best-effort cleanup of the orphan blob
            let _ = self.store.erase(&key);
            return Err(err);
        }
        self.store.set_counter(KEY_BATCH_COUNT, count + 1)?;
        self.store.commit()?;

        info!("saved batch #{sequence} ({} readings)", readings.len());
        Ok(())
    }

    /// Load stored readings in batch order, oldest first
    ///
    /// A corrupt or unreadable batch is skipped with a warning; loading stops
    /// once appending the next batch would exceed `max_capacity`.
    pub fn load_all(&self, max_capacity: usize) -> Result<Vec<Reading>, StorageError> {
        let (first, count) = self.counters()?;
        let mut out: Vec<Reading> = Vec::new();

        for sequence in first..first + count {
            let key = Self::batch_key(sequence);
            let blob = match self.store.get_blob(&key) {
                Ok(blob) => blob,
                Err(err) => {
                    warn!("skipping unreadable batch #{sequence}: {err}");
                    continue;
                }
            };
            let batch = match decode_batch(&blob) {
                Ok(batch) => batch,
                Err(err) => {
                    warn!("skipping corrupt batch #{sequence}: {err}");
                    continue;
                }
            };
            if out.len() + batch.len() > max_capacity {
                warn!(
                    "load capacity {max_capacity} reached; leaving batch #{sequence} and later in place"
                );
                break;
            }
            out.extend_from_slice(&batch);
        }

        info!("loaded {} stored readings from {count} batches", out.len());
        Ok(out)
    }

    /// Erase every live batch and reset the counters
    ///
    /// Only called after the loaded readings were confirmed delivered.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        let (first, count) = self.counters()?;

        for sequence in first..first + count {
            self.store.erase(&Self::batch_key(sequence))?;
        }
        self.store.erase(KEY_BATCH_FIRST)?;
        self.store.erase(KEY_BATCH_COUNT)?;
        self.store.commit()?;

        info!("cleared {count} stored batches");
        Ok(())
    }

    /// Total stored readings, via size-only queries
    pub fn count(&self) -> Result<usize, StorageError> {
        let (first, count) = self.counters()?;
        let mut total = 0;

        for sequence in first..first + count {
            match self.store.blob_size(&Self::batch_key(sequence)) {
                Ok(size) => total += size / RECORD_SIZE,
                // Missing or unreadable batches contribute nothing; load_all
                // skips them the same way
                Err(_) => continue,
            }
        }
        Ok(total)
    }

    /// Log what survives from the previous session; used once at startup
    pub fn open_and_report(&self) {
        match self.count() {
            Ok(0) => info!("overflow store empty"),
            Ok(stored) => info!("found {stored} stored readings from a previous session"),
            Err(err) => warn!("could not inspect overflow store: {err}"),
        }
    }

    /// Direct access to the durable collaborator
    ///
    /// Maintenance and test use only; going around the store's counters can
    /// break the contiguity invariant.
    pub fn backing_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Erase oldest batches until `incoming` more readings fit the bound
    fn evict_until_fits(&mut self, incoming: usize) -> Result<(), StorageError> {
        let (mut first, mut count) = self.counters()?;
        let mut stored = self.count()?;
        let mut evicted = 0;

        while stored + incoming > self.max_readings && count > 0 {
            let key = Self::batch_key(first);
            let dropped = self.store.blob_size(&key).map(|s| s / RECORD_SIZE).unwrap_or(0);
            self.store.erase(&key)?;
            first += 1;
            count -= 1;
            stored = stored.saturating_sub(dropped);
            evicted += 1;
        }

        if evicted > 0 {
            warn!("evicted {evicted} oldest batches to stay within {} readings", self.max_readings);
            self.store.set_counter(KEY_BATCH_FIRST, first)?;
            self.store.set_counter(KEY_BATCH_COUNT, count)?;
            self.store.commit()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;

    fn readings(base: i64, n: usize) -> Vec<Reading> {
        (0..n).map(|i| Reading::new(base + i as i64, i as f32)).collect()
    }

    #[test]
    fn save_then_load_round_trip() {
        let mut store = OverflowStore::new(MemoryBlobStore::new());
        let batch = readings(1_710_000_000, 5);

        store.save_batch(&batch).unwrap();
        let loaded = store.load_all(DEFAULT_MAX_READINGS).unwrap();
        assert_eq!(loaded, batch);
        assert_eq!(store.count().unwrap(), 5);
    }

    #[test]
    fn batches_load_in_order() {
        let mut store = OverflowStore::new(MemoryBlobStore::new());
        store.save_batch(&readings(1000, 2)).unwrap();
        store.save_batch(&readings(2000, 3)).unwrap();

        let loaded = store.load_all(DEFAULT_MAX_READINGS).unwrap();
        assert_eq!(loaded.len(), 5);
        assert_eq!(loaded[0].timestamp, 1000);
        assert_eq!(loaded[2].timestamp, 2000);
    }

    #[test]
    fn clear_resets_count_and_numbering() {
        let mut store = OverflowStore::new(MemoryBlobStore::new());
        store.save_batch(&readings(1000, 4)).unwrap();
        store.clear().unwrap();

        assert_eq!(store.count().unwrap(), 0);
        assert!(store.load_all(DEFAULT_MAX_READINGS).unwrap().is_empty());

        // Numbering restarts at batch_0 after a full clear
        store.save_batch(&readings(2000, 1)).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn corrupt_batch_is_skipped() {
        let mut store = OverflowStore::new(MemoryBlobStore::new());
        store.save_batch(&readings(1000, 2)).unwrap();
        store.save_batch(&readings(2000, 2)).unwrap();
        store.save_batch(&readings(3000, 2)).unwrap();

        // Vandalize the middle batch with a torn write
        store.backing_mut().set_blob("batch_1", &[0xde, 0xad, 0xbe]).unwrap();

        let loaded = store.load_all(DEFAULT_MAX_READINGS).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[0].timestamp, 1000);
        assert_eq!(loaded[2].timestamp, 3000);
    }

    #[test]
    fn failed_save_leaves_state_unchanged() {
        let mut store = OverflowStore::new(MemoryBlobStore::new());
        store.save_batch(&readings(1000, 3)).unwrap();

        store.backing_mut().fail_next_writes(1);
        let err = store.save_batch(&readings(2000, 3)).unwrap_err();
        assert!(matches!(err, StorageError::WriteFailed(_)));

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(store.load_all(DEFAULT_MAX_READINGS).unwrap(), readings(1000, 3));
    }

    #[test]
    fn eviction_drops_oldest_batches() {
        let mut store = OverflowStore::with_capacity(MemoryBlobStore::new(), 6);
        store.save_batch(&readings(1000, 3)).unwrap();
        store.save_batch(&readings(2000, 3)).unwrap();

        // Third batch forces the first one out
        store.save_batch(&readings(3000, 3)).unwrap();

        assert_eq!(store.count().unwrap(), 6);
        let loaded = store.load_all(DEFAULT_MAX_READINGS).unwrap();
        assert_eq!(loaded[0].timestamp, 2000);
        assert_eq!(loaded[3].timestamp, 3000);
    }

    #[test]
    fn oversized_batch_keeps_newest_readings() {
        let mut store = OverflowStore::with_capacity(MemoryBlobStore::new(), 4);
        store.save_batch(&readings(1000, 10)).unwrap();

        let loaded = store.load_all(DEFAULT_MAX_READINGS).unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[0].timestamp, 1006);
    }

    #[test]
    fn load_respects_capacity_bound() {
        let mut store = OverflowStore::new(MemoryBlobStore::new());
        store.save_batch(&readings(1000, 4)).unwrap();
        store.save_batch(&readings(2000, 4)).unwrap();

        // Second batch would exceed the bound; it stays in place
        let loaded = store.load_all(6).unwrap();
        assert_eq!(loaded.len(), 4);
    }

    #[test]
    fn empty_save_is_a_no_op() {
        let mut store = OverflowStore::new(MemoryBlobStore::new());
        store.save_batch(&[]).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
