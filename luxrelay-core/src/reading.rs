//! Sensor readings and their durable binary layout
//!
//! A [`Reading`] is one timestamped sample of the device's single measurement
//! stream. Readings are transient value data: they live in the shared buffer
//! or inside a persisted batch, never on their own.
//!
//! ## Durable layout
//!
//! Batches are persisted as a flat array of fixed-size records so that a
//! partially written or bit-rotted blob is detectable from its length alone,
//! and so loading never needs a self-describing decoder:
//!
//! ```text
//! record (12 bytes, little-endian):
//! ┌────────────────────────┬──────────────┐
//! │ timestamp: i64         │ value: f32   │
//! │ 8 bytes                │ 4 bytes      │
//! └────────────────────────┴──────────────┘
//! ```
//!
//! A blob whose length is not a multiple of [`RECORD_SIZE`] is reported as
//! corrupt and skipped by the overflow store.

use crate::errors::StorageError;
use crate::time::Timestamp;

/// Size of one encoded reading in bytes
pub const RECORD_SIZE: usize = 12;

/// One timestamped sensor sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Sampling instant, seconds since the Unix epoch
    pub timestamp: Timestamp,
    /// Measured value in the sensor's native unit
    pub value: f32,
}

impl Reading {
    /// Create a reading
    pub fn new(timestamp: Timestamp, value: f32) -> Self {
        Self { timestamp, value }
    }

    /// Encode into the fixed durable layout
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[..8].copy_from_slice(&self.timestamp.to_le_bytes());
        out[8..].copy_from_slice(&self.value.to_le_bytes());
        out
    }

    /// Decode one record from the fixed durable layout
    pub fn from_bytes(bytes: &[u8; RECORD_SIZE]) -> Self {
        let mut ts = [0u8; 8];
        ts.copy_from_slice(&bytes[..8]);
        let mut val = [0u8; 4];
        val.copy_from_slice(&bytes[8..]);
        Self {
            timestamp: i64::from_le_bytes(ts),
            value: f32::from_le_bytes(val),
        }
    }
}

/// Encode a batch of readings as one durable blob
pub fn encode_batch(readings: &[Reading]) -> Vec<u8> {
    let mut out = Vec::with_capacity(readings.len() * RECORD_SIZE);
    for reading in readings {
        out.extend_from_slice(&reading.to_bytes());
    }
    out
}

/// Decode a durable blob back into readings
///
/// Rejects blobs whose length is not a whole number of records; the caller
/// treats that batch as corrupt and moves on.
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<Reading>, StorageError> {
    if bytes.len() % RECORD_SIZE != 0 {
        return Err(StorageError::Corrupt("blob length is not a whole number of records"));
    }

    let mut readings = Vec::with_capacity(bytes.len() / RECORD_SIZE);
    for chunk in bytes.chunks_exact(RECORD_SIZE) {
        let mut record = [0u8; RECORD_SIZE];
        record.copy_from_slice(chunk);
        readings.push(Reading::from_bytes(&record));
    }
    Ok(readings)
}
