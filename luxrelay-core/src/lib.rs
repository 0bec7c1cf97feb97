//! Offline-tolerant telemetry delivery core for luxrelay
//!
//! Collects periodic sensor readings into a shared in-memory buffer, persists
//! what cannot be delivered into an append-only overflow store, and drains
//! both through a connect/sync/send/disconnect cycle when the link is up.
//!
//! Key constraints:
//! - A reading is never silently lost and never duplicated within one cycle
//! - Bounded memory: fixed-capacity buffer, fixed-size send chunks
//! - Flash-friendly: append-only batches, no read-modify-write of one blob
//!
//! ```no_run
//! use luxrelay_core::{Reading, ReadingBuffer};
//!
//! let buffer = ReadingBuffer::with_capacity(20);
//!
//! // Producer task: one append per sample period
//! buffer.append(Reading::new(1_710_000_000, 412.5)).ok();
//!
//! // Sender task: drain everything accumulated since the last cycle
//! let pending = buffer.drain().unwrap_or_default();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod delivery;
pub mod errors;
pub mod pipeline;
pub mod power;
pub mod reading;
pub mod storage;
pub mod time;
pub mod wire;

// Public API
pub use buffer::{AppendOutcome, ReadingBuffer};
pub use delivery::{Channel, Connectivity, DeliveryConfig, DeliveryEngine, DeliveryOutcome, RetryPolicy};
pub use errors::{BufferError, ChannelError, StorageError};
pub use pipeline::{CycleAction, TelemetryPipeline};
pub use power::{PowerMode, PowerMonitor, SleepDecision, SleepScheduler, WakeReason};
pub use reading::Reading;
pub use storage::{BlobStore, OverflowStore};
pub use time::{TimeAuthority, TimeSource, Timestamp, MIN_VALID_EPOCH};
pub use wire::{SensorIdentity, StatusRecord, TelemetryRecord};

/// Crate version, reported in status/heartbeat records
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
