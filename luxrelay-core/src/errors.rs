//! Error Types for the Telemetry Delivery Pipeline
//!
//! ## Design Philosophy
//!
//! Every expected failure in the pipeline surfaces as a typed error value;
//! nothing in this crate aborts the process for a condition the field has
//! already taught us to expect (a dead access point, a worn flash sector, a
//! collector redeploy returning 503s for a minute).
//!
//! ## Error Categories
//!
//! The taxonomy drives the delivery engine's behavior directly:
//!
//! ### Transient
//! - `ChannelError::Server` / `ChannelError::NotFound` / `ChannelError::Transport`:
//!   retried up to the configured attempt count within the same cycle; on
//!   exhaustion the affected readings are deferred to the overflow store.
//!
//! ### Terminal
//! - `ChannelError::Client` / `ChannelError::Auth`: retrying cannot help until
//!   a human fixes the payload or the credentials. Retries abort immediately,
//!   but the data is still deferred so a fixable credential problem does not
//!   lose readings.
//!
//! ### Storage
//! - `StorageError`: the durable store rejected or mangled an operation.
//!   Affected readings remain in volatile memory and are at risk until the
//!   next successful save.
//!
//! ### Corruption
//! - `StorageError::Corrupt` on a single batch is non-fatal to a load; the
//!   batch is skipped and loading continues.

use thiserror::Error;

/// Classified delivery-channel failures
///
/// The classification is fixed by the collector contract:
/// 400 maps to `Client`, 401/403 to `Auth`, 404 to `NotFound`, 5xx to
/// `Server`, and anything else that fails to `Transport`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChannelError {
    /// Collector rejected the request as malformed (HTTP 400 class)
    #[error("collector rejected request as malformed")]
    Client,

    /// Credentials missing or rejected (HTTP 401/403)
    #[error("collector rejected credentials")]
    Auth,

    /// Endpoint not found (HTTP 404) - usually a collector redeploy in progress
    #[error("collector endpoint not found")]
    NotFound,

    /// Collector-side failure (HTTP 5xx)
    #[error("collector server error (status {status})")]
    Server {
        /// HTTP status code returned by the collector
        status: u16,
    },

    /// Request never completed: DNS, TCP, TLS, or timeout
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ChannelError {
    /// Whether retrying within the same cycle is pointless
    ///
    /// Terminal failures (bad payload, bad credentials) abort the retry loop;
    /// everything else is assumed to heal on its own.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChannelError::Client | ChannelError::Auth)
    }
}

/// Durable-store failures
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StorageError {
    /// Store has no room for the write
    #[error("no space left in durable store")]
    NoSpace,

    /// Write or erase failed below the key-value layer
    #[error("durable write failed: {0}")]
    WriteFailed(String),

    /// Requested key does not exist
    #[error("key not found: {0}")]
    NotFound(String),

    /// Stored bytes do not decode as the expected record layout
    #[error("stored data corrupt: {0}")]
    Corrupt(&'static str),

    /// Commit to the backing medium failed after the writes
    #[error("commit failed: {0}")]
    CommitFailed(String),
}

/// Shared reading buffer failures
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// The buffer mutex was poisoned by a panicking task; the operation was
    /// not performed and the buffer contents are untouched
    #[error("reading buffer lock poisoned")]
    LockPoisoned,
}
