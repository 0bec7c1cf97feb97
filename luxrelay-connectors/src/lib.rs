//! Production delivery channels for luxrelay
//!
//! The core crate talks to its collector through the narrow
//! [`luxrelay_core::Channel`] trait; this crate holds the implementations
//! that need a real network stack. Today that is HTTP/HTTPS: the collector
//! exposes a plain REST ingest endpoint, and HTTP clears every firewall a
//! field deployment has ever hit.
//!
//! Retry logic deliberately does NOT live here: the delivery engine owns the
//! retry policy, so a channel performs exactly one attempt per call and
//! reports a classified [`luxrelay_core::ChannelError`]. A channel that also
//! retried internally would multiply the engine's attempt bound.

pub mod http;

pub use http::{HttpChannel, HttpConfig};

use thiserror::Error;

/// Connector construction/configuration errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// Configuration rejected before any network activity
    #[error("configuration error: {0}")]
    Config(String),
}
