//! HTTP/HTTPS delivery channel
//!
//! ## Overview
//!
//! Posts telemetry and status records to the collector's ingest endpoint as
//! JSON arrays, authenticated with a bearer token. Built on the lightweight
//! `ureq` client: blocking calls fit the sender task's model (everything
//! network-related happens inside that one task), and there is no async
//! runtime to carry onto a gateway-class device.
//!
//! ## Status classification
//!
//! The collector contract fixes how HTTP statuses map onto the core's
//! failure classes:
//!
//! | status | class | retried by the engine |
//! |--------|------------------------|-----------------------|
//! | 2xx    | success                | -                     |
//! | 400    | `Client`               | no (terminal)         |
//! | 401/403| `Auth`                 | no (terminal)         |
//! | 404    | `NotFound`             | yes                   |
//! | 5xx    | `Server`               | yes                   |
//! | other  | `Transport`            | yes                   |
//!
//! Transport-level failures (DNS, TCP, TLS, timeout) classify as
//! `Transport`.

use std::time::Duration;

use log::{debug, info};

use luxrelay_core::{Channel, ChannelError, StatusRecord, TelemetryRecord};

use crate::ConnectorError;

/// HTTP channel configuration
#[derive(Clone)]
pub struct HttpConfig {
    /// Collector ingest URL
    pub url: String,
    /// Bearer token presented on every request
    pub bearer_token: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl HttpConfig {
    /// Create a configuration for the given ingest URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: String::new(),
            timeout: Duration::from_secs(30),
            user_agent: format!("luxrelay/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Set the bearer token
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = token.into();
        self
    }

    /// Set the request timeout in seconds
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

/// HTTP implementation of the core's delivery channel
pub struct HttpChannel {
    config: HttpConfig,
    agent: ureq::Agent,
}

impl HttpChannel {
    /// Create a channel; rejects URLs that are not http(s)
    pub fn new(config: HttpConfig) -> Result<Self, ConnectorError> {
        if !config.url.starts_with("http://") && !config.url.starts_with("https://") {
            return Err(ConnectorError::Config(
                "collector URL must start with http:// or https://".into(),
            ));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build();

        Ok(Self { config, agent })
    }

    /// POST a JSON body, one attempt, classified failure
    fn post_json(&self, body: &str) -> Result<(), ChannelError> {
        let response = self
            .agent
            .post(&self.config.url)
            .set("Content-Type", "application/json")
            .set("Authorization", &format!("Bearer {}", self.config.bearer_token))
            .send_string(body);

        match response {
            Ok(resp) => {
                debug!("collector accepted payload (status {})", resp.status());
                Ok(())
            }
            Err(ureq::Error::Status(code, _)) => Err(classify_status(code)),
            Err(ureq::Error::Transport(err)) => Err(ChannelError::Transport(err.to_string())),
        }
    }
}

impl Channel for HttpChannel {
    fn send(&mut self, records: &[TelemetryRecord]) -> Result<(), ChannelError> {
        let body = serde_json::to_string(records)
            .map_err(|_| ChannelError::Client)?;

        info!("posting {} telemetry records", records.len());
        self.post_json(&body)
    }

    fn send_status(&mut self, status: &StatusRecord) -> Result<(), ChannelError> {
        // The collector ingests arrays only; a status report is an array of one
        let body = serde_json::to_string(std::slice::from_ref(status))
            .map_err(|_| ChannelError::Client)?;

        info!("posting status record");
        self.post_json(&body)
    }
}

/// Map an HTTP status code onto the core's failure classes
fn classify_status(code: u16) -> ChannelError {
    match code {
        400 => ChannelError::Client,
        401 | 403 => ChannelError::Auth,
        404 => ChannelError::NotFound,
        500..=599 => ChannelError::Server { status: code },
        other => ChannelError::Transport(format!("unexpected status {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = HttpConfig::new("https://collector.example.com/ingest")
            .bearer_token("secret")
            .timeout_secs(60);

        assert_eq!(config.url, "https://collector.example.com/ingest");
        assert_eq!(config.bearer_token, "secret");
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn url_validation() {
        assert!(HttpChannel::new(HttpConfig::new("not-a-url")).is_err());
        assert!(HttpChannel::new(HttpConfig::new("https://valid.example")).is_ok());
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(400), ChannelError::Client);
        assert_eq!(classify_status(401), ChannelError::Auth);
        assert_eq!(classify_status(403), ChannelError::Auth);
        assert_eq!(classify_status(404), ChannelError::NotFound);
        assert_eq!(classify_status(500), ChannelError::Server { status: 500 });
        assert_eq!(classify_status(503), ChannelError::Server { status: 503 });
        assert!(matches!(classify_status(302), ChannelError::Transport(_)));
    }

    #[test]
    fn terminal_statuses_abort_engine_retries() {
        assert!(classify_status(400).is_terminal());
        assert!(classify_status(401).is_terminal());
        assert!(!classify_status(404).is_terminal());
        assert!(!classify_status(500).is_terminal());
    }
}
