//! Delivery Engine - One Send Cycle per Interval
//!
//! ## Overview
//!
//! The sender task invokes [`DeliveryEngine::run_send_cycle`] once per send
//! interval. A cycle walks a fixed state machine:
//!
//! ```text
//! Idle -> Connecting -> TimeSync -> SendingStored -> SendingCurrent -> Disconnecting -> Idle
//!            │
//!            └── connect failed: defer current readings to the
//!                overflow store, back to Idle (NoNetwork)
//! ```
//!
//! ## Loss and duplication guarantees
//!
//! - The overflow store is cleared only after its contents were confirmed
//!   delivered (at-least-once; never clear-before-send).
//! - Drained buffer readings that fail to send are appended to the store
//!   before the cycle ends; the only window where data exists solely in RAM
//!   is between a drain and the corresponding save.
//! - Within one cycle no reading is transmitted twice; across cycles the
//!   collector deduplicates on (sensor, timestamp), so retry-after-partial
//!   is duplication-safe.
//!
//! ## Retry policy
//!
//! Retries are a value ([`RetryPolicy`]), not sleeps sprinkled through the
//! code: the engine asks its [`Delay`] collaborator to wait, and tests swap
//! in a recording no-op so a full retry storm runs in microseconds.

use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::buffer::ReadingBuffer;
use crate::errors::ChannelError;
use crate::power::{PowerMode, PowerMonitor};
use crate::reading::Reading;
use crate::storage::{BlobStore, OverflowStore};
use crate::time::{TimeAuthority, Timestamp, MIN_VALID_EPOCH};
use crate::wire::{SensorIdentity, StatusRecord, TelemetryRecord};

/// Outcome of one send cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Everything pending was delivered (or there was nothing pending on one side)
    Success,
    /// Connectivity could not be established; current readings were deferred
    NoNetwork,
    /// At least one send exhausted its retries or hit a terminal failure
    SendFailed,
    /// Neither the buffer nor the store held anything; no network activity
    NoData,
}

/// Wireless connectivity collaborator
pub trait Connectivity {
    /// Request a connection; the implementation bounds its own attempt
    fn connect(&mut self) -> bool;

    /// Whether the link is currently up
    fn is_connected(&self) -> bool;

    /// Tear the link down
    fn disconnect(&mut self);
}

/// Delivery channel collaborator
///
/// Implementations own payload encoding and transport; failures come back
/// already classified as [`ChannelError`].
pub trait Channel {
    /// Deliver a chunk of telemetry records
    fn send(&mut self, records: &[TelemetryRecord]) -> Result<(), ChannelError>;

    /// Deliver one status/heartbeat record
    fn send_status(&mut self, status: &StatusRecord) -> Result<(), ChannelError>;
}

/// Blocking wait collaborator, swapped for a recording stub in tests
pub trait Delay {
    /// Sleep for `ms` milliseconds
    fn sleep_ms(&mut self, ms: u64);
}

/// Real wall-clock delay
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn sleep_ms(&mut self, ms: u64) {
        std::thread::sleep(std::time::Duration::from_millis(ms));
    }
}

/// Bounded retry policy for channel sends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per send, including the first
    pub max_attempts: u32,
    /// Fixed delay between attempts, milliseconds
    pub delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 5_000,
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Identity stamped onto every wire record
    pub identity: SensorIdentity,
    /// Records per transmission (bounds peak payload memory)
    pub chunk_size: usize,
    /// Pause between consecutive chunks, milliseconds
    pub inter_chunk_delay_ms: u64,
    /// Retry policy for each send
    pub retry: RetryPolicy,
    /// Upper bound on readings loaded from the store per cycle
    pub max_stored_load: usize,
    /// Readings stamped further than this into the future are implausible (seconds)
    pub max_future_skew: i64,
}

impl DeliveryConfig {
    /// Configuration with production defaults
    pub fn new(identity: SensorIdentity) -> Self {
        Self {
            identity,
            chunk_size: 50,
            inter_chunk_delay_ms: 1_000,
            retry: RetryPolicy::default(),
            max_stored_load: crate::storage::DEFAULT_MAX_READINGS,
            max_future_skew: 3_600,
        }
    }

    /// Override records per transmission
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Override the pause between chunks
    pub fn inter_chunk_delay_ms(mut self, ms: u64) -> Self {
        self.inter_chunk_delay_ms = ms;
        self
    }

    /// Override the retry policy
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Runs the connect/sync/send/disconnect cycle
pub struct DeliveryEngine<N: Connectivity, C: Channel, S: BlobStore> {
    network: N,
    channel: C,
    store: OverflowStore<S>,
    time: TimeAuthority,
    power: Arc<dyn PowerMonitor>,
    delay: Box<dyn Delay>,
    config: DeliveryConfig,
}

impl<N: Connectivity, C: Channel, S: BlobStore> DeliveryEngine<N, C, S> {
    /// Assemble an engine from its collaborators
    pub fn new(
        network: N,
        channel: C,
        store: OverflowStore<S>,
        time: TimeAuthority,
        power: Arc<dyn PowerMonitor>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            network,
            channel,
            store,
            time,
            power,
            delay: Box::new(ThreadDelay),
            config,
        }
    }

    /// Replace the delay collaborator (tests)
    pub fn with_delay(mut self, delay: Box<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// The overflow store, for startup reporting and inspection
    pub fn store(&self) -> &OverflowStore<S> {
        &self.store
    }

    /// Identity stamped onto wire records
    pub fn identity(&self) -> &SensorIdentity {
        &self.config.identity
    }

    /// Run one full send cycle
    ///
    /// `now` is sampled by the caller at cycle start so the whole cycle
    /// reasons about a single instant.
    pub fn run_send_cycle(&mut self, buffer: &ReadingBuffer, now: Timestamp) -> DeliveryOutcome {
        let stored = self.store.count().unwrap_or_else(|err| {
            warn!("could not count stored readings: {err}");
            0
        });

        if buffer.is_empty() && stored == 0 {
            info!("no readings to send");
            return DeliveryOutcome::NoData;
        }

        if !self.network.is_connected() {
            info!("connecting to network");
            self.network.connect();

            if !self.network.is_connected() {
                error!("network unavailable; deferring current readings");
                self.defer_buffered(buffer);
                return DeliveryOutcome::NoNetwork;
            }
        }

        if self.time.should_resync(now) {
            info!("synchronizing clock");
            if !self.time.sync() {
                warn!("clock sync failed; continuing with best-available time");
            }
        }

        let mut all_sent = true;

        // Stored readings go first: oldest data has waited longest
        if stored > 0 {
            all_sent &= self.send_stored(now);
        }

        all_sent &= self.send_current(buffer, now);

        if self.power.power_mode() == PowerMode::Low {
            info!("disconnecting network for power saving");
            self.network.disconnect();
        }

        if all_sent {
            DeliveryOutcome::Success
        } else {
            DeliveryOutcome::SendFailed
        }
    }

    /// Send one status/heartbeat record through the channel, single attempt
    pub fn send_status(&mut self, status: &StatusRecord) -> Result<(), ChannelError> {
        info!("sending status update: '{}'", status.status_text);
        self.channel.send_status(status)
    }

    /// Build and send the boot status report
    ///
    /// Prefixes the text with the wake reason and attaches battery data when
    /// the platform can measure it.
    pub fn send_boot_status(&mut self, now: Timestamp, text: &str) -> Result<(), ChannelError> {
        let reason = self.power.wake_reason();
        let mut status = StatusRecord::new(
            &self.config.identity,
            now,
            format!("[{}] {text}", reason.label()),
        );
        if let (Some(voltage), Some(percent)) =
            (self.power.battery_voltage(), self.power.battery_percent())
        {
            status = status.with_battery(voltage, percent);
        }
        self.send_status(&status)
    }

    /// Deliver the overflow backlog; clear the store only on confirmed success
    fn send_stored(&mut self, now: Timestamp) -> bool {
        let readings = match self.store.load_all(self.config.max_stored_load) {
            Ok(readings) => readings,
            Err(err) => {
                warn!("could not load stored readings: {err}; leaving store untouched");
                return true;
            }
        };
        if readings.is_empty() {
            return true;
        }

        let plausible = self.filter_plausible(&readings, now);
        if !plausible.is_empty() {
            info!("sending {} stored readings", plausible.len());
            if !self.send_with_retry(&plausible) {
                error!("failed to send stored readings; store left untouched");
                return false;
            }
        } else {
            warn!("stored backlog held no plausible readings; purging");
        }

        match self.store.clear() {
            Ok(()) => {
                info!("stored readings sent and cleared");
                true
            }
            Err(err) => {
                // Delivered but not cleared: the next cycle will resend and
                // the collector's dedup absorbs it
                error!("could not clear store after delivery: {err}");
                false
            }
        }
    }

    /// Drain, filter, and deliver the current buffer contents
    fn send_current(&mut self, buffer: &ReadingBuffer, now: Timestamp) -> bool {
        let drained = match buffer.drain() {
            Ok(drained) => drained,
            Err(err) => {
                warn!("buffer drain failed: {err}; will retry next cycle");
                return true;
            }
        };
        if drained.is_empty() {
            return true;
        }

        let plausible = self.filter_plausible(&drained, now);
        if plausible.is_empty() {
            warn!("no plausible readings after timestamp filtering");
            return true;
        }

        info!("sending {} new readings", plausible.len());
        if self.send_with_retry(&plausible) {
            return true;
        }

        error!("failed to send new readings; deferring to overflow store");
        self.defer(drained);
        false
    }

    /// Chunked send wrapped in the bounded retry policy
    fn send_with_retry(&mut self, readings: &[Reading]) -> bool {
        let retry = self.config.retry;

        for attempt in 1..=retry.max_attempts {
            info!(
                "send attempt {attempt}/{} ({} readings)",
                retry.max_attempts,
                readings.len()
            );

            match self.send_chunks(readings) {
                Ok(()) => return true,
                Err(err) if err.is_terminal() => {
                    error!("terminal channel failure: {err}; aborting retries");
                    return false;
                }
                Err(err) => {
                    error!("send attempt {attempt} failed: {err}");
                    if attempt < retry.max_attempts {
                        self.delay.sleep_ms(retry.delay_ms);
                    }
                }
            }
        }

        error!("send failed after {} attempts", retry.max_attempts);
        false
    }

    /// Transmit readings in fixed-size chunks, pausing between chunks
    fn send_chunks(&mut self, readings: &[Reading]) -> Result<(), ChannelError> {
        let records: Vec<TelemetryRecord> = readings
            .iter()
            .map(|r| TelemetryRecord::from_reading(r, &self.config.identity))
            .collect();

        let total = records.len();
        let mut sent = 0;
        for chunk in records.chunks(self.config.chunk_size) {
            self.channel.send(chunk)?;
            sent += chunk.len();
            debug!("chunk delivered ({sent}/{total} readings)");

            if sent < total {
                self.delay.sleep_ms(self.config.inter_chunk_delay_ms);
            }
        }
        Ok(())
    }

    /// Drop readings stamped before the minimum epoch or too far in the future
    fn filter_plausible(&self, readings: &[Reading], now: Timestamp) -> Vec<Reading> {
        let horizon = now.saturating_add(self.config.max_future_skew);
        let mut plausible = Vec::with_capacity(readings.len());

        for reading in readings {
            if reading.timestamp < MIN_VALID_EPOCH {
                warn!("skipping reading with pre-epoch timestamp {}", reading.timestamp);
                continue;
            }
            if reading.timestamp > horizon {
                warn!("skipping reading with future timestamp {}", reading.timestamp);
                continue;
            }
            plausible.push(*reading);
        }

        if plausible.len() < readings.len() {
            info!("filtered {}/{} readings as plausible", plausible.len(), readings.len());
        }
        plausible
    }

    /// Drain the buffer straight into the overflow store (no-network path)
    fn defer_buffered(&mut self, buffer: &ReadingBuffer) {
        match buffer.drain() {
            Ok(drained) if !drained.is_empty() => self.defer(drained),
            Ok(_) => {}
            Err(err) => warn!("buffer drain failed while deferring: {err}"),
        }
    }

    /// Persist readings that could not be delivered this cycle
    fn defer(&mut self, readings: Vec<Reading>) {
        let count = readings.len();
        match self.store.save_batch(&readings) {
            Ok(()) => info!("deferred {count} readings to overflow store"),
            Err(err) => {
                // Volatile from here on: lost if power drops before the next
                // successful save
                error!("could not persist {count} readings: {err}");
            }
        }
    }
}
