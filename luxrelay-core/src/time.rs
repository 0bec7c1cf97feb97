//! Time management for the delivery pipeline
//!
//! Provides a clock abstraction so the pipeline can run against:
//! - The system clock (on-device, once SNTP has set it)
//! - A fixed, manually advanced clock (tests and simulation)
//!
//! and a [`TimeAuthority`] that tracks whether the device clock can be
//! trusted at all. A cold-booted device without an RTC battery starts the
//! epoch at 1970; readings stamped with that clock are garbage and the
//! delivery engine filters them out. The authority owns the "is the clock
//! plausible" decision and drives resynchronization through a collaborator.

use log::{info, warn};

/// Timestamp in seconds since the Unix epoch
///
/// Seconds (not milliseconds) match the sampling cadence of the device and
/// the resolution of the collector's wire format.
pub type Timestamp = i64;

/// Earliest timestamp the pipeline accepts as plausible (2024-01-01T00:00:00Z)
///
/// Anything earlier means the clock was never set after boot.
pub const MIN_VALID_EPOCH: Timestamp = 1_704_067_200;

/// Default interval between clock resynchronizations (seconds)
pub const DEFAULT_RESYNC_INTERVAL: i64 = 60 * 60;

/// Source of time for the pipeline
pub trait TimeSource {
    /// Current timestamp in seconds since the Unix epoch
    fn now(&self) -> Timestamp;

    /// Whether this source tracks wall clock time (vs a monotonic counter)
    fn is_wall_clock(&self) -> bool;
}

/// System clock source
#[derive(Debug, Clone)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Timestamp {
        use std::time::{SystemTime, UNIX_EPOCH};

        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as Timestamp
    }

    fn is_wall_clock(&self) -> bool {
        true
    }
}

/// Fixed time source for tests and simulation
///
/// Interior mutability lets a test advance the clock while the pipeline
/// holds a shared reference to it.
#[derive(Debug)]
pub struct FixedClock {
    timestamp: core::cell::Cell<Timestamp>,
}

impl FixedClock {
    /// Create a clock pinned at `timestamp`
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            timestamp: core::cell::Cell::new(timestamp),
        }
    }

    /// Pin the clock at a new timestamp
    pub fn set(&self, timestamp: Timestamp) {
        self.timestamp.set(timestamp);
    }

    /// Move the clock forward by `secs`
    pub fn advance(&self, secs: i64) {
        self.timestamp.set(self.timestamp.get() + secs);
    }
}

impl TimeSource for FixedClock {
    fn now(&self) -> Timestamp {
        self.timestamp.get()
    }

    fn is_wall_clock(&self) -> bool {
        false
    }
}

/// Collaborator that performs one bounded clock-synchronization attempt
///
/// The production implementation wraps the platform SNTP client and bounds
/// its own wait internally; the authority only retries whole attempts.
pub trait SyncProvider {
    /// Attempt one synchronization; true if the provider believes it set the clock
    fn synchronize(&mut self) -> bool;
}

/// Tracks clock trustworthiness and drives resynchronization
///
/// Validity is durable for the process lifetime once achieved, unless the
/// clock later turns implausible again (e.g. an RTC brownout mid-run).
/// Readings recorded before the first successful sync keep whatever
/// timestamp was available at sampling time; there is no retroactive
/// correction.
pub struct TimeAuthority {
    clock: Box<dyn TimeSource>,
    provider: Box<dyn SyncProvider>,
    resync_interval: i64,
    sync_attempts: u32,
    last_sync: Option<Timestamp>,
}

impl TimeAuthority {
    /// Create an authority over `clock`, synchronizing through `provider`
    pub fn new(clock: Box<dyn TimeSource>, provider: Box<dyn SyncProvider>) -> Self {
        Self {
            clock,
            provider,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            sync_attempts: 3,
            last_sync: None,
        }
    }

    /// Override the resynchronization interval (seconds)
    pub fn resync_interval(mut self, secs: i64) -> Self {
        self.resync_interval = secs;
        self
    }

    /// Override the per-sync attempt bound
    pub fn sync_attempts(mut self, attempts: u32) -> Self {
        self.sync_attempts = attempts.max(1);
        self
    }

    /// Whether the clock currently reads a plausible wall time
    pub fn is_valid(&self) -> bool {
        self.clock.now() >= MIN_VALID_EPOCH
    }

    /// Whether the next cycle should attempt a synchronization
    ///
    /// True when validity was never achieved, the clock has gone implausible
    /// again, or the regular resync interval has elapsed.
    pub fn should_resync(&self, now: Timestamp) -> bool {
        if !self.is_valid() {
            return true;
        }
        match self.last_sync {
            None => true,
            Some(last) => now.saturating_sub(last) >= self.resync_interval,
        }
    }

    /// Synchronize the clock through the provider, bounded retries
    ///
    /// Returns whether a plausible wall time was obtained. A `false` return
    /// is not fatal to the caller's cycle; time-dependent filtering simply
    /// runs on the best-available clock.
    pub fn sync(&mut self) -> bool {
        for attempt in 1..=self.sync_attempts {
            if self.provider.synchronize() && self.is_valid() {
                let now = self.clock.now();
                info!("clock synchronized on attempt {attempt}/{}", self.sync_attempts);
                self.last_sync = Some(now);
                return true;
            }
            warn!(
                "clock sync attempt {attempt}/{} did not yield a plausible time",
                self.sync_attempts
            );
        }
        false
    }

    /// Instant of the last successful synchronization, if any
    pub fn last_sync(&self) -> Option<Timestamp> {
        self.last_sync
    }
}
