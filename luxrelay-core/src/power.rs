//! Power and sleep scheduling
//!
//! Battery-powered units spend the night asleep: nobody reads an ambient
//! light sensor at 3am, and the radio is the hungriest part on the board.
//! The scheduler decides, once per cycle, whether the device should enter
//! deep sleep and for how long. Sleep duration is capped at a re-check
//! interval even deep inside the night window so the device periodically
//! wakes to re-evaluate conditions (battery pulled, window reconfigured,
//! clock corrected).
//!
//! Decisions are recomputed fresh every cycle and never cached across
//! reboots; a deep-sleep wake is a cold start as far as this module is
//! concerned.

use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, TimeZone, Timelike};
use log::{debug, info};

use crate::time::Timestamp;

/// Default cap on one sleep stretch (minutes)
pub const DEFAULT_CHECK_INTERVAL_MIN: i64 = 30;

/// Device power mode as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerMode {
    /// Externally powered; the radio may stay up between cycles
    Normal,
    /// Running on battery; the radio is dropped at the end of each cycle
    Low,
}

/// Why the current boot happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    /// Timer expiry ended a deep sleep
    Timer,
    /// An external signal ended a deep sleep
    External,
    /// Power-on or reset; not a deep-sleep wake
    ColdBoot,
}

impl WakeReason {
    /// Short label used as a status-text prefix
    pub fn label(&self) -> &'static str {
        match self {
            WakeReason::Timer => "timer-wake",
            WakeReason::External => "external-wake",
            WakeReason::ColdBoot => "cold-boot",
        }
    }
}

/// Platform power collaborator
pub trait PowerMonitor {
    /// Whether a battery is attached (false on bench/USB power)
    fn battery_present(&self) -> bool;

    /// Current power mode
    fn power_mode(&self) -> PowerMode;

    /// What ended the previous sleep, for the boot sequence
    fn wake_reason(&self) -> WakeReason;

    /// Battery voltage in volts, when measurable
    fn battery_voltage(&self) -> Option<f32> {
        None
    }

    /// Battery charge estimate in percent, when measurable
    fn battery_percent(&self) -> Option<u8> {
        None
    }
}

/// Outcome of one scheduling decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepDecision {
    /// Whether the device should enter deep sleep now
    pub should_sleep: bool,
    /// How long to sleep; zero when `should_sleep` is false
    pub duration: Duration,
}

impl SleepDecision {
    /// Decision to continue normal operation
    pub fn stay_awake() -> Self {
        Self {
            should_sleep: false,
            duration: Duration::ZERO,
        }
    }
}

/// Local-time window during which the device sleeps
///
/// `start_hour >= end_hour` means the window crosses midnight (the common
/// case, e.g. 22 to 4); `start_hour < end_hour` is a same-day window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NightWindow {
    /// Hour (0-23, local) the window opens
    pub start_hour: u32,
    /// Hour (0-23, local) the window closes
    pub end_hour: u32,
}

impl NightWindow {
    /// Create a window; hours are taken modulo 24
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour: start_hour % 24,
            end_hour: end_hour % 24,
        }
    }

    /// Whether a local hour falls inside the window
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour >= self.end_hour {
            hour >= self.start_hour || hour < self.end_hour
        } else {
            hour >= self.start_hour && hour < self.end_hour
        }
    }

    /// Minutes from a local time until the window closes; 0 outside it
    pub fn minutes_until_end(&self, hour: u32, minute: u32) -> i64 {
        if !self.contains(hour) {
            return 0;
        }
        let now_min = (hour * 60 + minute) as i64;
        let end_min = (self.end_hour * 60) as i64;
        if now_min < end_min {
            end_min - now_min
        } else {
            // Window end is tomorrow
            24 * 60 - now_min + end_min
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Local-time sleep window
    pub night: NightWindow,
    /// Cap on one sleep stretch, minutes
    pub check_interval_min: i64,
    /// Device timezone as a fixed offset from UTC, hours
    pub utc_offset_hours: i32,
}

impl SchedulerConfig {
    /// Configuration with a night window and defaults for the rest
    pub fn new(night: NightWindow) -> Self {
        Self {
            night,
            check_interval_min: DEFAULT_CHECK_INTERVAL_MIN,
            utc_offset_hours: 0,
        }
    }

    /// Override the sleep-stretch cap (minutes)
    pub fn check_interval_min(mut self, minutes: i64) -> Self {
        self.check_interval_min = minutes.max(1);
        self
    }

    /// Set the device's UTC offset in hours
    pub fn utc_offset_hours(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours.clamp(-12, 14);
        self
    }
}

/// Decides whether to run, skip, or sleep each cycle
pub struct SleepScheduler {
    power: Arc<dyn PowerMonitor>,
    config: SchedulerConfig,
}

impl SleepScheduler {
    /// Create a scheduler over the platform power collaborator
    pub fn new(power: Arc<dyn PowerMonitor>, config: SchedulerConfig) -> Self {
        Self { power, config }
    }

    /// Compute a fresh sleep decision for `now`
    ///
    /// Sleep is recommended only when a battery is present, local time is
    /// inside the night window, and the computed duration
    /// `min(minutes_until_window_end, check_interval)` is positive.
    pub fn should_sleep(&self, now: Timestamp) -> SleepDecision {
        if !self.power.battery_present() {
            debug!("no battery detected (external power); staying awake");
            return SleepDecision::stay_awake();
        }

        let offset = match FixedOffset::east_opt(self.config.utc_offset_hours * 3600) {
            Some(offset) => offset,
            None => return SleepDecision::stay_awake(),
        };
        let local = match offset.timestamp_opt(now, 0).single() {
            Some(local) => local,
            None => return SleepDecision::stay_awake(),
        };

        let (hour, minute) = (local.hour(), local.minute());
        if !self.config.night.contains(hour) {
            debug!("local time {hour:02}:{minute:02} outside night window; staying awake");
            return SleepDecision::stay_awake();
        }

        let minutes = self
            .config
            .night
            .minutes_until_end(hour, minute)
            .min(self.config.check_interval_min);
        if minutes <= 0 {
            return SleepDecision::stay_awake();
        }

        info!("night window active at {hour:02}:{minute:02}; sleeping {minutes} minutes");
        SleepDecision {
            should_sleep: true,
            duration: Duration::from_secs(minutes as u64 * 60),
        }
    }

    /// What ended the previous sleep; used by the boot sequence
    pub fn check_wakeup_reason(&self) -> WakeReason {
        let reason = self.power.wake_reason();
        info!("boot follows {}", reason.label());
        reason
    }
}
