//! Shared test doubles for the delivery pipeline integration tests
//!
//! Every collaborator the engine touches has a scriptable mock here, with
//! state behind an `Arc<Mutex<..>>` handle so tests can inspect what the
//! engine did after it consumed the mock.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use luxrelay_core::delivery::{Channel, Connectivity, Delay};
use luxrelay_core::power::{PowerMode, PowerMonitor, WakeReason};
use luxrelay_core::time::SyncProvider;
use luxrelay_core::{ChannelError, StatusRecord, TelemetryRecord};

/// Observable state of the connectivity mock
#[derive(Debug, Default)]
pub struct ConnectivityState {
    pub connected: bool,
    pub connect_succeeds: bool,
    pub connect_calls: u32,
    pub disconnect_calls: u32,
}

pub struct MockConnectivity {
    state: Arc<Mutex<ConnectivityState>>,
}

impl MockConnectivity {
    pub fn new(connected: bool, connect_succeeds: bool) -> (Self, Arc<Mutex<ConnectivityState>>) {
        let state = Arc::new(Mutex::new(ConnectivityState {
            connected,
            connect_succeeds,
            ..Default::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Connectivity for MockConnectivity {
    fn connect(&mut self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.connect_succeeds {
            state.connected = true;
        }
        state.connected
    }

    fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    fn disconnect(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.disconnect_calls += 1;
        state.connected = false;
    }
}

/// Observable state of the channel mock
#[derive(Debug, Default)]
pub struct ChannelState {
    /// Scripted results for successive `send` calls; exhausted script -> Ok
    pub script: VecDeque<Result<(), ChannelError>>,
    /// Every payload handed to `send`, including failed attempts
    pub sent: Vec<Vec<TelemetryRecord>>,
    /// Every status record handed to `send_status`
    pub statuses: Vec<StatusRecord>,
}

pub struct MockChannel {
    state: Arc<Mutex<ChannelState>>,
}

impl MockChannel {
    pub fn new() -> (Self, Arc<Mutex<ChannelState>>) {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<(), ChannelError>>) -> (Self, Arc<Mutex<ChannelState>>) {
        let state = Arc::new(Mutex::new(ChannelState {
            script: script.into(),
            ..Default::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Channel for MockChannel {
    fn send(&mut self, records: &[TelemetryRecord]) -> Result<(), ChannelError> {
        let mut state = self.state.lock().unwrap();
        state.sent.push(records.to_vec());
        state.script.pop_front().unwrap_or(Ok(()))
    }

    fn send_status(&mut self, status: &StatusRecord) -> Result<(), ChannelError> {
        self.state.lock().unwrap().statuses.push(status.clone());
        Ok(())
    }
}

/// Scriptable time-sync provider
pub struct MockSync {
    result: bool,
    calls: Arc<Mutex<u32>>,
}

impl MockSync {
    pub fn new(result: bool) -> (Self, Arc<Mutex<u32>>) {
        let calls = Arc::new(Mutex::new(0));
        (
            Self {
                result,
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl SyncProvider for MockSync {
    fn synchronize(&mut self) -> bool {
        *self.calls.lock().unwrap() += 1;
        self.result
    }
}

/// Delay double that records requested sleeps instead of performing them
pub struct InstantDelay {
    slept: Arc<Mutex<Vec<u64>>>,
}

impl InstantDelay {
    pub fn new() -> (Self, Arc<Mutex<Vec<u64>>>) {
        let slept = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                slept: Arc::clone(&slept),
            },
            slept,
        )
    }
}

impl Delay for InstantDelay {
    fn sleep_ms(&mut self, ms: u64) {
        self.slept.lock().unwrap().push(ms);
    }
}

/// Fixed-answer power monitor
pub struct MockPower {
    pub battery: bool,
    pub mode: PowerMode,
    pub reason: WakeReason,
    pub voltage: Option<f32>,
    pub percent: Option<u8>,
}

impl MockPower {
    pub fn normal() -> Self {
        Self {
            battery: false,
            mode: PowerMode::Normal,
            reason: WakeReason::ColdBoot,
            voltage: None,
            percent: None,
        }
    }

    pub fn on_battery() -> Self {
        Self {
            battery: true,
            mode: PowerMode::Low,
            reason: WakeReason::Timer,
            voltage: Some(3.87),
            percent: Some(72),
        }
    }
}

impl PowerMonitor for MockPower {
    fn battery_present(&self) -> bool {
        self.battery
    }

    fn power_mode(&self) -> PowerMode {
        self.mode
    }

    fn wake_reason(&self) -> WakeReason {
        self.reason
    }

    fn battery_voltage(&self) -> Option<f32> {
        self.voltage
    }

    fn battery_percent(&self) -> Option<u8> {
        self.percent
    }
}
