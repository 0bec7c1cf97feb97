//! Logical wire records handed to the delivery channel
//!
//! The channel collaborator owns the request/response mechanics and the byte
//! encoding; the core produces these logical shapes and nothing lower-level.
//! Timestamps cross the wire as ISO-8601 UTC strings because the collector
//! ingests from heterogeneous sensor fleets and refuses epoch integers.

use chrono::{TimeZone, Utc};
use serde::Serialize;

use crate::reading::Reading;
use crate::time::Timestamp;

/// Identity of this device within a deployment
///
/// `sensor_id` names the physical unit, `sensor_set_id` the deployment group
/// it reports under (one collector tenant can host many sets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorIdentity {
    /// Unique identifier of this device
    pub sensor_id: String,
    /// Deployment group the device belongs to
    pub sensor_set_id: String,
}

impl SensorIdentity {
    /// Create an identity
    pub fn new(sensor_id: impl Into<String>, sensor_set_id: impl Into<String>) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            sensor_set_id: sensor_set_id.into(),
        }
    }
}

/// One telemetry record as the channel sees it
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetryRecord {
    /// Sampling instant, ISO-8601 UTC
    pub timestamp: String,
    /// Device identifier
    pub sensor_id: String,
    /// Deployment group identifier
    pub sensor_set_id: String,
    /// Measured value
    pub value: f32,
}

impl TelemetryRecord {
    /// Build a wire record from a reading
    pub fn from_reading(reading: &Reading, identity: &SensorIdentity) -> Self {
        Self {
            timestamp: iso8601_utc(reading.timestamp),
            sensor_id: identity.sensor_id.clone(),
            sensor_set_id: identity.sensor_set_id.clone(),
            value: reading.value,
        }
    }
}

/// Status/heartbeat record
///
/// Sent on boot and on operator request. Battery and link fields are only
/// present when the platform can actually measure them; a bench-powered unit
/// omits them entirely rather than reporting zeros.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusRecord {
    /// Device identifier
    pub sensor_id: String,
    /// Deployment group identifier
    pub sensor_set_id: String,
    /// Report instant, ISO-8601 UTC
    pub timestamp: String,
    /// Free-form status text, e.g. "[timer-wake] boot"
    pub status_text: String,
    /// Firmware/library version that produced the report
    pub build_version: String,
    /// Battery voltage in volts, when a battery is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_voltage: Option<f32>,
    /// Battery charge estimate in percent, when a battery is present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<u8>,
    /// Wireless link strength in dBm, when connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_dbm: Option<i8>,
}

impl StatusRecord {
    /// Build a status record with the mandatory fields
    pub fn new(identity: &SensorIdentity, now: Timestamp, status_text: impl Into<String>) -> Self {
        Self {
            sensor_id: identity.sensor_id.clone(),
            sensor_set_id: identity.sensor_set_id.clone(),
            timestamp: iso8601_utc(now),
            status_text: status_text.into(),
            build_version: crate::VERSION.to_string(),
            battery_voltage: None,
            battery_percent: None,
            link_dbm: None,
        }
    }

    /// Attach battery measurements
    pub fn with_battery(mut self, voltage: f32, percent: u8) -> Self {
        self.battery_voltage = Some(voltage);
        self.battery_percent = Some(percent);
        self
    }

    /// Attach link strength
    pub fn with_link_strength(mut self, dbm: i8) -> Self {
        self.link_dbm = Some(dbm);
        self
    }
}

/// Format a timestamp as ISO-8601 UTC ("%Y-%m-%dT%H:%M:%SZ")
///
/// Timestamps outside chrono's representable range collapse to the epoch;
/// such values never survive the delivery engine's plausibility filter, so
/// this path only matters for status records built from a broken clock.
pub fn iso8601_utc(timestamp: Timestamp) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(instant) => instant.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => "1970-01-01T00:00:00Z".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SensorIdentity {
        SensorIdentity::new("lux-007", "orchard-west")
    }

    #[test]
    fn iso_formatting() {
        assert_eq!(iso8601_utc(1_704_067_200), "2024-01-01T00:00:00Z");
        assert_eq!(iso8601_utc(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn telemetry_record_from_reading() {
        let record = TelemetryRecord::from_reading(&Reading::new(1_704_067_215, 88.25), &identity());

        assert_eq!(record.timestamp, "2024-01-01T00:00:15Z");
        assert_eq!(record.sensor_id, "lux-007");
        assert_eq!(record.sensor_set_id, "orchard-west");
        assert_eq!(record.value, 88.25);
    }

    #[test]
    fn telemetry_record_field_names() {
        let record = TelemetryRecord::from_reading(&Reading::new(1_704_067_200, 1.0), &identity());
        let json = serde_json::to_value(&record).unwrap();

        assert!(json.get("timestamp").is_some());
        assert!(json.get("sensor_id").is_some());
        assert!(json.get("sensor_set_id").is_some());
        assert!(json.get("value").is_some());
    }

    #[test]
    fn status_record_omits_absent_battery() {
        let status = StatusRecord::new(&identity(), 1_704_067_200, "boot");
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["status_text"], "boot");
        assert!(json.get("battery_voltage").is_none());
        assert!(json.get("battery_percent").is_none());
        assert!(json.get("link_dbm").is_none());
    }

    #[test]
    fn status_record_with_battery_and_link() {
        let status = StatusRecord::new(&identity(), 1_704_067_200, "battery")
            .with_battery(3.91, 76)
            .with_link_strength(-61);
        let json = serde_json::to_value(&status).unwrap();

        assert_eq!(json["battery_voltage"], 3.91f32 as f64);
        assert_eq!(json["battery_percent"], 76);
        assert_eq!(json["link_dbm"], -61);
        assert!(!status.build_version.is_empty());
    }
}
