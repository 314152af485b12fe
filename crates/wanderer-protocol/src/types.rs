//! Common types used in the protocol.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ProtocolError;

/// Device-reported status, refreshed by a status query.
///
/// Overwritten wholesale on each successful query; never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    /// Whether a recording is in progress.
    pub sampling: bool,
    /// Number of samples currently stored.
    pub sample_count: u32,
    /// Battery level in percent.
    pub battery_percent: u8,
    /// How often the sensors are read.
    pub sample_period: Duration,
    /// How often a reading is committed to memory.
    pub store_period: Duration,
}

impl DeviceStatus {
    /// Wire size of a status payload.
    pub const WIRE_SIZE: usize = 8;

    /// Parse a status payload: flags, sample count (u16 LE), raw battery,
    /// sample period seconds (u16 LE), store period seconds (u16 LE).
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        if payload.len() < Self::WIRE_SIZE {
            return Err(ProtocolError::ResponseTooShort {
                expected: Self::WIRE_SIZE,
                actual: payload.len(),
            });
        }
        let flags = payload[0];
        let sample_count = u16::from_le_bytes([payload[1], payload[2]]) as u32;
        let battery_percent = decode_battery(payload[3])?;
        let sample_period = u16::from_le_bytes([payload[4], payload[5]]);
        let store_period = u16::from_le_bytes([payload[6], payload[7]]);
        Ok(DeviceStatus {
            sampling: flags & 0x01 != 0,
            sample_count,
            battery_percent,
            sample_period: Duration::from_secs(sample_period as u64),
            store_period: Duration::from_secs(store_period as u64),
        })
    }
}

/// Decode the offset battery encoding shared by status and battery replies.
pub(crate) fn decode_battery(raw: u8) -> Result<u8, ProtocolError> {
    raw.checked_sub(BATTERY_OFFSET)
        .ok_or(ProtocolError::BatteryUnderflow { raw })
}

/// Measurement programming parameters.
///
/// Mirrors what the unit accepts when a new measurement is programmed. The
/// resolution fields are percent-deviation thresholds: a new value is only
/// stored when it differs from the previous stored value by at least that
/// many percent, with 1 meaning every reading is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Sensor read period in seconds (1..=10 per the unit's manual).
    pub sample_period_secs: u16,
    /// Memory store period in seconds.
    pub store_period_secs: u16,
    /// Recording length in hours.
    pub duration_hours: u16,
    /// Temperature resolution threshold in percent.
    pub resolution_temp: u8,
    /// Vibration resolution threshold in percent.
    pub resolution_vib: u8,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        SamplingConfig {
            sample_period_secs: 1,
            store_period_secs: 1,
            duration_hours: 1,
            resolution_temp: 1,
            resolution_vib: 1,
        }
    }
}

impl SamplingConfig {
    /// Wire size of a configure payload.
    pub const WIRE_SIZE: usize = 8;

    /// Validate every field against the ranges the device accepts.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        check_range("sample period", self.sample_period_secs as u32, 1, 10)?;
        check_range("store period", self.store_period_secs as u32, 1, 3600)?;
        check_range("duration", self.duration_hours as u32, 1, 9999)?;
        check_range("temperature resolution", self.resolution_temp as u32, 1, 100)?;
        check_range("vibration resolution", self.resolution_vib as u32, 1, 100)?;
        Ok(())
    }

    /// Encode the configure payload. Fails on out-of-range fields without
    /// producing any bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        self.validate()?;
        let mut buf = Vec::with_capacity(Self::WIRE_SIZE);
        buf.extend_from_slice(&self.sample_period_secs.to_le_bytes());
        buf.extend_from_slice(&self.store_period_secs.to_le_bytes());
        buf.extend_from_slice(&self.duration_hours.to_le_bytes());
        buf.push(self.resolution_temp);
        buf.push(self.resolution_vib);
        Ok(buf)
    }
}

fn check_range(
    field: &'static str,
    value: u32,
    min: u32,
    max: u32,
) -> Result<(), ProtocolError> {
    if value < min || value > max {
        return Err(ProtocolError::InvalidConfig {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// One decoded reading from the device's recorded log. Immutable once
/// decoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Record sequence index, strictly increasing across the log.
    pub sequence: u16,
    /// Time since the recording started.
    pub elapsed: Duration,
    /// Temperature in degrees Celsius.
    pub temperature_c: f32,
    /// Vibration in G.
    pub vibration_g: f32,
    /// The raw temperature was outside the sensor's representable window
    /// and was clamped: saturation, not corruption.
    pub temperature_clamped: bool,
    /// The raw vibration was outside the representable window and clamped.
    pub vibration_clamped: bool,
}

/// Whether a decoded log covers everything the device recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Completeness {
    /// The stream ended at the end-of-log marker or the expected count.
    Complete,
    /// The stream truncated early; the samples present are still valid.
    Partial,
}

/// Result of decoding a download stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedLog {
    /// Decoded samples, in order.
    pub samples: Vec<Sample>,
    /// Whether the whole log was recovered.
    pub completeness: Completeness,
    /// Records dropped for non-increasing sequence or time.
    pub dropped: usize,
    /// Samples with at least one clamped reading.
    pub clamped: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_decode() {
        let payload = [0x01, 0x22, 0x01, 0xE7, 0x02, 0x00, 0x0A, 0x00];
        let status = DeviceStatus::decode(&payload).unwrap();
        assert!(status.sampling);
        assert_eq!(status.sample_count, 0x0122);
        assert_eq!(status.battery_percent, 0xE7 - 100);
        assert_eq!(status.sample_period, Duration::from_secs(2));
        assert_eq!(status.store_period, Duration::from_secs(10));
    }

    #[test]
    fn test_status_too_short() {
        assert_eq!(
            DeviceStatus::decode(&[0x00, 0x01]),
            Err(ProtocolError::ResponseTooShort {
                expected: 8,
                actual: 2
            })
        );
    }

    #[test]
    fn test_battery_underflow_rejected() {
        assert_eq!(
            decode_battery(0x42),
            Err(ProtocolError::BatteryUnderflow { raw: 0x42 })
        );
        assert_eq!(decode_battery(150), Ok(50));
    }

    #[test]
    fn test_sampling_config_validation() {
        assert!(SamplingConfig::default().validate().is_ok());

        let bad = SamplingConfig {
            sample_period_secs: 11,
            ..SamplingConfig::default()
        };
        assert_eq!(
            bad.validate(),
            Err(ProtocolError::InvalidConfig {
                field: "sample period",
                value: 11,
                min: 1,
                max: 10
            })
        );
        assert!(bad.encode().is_err());
    }

    #[test]
    fn test_sampling_config_encode() {
        let config = SamplingConfig {
            sample_period_secs: 2,
            store_period_secs: 60,
            duration_hours: 24,
            resolution_temp: 1,
            resolution_vib: 3,
        };
        assert_eq!(
            config.encode().unwrap(),
            vec![0x02, 0x00, 0x3C, 0x00, 0x18, 0x00, 0x01, 0x03]
        );
    }
}
