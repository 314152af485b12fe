//! Commands that can be sent to the logger.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::{encode_frame, FrameConfig};
use crate::types::SamplingConfig;

/// Commands that can be sent to the logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Query sampling state, sample count, battery, and periods.
    QueryStatus,

    /// Begin recording with the currently programmed configuration.
    StartSampling,

    /// Stop an active recording. The recorded log stays in memory until a
    /// new measurement is programmed or the unit loses power.
    StopSampling,

    /// Download a chunk of recorded samples.
    DownloadSamples {
        /// Record offset to start the chunk at.
        offset: u16,
    },

    /// Abort an in-progress download.
    AbortDownload,

    /// Query the battery level.
    QueryBattery,

    /// Set the device clock.
    SetClock {
        /// Unix timestamp in seconds.
        unix_secs: u32,
    },

    /// Program a new measurement. Replaces any previously recorded log.
    Configure(SamplingConfig),
}

impl Command {
    /// Get the command code for this command.
    pub fn code(&self) -> u8 {
        match self {
            Command::QueryStatus => CMD_QUERY_STATUS,
            Command::StartSampling => CMD_START_SAMPLING,
            Command::StopSampling => CMD_STOP_SAMPLING,
            Command::DownloadSamples { .. } => CMD_DOWNLOAD_SAMPLES,
            Command::AbortDownload => CMD_ABORT_DOWNLOAD,
            Command::QueryBattery => CMD_QUERY_BATTERY,
            Command::SetClock { .. } => CMD_SET_CLOCK,
            Command::Configure(_) => CMD_CONFIGURE,
        }
    }

    /// Short operation name used in logs and surfaced errors.
    pub fn name(&self) -> &'static str {
        match self {
            Command::QueryStatus => "query-status",
            Command::StartSampling => "start-sampling",
            Command::StopSampling => "stop-sampling",
            Command::DownloadSamples { .. } => "download-samples",
            Command::AbortDownload => "abort-download",
            Command::QueryBattery => "query-battery",
            Command::SetClock { .. } => "set-clock",
            Command::Configure(_) => "configure",
        }
    }

    /// Build the command payload. Argument validation happens here, before
    /// any byte reaches the wire.
    pub fn payload(&self) -> Result<Vec<u8>, ProtocolError> {
        match self {
            Command::QueryStatus
            | Command::StartSampling
            | Command::StopSampling
            | Command::AbortDownload
            | Command::QueryBattery => Ok(Vec::new()),

            Command::DownloadSamples { offset } => Ok(offset.to_le_bytes().to_vec()),

            Command::SetClock { unix_secs } => Ok(unix_secs.to_le_bytes().to_vec()),

            Command::Configure(config) => config.encode(),
        }
    }

    /// Encode the command as a complete frame under the given variant.
    pub fn encode(&self, config: &FrameConfig) -> Result<Vec<u8>, ProtocolError> {
        encode_frame(config, self.code(), &self.payload()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{decode_frame, DecodeOutcome};

    #[test]
    fn test_query_status_exact_bytes() {
        // 9600-8-N-1 link, default variant: the canonical status query.
        let bytes = Command::QueryStatus.encode(&FrameConfig::default()).unwrap();
        assert_eq!(bytes, vec![0xAA, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_all_commands_round_trip() {
        let config = FrameConfig::default();
        let commands = [
            Command::QueryStatus,
            Command::StartSampling,
            Command::StopSampling,
            Command::DownloadSamples { offset: 0x1234 },
            Command::AbortDownload,
            Command::QueryBattery,
            Command::SetClock {
                unix_secs: 1_700_000_000,
            },
            Command::Configure(SamplingConfig::default()),
        ];
        for command in commands {
            let encoded = command.encode(&config).unwrap();
            match decode_frame(&config, &encoded) {
                DecodeOutcome::Frame { frame, consumed } => {
                    assert_eq!(consumed, encoded.len());
                    assert_eq!(frame.command, command.code());
                    assert_eq!(frame.payload, command.payload().unwrap());
                }
                other => panic!("round trip failed for {command:?}: {other:?}"),
            }
        }
    }

    #[test]
    fn test_download_offset_little_endian() {
        let payload = Command::DownloadSamples { offset: 0x0102 }.payload().unwrap();
        assert_eq!(payload, vec![0x02, 0x01]);
    }

    #[test]
    fn test_configure_validates_before_encoding() {
        let bad = Command::Configure(SamplingConfig {
            resolution_vib: 0,
            ..SamplingConfig::default()
        });
        assert!(matches!(
            bad.encode(&FrameConfig::default()),
            Err(ProtocolError::InvalidConfig { field: "vibration resolution", .. })
        ));
    }
}
