//! Responses received from the logger.
//!
//! The device answers every command with a frame echoing the command code.
//! Queries carry data; everything else comes back as a bare acknowledgement
//! with an empty payload. No negative-acknowledge code has ever been
//! observed; the unit simply stays silent on commands it dislikes, which
//! the transport layer treats as a timeout.

use crate::constants::*;
use crate::error::ProtocolError;
use crate::frame::DecodedFrame;
use crate::types::{decode_battery, DeviceStatus};

/// Responses received from the logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Status query reply.
    Status(DeviceStatus),

    /// Battery query reply.
    Battery {
        /// Battery level in percent.
        percent: u8,
    },

    /// One chunk of the recorded sample stream, raw record bytes.
    SampleChunk {
        /// Concatenated 6-byte records; the final chunk ends with the
        /// end-of-log record.
        data: Vec<u8>,
    },

    /// Bare acknowledgement echoing a command code.
    Ack {
        /// The echoed command code.
        code: u8,
    },
}

impl Response {
    /// Decode a validated frame into a typed response.
    pub fn decode(frame: &DecodedFrame) -> Result<Response, ProtocolError> {
        match frame.command {
            CMD_QUERY_STATUS => Ok(Response::Status(DeviceStatus::decode(&frame.payload)?)),

            CMD_QUERY_BATTERY => {
                if frame.payload.is_empty() {
                    return Err(ProtocolError::ResponseTooShort {
                        expected: 1,
                        actual: 0,
                    });
                }
                Ok(Response::Battery {
                    percent: decode_battery(frame.payload[0])?,
                })
            }

            CMD_DOWNLOAD_SAMPLES => Ok(Response::SampleChunk {
                data: frame.payload.clone(),
            }),

            CMD_START_SAMPLING | CMD_STOP_SAMPLING | CMD_ABORT_DOWNLOAD | CMD_SET_CLOCK
            | CMD_CONFIGURE => Ok(Response::Ack {
                code: frame.command,
            }),

            other => Err(ProtocolError::UnknownCommand(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(command: u8, payload: &[u8]) -> DecodedFrame {
        DecodedFrame {
            command,
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_status_response() {
        let payload = [0x00, 0x05, 0x00, 0xC8, 0x01, 0x00, 0x01, 0x00];
        match Response::decode(&frame(CMD_QUERY_STATUS, &payload)).unwrap() {
            Response::Status(status) => {
                assert!(!status.sampling);
                assert_eq!(status.sample_count, 5);
                assert_eq!(status.battery_percent, 100);
                assert_eq!(status.sample_period, Duration::from_secs(1));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_battery_response() {
        assert_eq!(
            Response::decode(&frame(CMD_QUERY_BATTERY, &[0xAB])).unwrap(),
            Response::Battery { percent: 71 }
        );
        assert_eq!(
            Response::decode(&frame(CMD_QUERY_BATTERY, &[])),
            Err(ProtocolError::ResponseTooShort {
                expected: 1,
                actual: 0
            })
        );
    }

    #[test]
    fn test_ack_responses() {
        for code in [
            CMD_START_SAMPLING,
            CMD_STOP_SAMPLING,
            CMD_ABORT_DOWNLOAD,
            CMD_SET_CLOCK,
            CMD_CONFIGURE,
        ] {
            assert_eq!(
                Response::decode(&frame(code, &[])).unwrap(),
                Response::Ack { code }
            );
        }
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert_eq!(
            Response::decode(&frame(0x7F, &[])),
            Err(ProtocolError::UnknownCommand(0x7F))
        );
    }

    #[test]
    fn test_sample_chunk_passthrough() {
        let data = [0x00, 0x00, 0x01, 0x00, 0x3C, 0x10];
        match Response::decode(&frame(CMD_DOWNLOAD_SAMPLES, &data)).unwrap() {
            Response::SampleChunk { data: chunk } => assert_eq!(chunk, data),
            other => panic!("expected chunk, got {other:?}"),
        }
    }
}
