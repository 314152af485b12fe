//! Frame encoding/decoding utilities.
//!
//! Each frame is a start marker, a command code, a length field, the
//! payload, a checksum, and (on some firmware revisions) an end marker:
//!
//! ```text
//! +-------+---------+-----------+------------------+----------+-------+
//! | start | command | len[1..2] | payload[0..len]  | checksum | (end) |
//! +-------+---------+-----------+------------------+----------+-------+
//! ```
//!
//! The checksum covers the command byte, the length field, and the
//! payload. The start marker is excluded so that resynchronization can
//! scan for it without re-checksumming. Because the format was reverse
//! engineered, the marker bytes, length-field width, and checksum
//! algorithm are all held in a [`FrameConfig`] instead of being baked in.

use bytes::{Buf, BytesMut};

use crate::constants::*;
use crate::error::ProtocolError;

/// Width of the frame length field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthWidth {
    /// One byte; payloads up to 255 bytes.
    One,
    /// Two bytes, little-endian; payloads up to [`MAX_PAYLOAD_SIZE`].
    Two,
}

impl LengthWidth {
    /// Number of bytes the length field occupies.
    pub fn size(self) -> usize {
        match self {
            LengthWidth::One => 1,
            LengthWidth::Two => 2,
        }
    }
}

/// Checksum algorithm applied over command + length field + payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    /// XOR of all covered bytes. Observed on the tested unit.
    Xor,
    /// Modulo-256 sum of all covered bytes.
    Sum,
}

impl ChecksumKind {
    /// Compute the checksum over `bytes`.
    pub fn compute(self, bytes: &[u8]) -> u8 {
        match self {
            ChecksumKind::Xor => bytes.iter().fold(0u8, |acc, b| acc ^ b),
            ChecksumKind::Sum => bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)),
        }
    }
}

/// Wire-format variant for one device/firmware revision.
///
/// The defaults describe the unit the protocol was recovered from. A device
/// that frames differently is a different `FrameConfig`, not different code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Start-of-frame marker byte.
    pub start_marker: u8,
    /// Optional trailing end marker.
    pub end_marker: Option<u8>,
    /// Width of the length field.
    pub length_width: LengthWidth,
    /// Checksum algorithm.
    pub checksum: ChecksumKind,
}

impl Default for FrameConfig {
    fn default() -> Self {
        FrameConfig {
            start_marker: START_MARKER,
            end_marker: None,
            length_width: LengthWidth::One,
            checksum: ChecksumKind::Xor,
        }
    }
}

impl FrameConfig {
    /// Largest payload this variant can frame.
    pub fn max_payload(&self) -> usize {
        match self.length_width {
            LengthWidth::One => u8::MAX as usize,
            LengthWidth::Two => MAX_PAYLOAD_SIZE,
        }
    }

    /// Bytes before the payload: marker + command + length field.
    fn header_size(&self) -> usize {
        2 + self.length_width.size()
    }

    /// Bytes after the payload: checksum + optional end marker.
    fn trailer_size(&self) -> usize {
        1 + usize::from(self.end_marker.is_some())
    }

    /// Total frame size for a payload of `len` bytes.
    pub fn frame_size(&self, len: usize) -> usize {
        self.header_size() + len + self.trailer_size()
    }
}

/// A parsed frame: command code plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    /// Command code (echoed request code for responses).
    pub command: u8,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

/// Why a stretch of input was judged corrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptReason {
    /// Bytes before the next start marker that belong to no frame.
    LeadingGarbage,
    /// Length field above the variant's maximum.
    LengthOutOfRange {
        /// Claimed payload length.
        claimed: usize,
    },
    /// Trailing checksum did not match the covered bytes.
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        expected: u8,
        /// Checksum carried by the frame.
        actual: u8,
    },
    /// Configured end marker missing where the frame should close.
    BadEndMarker {
        /// Byte found in the end-marker position.
        actual: u8,
    },
}

impl std::fmt::Display for CorruptReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorruptReason::LeadingGarbage => write!(f, "garbage before start marker"),
            CorruptReason::LengthOutOfRange { claimed } => {
                write!(f, "length field out of range ({claimed})")
            }
            CorruptReason::ChecksumMismatch { expected, actual } => {
                write!(
                    f,
                    "checksum mismatch (computed 0x{expected:02X}, frame carried 0x{actual:02X})"
                )
            }
            CorruptReason::BadEndMarker { actual } => {
                write!(f, "bad end marker (0x{actual:02X})")
            }
        }
    }
}

/// Result of one decode attempt over a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete, validated frame.
    Frame {
        /// The decoded frame.
        frame: DecodedFrame,
        /// Bytes consumed from the front of the buffer.
        consumed: usize,
    },
    /// The buffer holds a prefix of a frame; nothing was consumed.
    NeedMoreData,
    /// The front of the buffer cannot be a valid frame. Discard `discard`
    /// bytes and rescan for the next start marker.
    Corrupt {
        /// Leading bytes to discard.
        discard: usize,
        /// What failed validation.
        reason: CorruptReason,
    },
}

/// Encode a command frame.
///
/// Fails with [`ProtocolError::PayloadTooLarge`] when the payload does not
/// fit the variant's length field.
pub fn encode_frame(
    config: &FrameConfig,
    command: u8,
    payload: &[u8],
) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > config.max_payload() {
        return Err(ProtocolError::PayloadTooLarge {
            max: config.max_payload(),
            actual: payload.len(),
        });
    }

    let mut buf = Vec::with_capacity(config.frame_size(payload.len()));
    buf.push(config.start_marker);
    buf.push(command);
    match config.length_width {
        LengthWidth::One => buf.push(payload.len() as u8),
        LengthWidth::Two => buf.extend_from_slice(&(payload.len() as u16).to_le_bytes()),
    }
    buf.extend_from_slice(payload);

    // Checksum covers everything after the start marker so far.
    let checksum = config.checksum.compute(&buf[1..]);
    buf.push(checksum);
    if let Some(end) = config.end_marker {
        buf.push(end);
    }
    Ok(buf)
}

/// Attempt to decode one frame from the front of `buf`.
///
/// Pure and resumable: [`DecodeOutcome::NeedMoreData`] consumes nothing, so
/// the caller can append bytes and retry. Corruption reports how many
/// leading bytes to drop before rescanning, which keeps a live session
/// aligned after line noise instead of aborting it.
pub fn decode_frame(config: &FrameConfig, buf: &[u8]) -> DecodeOutcome {
    if buf.is_empty() {
        return DecodeOutcome::NeedMoreData;
    }

    // Resynchronize: everything before the next start marker is garbage.
    if buf[0] != config.start_marker {
        let discard = buf
            .iter()
            .position(|&b| b == config.start_marker)
            .unwrap_or(buf.len());
        return DecodeOutcome::Corrupt {
            discard,
            reason: CorruptReason::LeadingGarbage,
        };
    }

    let header = config.header_size();
    if buf.len() < header {
        return DecodeOutcome::NeedMoreData;
    }

    let len = match config.length_width {
        LengthWidth::One => buf[2] as usize,
        LengthWidth::Two => u16::from_le_bytes([buf[2], buf[3]]) as usize,
    };
    if len > config.max_payload() {
        // The marker byte itself is suspect; drop it and rescan.
        return DecodeOutcome::Corrupt {
            discard: 1,
            reason: CorruptReason::LengthOutOfRange { claimed: len },
        };
    }

    let total = config.frame_size(len);
    if buf.len() < total {
        return DecodeOutcome::NeedMoreData;
    }

    if let Some(end) = config.end_marker {
        let actual = buf[total - 1];
        if actual != end {
            return DecodeOutcome::Corrupt {
                discard: 1,
                reason: CorruptReason::BadEndMarker { actual },
            };
        }
    }

    let covered = &buf[1..header + len];
    let expected = config.checksum.compute(covered);
    let actual = buf[header + len];
    if expected != actual {
        return DecodeOutcome::Corrupt {
            discard: 1,
            reason: CorruptReason::ChecksumMismatch { expected, actual },
        };
    }

    DecodeOutcome::Frame {
        frame: DecodedFrame {
            command: buf[1],
            payload: buf[header..header + len].to_vec(),
        },
        consumed: total,
    }
}

/// A stateful codec for reading frames from a streaming byte source.
///
/// Bytes arrive a few at a time over a slow link; `push` accumulates them
/// and `try_decode` pulls complete frames out as they become available.
#[derive(Debug)]
pub struct FrameCodec {
    config: FrameConfig,
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a codec for the given wire-format variant.
    pub fn new(config: FrameConfig) -> Self {
        FrameCodec {
            config,
            buffer: BytesMut::with_capacity(MAX_PAYLOAD_SIZE),
        }
    }

    /// The codec's wire-format variant.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Add received data to the buffer.
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffered data.
    ///
    /// Returns `Ok(Some(frame))` when a complete frame is available,
    /// `Ok(None)` when more data is needed, or `Err(reason)` when corrupt
    /// bytes were discarded. The caller may simply call again; the buffer
    /// has already been realigned to the next candidate start marker.
    pub fn try_decode(&mut self) -> Result<Option<DecodedFrame>, CorruptReason> {
        match decode_frame(&self.config, &self.buffer) {
            DecodeOutcome::Frame { frame, consumed } => {
                self.buffer.advance(consumed);
                Ok(Some(frame))
            }
            DecodeOutcome::NeedMoreData => Ok(None),
            DecodeOutcome::Corrupt { discard, reason } => {
                self.buffer.advance(discard);
                Err(reason)
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants() -> Vec<FrameConfig> {
        vec![
            FrameConfig::default(),
            FrameConfig {
                checksum: ChecksumKind::Sum,
                ..FrameConfig::default()
            },
            FrameConfig {
                length_width: LengthWidth::Two,
                ..FrameConfig::default()
            },
            FrameConfig {
                start_marker: 0xA5,
                end_marker: Some(0x55),
                length_width: LengthWidth::Two,
                checksum: ChecksumKind::Sum,
            },
        ]
    }

    #[test]
    fn test_round_trip_all_variants() {
        for config in variants() {
            for payload in [&b""[..], &b"\x01"[..], &b"hello wanderer"[..]] {
                let encoded = encode_frame(&config, 0x04, payload).unwrap();
                match decode_frame(&config, &encoded) {
                    DecodeOutcome::Frame { frame, consumed } => {
                        assert_eq!(consumed, encoded.len());
                        assert_eq!(frame.command, 0x04);
                        assert_eq!(frame.payload, payload);
                    }
                    other => panic!("expected frame for {config:?}, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_query_status_wire_bytes() {
        // The exact bytes observed for a status query on the default variant.
        let encoded = encode_frame(&FrameConfig::default(), CMD_QUERY_STATUS, &[]).unwrap();
        assert_eq!(encoded, vec![0xAA, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_short_buffers_need_more_data() {
        let config = FrameConfig::default();
        let encoded = encode_frame(&config, 0x02, b"abc").unwrap();
        for cut in 0..encoded.len() {
            assert_eq!(
                decode_frame(&config, &encoded[..cut]),
                DecodeOutcome::NeedMoreData,
                "prefix of {cut} bytes"
            );
        }
    }

    #[test]
    fn test_flipped_checksum_bit_is_corrupt() {
        let config = FrameConfig::default();
        let mut encoded = encode_frame(&config, 0x03, b"xyz").unwrap();
        let checksum_pos = encoded.len() - 1;
        encoded[checksum_pos] ^= 0x10;
        match decode_frame(&config, &encoded) {
            DecodeOutcome::Corrupt {
                discard,
                reason: CorruptReason::ChecksumMismatch { .. },
            } => assert_eq!(discard, 1),
            other => panic!("expected checksum corruption, got {other:?}"),
        }
    }

    #[test]
    fn test_flipped_payload_bit_is_corrupt() {
        let config = FrameConfig::default();
        let mut encoded = encode_frame(&config, 0x03, b"xyz").unwrap();
        encoded[4] ^= 0x01;
        assert!(matches!(
            decode_frame(&config, &encoded),
            DecodeOutcome::Corrupt {
                reason: CorruptReason::ChecksumMismatch { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_leading_garbage_reports_discard_to_marker() {
        let config = FrameConfig::default();
        let encoded = encode_frame(&config, 0x01, &[]).unwrap();
        let mut noisy = vec![0x00, 0x13, 0x37];
        noisy.extend_from_slice(&encoded);
        match decode_frame(&config, &noisy) {
            DecodeOutcome::Corrupt {
                discard,
                reason: CorruptReason::LeadingGarbage,
            } => assert_eq!(discard, 3),
            other => panic!("expected garbage report, got {other:?}"),
        }
    }

    #[test]
    fn test_payload_too_large_rejected() {
        let config = FrameConfig::default();
        let payload = vec![0u8; 256];
        assert_eq!(
            encode_frame(&config, 0x04, &payload),
            Err(ProtocolError::PayloadTooLarge {
                max: 255,
                actual: 256
            })
        );
    }

    #[test]
    fn test_codec_streaming_and_resync() {
        let config = FrameConfig::default();
        let mut codec = FrameCodec::new(config);

        let good = encode_frame(&config, 0x04, b"data").unwrap();
        let mut bad = encode_frame(&config, 0x04, b"data").unwrap();
        let pos = bad.len() - 1;
        bad[pos] ^= 0xFF;

        // Corrupt frame, some noise, then a good frame, fed in drips.
        let mut stream = bad;
        stream.extend_from_slice(&[0x42]);
        stream.extend_from_slice(&good);

        let mut decoded = Vec::new();
        let mut corruptions = 0;
        for chunk in stream.chunks(3) {
            codec.push(chunk);
            loop {
                match codec.try_decode() {
                    Ok(Some(frame)) => decoded.push(frame),
                    Ok(None) => break,
                    Err(_) => corruptions += 1,
                }
            }
        }

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].payload, b"data");
        assert!(corruptions >= 1);
        assert_eq!(codec.buffered_len(), 0);
    }

    #[test]
    fn test_codec_multiple_frames_in_one_push() {
        let config = FrameConfig::default();
        let mut codec = FrameCodec::new(config);
        let first = encode_frame(&config, 0x01, &[]).unwrap();
        let second = encode_frame(&config, 0x06, &[0x70]).unwrap();
        codec.push(&first);
        codec.push(&second);

        assert_eq!(codec.try_decode().unwrap().unwrap().command, 0x01);
        assert_eq!(codec.try_decode().unwrap().unwrap().command, 0x06);
        assert!(codec.try_decode().unwrap().is_none());
    }

    #[test]
    fn test_end_marker_variant() {
        let config = FrameConfig {
            end_marker: Some(0x55),
            ..FrameConfig::default()
        };
        let mut encoded = encode_frame(&config, 0x02, b"ab").unwrap();
        assert_eq!(*encoded.last().unwrap(), 0x55);

        let pos = encoded.len() - 1;
        encoded[pos] = 0x56;
        assert!(matches!(
            decode_frame(&config, &encoded),
            DecodeOutcome::Corrupt {
                reason: CorruptReason::BadEndMarker { actual: 0x56 },
                ..
            }
        ));
    }
}
