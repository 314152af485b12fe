//! Protocol constants
//!
//! Command codes, framing limits, and the empirically derived sensor
//! conversion constants. The command set below is the subset needed to
//! query, program, start, stop, and download a logger; unknown codes seen
//! on the wire surface as [`crate::ProtocolError::UnknownCommand`] so that
//! additional codes can be added without touching the codec.

// ============================================================================
// Command Codes (host → device, echoed back in responses)
// ============================================================================

/// Query sampling state, sample count, battery, and configured periods.
pub const CMD_QUERY_STATUS: u8 = 0x01;
/// Begin recording with the currently programmed configuration.
pub const CMD_START_SAMPLING: u8 = 0x02;
/// Stop an active recording. Recorded samples stay in memory.
pub const CMD_STOP_SAMPLING: u8 = 0x03;
/// Download a chunk of recorded samples starting at a record offset.
pub const CMD_DOWNLOAD_SAMPLES: u8 = 0x04;
/// Abort an in-progress download and return the device to its idle state.
pub const CMD_ABORT_DOWNLOAD: u8 = 0x05;
/// Query the battery level.
pub const CMD_QUERY_BATTERY: u8 = 0x06;
/// Set the device clock.
pub const CMD_SET_CLOCK: u8 = 0x07;
/// Program a new measurement (periods, duration, resolutions).
pub const CMD_CONFIGURE: u8 = 0x08;

// ============================================================================
// Framing
// ============================================================================

/// Default start-of-frame marker.
pub const START_MARKER: u8 = 0xAA;

/// Upper bound on frame payloads accepted by the codec, independent of the
/// length-field width. Length fields above this are treated as corruption.
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// Records per download chunk the device is willing to return. Frames are
/// limited to 255 payload bytes under the default one-byte length field, so
/// chunks are kept well under that.
pub const DOWNLOAD_CHUNK_RECORDS: usize = 32;

// ============================================================================
// Sample records
// ============================================================================

/// Size of one stored sample record on the wire.
pub const SAMPLE_RECORD_SIZE: usize = 6;

/// Sequence value marking the end of the recorded log.
pub const END_OF_LOG_SEQ: u16 = 0xFFFF;

// ============================================================================
// Sensor conversion (empirical)
// ============================================================================
//
// The temperature mapping was confirmed against a reference thermometer.
// The vibration divisor is a fit against a handful of known 1-3 G shocks
// and may drift for other firmware revisions.

/// Degrees Celsius per raw temperature count.
pub const TEMP_SCALE: f32 = 0.5;
/// Temperature offset in degrees Celsius at raw zero.
pub const TEMP_OFFSET: f32 = -30.0;
/// Highest raw temperature count the sensor can represent before saturating.
pub const TEMP_RAW_MAX: u8 = 200;

/// Raw vibration counts per G.
pub const VIB_SCALE: f32 = 14.5;
/// Highest raw vibration count the sensor can represent before saturating.
pub const VIB_RAW_MAX: u8 = 145;

/// The device reports battery as percent offset by 100.
pub const BATTERY_OFFSET: u8 = 100;
