//! Wanderer Serial Protocol
//!
//! This crate provides types and utilities for talking to Wanderer
//! battery-powered temperature/vibration loggers over their serial protocol.
//! The protocol has no official documentation; everything here was recovered
//! by observing a real unit on a serial sniffer, so the wire-format
//! assumptions (delimiters, checksum algorithm, field widths) are kept as
//! configuration data rather than hardcoded constants.
//!
//! # Protocol Overview
//!
//! Exchanges are strictly half-duplex request/response. The host sends a
//! framed command, the device answers with a frame echoing the command code:
//!
//! ```text
//! +-------+---------+--------+------------------+----------+
//! | start | command | length | payload[0..len]  | checksum |
//! +-------+---------+--------+------------------+----------+
//! ```
//!
//! With the default [`FrameConfig`] the start marker is `0xAA`, the length
//! field is one byte, and the checksum is the XOR of the command byte, the
//! length field, and every payload byte. Some firmware revisions appear to
//! use an additive checksum and/or a trailing end marker; both are covered
//! by alternative [`FrameConfig`] values.
//!
//! # Example
//!
//! ```rust,ignore
//! use wanderer_protocol::{Command, FrameCodec, FrameConfig, Response};
//!
//! // Build a command frame
//! let frame = Command::QueryStatus.encode(&FrameConfig::default())?;
//!
//! // Feed received bytes and pull out responses
//! let mut codec = FrameCodec::new(FrameConfig::default());
//! codec.push(&received);
//! if let Some(frame) = codec.try_decode()? {
//!     let response = Response::decode(&frame)?;
//! }
//! ```

mod commands;
mod constants;
mod error;
mod frame;
mod responses;
mod samples;
mod types;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use frame::*;
pub use responses::*;
pub use samples::*;
pub use types::*;
