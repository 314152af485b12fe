//! Wanderer host-side session engine.
//!
//! Drives one Wanderer logger over one exclusively owned serial link. The
//! layering, bottom up:
//!
//! - [`link`]: the physical byte transport. [`link::SerialLink`] owns the
//!   port; the [`link::Link`] trait lets tests substitute a simulated
//!   device.
//! - [`transport`]: synchronous request/response over a link. Frames the
//!   command, reads incrementally until a matching frame decodes,
//!   resynchronizes after corruption, and retries with bounded backoff.
//! - [`session`]: the legal operation order. Tracks the session state
//!   machine, rejects out-of-order requests before any I/O, and turns
//!   download chunks into a decoded sample log.
//!
//! The protocol is half-duplex request/response with no multiplexing, so a
//! session serializes all exchanges; callers wanting concurrency run
//! independent sessions on independent links.

pub mod error;
pub mod link;
pub mod retry;
pub mod session;
pub mod transport;

pub use error::HostError;
pub use link::{Link, PortSettings, SerialLink};
pub use retry::RetryPolicy;
pub use session::{CancelToken, DeviceSession, SessionConfig, SessionState};
pub use transport::{Transport, TransportError};
