//! Host error taxonomy.
//!
//! Transient transport failures (timeouts, I/O errors) are retried by the
//! transport within its bounded policy and only surface here after
//! exhaustion, carrying the attempt count. Caller-misuse errors (state
//! transitions, bad arguments) surface immediately and never touch the
//! device. Every surfaced error names the operation attempted and the
//! session state at the time of failure.

use thiserror::Error;

use wanderer_protocol::ProtocolError;

use crate::session::SessionState;

/// Errors surfaced by the host engine.
#[derive(Error, Debug)]
pub enum HostError {
    /// The serial port could not be opened or configured. Fatal.
    #[error("serial port {port} unavailable: {source}")]
    PortUnavailable {
        /// Port name as given by the caller.
        port: String,
        /// Underlying serial error.
        source: serialport::Error,
    },

    /// No response within the budget, after the full retry policy.
    #[error("{operation} timed out in state {state} after {attempts} attempt(s)")]
    Timeout {
        /// Operation attempted.
        operation: &'static str,
        /// Session state when the failure happened.
        state: SessionState,
        /// Attempts made before surfacing.
        attempts: u32,
    },

    /// I/O failed mid-transfer, after the full retry policy.
    #[error("{operation} link error in state {state} after {attempts} attempt(s): {source}")]
    Link {
        /// Operation attempted.
        operation: &'static str,
        /// Session state when the failure happened.
        state: SessionState,
        /// Attempts made before surfacing.
        attempts: u32,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The device answered, but with something the protocol cannot accept.
    #[error("{operation} protocol violation in state {state}: {source}")]
    Protocol {
        /// Operation attempted.
        operation: &'static str,
        /// Session state when the failure happened.
        state: SessionState,
        /// What was wrong with the response.
        source: ProtocolError,
    },

    /// The requested operation is not legal from the current state. No
    /// device I/O was performed.
    #[error("invalid transition: {requested} not allowed from {from}")]
    InvalidStateTransition {
        /// State the session was in.
        from: SessionState,
        /// Operation that was requested.
        requested: &'static str,
    },

    /// A recording is already in progress.
    #[error("already sampling")]
    AlreadySampling,

    /// Caller-supplied command arguments failed validation. No device I/O
    /// was performed.
    #[error("invalid arguments for {operation}: {source}")]
    InvalidPayload {
        /// Operation attempted.
        operation: &'static str,
        /// Validation failure.
        source: ProtocolError,
    },

    /// The link was released by an earlier failure; open a new session.
    #[error("{operation} attempted on a closed link")]
    LinkClosed {
        /// Operation attempted.
        operation: &'static str,
    },
}
