//! Device session state machine.
//!
//! Sequences the legal operation order for one logger: connect, query,
//! program, start/stop sampling, download. Out-of-order requests are
//! rejected before any byte reaches the device. Transport failures drop
//! the session to [`SessionState::Disconnected`] and release the link; the
//! session never retries beyond the transport's own budget. Recovery
//! policy above that belongs to the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use wanderer_protocol::{
    chunk_is_final, decode_stream, Command, Completeness, DeviceStatus, DownloadedLog,
    FrameConfig, ProtocolError, Response, SamplingConfig, SAMPLE_RECORD_SIZE,
};

use crate::error::HostError;
use crate::link::{Link, PortSettings, SerialLink};
use crate::retry::RetryPolicy;
use crate::transport::{Transport, TransportError};

/// Session states, in the order a normal run visits them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No confirmed device. Initial state; also the landing state after
    /// any transport failure.
    Disconnected,
    /// Device presence confirmed by a status query.
    Connected,
    /// Ready for programming, sampling, or download.
    Idle,
    /// A recording is in progress.
    Sampling,
    /// A download is in progress.
    Downloading,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Idle => "idle",
            SessionState::Sampling => "sampling",
            SessionState::Downloading => "downloading",
        };
        f.write_str(name)
    }
}

/// Cooperative cancellation for long downloads. Cloneable; any clone can
/// cancel, checked between chunk requests.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Everything configurable about a session, with the empirically discovered
/// defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Serial port parameters.
    pub port: PortSettings,
    /// Wire-format variant.
    pub frame: FrameConfig,
    /// Transport retry policy.
    pub retry: RetryPolicy,
    /// Per-attempt response budget.
    pub response_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            port: PortSettings::default(),
            frame: FrameConfig::default(),
            retry: RetryPolicy::default(),
            response_timeout: Duration::from_secs(2),
        }
    }
}

/// A session with one logger over one exclusively owned link.
pub struct DeviceSession<L: Link> {
    transport: Option<Transport<L>>,
    state: SessionState,
    status: Option<DeviceStatus>,
}

impl DeviceSession<SerialLink> {
    /// Open the named serial port. The session starts [`SessionState::Disconnected`];
    /// call [`DeviceSession::connect`] to confirm the device is there.
    pub fn open(port_name: &str, config: &SessionConfig) -> Result<Self, HostError> {
        let link = SerialLink::open(port_name, &config.port)?;
        Ok(Self::with_link(link, config))
    }
}

impl<L: Link> DeviceSession<L> {
    /// Build a session over an already-open link. Used directly by tests
    /// running against a simulated device.
    pub fn with_link(link: L, config: &SessionConfig) -> Self {
        DeviceSession {
            transport: Some(Transport::new(
                link,
                config.frame,
                config.retry,
                config.response_timeout,
            )),
            state: SessionState::Disconnected,
            status: None,
        }
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Status from the most recent successful query, if any.
    pub fn last_status(&self) -> Option<&DeviceStatus> {
        self.status.as_ref()
    }

    /// Confirm device presence with a status query.
    pub fn connect(&mut self) -> Result<DeviceStatus, HostError> {
        self.require("connect", &[SessionState::Disconnected])?;
        let status = self.query_status("connect")?;
        self.state = SessionState::Connected;
        info!(
            "connected: sampling={}, {} samples stored, battery {}%",
            status.sampling, status.sample_count, status.battery_percent
        );
        Ok(status)
    }

    /// Move a connected session to idle, ready for operations.
    pub fn enter_idle(&mut self) -> Result<(), HostError> {
        self.require("enter-idle", &[SessionState::Connected])?;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Re-query device status.
    pub fn refresh_status(&mut self) -> Result<DeviceStatus, HostError> {
        self.require(
            "query-status",
            &[
                SessionState::Connected,
                SessionState::Idle,
                SessionState::Sampling,
            ],
        )?;
        self.query_status("query-status")
    }

    /// Query the battery level in percent.
    pub fn battery(&mut self) -> Result<u8, HostError> {
        self.require(
            "query-battery",
            &[
                SessionState::Connected,
                SessionState::Idle,
                SessionState::Sampling,
            ],
        )?;
        match self.exchange("query-battery", &Command::QueryBattery)? {
            Response::Battery { percent } => Ok(percent),
            _ => Err(self.unexpected("query-battery", "battery")),
        }
    }

    /// Set the device clock.
    pub fn set_clock(&mut self, unix_secs: u32) -> Result<(), HostError> {
        self.require(
            "set-clock",
            &[SessionState::Connected, SessionState::Idle],
        )?;
        self.expect_ack("set-clock", &Command::SetClock { unix_secs })
    }

    /// Program a new measurement. Replaces the recorded log.
    pub fn configure(&mut self, config: SamplingConfig) -> Result<(), HostError> {
        self.require("configure", &[SessionState::Idle])?;
        self.expect_ack("configure", &Command::Configure(config))
    }

    /// Adopt an in-progress recording reported by the device, so that a
    /// fresh session can stop a recording started days earlier. Legal only
    /// when the last status actually reported sampling; no I/O happens.
    pub fn resume_sampling(&mut self) -> Result<(), HostError> {
        self.require("resume-sampling", &[SessionState::Connected])?;
        if !self.status.as_ref().is_some_and(|s| s.sampling) {
            return Err(HostError::InvalidStateTransition {
                from: self.state,
                requested: "resume-sampling",
            });
        }
        self.state = SessionState::Sampling;
        Ok(())
    }

    /// Begin recording.
    pub fn start_sampling(&mut self) -> Result<(), HostError> {
        if self.state == SessionState::Sampling {
            return Err(HostError::AlreadySampling);
        }
        self.require("start-sampling", &[SessionState::Idle])?;
        self.expect_ack("start-sampling", &Command::StartSampling)?;
        self.state = SessionState::Sampling;
        Ok(())
    }

    /// Stop recording. The log stays on the device for download.
    pub fn stop_sampling(&mut self) -> Result<(), HostError> {
        self.require("stop-sampling", &[SessionState::Sampling])?;
        self.expect_ack("stop-sampling", &Command::StopSampling)?;
        self.state = SessionState::Idle;
        Ok(())
    }

    /// Download the recorded log and decode it into samples.
    ///
    /// The device hands the log back in chunks; `cancel` is checked between
    /// chunk requests. On cancellation the device is sent an abort (falling
    /// back to dropping the link when even that fails) and the partial log
    /// is returned with [`Completeness::Partial`]. On success or protocol
    /// failure the session lands back in idle; a transport failure lands it
    /// disconnected, as everywhere else. It is never left in
    /// [`SessionState::Downloading`].
    pub fn download(&mut self, cancel: Option<&CancelToken>) -> Result<DownloadedLog, HostError> {
        self.require("download", &[SessionState::Idle])?;
        self.state = SessionState::Downloading;

        let hint = self.status.as_ref().map(|s| s.sample_count as usize);
        let mut raw: Vec<u8> = Vec::new();
        let mut offset: u16 = 0;
        let mut cancelled = false;

        loop {
            if cancel.is_some_and(|token| token.is_cancelled()) {
                cancelled = true;
                break;
            }

            let data = match self.exchange("download-samples", &Command::DownloadSamples { offset })?
            {
                Response::SampleChunk { data } => data,
                _ => return Err(self.unexpected("download-samples", "sample chunk")),
            };

            let records = data.len() / SAMPLE_RECORD_SIZE;
            let finished = chunk_is_final(&data);
            raw.extend_from_slice(&data);

            if finished || records == 0 {
                break;
            }
            // The offset field caps the log the device can address; stop
            // rather than wrap and re-request the same records forever.
            match offset.checked_add(records as u16) {
                Some(next) => offset = next,
                None => break,
            }
        }

        if cancelled {
            info!("download cancelled at {} raw bytes", raw.len());
            match self.exchange("abort-download", &Command::AbortDownload) {
                Ok(_) => {}
                Err(err) => warn!("abort after cancel failed, link dropped: {err}"),
            }
        }

        let mut log = decode_stream(&raw, hint);
        if cancelled {
            log.completeness = Completeness::Partial;
        }
        if self.state == SessionState::Downloading {
            self.state = SessionState::Idle;
        }
        info!(
            "downloaded {} samples ({:?}), {} dropped, {} clamped",
            log.samples.len(),
            log.completeness,
            log.dropped,
            log.clamped
        );
        Ok(log)
    }

    /// Release the link and reset to disconnected. Safe from any state; a
    /// device left sampling keeps recording on its own.
    pub fn disconnect(&mut self) {
        if self.transport.is_some() {
            info!("disconnecting in state {}", self.state);
        }
        self.transport = None;
        self.status = None;
        self.state = SessionState::Disconnected;
    }

    fn require(&self, requested: &'static str, allowed: &[SessionState]) -> Result<(), HostError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(HostError::InvalidStateTransition {
                from: self.state,
                requested,
            })
        }
    }

    fn query_status(&mut self, operation: &'static str) -> Result<DeviceStatus, HostError> {
        match self.exchange(operation, &Command::QueryStatus)? {
            Response::Status(status) => {
                self.status = Some(status.clone());
                Ok(status)
            }
            _ => Err(self.unexpected(operation, "status")),
        }
    }

    fn expect_ack(&mut self, operation: &'static str, command: &Command) -> Result<(), HostError> {
        match self.exchange(operation, command)? {
            Response::Ack { .. } => Ok(()),
            _ => Err(self.unexpected(operation, "acknowledgement")),
        }
    }

    /// One transport exchange, with session semantics attached: argument
    /// validation surfaces without touching the state, every other failure
    /// drops the session and releases the link.
    fn exchange(
        &mut self,
        operation: &'static str,
        command: &Command,
    ) -> Result<Response, HostError> {
        let transport = self
            .transport
            .as_mut()
            .ok_or(HostError::LinkClosed { operation })?;
        match transport.send_and_wait(command) {
            Ok(response) => Ok(response),
            Err(TransportError::Encode { source }) => {
                Err(HostError::InvalidPayload { operation, source })
            }
            Err(err) => Err(self.fail(operation, err)),
        }
    }

    fn unexpected(&mut self, operation: &'static str, expected: &'static str) -> HostError {
        self.fail(
            operation,
            TransportError::Response {
                source: ProtocolError::UnexpectedResponse { expected },
            },
        )
    }

    fn fail(&mut self, operation: &'static str, err: TransportError) -> HostError {
        let state = self.state;
        warn!("{operation} failed in state {state}, dropping link: {err}");
        self.transport = None;
        self.status = None;
        self.state = SessionState::Disconnected;
        match err {
            TransportError::Timeout { attempts, .. } => HostError::Timeout {
                operation,
                state,
                attempts,
            },
            TransportError::Link { attempts, source } => HostError::Link {
                operation,
                state,
                attempts,
                source,
            },
            TransportError::Response { source } | TransportError::Encode { source } => {
                HostError::Protocol {
                    operation,
                    state,
                    source,
                }
            }
        }
    }
}
