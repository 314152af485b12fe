//! Synchronous request/response over a link.
//!
//! One exchange: write the encoded command frame, then read incrementally,
//! feeding the frame codec until a frame with the matching command code
//! decodes or the response budget runs out. Corrupt stretches are discarded
//! and reading continues within the same budget; resynchronization never
//! extends the deadline, so a noisy link degrades to a timeout instead of
//! hanging. Timeouts and I/O errors retry the whole send under the injected
//! [`RetryPolicy`], with the attempt count carried on the surfaced error.

use std::io;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use wanderer_protocol::{Command, DecodedFrame, FrameCodec, FrameConfig, ProtocolError, Response};

use crate::link::Link;
use crate::retry::RetryPolicy;

/// How long a single blocking read waits before the deadline is rechecked.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from one command/response exchange, before the session attaches
/// operation and state context.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No matching response within the budget on any attempt.
    #[error("no response within {timeout:?} after {attempts} attempt(s)")]
    Timeout {
        /// Attempts made.
        attempts: u32,
        /// Per-attempt response budget.
        timeout: Duration,
    },

    /// Link I/O failed on the final attempt.
    #[error("link I/O failed after {attempts} attempt(s): {source}")]
    Link {
        /// Attempts made.
        attempts: u32,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// Command arguments failed validation; nothing was written.
    #[error("invalid command arguments: {source}")]
    Encode {
        /// Validation failure.
        source: ProtocolError,
    },

    /// A frame arrived but its payload does not parse as a response.
    #[error("malformed response: {source}")]
    Response {
        /// Decoding failure.
        source: ProtocolError,
    },
}

enum ExchangeFailure {
    TimedOut,
    Io(io::Error),
}

/// Request/response pump over one exclusively owned link.
pub struct Transport<L: Link> {
    link: L,
    codec: FrameCodec,
    retry: RetryPolicy,
    response_timeout: Duration,
}

impl<L: Link> Transport<L> {
    /// Build a transport over `link` with the given wire variant, retry
    /// policy, and per-attempt response budget.
    pub fn new(
        link: L,
        frame_config: FrameConfig,
        retry: RetryPolicy,
        response_timeout: Duration,
    ) -> Self {
        Transport {
            link,
            codec: FrameCodec::new(frame_config),
            retry,
            response_timeout,
        }
    }

    /// Send `command` and wait for its response, retrying transient
    /// failures up to the policy budget.
    pub fn send_and_wait(&mut self, command: &Command) -> Result<Response, TransportError> {
        // Validate and encode before any byte reaches the wire.
        let frame_bytes = command
            .encode(self.codec.config())
            .map_err(|source| TransportError::Encode { source })?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.exchange(&frame_bytes, command.code()) {
                Ok(frame) => {
                    return Response::decode(&frame)
                        .map_err(|source| TransportError::Response { source });
                }
                Err(ExchangeFailure::TimedOut) => {
                    warn!(
                        "{} attempt {}/{} timed out",
                        command.name(),
                        attempt,
                        max_attempts
                    );
                    match self.retry.delay_after(attempt) {
                        Some(delay) => backoff(delay),
                        None => {
                            return Err(TransportError::Timeout {
                                attempts: attempt,
                                timeout: self.response_timeout,
                            })
                        }
                    }
                }
                Err(ExchangeFailure::Io(source)) => {
                    warn!(
                        "{} attempt {}/{} link error: {}",
                        command.name(),
                        attempt,
                        max_attempts,
                        source
                    );
                    match self.retry.delay_after(attempt) {
                        Some(delay) => backoff(delay),
                        None => {
                            return Err(TransportError::Link {
                                attempts: attempt,
                                source,
                            })
                        }
                    }
                }
            }
            attempt += 1;
        }
    }

    /// One write-then-read-until-frame attempt.
    fn exchange(
        &mut self,
        frame_bytes: &[u8],
        expect_code: u8,
    ) -> Result<DecodedFrame, ExchangeFailure> {
        // Anything still buffered belongs to an earlier, failed exchange.
        self.codec.clear();

        self.link.send(frame_bytes).map_err(ExchangeFailure::Io)?;

        let deadline = Instant::now() + self.response_timeout;
        let mut chunk = [0u8; 64];
        loop {
            loop {
                match self.codec.try_decode() {
                    Ok(Some(frame)) if frame.command == expect_code => return Ok(frame),
                    Ok(Some(frame)) => {
                        debug!("skipping stale frame 0x{:02X}", frame.command);
                    }
                    Ok(None) => break,
                    Err(reason) => {
                        warn!("resynchronizing after corrupt input: {reason}");
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ExchangeFailure::TimedOut);
            }
            let wait = (deadline - now).min(POLL_INTERVAL);
            let n = self
                .link
                .recv(&mut chunk, wait)
                .map_err(ExchangeFailure::Io)?;
            if n > 0 {
                self.codec.push(&chunk[..n]);
            }
        }
    }
}

fn backoff(delay: Duration) {
    if !delay.is_zero() {
        thread::sleep(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use wanderer_protocol::{encode_frame, DeviceStatus};

    /// A link whose replies are scripted up front. Each `recv` hands back
    /// the next canned burst immediately; an empty script means silence.
    struct ScriptedLink {
        sent: Vec<Vec<u8>>,
        replies: VecDeque<Vec<u8>>,
        send_failures: u32,
    }

    impl ScriptedLink {
        fn new(replies: Vec<Vec<u8>>) -> Self {
            ScriptedLink {
                sent: Vec::new(),
                replies: replies.into(),
                send_failures: 0,
            }
        }
    }

    impl Link for ScriptedLink {
        fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.send_failures > 0 {
                self.send_failures -= 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "adapter reset"));
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        fn recv(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<usize> {
            match self.replies.pop_front() {
                Some(reply) => {
                    let n = reply.len().min(buf.len());
                    buf[..n].copy_from_slice(&reply[..n]);
                    if n < reply.len() {
                        self.replies.push_front(reply[n..].to_vec());
                    }
                    Ok(n)
                }
                None => Ok(0),
            }
        }
    }

    fn status_reply() -> Vec<u8> {
        encode_frame(
            &FrameConfig::default(),
            0x01,
            &[0x00, 0x03, 0x00, 0xC8, 0x01, 0x00, 0x01, 0x00],
        )
        .unwrap()
    }

    fn fast_transport(link: ScriptedLink, max_attempts: u32) -> Transport<ScriptedLink> {
        Transport::new(
            link,
            FrameConfig::default(),
            RetryPolicy {
                max_attempts,
                base_delay: Duration::ZERO,
                multiplier: 1,
            },
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_simple_exchange() {
        let link = ScriptedLink::new(vec![status_reply()]);
        let mut transport = fast_transport(link, 3);
        match transport.send_and_wait(&Command::QueryStatus).unwrap() {
            Response::Status(DeviceStatus { sample_count, .. }) => assert_eq!(sample_count, 3),
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_three_timeouts_no_fourth_attempt() {
        let link = ScriptedLink::new(vec![]);
        let mut transport = fast_transport(link, 3);
        match transport.send_and_wait(&Command::QueryStatus) {
            Err(TransportError::Timeout { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(transport.link.sent.len(), 3);
    }

    #[test]
    fn test_corrupt_then_good_within_budget() {
        let mut corrupted = status_reply();
        corrupted[3] ^= 0xFF;
        let mut stream = corrupted;
        stream.extend_from_slice(&status_reply());

        let link = ScriptedLink::new(vec![stream]);
        let mut transport = fast_transport(link, 1);
        assert!(matches!(
            transport.send_and_wait(&Command::QueryStatus),
            Ok(Response::Status(_))
        ));
    }

    #[test]
    fn test_stale_frame_skipped() {
        // A leftover battery reply arrives before the status frame.
        let stale = encode_frame(&FrameConfig::default(), 0x06, &[0xC8]).unwrap();
        let link = ScriptedLink::new(vec![stale, status_reply()]);
        let mut transport = fast_transport(link, 1);
        assert!(matches!(
            transport.send_and_wait(&Command::QueryStatus),
            Ok(Response::Status(_))
        ));
    }

    #[test]
    fn test_link_error_retried_then_succeeds() {
        let mut link = ScriptedLink::new(vec![status_reply()]);
        link.send_failures = 2;
        let mut transport = fast_transport(link, 3);
        assert!(transport.send_and_wait(&Command::QueryStatus).is_ok());
        assert_eq!(transport.link.sent.len(), 1);
    }

    #[test]
    fn test_link_error_exhausts_budget() {
        let mut link = ScriptedLink::new(vec![]);
        link.send_failures = 5;
        let mut transport = fast_transport(link, 2);
        match transport.send_and_wait(&Command::QueryStatus) {
            Err(TransportError::Link { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected link error, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_failure_writes_nothing() {
        let link = ScriptedLink::new(vec![]);
        let mut transport = fast_transport(link, 3);
        let bad = Command::Configure(wanderer_protocol::SamplingConfig {
            sample_period_secs: 0,
            ..Default::default()
        });
        assert!(matches!(
            transport.send_and_wait(&bad),
            Err(TransportError::Encode { .. })
        ));
        assert!(transport.link.sent.is_empty());
    }
}
