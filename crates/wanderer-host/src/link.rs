//! Physical link ownership.
//!
//! The serial link is an exclusively owned resource: [`SerialLink`] holds
//! the open port handle and releases it when dropped, so every exit path
//! gives the port back, error exits included. The [`Link`] trait
//! is the seam the transport is written against, which lets tests drive the
//! real protocol against an in-process simulated device.

use std::io;
use std::thread;
use std::time::Duration;

use serialport::{DataBits, Parity, SerialPort, StopBits};

use crate::error::HostError;

/// A blocking byte transport to one device.
pub trait Link: Send {
    /// Write `bytes` to the device.
    fn send(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read whatever is available into `buf`, waiting at most `timeout`.
    /// Returns the number of bytes read; 0 means nothing arrived in time.
    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

/// Serial port parameters.
///
/// The defaults are the values the tested unit actually speaks; they were
/// found by trial, not documentation, so every one of them is overridable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// Baud rate.
    pub baud_rate: u32,
    /// Data bits per character.
    pub data_bits: DataBits,
    /// Parity checking.
    pub parity: Parity,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Assert RTS. The unit draws extra power from this line; leaving it
    /// deasserted produces intermittent garbage on marginal batteries.
    pub rts: bool,
    /// Assert DTR. Not connected in the original straight cable.
    pub dtr: bool,
    /// Delay between individual bytes on write. The unit is picky about
    /// accepting writes; pacing one character at a time proved most robust
    /// with the known-flaky USB adapters.
    pub write_pacing: Option<Duration>,
}

impl Default for PortSettings {
    fn default() -> Self {
        PortSettings {
            baud_rate: 9600,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            rts: true,
            dtr: false,
            write_pacing: Some(Duration::from_millis(1)),
        }
    }
}

/// An open serial link to a logger.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    write_pacing: Option<Duration>,
}

impl SerialLink {
    /// Open and configure the named port.
    pub fn open(port_name: &str, settings: &PortSettings) -> Result<Self, HostError> {
        let unavailable = |source| HostError::PortUnavailable {
            port: port_name.to_string(),
            source,
        };

        let mut port = serialport::new(port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(unavailable)?;

        port.write_request_to_send(settings.rts).map_err(unavailable)?;
        port.write_data_terminal_ready(settings.dtr)
            .map_err(unavailable)?;

        log::info!("opened {} at {} baud", port_name, settings.baud_rate);
        Ok(SerialLink {
            port,
            write_pacing: settings.write_pacing,
        })
    }
}

impl Link for SerialLink {
    fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.write_pacing {
            Some(pacing) => {
                for byte in bytes {
                    self.port.write_all(std::slice::from_ref(byte))?;
                    thread::sleep(pacing);
                }
            }
            None => self.port.write_all(bytes)?,
        }
        self.port.flush()
    }

    fn recv(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        self.port
            .set_timeout(timeout)
            .map_err(io::Error::from)?;
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }
}
