//! Scoped serial port acquisition.
//!
//! Wraps `serialport`'s blocking port so every caller gets the same
//! guaranteed-close-on-all-exit-paths behaviour and the same timeout
//! convention as the rest of the gateway.

use std::io::{Read, Write};
use std::time::Duration;

use gw_core::prelude::*;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SerialConfig {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub stop_bits: u8,
}

impl SerialConfig {
    pub const fn new(baud_rate: u32, data_bits: u8, parity: Parity, stop_bits: u8) -> Self {
        Self {
            baud_rate,
            data_bits,
            parity,
            stop_bits,
        }
    }
}

fn to_serialport_data_bits(bits: u8) -> serialport::DataBits {
    match bits {
        5 => serialport::DataBits::Five,
        6 => serialport::DataBits::Six,
        7 => serialport::DataBits::Seven,
        _ => serialport::DataBits::Eight,
    }
}

fn to_serialport_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Odd => serialport::Parity::Odd,
        Parity::Even => serialport::Parity::Even,
    }
}

fn to_serialport_stop_bits(bits: u8) -> serialport::StopBits {
    match bits {
        2 => serialport::StopBits::Two,
        _ => serialport::StopBits::One,
    }
}

/// A scoped handle to a platform serial device. Dropping it closes the
/// underlying port regardless of the exit path.
pub struct SerialPort {
    path: String,
    port: Box<dyn serialport::SerialPort>,
}

impl SerialPort {
    /// Opens `path` with the given configuration. The port-level read
    /// timeout is set to a short poll interval; callers drive their own
    /// deadline on top via [`SerialPort::read`].
    pub fn open(path: &str, config: SerialConfig) -> Result<Self> {
        let port = serialport::new(path, config.baud_rate)
            .data_bits(to_serialport_data_bits(config.data_bits))
            .parity(to_serialport_parity(config.parity))
            .stop_bits(to_serialport_stop_bits(config.stop_bits))
            .timeout(Duration::from_millis(50))
            .open()
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        tracing::debug!(path, baud = config.baud_rate, "serial port opened");
        Ok(Self {
            path: path.to_string(),
            port,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn flush(&mut self) -> Result<()> {
        self.port.flush()?;
        // drain anything already buffered so probing starts from a clean frame boundary
        let mut scratch = [0u8; 256];
        loop {
            match self.port.read(&mut scratch) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Best-effort partial write; callers are responsible for retrying
    /// a short write.
    pub fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        match self.port.write(bytes) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    pub fn write_all(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let n = self.write(bytes)?;
            if n == 0 {
                continue;
            }
            bytes = &bytes[n..];
        }
        Ok(())
    }

    /// Reads whatever is available within `timeout` (`None` blocks
    /// indefinitely). Returns `Error::Timeout` if nothing arrives in time.
    pub fn read(&mut self, timeout: Timeout) -> Result<Vec<u8>> {
        let deadline = timeout.map(|d| std::time::Instant::now() + clamp_min(d));
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => {}
                Ok(n) => {
                    out.extend_from_slice(&buf[..n]);
                    return Ok(out);
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut || e.kind() == std::io::ErrorKind::WouldBlock => {
                    if let Some(deadline) = deadline {
                        if std::time::Instant::now() >= deadline {
                            return Err(Error::Timeout);
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn close(self) {
        tracing::debug!(path = %self.path, "serial port closed");
        // Drop takes care of the rest; named for call-site clarity.
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        tracing::trace!(path = %self.path, "serial port dropped");
    }
}
