//! # RFPlayer Serial Transport
//!
//! Line oriented access to the dongle. [`Transport`] is the seam between the
//! dispatch engine and the physical link: [`SerialTransport`] talks to a real
//! port through `tokio-serial`, while [`crate::rfp::mock::MockTransport`]
//! scripts a dongle in memory. A [`Connector`] opens transports by port name
//! so that clients can reconnect after a firmware update.

use crate::constants::{DEFAULT_BAUDRATE, DEFAULT_READ_TIMEOUT, MAX_LINE_BUFFER, TERMINATOR};
use crate::error::RfpError;
use crate::logging::log_warn;
use crate::util::logging::log_frame_hex;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::{SerialPort, SerialPortBuilderExt};

/// Configuration for serial connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baudrate: u32,
    /// RTS/CTS hardware flow control.
    pub rtscts: bool,
    /// Per read timeout handed to the port driver.
    #[serde(with = "crate::config::millis")]
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            baudrate: DEFAULT_BAUDRATE,
            rtscts: true,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Line oriented link to a dongle.
#[async_trait]
pub trait Transport: Send {
    /// Writes `line` followed by the `\r` terminator.
    async fn write_line(&mut self, line: &str) -> Result<(), RfpError>;

    /// Writes bytes untouched (firmware images).
    async fn write_raw(&mut self, data: &[u8]) -> Result<(), RfpError>;

    /// Reads one terminated line, or `None` when nothing complete arrived
    /// within `wait`.
    async fn read_line(&mut self, wait: Duration) -> Result<Option<String>, RfpError>;

    /// Discards bytes queued for output.
    async fn reset_output(&mut self) -> Result<(), RfpError>;

    async fn close(&mut self) -> Result<(), RfpError>;
}

/// Opens transports by port name.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, port: &str, config: &SerialConfig) -> Result<Box<dyn Transport>, RfpError>;
}

/// Splits the first terminated line off `buf`.
///
/// Both `\r` and `\n` terminate a line; empty lines are skipped.
pub(crate) fn take_line(buf: &mut BytesMut) -> Option<String> {
    loop {
        let pos = buf.iter().position(|&b| b == TERMINATOR || b == b'\n')?;
        let line = buf.split_to(pos);
        buf.advance(1);
        if line.is_empty() {
            continue;
        }
        if std::str::from_utf8(&line).is_err() {
            log_frame_hex("Non UTF-8 line", &line);
        }
        return Some(String::from_utf8_lossy(&line).into_owned());
    }
}

/// Clears `buf` once it holds more than [`MAX_LINE_BUFFER`] bytes without a
/// terminator. Returns the number of bytes dropped.
pub(crate) fn drop_unterminated(buf: &mut BytesMut, name: &str) -> usize {
    if buf.len() <= MAX_LINE_BUFFER {
        return 0;
    }
    let dropped = buf.len();
    buf.clear();
    log_warn(&format!("{name}: {dropped} bytes without line terminator dropped as noise"));
    dropped
}

/// Transport over a `tokio-serial` stream.
pub struct SerialTransport {
    port: tokio_serial::SerialStream,
    buffer: BytesMut,
    name: String,
}

impl SerialTransport {
    /// Opens the port with 8N1 framing and the configured flow control.
    pub fn open(port_name: &str, config: &SerialConfig) -> Result<SerialTransport, RfpError> {
        let flow = if config.rtscts {
            tokio_serial::FlowControl::Hardware
        } else {
            tokio_serial::FlowControl::None
        };
        let port = tokio_serial::new(port_name, config.baudrate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(flow)
            .timeout(config.timeout)
            .open_native_async()
            .map_err(|e| RfpError::Transport(format!("{port_name}: {e}")))?;

        Ok(SerialTransport {
            port,
            buffer: BytesMut::with_capacity(1024),
            name: port_name.to_string(),
        })
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn write_line(&mut self, line: &str) -> Result<(), RfpError> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(TERMINATOR);
        self.write_raw(&data).await
    }

    async fn write_raw(&mut self, data: &[u8]) -> Result<(), RfpError> {
        self.port
            .write_all(data)
            .await
            .map_err(|e| RfpError::Transport(format!("{}: {e}", self.name)))?;
        self.port
            .flush()
            .await
            .map_err(|e| RfpError::Transport(format!("{}: {e}", self.name)))
    }

    async fn read_line(&mut self, wait: Duration) -> Result<Option<String>, RfpError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(line) = take_line(&mut self.buffer) {
                return Ok(Some(line));
            }
            drop_unterminated(&mut self.buffer, &self.name);
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match timeout(remaining, self.port.read_buf(&mut self.buffer)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    return Err(RfpError::Transport(format!("{}: port closed", self.name)))
                }
                Ok(Ok(_)) => continue,
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::TimedOut => return Ok(None),
                Ok(Err(e)) => return Err(RfpError::Transport(format!("{}: {e}", self.name))),
            }
        }
    }

    async fn reset_output(&mut self) -> Result<(), RfpError> {
        self.port
            .clear(tokio_serial::ClearBuffer::Output)
            .map_err(|e| RfpError::Transport(format!("{}: {e}", self.name)))
    }

    async fn close(&mut self) -> Result<(), RfpError> {
        // SerialStream has no close; the descriptor is released on drop.
        self.buffer.clear();
        Ok(())
    }
}

/// Connector opening real serial ports.
#[derive(Debug, Default, Clone)]
pub struct SerialConnector;

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self, port: &str, config: &SerialConfig) -> Result<Box<dyn Transport>, RfpError> {
        Ok(Box::new(SerialTransport::open(port, config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_line_splits_on_terminator() {
        let mut buf = BytesMut::from(&b"ZIA--PONG\rZIA33{}\rpartial"[..]);
        assert_eq!(take_line(&mut buf).as_deref(), Some("ZIA--PONG"));
        assert_eq!(take_line(&mut buf).as_deref(), Some("ZIA33{}"));
        assert_eq!(take_line(&mut buf), None);
        assert_eq!(&buf[..], b"partial");
    }

    #[test]
    fn test_take_line_skips_blank_lines() {
        let mut buf = BytesMut::from(&b"\r\n\rZIA44TEXT\r\n"[..]);
        assert_eq!(take_line(&mut buf).as_deref(), Some("ZIA44TEXT"));
        assert_eq!(take_line(&mut buf), None);
    }

    #[test]
    fn test_unterminated_noise_is_capped() {
        let mut buf = BytesMut::from(&b"ZIA--PONG"[..]);
        assert_eq!(drop_unterminated(&mut buf, "test"), 0);
        assert_eq!(&buf[..], b"ZIA--PONG");

        buf.extend_from_slice(&[b'x'; MAX_LINE_BUFFER]);
        assert_eq!(take_line(&mut buf), None);
        assert_eq!(drop_unterminated(&mut buf, "test"), MAX_LINE_BUFFER + 9);
        assert!(buf.is_empty());

        buf.extend_from_slice(b"ZIA44JAMMING OFF\r");
        assert_eq!(take_line(&mut buf).as_deref(), Some("ZIA44JAMMING OFF"));
    }

    #[test]
    fn test_serial_defaults() {
        let cfg = SerialConfig::default();
        assert_eq!(cfg.baudrate, 115_200);
        assert!(cfg.rtscts);
        assert_eq!(cfg.timeout, Duration::from_millis(100));
    }
}
