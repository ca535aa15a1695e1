//! Instrument transports.
//!
//! The binding engine talks to instruments only through the [`Transport`] trait:
//! a blocking, message-based request/response channel. Implementations:
//!
//! - [`MockTransport`]: scripted in-memory instrument for tests and dry runs
//! - [`SerialTransport`]: RS-232/USB-serial via `serialport` (feature `instrument_serial`)
//! - [`VisaTransport`]: GPIB/USB/LXI via `visa-rs` (feature `instrument_visa`)
//!
//! Transports strip line terminators from text responses; callers never see
//! `\r` or `\n` at the end of a reply.

pub mod block;
pub mod mock;
#[cfg(feature = "instrument_serial")]
pub mod serial;
#[cfg(feature = "instrument_visa")]
pub mod visa;

pub use block::{BlockHeader, ByteOrder, ElementType, TraceEncoding};
pub use mock::{MockCall, MockHandle, MockRegister, MockTransport};
#[cfg(feature = "instrument_serial")]
pub use serial::SerialTransport;
#[cfg(feature = "instrument_visa")]
pub use visa::VisaTransport;

use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by transports. Propagated unchanged through the engine.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// No response within the configured timeout
    #[error("Read timeout after {0:?}")]
    Timeout(Duration),

    /// Stream ended in the middle of a response
    #[error("Unexpected EOF from instrument")]
    UnexpectedEof,

    /// The transport was already closed
    #[error("Transport is closed")]
    Closed,

    /// Response bytes are not valid UTF-8
    #[error("Response is not valid UTF-8")]
    InvalidUtf8,

    /// A trace block could not be decoded
    #[error("Malformed data block: {0}")]
    MalformedBlock(String),

    /// VISA library error
    #[error("VISA error: {0}")]
    Visa(String),

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(String),

    /// Transport kind compiled out
    #[error("Transport '{0}' is not enabled. Rebuild with --features {1}")]
    FeatureNotEnabled(&'static str, &'static str),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => TransportError::UnexpectedEof,
            _ => TransportError::Io(err),
        }
    }
}

/// A blocking request/response channel to one instrument.
///
/// Every call completes its exchange before returning; implementations need
/// no internal locking because a transport has exactly one owner.
pub trait Transport: Send {
    /// Send a command, expecting no reply.
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Read one pending text response.
    fn read(&mut self) -> Result<String, TransportError>;

    /// Send a command and read its text response.
    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command)?;
        self.read()
    }

    /// Send a command and read a numeric block in the transport's trace encoding.
    fn read_binary(&mut self, command: &str) -> Result<Vec<f64>, TransportError>;

    /// Release the connection. Further calls fail with [`TransportError::Closed`].
    fn close(&mut self) -> Result<(), TransportError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }

    fn read(&mut self) -> Result<String, TransportError> {
        (**self).read()
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).query(command)
    }

    fn read_binary(&mut self, command: &str) -> Result<Vec<f64>, TransportError> {
        (**self).read_binary(command)
    }

    fn close(&mut self) -> Result<(), TransportError> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// =============================================================================
// Transport configuration
// =============================================================================

/// Which transport an instrument profile opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportConfig {
    /// In-memory instrument without any scripted behaviour
    Mock,
    /// Serial port
    Serial {
        /// Port path (e.g. "/dev/ttyUSB0", "COM3")
        port: String,
        /// Baud rate
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
        /// Read timeout in milliseconds
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        /// Appended to every command
        #[serde(default = "default_serial_terminator")]
        line_terminator: String,
        /// Byte that ends a text response
        #[serde(default = "default_response_delimiter")]
        response_delimiter: char,
    },
    /// VISA resource
    Visa {
        /// Resource string (e.g. "GPIB0::1::INSTR")
        resource: String,
        /// Open timeout in milliseconds
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
        /// Appended to every command
        #[serde(default = "default_visa_terminator")]
        line_terminator: String,
    },
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig::Mock
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_timeout_ms() -> u64 {
    2000
}

fn default_serial_terminator() -> String {
    "\r\n".to_string()
}

fn default_visa_terminator() -> String {
    "\n".to_string()
}

fn default_response_delimiter() -> char {
    '\n'
}

/// Open the transport described by `config`.
pub fn open_transport(
    config: &TransportConfig,
    encoding: TraceEncoding,
) -> Result<Box<dyn Transport>, TransportError> {
    match config {
        TransportConfig::Mock => Ok(Box::new(MockTransport::new().with_trace_encoding(encoding))),

        #[cfg(feature = "instrument_serial")]
        TransportConfig::Serial {
            port,
            baud_rate,
            timeout_ms,
            line_terminator,
            response_delimiter,
        } => {
            let transport = SerialTransport::new(port.clone(), *baud_rate)
                .with_timeout(Duration::from_millis(*timeout_ms))
                .with_line_terminator(line_terminator.clone())
                .with_response_delimiter(*response_delimiter)
                .with_trace_encoding(encoding)
                .open()?;
            Ok(Box::new(transport))
        }
        #[cfg(not(feature = "instrument_serial"))]
        TransportConfig::Serial { .. } => Err(TransportError::FeatureNotEnabled(
            "serial",
            "instrument_serial",
        )),

        #[cfg(feature = "instrument_visa")]
        TransportConfig::Visa {
            resource,
            timeout_ms,
            line_terminator,
        } => {
            let transport = VisaTransport::new(resource.clone())
                .with_timeout(Duration::from_millis(*timeout_ms))
                .with_line_terminator(line_terminator.clone())
                .with_trace_encoding(encoding)
                .open()?;
            Ok(Box::new(transport))
        }
        #[cfg(not(feature = "instrument_visa"))]
        TransportConfig::Visa { .. } => {
            Err(TransportError::FeatureNotEnabled("visa", "instrument_visa"))
        }
    }
}

/// Decode a text response and strip surrounding whitespace and terminators.
///
/// Instruments answer in whatever code page their firmware uses (windows-1252
/// on some controllers), so bytes that are not UTF-8 become U+FFFD instead of
/// failing the read.
#[cfg_attr(
    not(any(feature = "instrument_serial", feature = "instrument_visa")),
    allow(dead_code)
)]
pub(crate) fn decode_response(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_maps_to_unexpected_eof() {
        let err: TransportError = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, TransportError::UnexpectedEof));
        let err: TransportError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, TransportError::Io(_)));
    }

    #[test]
    fn test_transport_config_defaults() {
        let config: TransportConfig =
            serde_yaml::from_str("kind: serial\nport: /dev/ttyUSB0\n").unwrap();
        assert_eq!(
            config,
            TransportConfig::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: 9600,
                timeout_ms: 2000,
                line_terminator: "\r\n".to_string(),
                response_delimiter: '\n',
            }
        );
    }

    #[test]
    fn test_open_mock_transport() {
        let mut transport =
            open_transport(&TransportConfig::Mock, TraceEncoding::default()).unwrap();
        assert!(transport.describe().contains("Mock"));
        assert!(transport.close().is_ok());
    }

    #[cfg(not(feature = "instrument_visa"))]
    #[test]
    fn test_visa_feature_disabled() {
        let config = TransportConfig::Visa {
            resource: "GPIB0::1::INSTR".to_string(),
            timeout_ms: 1000,
            line_terminator: "\n".to_string(),
        };
        let err = open_transport(&config, TraceEncoding::default()).err().unwrap();
        assert!(matches!(err, TransportError::FeatureNotEnabled("visa", _)));
    }

    #[test]
    fn test_non_utf8_response_decodes() {
        use crate::coercion::{FirstNumberParser, ResponseParser};
        use crate::coercion::Value;
        use crate::descriptor::ValueType;

        // 0xB0 is the degree sign in windows-1252
        let response = decode_response(b"temp 25\xb0C\r");
        assert_eq!(response, "temp 25\u{fffd}C");
        assert_eq!(
            FirstNumberParser.parse(&response, ValueType::Int).unwrap(),
            Value::Int(25)
        );
        assert_eq!(decode_response(b" 1.5\r\n"), "1.5");
    }
}
