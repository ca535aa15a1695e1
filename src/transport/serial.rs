//! Serial transport for RS-232/USB-serial instruments
//!
//! Commands are written with a line terminator; text responses are read byte
//! by byte until the response delimiter, bounded by an overall timeout.

use super::block::{self, TraceEncoding};
use super::{decode_response, Transport, TransportError};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::time::{Duration, Instant};
use tracing::debug;

/// Per-read timeout of the underlying port. The overall response timeout is
/// enforced by the read loop.
const PORT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial transport wrapping the `serialport` crate.
pub struct SerialTransport {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    port_name: String,

    /// Baud rate (e.g., 9600, 115200)
    baud_rate: u32,

    /// Overall response timeout
    timeout: Duration,

    /// Line terminator for commands (e.g., "\r\n")
    line_terminator: String,

    /// Response line ending character (e.g., '\n')
    response_delimiter: char,

    /// How traces are encoded on the wire
    encoding: TraceEncoding,

    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    /// Create an unopened serial transport with default settings
    ///
    /// # Arguments
    /// * `port_name` - Serial port path (e.g., "/dev/ttyUSB0", "COM3")
    /// * `baud_rate` - Communication speed (e.g., 9600, 115200)
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            timeout: Duration::from_secs(2),
            line_terminator: "\r\n".to_string(),
            response_delimiter: '\n',
            encoding: TraceEncoding::default(),
            port: None,
        }
    }

    /// Set overall response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Set response delimiter character
    pub fn with_response_delimiter(mut self, delimiter: char) -> Self {
        self.response_delimiter = delimiter;
        self
    }

    /// Set the trace encoding
    pub fn with_trace_encoding(mut self, encoding: TraceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Open the port.
    pub fn open(mut self) -> Result<Self, TransportError> {
        let port = serialport::new(&self.port_name, self.baud_rate)
            .timeout(PORT_POLL_TIMEOUT)
            .open()
            .map_err(|e| {
                TransportError::Serial(format!(
                    "failed to open '{}' at {} baud: {}",
                    self.port_name, self.baud_rate, e
                ))
            })?;
        debug!(
            "Serial port '{}' opened at {} baud",
            self.port_name, self.baud_rate
        );
        self.port = Some(port);
        Ok(self)
    }

    /// Whether the port is open.
    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let delimiter = self.response_delimiter;
        let timeout = self.timeout;
        let port = self.port()?;

        let mut response = Vec::new();
        let mut buffer = [0u8; 1];
        let start = Instant::now();

        loop {
            if start.elapsed() > timeout {
                return Err(TransportError::Timeout(timeout));
            }

            match port.read(&mut buffer) {
                Ok(1) => {
                    if char::from(buffer[0]) == delimiter {
                        break;
                    }
                    response.push(buffer[0]);
                }
                Ok(_) => return Err(TransportError::UnexpectedEof),
                // Port poll timeout is shorter than the response timeout
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        let response = decode_response(&response);
        debug!("Received serial response: {}", response);
        Ok(response)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let line = format!("{}{}", command, self.line_terminator);
        let port = self.port()?;
        port.write_all(line.as_bytes())?;
        port.flush()?;
        debug!("Sent serial command: {}", command);
        Ok(())
    }

    fn read(&mut self) -> Result<String, TransportError> {
        self.read_line()
    }

    fn read_binary(&mut self, command: &str) -> Result<Vec<f64>, TransportError> {
        self.write(command)?;
        match self.encoding.clone() {
            TraceEncoding::Ascii { separator } => {
                let line = self.read_line()?;
                block::parse_ascii(&line, &separator)
            }
            encoding => {
                // Blocks are read with read_exact, so the whole response
                // timeout applies to each read
                let timeout = self.timeout;
                let port = self.port()?;
                port.set_timeout(timeout)
                    .map_err(|e| TransportError::Serial(e.to_string()))?;
                let result = block::read_block(port.as_mut(), &encoding);
                port.set_timeout(PORT_POLL_TIMEOUT)
                    .map_err(|e| TransportError::Serial(e.to_string()))?;
                result
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.port.take() {
            Some(_) => {
                debug!("Serial port '{}' closed", self.port_name);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }

    fn describe(&self) -> String {
        format!(
            "SerialTransport({} @ {} baud)",
            self.port_name, self.baud_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_transport_creation() {
        let transport = SerialTransport::new("/dev/ttyUSB0".to_string(), 9600);
        assert!(!transport.is_open());
        assert_eq!(transport.port_name, "/dev/ttyUSB0");
        assert_eq!(transport.baud_rate, 9600);
    }

    #[test]
    fn test_serial_transport_builder() {
        let transport = SerialTransport::new("/dev/ttyUSB0".to_string(), 9600)
            .with_timeout(Duration::from_millis(500))
            .with_line_terminator("\n".to_string())
            .with_response_delimiter('\r');

        assert_eq!(transport.timeout, Duration::from_millis(500));
        assert_eq!(transport.line_terminator, "\n");
        assert_eq!(transport.response_delimiter, '\r');
    }

    #[test]
    fn test_describe() {
        let transport = SerialTransport::new("COM3".to_string(), 115200);
        let info = transport.describe();
        assert!(info.contains("COM3"));
        assert!(info.contains("115200"));
    }

    #[test]
    fn test_unopened_port_is_closed() {
        let mut transport = SerialTransport::new("/dev/null-port".to_string(), 9600);
        assert!(matches!(transport.write("*IDN?"), Err(TransportError::Closed)));
        assert!(matches!(transport.close(), Err(TransportError::Closed)));
    }
}
