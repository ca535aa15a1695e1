//! VISA transport for GPIB/USB/Ethernet instruments
//!
//! Supports resource strings like:
//! - "GPIB0::1::INSTR" (GPIB interface)
//! - "USB0::0x1234::0x5678::SERIAL::INSTR" (USB)
//! - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)

use super::block::{self, TraceEncoding};
use super::{decode_response, Transport, TransportError};
use std::ffi::CString;
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;
use visa_rs::prelude::*;

struct VisaSession {
    // Keeps the resource manager alive for as long as the instrument is open
    _rm: DefaultRM,
    instr: Instrument,
}

/// VISA transport wrapping the `visa-rs` crate.
pub struct VisaTransport {
    /// VISA resource string (e.g., "GPIB0::1::INSTR")
    resource_string: String,

    /// Open timeout
    timeout: Duration,

    /// Line terminator for commands (typically "\n" for SCPI)
    line_terminator: String,

    /// How traces are encoded on the wire
    encoding: TraceEncoding,

    session: Option<VisaSession>,
}

impl VisaTransport {
    /// Create an unopened VISA transport
    ///
    /// # Arguments
    /// * `resource_string` - VISA resource identifier (e.g., "GPIB0::1::INSTR")
    pub fn new(resource_string: String) -> Self {
        Self {
            resource_string,
            timeout: Duration::from_secs(5),
            line_terminator: "\n".to_string(),
            encoding: TraceEncoding::default(),
            session: None,
        }
    }

    /// Set open timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set line terminator for commands
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Set the trace encoding
    pub fn with_trace_encoding(mut self, encoding: TraceEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Open the resource.
    pub fn open(mut self) -> Result<Self, TransportError> {
        let rm = DefaultRM::new().map_err(|e| {
            TransportError::Visa(format!("failed to create resource manager: {}", e))
        })?;
        let resource = CString::new(self.resource_string.clone()).map_err(|_| {
            TransportError::Visa(format!(
                "resource string {:?} contains a NUL byte",
                self.resource_string
            ))
        })?;
        let instr = rm
            .open(&resource.into(), AccessMode::NO_LOCK, self.timeout)
            .map_err(|e| {
                TransportError::Visa(format!("failed to open {}: {}", self.resource_string, e))
            })?;
        debug!("VISA resource '{}' opened", self.resource_string);

        self.session = Some(VisaSession { _rm: rm, instr });
        Ok(self)
    }

    /// Whether the resource is open.
    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn instrument(&mut self) -> Result<&mut Instrument, TransportError> {
        self.session
            .as_mut()
            .map(|s| &mut s.instr)
            .ok_or(TransportError::Closed)
    }

    fn read_line(&mut self) -> Result<String, TransportError> {
        let mut reader: &Instrument = self.instrument()?;
        let mut response = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte)? {
                0 => break,
                _ if byte[0] == b'\n' => break,
                _ => response.push(byte[0]),
            }
        }
        let response = decode_response(&response);
        debug!("Received VISA response: {}", response);
        Ok(response)
    }
}

impl Transport for VisaTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let line = format!("{}{}", command, self.line_terminator);
        let instr = self.instrument()?;
        instr.write_all(line.as_bytes())?;
        debug!("Sent VISA command: {}", command);
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
                let mut reader: &Instrument = self.instrument()?;
                block::read_block(&mut reader, &encoding)
            }
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        match self.session.take() {
            Some(_) => {
                debug!("VISA resource '{}' closed", self.resource_string);
                Ok(())
            }
            None => Err(TransportError::Closed),
        }
    }

    fn describe(&self) -> String {
        format!(
            "VisaTransport({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visa_transport_creation() {
        let transport = VisaTransport::new("GPIB0::1::INSTR".to_string());
        assert!(!transport.is_open());
        assert_eq!(transport.resource_string, "GPIB0::1::INSTR");
        assert_eq!(transport.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_visa_transport_builder() {
        let transport = VisaTransport::new("USB0::0x1234::0x5678::SERIAL::INSTR".to_string())
            .with_timeout(Duration::from_millis(2000))
            .with_line_terminator("\r\n".to_string());

        assert_eq!(transport.timeout, Duration::from_millis(2000));
        assert_eq!(transport.line_terminator, "\r\n");
    }

    #[test]
    fn test_describe() {
        let transport = VisaTransport::new("TCPIP0::192.168.1.100::INSTR".to_string())
            .with_timeout(Duration::from_millis(3000));
        let info = transport.describe();
        assert!(info.contains("TCPIP0::192.168.1.100::INSTR"));
        assert!(info.contains("3000ms"));
    }
}
