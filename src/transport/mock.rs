//! Mock transport for testing
//!
//! Simulates an instrument without requiring physical hardware. It provides:
//! - Fixed replies per query string
//! - Echo registers that remember the last value written to a property
//! - Write confirmations (accepting or rejecting)
//! - Trace blocks, raw or pre-decoded
//! - One-shot failure injection
//! - Call logging for test verification
//!
//! The transport is usually moved into a session, so every piece of state
//! lives behind a shared [`MockHandle`] that tests keep for inspection.

use super::block::{self, TraceEncoding};
use super::{Transport, TransportError};
use crate::binding::{self, ProtocolConstants};
use crate::descriptor::ReadWriteProperty;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::{self, Cursor};
use std::sync::Arc;
use std::time::Duration;

/// One recorded transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    /// `write(command)`
    Write(String),
    /// `query(command)`
    Query(String),
    /// `read()`
    Read,
    /// `read_binary(command)`
    ReadBinary(String),
    /// `close()`
    Close,
}

/// A simulated setting: writes starting with `set_prefix` store a value that
/// queries equal to `query` return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRegister {
    set_prefix: String,
    query: String,
    unit: String,
    value: String,
    ignore_writes: bool,
}

impl MockRegister {
    /// Register answering `query`, updated by writes beginning with `set_prefix`.
    pub fn new(set_prefix: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            set_prefix: set_prefix.into(),
            query: query.into(),
            unit: String::new(),
            value: "0".to_string(),
            ignore_writes: false,
        }
    }

    /// Register matching the wire strings a bound property will use.
    pub fn for_property(property: &ReadWriteProperty, constants: &ProtocolConstants) -> Self {
        Self::new(
            binding::set_prefix(&property.command, &constants.set_separator, &property.suffix),
            binding::property_query(&property.command, &constants.get_suffix, &property.suffix),
        )
        .with_unit(property.value_unit.clone())
    }

    /// Strip this unit from written values.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Value reported before any write.
    pub fn with_initial(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    /// Keep reporting the same value whatever is written.
    pub fn ignore_writes(mut self) -> Self {
        self.ignore_writes = true;
        self
    }

    fn apply_write(&mut self, command: &str) -> bool {
        let Some(rest) = command.strip_prefix(self.set_prefix.as_str()) else {
            return false;
        };
        if !self.ignore_writes {
            let rest = rest.strip_suffix(self.unit.as_str()).unwrap_or(rest);
            self.value = rest.trim().to_string();
        }
        true
    }
}

#[derive(Debug, Clone)]
enum TraceData {
    Samples(Vec<f64>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmation {
    Accept,
    Reject,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    responses: HashMap<String, String>,
    replies: VecDeque<String>,
    pending_reads: VecDeque<String>,
    registers: Vec<MockRegister>,
    traces: HashMap<String, TraceData>,
    confirmation: Option<(String, Confirmation)>,
    encoding: TraceEncoding,
    fail_next: bool,
    closed: bool,
    close_count: usize,
}

impl MockState {
    fn check(&mut self) -> Result<(), TransportError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(TransportError::Io(io::Error::other("injected mock failure")));
        }
        if self.closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

/// Mock transport for testing
///
/// # Example
///
/// ```
/// use rust_instr::transport::{MockTransport, Transport};
///
/// let mut transport = MockTransport::new().with_response("*IDN?", "ACME,OSA-1,0001,1.0");
/// let handle = transport.handle();
///
/// assert_eq!(transport.query("*IDN?").unwrap(), "ACME,OSA-1,0001,1.0");
/// assert_eq!(handle.queries(), vec!["*IDN?".to_string()]);
/// ```
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    timeout: Duration,
}

impl MockTransport {
    /// Create a mock transport that knows no commands.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            timeout: Duration::from_secs(1),
        }
    }

    /// Answer `query` with a fixed `reply`.
    pub fn with_response(self, query: impl Into<String>, reply: impl Into<String>) -> Self {
        self.state.lock().responses.insert(query.into(), reply.into());
        self
    }

    /// Add an echo register.
    pub fn with_register(self, register: MockRegister) -> Self {
        self.state.lock().registers.push(register);
        self
    }

    /// After every write, queue `reply` for the next `read()` and apply the write.
    pub fn with_confirmation(self, reply: impl Into<String>) -> Self {
        self.state.lock().confirmation = Some((reply.into(), Confirmation::Accept));
        self
    }

    /// After every write, queue `reply` for the next `read()` and drop the write.
    pub fn with_rejection(self, reply: impl Into<String>) -> Self {
        self.state.lock().confirmation = Some((reply.into(), Confirmation::Reject));
        self
    }

    /// Return `samples` for `read_binary(command)`.
    pub fn with_trace(self, command: impl Into<String>, samples: Vec<f64>) -> Self {
        self.state
            .lock()
            .traces
            .insert(command.into(), TraceData::Samples(samples));
        self
    }

    /// Decode `raw` with the configured trace encoding on `read_binary(command)`.
    pub fn with_trace_block(self, command: impl Into<String>, raw: Vec<u8>) -> Self {
        self.state
            .lock()
            .traces
            .insert(command.into(), TraceData::Raw(raw));
        self
    }

    /// Set the trace encoding used for raw blocks.
    pub fn with_trace_encoding(self, encoding: TraceEncoding) -> Self {
        self.state.lock().encoding = encoding;
        self
    }

    /// Timeout reported when nothing answers a query.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Shared handle for inspecting and steering the mock after it is moved.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Write(command.to_string()));
        state.check()?;

        let confirmation = state.confirmation.clone();
        if !matches!(confirmation, Some((_, Confirmation::Reject))) {
            for register in state.registers.iter_mut() {
                if register.apply_write(command) {
                    break;
                }
            }
        }
        if let Some((reply, _)) = confirmation {
            state.pending_reads.push_back(reply);
        }
        Ok(())
    }

    fn read(&mut self) -> Result<String, TransportError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Read);
        state.check()?;
        state
            .pending_reads
            .pop_front()
            .ok_or(TransportError::Timeout(self.timeout))
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Query(command.to_string()));
        state.check()?;

        if let Some(reply) = state.replies.pop_front() {
            return Ok(reply);
        }
        if let Some(reply) = state.responses.get(command) {
            return Ok(reply.clone());
        }
        state
            .registers
            .iter()
            .find(|r| r.query == command)
            .map(|r| r.value.clone())
            .ok_or(TransportError::Timeout(self.timeout))
    }

    fn read_binary(&mut self, command: &str) -> Result<Vec<f64>, TransportError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::ReadBinary(command.to_string()));
        state.check()?;

        match state.traces.get(command) {
            Some(TraceData::Samples(samples)) => Ok(samples.clone()),
            Some(TraceData::Raw(raw)) => match &state.encoding {
                TraceEncoding::Ascii { separator } => {
                    let text =
                        std::str::from_utf8(raw).map_err(|_| TransportError::InvalidUtf8)?;
                    block::parse_ascii(text, separator)
                }
                encoding => block::read_block(&mut Cursor::new(raw), encoding),
            },
            None => Err(TransportError::Timeout(self.timeout)),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Close);
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.closed = true;
        state.close_count += 1;
        Ok(())
    }

    fn describe(&self) -> String {
        let state = self.state.lock();
        format!(
            "MockTransport ({} responses, {} registers, {} traces)",
            state.responses.len(),
            state.registers.len(),
            state.traces.len()
        )
    }
}

/// Shared view of a [`MockTransport`]'s state.
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    /// Commands passed to `write`.
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Write(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Commands passed to `query`.
    pub fn queries(&self) -> Vec<String> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|c| match c {
                MockCall::Query(command) => Some(command.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Answer the next query with `reply`, whatever it asks.
    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.state.lock().replies.push_back(reply.into());
    }

    /// Queue `reply` for the next `read()`.
    pub fn queue_read(&self, reply: impl Into<String>) {
        self.state.lock().pending_reads.push_back(reply.into());
    }

    /// Replace or add a fixed reply.
    pub fn set_response(&self, query: impl Into<String>, reply: impl Into<String>) {
        self.state.lock().responses.insert(query.into(), reply.into());
    }

    /// Change the confirmation reply queued after writes.
    pub fn set_confirmation(&self, reply: Option<String>) {
        self.state.lock().confirmation = reply.map(|r| (r, Confirmation::Accept));
    }

    /// Current value of the register answering `query`.
    pub fn register_value(&self, query: &str) -> Option<String> {
        self.state
            .lock()
            .registers
            .iter()
            .find(|r| r.query == query)
            .map(|r| r.value.clone())
    }

    /// Fail the next operation with an I/O error.
    pub fn fail_next(&self) {
        self.state.lock().fail_next = true;
    }

    /// Whether `close()` has succeeded.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of successful `close()` calls.
    pub fn close_count(&self) -> usize {
        self.state.lock().close_count
    }
}
