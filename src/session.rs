//! Instrument sessions.
//!
//! An [`InstrumentSession`] owns one transport and one descriptor set, binds
//! the accessors once and exposes them by name:
//!
//! ```
//! use rust_instr::descriptor::{CapabilityDescriptorSet, ReadWriteProperty};
//! use rust_instr::binding::ProtocolConstants;
//! use rust_instr::session::InstrumentSession;
//! use rust_instr::transport::{MockRegister, MockTransport};
//!
//! let volt = ReadWriteProperty::new("volt", "VOLT").with_min(0.0).with_max(10.0);
//! let transport = MockTransport::new()
//!     .with_register(MockRegister::for_property(&volt, &ProtocolConstants::default()));
//! let descriptors = CapabilityDescriptorSet::new().with_read_write(volt).unwrap();
//!
//! let mut session = InstrumentSession::builder(descriptors)
//!     .name("psu")
//!     .open_with(transport)
//!     .unwrap();
//! session.set("volt", 5).unwrap();
//! assert_eq!(session.get("volt").unwrap().as_f64(), Some(5.0));
//! assert!(session.set("volt", 10).is_err());
//! session.close().unwrap();
//! ```

use crate::binding::{
    Accessor, AccessorTable, ProtocolConstants, ReadOnlyAccessor, ReadWriteAccessor,
    TraceAccessor,
};
use crate::coercion::{ResponseParser, StandardParser, Value};
use crate::descriptor::{AccessorKind, CapabilityDescriptorSet, ReadWriteProperty};
use crate::error::{InstrError, InstrResult};
use crate::readiness::{AlwaysReady, ReadinessProbe};
use crate::transport::{Transport, TransportError};
use tracing::{debug, info, warn};

/// A bound instrument.
///
/// Every operation runs one complete request/response exchange before
/// returning. The session performs no locking of its own: it is `Send`, and
/// callers sharing it between threads wrap it in a `Mutex`.
///
/// The transport is closed exactly once, by [`close`](Self::close) or on drop.
pub struct InstrumentSession {
    name: String,
    transport: Option<Box<dyn Transport>>,
    descriptors: CapabilityDescriptorSet,
    accessors: AccessorTable,
    constants: ProtocolConstants,
    parser: Box<dyn ResponseParser>,
    readiness: Box<dyn ReadinessProbe>,
}

impl InstrumentSession {
    /// Start configuring a session for `descriptors`.
    pub fn builder(descriptors: CapabilityDescriptorSet) -> SessionBuilder {
        SessionBuilder::new(descriptors)
    }

    /// Open a session with default protocol constants, parser and probe.
    pub fn open(
        transport: Box<dyn Transport>,
        descriptors: CapabilityDescriptorSet,
    ) -> InstrResult<Self> {
        SessionBuilder::new(descriptors).open(transport)
    }

    /// Instrument name used in logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Protocol constants the accessors were bound with.
    pub fn constants(&self) -> &ProtocolConstants {
        &self.constants
    }

    /// The descriptor set, frozen at binding.
    pub fn descriptors(&self) -> &CapabilityDescriptorSet {
        &self.descriptors
    }

    /// Name of the active response parser.
    pub fn parser_name(&self) -> &'static str {
        self.parser.name()
    }

    /// Look up a bound accessor.
    pub fn accessor(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }

    /// All bound names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.names()
    }

    /// Number of bound accessors.
    pub fn accessor_count(&self) -> usize {
        self.accessors.len()
    }

    /// Read a property.
    ///
    /// Read-write properties return their declared type; read-only properties
    /// return their raw text as [`Value::Text`].
    pub fn get(&mut self, name: &str) -> InstrResult<Value> {
        let (accessor, transport, parser) = self.parts(name)?;
        match accessor {
            Accessor::ReadWrite(a) => a.get(transport, parser),
            Accessor::ReadOnly(a) => a.get(transport).map(Value::Text),
            Accessor::Trace(_) => Err(wrong_kind(name, AccessorKind::ReadWrite, AccessorKind::Trace)),
        }
    }

    /// Write a read-write property, with validation, confirmation and read-back.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> InstrResult<()> {
        let (accessor, transport, parser) = self.parts(name)?;
        match accessor {
            Accessor::ReadWrite(a) => a.set(transport, parser, value.into()),
            other => Err(wrong_kind(name, AccessorKind::ReadWrite, other.kind())),
        }
    }

    /// Query a read-only property and return the raw text.
    pub fn read_text(&mut self, name: &str) -> InstrResult<String> {
        let (accessor, transport, _) = self.parts(name)?;
        match accessor {
            Accessor::ReadOnly(a) => a.get(transport),
            other => Err(wrong_kind(name, AccessorKind::ReadOnly, other.kind())),
        }
    }

    /// Fetch a trace.
    pub fn read_trace(&mut self, name: &str) -> InstrResult<Vec<f64>> {
        let (accessor, transport, _) = self.parts(name)?;
        match accessor {
            Accessor::Trace(a) => a.get(transport),
            other => Err(wrong_kind(name, AccessorKind::Trace, other.kind())),
        }
    }

    /// Typed handle to a read-write property.
    pub fn property(&mut self, name: &str) -> InstrResult<PropertyHandle<'_>> {
        let (accessor, transport, parser) = self.parts(name)?;
        match accessor {
            Accessor::ReadWrite(accessor) => Ok(PropertyHandle {
                accessor,
                transport,
                parser,
            }),
            other => Err(wrong_kind(name, AccessorKind::ReadWrite, other.kind())),
        }
    }

    /// Typed handle to a read-only property.
    pub fn read_only(&mut self, name: &str) -> InstrResult<ReadOnlyHandle<'_>> {
        let (accessor, transport, _) = self.parts(name)?;
        match accessor {
            Accessor::ReadOnly(accessor) => Ok(ReadOnlyHandle {
                accessor,
                transport,
            }),
            other => Err(wrong_kind(name, AccessorKind::ReadOnly, other.kind())),
        }
    }

    /// Typed handle to a trace.
    pub fn trace(&mut self, name: &str) -> InstrResult<TraceHandle<'_>> {
        let (accessor, transport, _) = self.parts(name)?;
        match accessor {
            Accessor::Trace(accessor) => Ok(TraceHandle {
                accessor,
                transport,
            }),
            other => Err(wrong_kind(name, AccessorKind::Trace, other.kind())),
        }
    }

    /// Ask the readiness probe whether the instrument is ready.
    pub fn is_ready(&mut self) -> InstrResult<bool> {
        let transport = self.transport.as_deref_mut().ok_or(TransportError::Closed)?;
        self.readiness.is_ready(transport)
    }

    /// Send a command outside the descriptor set.
    pub fn write_raw(&mut self, command: &str) -> InstrResult<()> {
        let transport = self.transport.as_deref_mut().ok_or(TransportError::Closed)?;
        debug!(instrument = %self.name, command = %command, "raw write");
        transport.write(command)?;
        Ok(())
    }

    /// Query outside the descriptor set.
    pub fn query_raw(&mut self, command: &str) -> InstrResult<String> {
        let transport = self.transport.as_deref_mut().ok_or(TransportError::Closed)?;
        let response = transport.query(command)?;
        debug!(instrument = %self.name, command = %command, response = %response, "raw query");
        Ok(response)
    }

    /// Close the transport and end the session.
    pub fn close(mut self) -> InstrResult<()> {
        match self.transport.take() {
            Some(mut transport) => {
                transport.close()?;
                info!(instrument = %self.name, "session closed");
                Ok(())
            }
            None => Err(TransportError::Closed.into()),
        }
    }

    fn parts(
        &mut self,
        name: &str,
    ) -> InstrResult<(&Accessor, &mut dyn Transport, &dyn ResponseParser)> {
        let accessor = self
            .accessors
            .get(name)
            .ok_or_else(|| InstrError::UnknownAccessor(name.to_string()))?;
        let transport = self.transport.as_deref_mut().ok_or(TransportError::Closed)?;
        Ok((accessor, transport, self.parser.as_ref()))
    }
}

impl Drop for InstrumentSession {
    fn drop(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            match transport.close() {
                Ok(()) => info!(instrument = %self.name, "session closed on drop"),
                Err(e) => warn!(instrument = %self.name, "failed to close transport: {}", e),
            }
        }
    }
}

impl std::fmt::Debug for InstrumentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentSession")
            .field("name", &self.name)
            .field("open", &self.transport.is_some())
            .field("accessors", &self.accessors.len())
            .field("constants", &self.constants)
            .field("parser", &self.parser.name())
            .finish()
    }
}

fn wrong_kind(name: &str, requested: AccessorKind, actual: AccessorKind) -> InstrError {
    InstrError::WrongAccessorKind {
        name: name.to_string(),
        requested,
        actual,
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Borrowed handle to a read-write property.
pub struct PropertyHandle<'s> {
    accessor: &'s ReadWriteAccessor,
    transport: &'s mut dyn Transport,
    parser: &'s dyn ResponseParser,
}

impl PropertyHandle<'_> {
    /// Property name.
    pub fn name(&self) -> &str {
        &self.accessor.descriptor().name
    }

    /// Documentation string from the descriptor.
    pub fn doc(&self) -> &str {
        &self.accessor.descriptor().doc_string
    }

    /// The full descriptor.
    pub fn descriptor(&self) -> &ReadWriteProperty {
        self.accessor.descriptor()
    }

    /// Read the property.
    pub fn get(&mut self) -> InstrResult<Value> {
        self.accessor.get(self.transport, self.parser)
    }

    /// Write the property.
    pub fn set(&mut self, value: impl Into<Value>) -> InstrResult<()> {
        self.accessor.set(self.transport, self.parser, value.into())
    }
}

/// Borrowed handle to a read-only property.
pub struct ReadOnlyHandle<'s> {
    accessor: &'s ReadOnlyAccessor,
    transport: &'s mut dyn Transport,
}

impl ReadOnlyHandle<'_> {
    /// Property name.
    pub fn name(&self) -> &str {
        &self.accessor.descriptor().name
    }

    /// Query the property.
    pub fn get(&mut self) -> InstrResult<String> {
        self.accessor.get(self.transport)
    }
}

/// Borrowed handle to a trace.
pub struct TraceHandle<'s> {
    accessor: &'s TraceAccessor,
    transport: &'s mut dyn Transport,
}

impl TraceHandle<'_> {
    /// Trace name.
    pub fn name(&self) -> &str {
        &self.accessor.descriptor().name
    }

    /// Fetch the trace.
    pub fn get(&mut self) -> InstrResult<Vec<f64>> {
        self.accessor.get(self.transport)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Configures and opens an [`InstrumentSession`].
pub struct SessionBuilder {
    name: String,
    descriptors: CapabilityDescriptorSet,
    constants: ProtocolConstants,
    parser: Box<dyn ResponseParser>,
    readiness: Box<dyn ReadinessProbe>,
    init_commands: Vec<String>,
}

impl SessionBuilder {
    /// Builder with default constants, [`StandardParser`] and [`AlwaysReady`].
    pub fn new(descriptors: CapabilityDescriptorSet) -> Self {
        Self {
            name: "instrument".to_string(),
            descriptors,
            constants: ProtocolConstants::default(),
            parser: Box::new(StandardParser),
            readiness: Box::new(AlwaysReady),
            init_commands: Vec::new(),
        }
    }

    /// Instrument name used in logs.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace all protocol constants.
    pub fn protocol(mut self, constants: ProtocolConstants) -> Self {
        self.constants = constants;
        self
    }

    /// Query suffix.
    pub fn get_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.constants.get_suffix = suffix.into();
        self
    }

    /// Separator between command and value.
    pub fn set_separator(mut self, separator: impl Into<String>) -> Self {
        self.constants.set_separator = separator.into();
        self
    }

    /// Reply expected after every write.
    pub fn expected_set_response(mut self, response: impl Into<String>) -> Self {
        self.constants.expected_set_response = Some(response.into());
        self
    }

    /// Template for written values.
    pub fn value_format(mut self, template: impl Into<String>) -> Self {
        self.constants.value_format = template.into();
        self
    }

    /// Response parsing strategy.
    pub fn parser<P: ResponseParser + 'static>(self, parser: P) -> Self {
        self.boxed_parser(Box::new(parser))
    }

    /// Response parsing strategy, already boxed.
    pub fn boxed_parser(mut self, parser: Box<dyn ResponseParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Readiness probe.
    pub fn readiness<R: ReadinessProbe + 'static>(self, probe: R) -> Self {
        self.boxed_readiness(Box::new(probe))
    }

    /// Readiness probe, already boxed.
    pub fn boxed_readiness(mut self, probe: Box<dyn ReadinessProbe>) -> Self {
        self.readiness = probe;
        self
    }

    /// Command written once after binding.
    pub fn init_command(mut self, command: impl Into<String>) -> Self {
        self.init_commands.push(command.into());
        self
    }

    /// Commands written once after binding, in order.
    pub fn init_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.init_commands.extend(commands.into_iter().map(Into::into));
        self
    }

    /// Bind the accessors, run the init commands and open the session.
    ///
    /// On any failure the transport is closed before the error is returned.
    pub fn open(self, mut transport: Box<dyn Transport>) -> InstrResult<InstrumentSession> {
        let accessors = match AccessorTable::bind(&self.descriptors, &self.constants) {
            Ok(accessors) => accessors,
            Err(e) => {
                warn!(instrument = %self.name, "binding failed: {}", e);
                if let Err(close_err) = transport.close() {
                    warn!(instrument = %self.name, "failed to close transport: {}", close_err);
                }
                return Err(e);
            }
        };

        let description = transport.describe();
        let mut session = InstrumentSession {
            name: self.name,
            transport: Some(transport),
            descriptors: self.descriptors,
            accessors,
            constants: self.constants,
            parser: self.parser,
            readiness: self.readiness,
        };

        // Dropping the session on failure closes the transport
        for command in &self.init_commands {
            session.write_raw(command)?;
        }

        info!(
            instrument = %session.name,
            transport = %description,
            accessors = session.accessor_count(),
            parser = session.parser_name(),
            "session opened"
        );
        Ok(session)
    }

    /// [`open`](Self::open) for an unboxed transport.
    pub fn open_with<T: Transport + 'static>(self, transport: T) -> InstrResult<InstrumentSession> {
        self.open(Box::new(transport))
    }
}
