//! Accessor binding engine.
//!
//! Turns a [`CapabilityDescriptorSet`] into a table of accessors, one per
//! descriptor, with every wire string computed once at bind time.
//!
//! # Wire format
//!
//! With protocol constants `get_suffix`, `set_separator` and a descriptor
//! `{command, suffix, value_unit}`:
//!
//! | Operation              | Sent                                                   |
//! |------------------------|--------------------------------------------------------|
//! | read-only `get`        | `command + get_suffix`                                 |
//! | read-write `get`       | `command + get_suffix + " " + suffix`                  |
//! | read-write `set(v)`    | `command + set_separator + " " + suffix + format(v) + value_unit` |
//! | trace `get`            | `command + get_suffix + " " + suffix` (binary read)    |
//!
//! The space after `get_suffix`/`set_separator` is sent even when `suffix` is
//! empty; instruments that care use a `set_separator` of `""`.
//!
//! # Set sequence
//!
//! 1. Coerce the value to the declared type.
//! 2. Validate: allowed values, then the exclusive `min_value`, then the
//!    exclusive `max_value`. The value is also rendered through the format
//!    template here. Nothing is written if any step fails.
//! 3. Write the set command.
//! 4. If an expected set response is configured, read one reply and compare.
//!    A mismatch fails the set immediately; no read-back is attempted.
//! 5. Read the property back and compare it with the written value.

use crate::coercion::{ResponseParser, Value, ValueFormat};
use crate::descriptor::{
    AccessorKind, BinaryTrace, CapabilityDescriptorSet, ReadOnlyProperty, ReadWriteProperty,
};
use crate::error::{InstrError, InstrResult};
use crate::transport::Transport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Per-instrument protocol constants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConstants {
    /// Appended to a command to query it
    pub get_suffix: String,
    /// Placed between a command and the value on writes
    pub set_separator: String,
    /// Reply the instrument sends after every write, if any
    pub expected_set_response: Option<String>,
    /// Template for rendering written values
    pub value_format: String,
}

impl Default for ProtocolConstants {
    fn default() -> Self {
        Self {
            get_suffix: "?".to_string(),
            set_separator: " ".to_string(),
            expected_set_response: None,
            value_format: "{}".to_string(),
        }
    }
}

/// Query sent by a read-only property.
pub fn read_only_query(command: &str, get_suffix: &str) -> String {
    format!("{}{}", command, get_suffix)
}

/// Query sent by a read-write property or a trace.
pub fn property_query(command: &str, get_suffix: &str, suffix: &str) -> String {
    format!("{}{} {}", command, get_suffix, suffix)
}

/// Everything a set command carries before the formatted value.
pub fn set_prefix(command: &str, set_separator: &str, suffix: &str) -> String {
    format!("{}{} {}", command, set_separator, suffix)
}

// =============================================================================
// Accessors
// =============================================================================

/// Query-only property returning raw text.
#[derive(Debug, Clone)]
pub struct ReadOnlyAccessor {
    descriptor: ReadOnlyProperty,
    query: String,
}

impl ReadOnlyAccessor {
    fn bind(descriptor: &ReadOnlyProperty, constants: &ProtocolConstants) -> Self {
        Self {
            query: read_only_query(&descriptor.command, &constants.get_suffix),
            descriptor: descriptor.clone(),
        }
    }

    /// The bound descriptor.
    pub fn descriptor(&self) -> &ReadOnlyProperty {
        &self.descriptor
    }

    /// Query string sent on `get`.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Query the instrument and return the response unmodified.
    pub fn get(&self, transport: &mut dyn Transport) -> InstrResult<String> {
        let response = transport.query(&self.query)?;
        debug!(property = %self.descriptor.name, query = %self.query, response = %response, "read-only get");
        Ok(response)
    }
}

/// Typed, validated, settable property.
#[derive(Debug, Clone)]
pub struct ReadWriteAccessor {
    descriptor: ReadWriteProperty,
    query: String,
    set_prefix: String,
    format: ValueFormat,
    expected_set_response: Option<String>,
}

impl ReadWriteAccessor {
    fn bind(
        descriptor: &ReadWriteProperty,
        constants: &ProtocolConstants,
        format: &ValueFormat,
    ) -> Self {
        Self {
            query: property_query(&descriptor.command, &constants.get_suffix, &descriptor.suffix),
            set_prefix: set_prefix(&descriptor.command, &constants.set_separator, &descriptor.suffix),
            format: format.clone(),
            expected_set_response: constants.expected_set_response.clone(),
            descriptor: descriptor.clone(),
        }
    }

    /// The bound descriptor.
    pub fn descriptor(&self) -> &ReadWriteProperty {
        &self.descriptor
    }

    /// Query string sent on `get`.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Set command without the value and unit.
    pub fn set_prefix(&self) -> &str {
        &self.set_prefix
    }

    /// Query the property and coerce the response to the declared type.
    pub fn get(
        &self,
        transport: &mut dyn Transport,
        parser: &dyn ResponseParser,
    ) -> InstrResult<Value> {
        let response = transport.query(&self.query)?;
        debug!(property = %self.descriptor.name, query = %self.query, response = %response, "get");
        parser.parse(&response, self.descriptor.value_type)
    }

    /// Coerce `value` to the declared type and check it against the
    /// descriptor's constraints.
    pub fn validate(&self, value: Value) -> InstrResult<Value> {
        let name = self.descriptor.name.as_str();
        let value = value.coerce_to(self.descriptor.value_type, name)?;

        if let Some(allowed) = &self.descriptor.allowed_values {
            if !allowed.contains(&value) {
                let listed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                return Err(InstrError::validation(
                    name,
                    format!("{} is not one of [{}]", value, listed.join(", ")),
                ));
            }
        }

        if self.descriptor.min_value.is_none() && self.descriptor.max_value.is_none() {
            return Ok(value);
        }
        let number = value.as_f64().ok_or_else(|| {
            InstrError::validation(name, format!("bounds need a numeric value, got {:?}", value))
        })?;
        if let Some(min) = self.descriptor.min_value {
            if number <= min {
                return Err(InstrError::validation(
                    name,
                    format!("{} <= min_value {}", value, min),
                ));
            }
        }
        if let Some(max) = self.descriptor.max_value {
            if number >= max {
                return Err(InstrError::validation(
                    name,
                    format!("{} >= max_value {}", value, max),
                ));
            }
        }
        Ok(value)
    }

    /// Full command that writes an already validated `value`.
    pub fn set_command(&self, value: &Value) -> InstrResult<String> {
        let rendered = self.format.render(value, &self.descriptor.name)?;
        Ok(format!(
            "{}{}{}",
            self.set_prefix, rendered, self.descriptor.value_unit
        ))
    }

    /// Validate, write, confirm and read back.
    pub fn set(
        &self,
        transport: &mut dyn Transport,
        parser: &dyn ResponseParser,
        value: Value,
    ) -> InstrResult<()> {
        let name = self.descriptor.name.as_str();
        let value = self.validate(value)?;
        let command = self.set_command(&value)?;

        transport.write(&command)?;
        debug!(property = %name, command = %command, "set");

        if let Some(expected) = &self.expected_set_response {
            let reply = transport.read()?;
            if reply != *expected {
                warn!(property = %name, expected = %expected, reply = %reply, "set not confirmed");
                return Err(InstrError::protocol(
                    name,
                    format!("expected {:?} after write, got {:?}", expected, reply),
                ));
            }
        }

        let read_back = self.get(transport, parser)?;
        if read_back != value {
            warn!(property = %name, written = %value, read = %read_back, "read-back mismatch");
            return Err(InstrError::protocol(
                name,
                format!("wrote {} but instrument reports {}", value, read_back),
            ));
        }
        Ok(())
    }
}

/// Binary numeric trace.
#[derive(Debug, Clone)]
pub struct TraceAccessor {
    descriptor: BinaryTrace,
    query: String,
}

impl TraceAccessor {
    fn bind(descriptor: &BinaryTrace, constants: &ProtocolConstants) -> Self {
        Self {
            query: property_query(&descriptor.command, &constants.get_suffix, &descriptor.suffix),
            descriptor: descriptor.clone(),
        }
    }

    /// The bound descriptor.
    pub fn descriptor(&self) -> &BinaryTrace {
        &self.descriptor
    }

    /// Query string sent on `get`.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Fetch the trace in transport order.
    pub fn get(&self, transport: &mut dyn Transport) -> InstrResult<Vec<f64>> {
        let samples = transport.read_binary(&self.query)?;
        debug!(trace = %self.descriptor.name, query = %self.query, points = samples.len(), "trace read");
        Ok(samples)
    }
}

/// One bound accessor.
#[derive(Debug, Clone)]
pub enum Accessor {
    /// Read-only property
    ReadOnly(ReadOnlyAccessor),
    /// Read-write property
    ReadWrite(ReadWriteAccessor),
    /// Binary trace
    Trace(TraceAccessor),
}

impl Accessor {
    /// Declared name.
    pub fn name(&self) -> &str {
        match self {
            Accessor::ReadOnly(a) => &a.descriptor.name,
            Accessor::ReadWrite(a) => &a.descriptor.name,
            Accessor::Trace(a) => &a.descriptor.name,
        }
    }

    /// Accessor kind.
    pub fn kind(&self) -> AccessorKind {
        match self {
            Accessor::ReadOnly(_) => AccessorKind::ReadOnly,
            Accessor::ReadWrite(_) => AccessorKind::ReadWrite,
            Accessor::Trace(_) => AccessorKind::Trace,
        }
    }

    /// Query string the accessor sends on `get`.
    pub fn query(&self) -> &str {
        match self {
            Accessor::ReadOnly(a) => a.query(),
            Accessor::ReadWrite(a) => a.query(),
            Accessor::Trace(a) => a.query(),
        }
    }
}

// =============================================================================
// Accessor table
// =============================================================================

/// Accessors keyed by name.
#[derive(Debug, Clone, Default)]
pub struct AccessorTable {
    accessors: BTreeMap<String, Accessor>,
}

impl AccessorTable {
    /// Bind every descriptor in `set`.
    ///
    /// Either every descriptor binds or none does: the first invalid descriptor
    /// or an unusable value format template aborts with an error.
    pub fn bind(set: &CapabilityDescriptorSet, constants: &ProtocolConstants) -> InstrResult<Self> {
        set.validate()?;
        let format = ValueFormat::parse(&constants.value_format)?;

        let mut accessors = BTreeMap::new();
        for property in set.read_only() {
            accessors.insert(
                property.name.clone(),
                Accessor::ReadOnly(ReadOnlyAccessor::bind(property, constants)),
            );
        }
        for property in set.read_write() {
            accessors.insert(
                property.name.clone(),
                Accessor::ReadWrite(ReadWriteAccessor::bind(property, constants, &format)),
            );
        }
        for trace in set.traces() {
            accessors.insert(
                trace.name.clone(),
                Accessor::Trace(TraceAccessor::bind(trace, constants)),
            );
        }

        debug!(count = accessors.len(), "accessors bound");
        Ok(Self { accessors })
    }

    /// Look up an accessor.
    pub fn get(&self, name: &str) -> Option<&Accessor> {
        self.accessors.get(name)
    }

    /// Number of bound accessors.
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    /// Whether nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }

    /// Bound names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.accessors.keys().map(String::as_str)
    }

    /// Bound accessors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Accessor> {
        self.accessors.values()
    }
}
