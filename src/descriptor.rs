//! Capability descriptors: what an instrument can be asked.
//!
//! A descriptor document lists three kinds of entries:
//!
//! ```yaml
//! spec: "1.0"
//! readOnlyProps:
//!   name: '*IDN'
//! readWriteProps:
//!   voltage: ':VOLT:IMM:AMPL'        # short form, all options default
//!   span:
//!     command: ':SENS:WAV:SPAN'      # long form
//!     value_unit: 'NM'
//!     min_value: 0
//! readBinaryTraces:
//!   data:
//!     command: ':TRAC:Y'
//!     suffix: 'TRA'
//! ```
//!
//! The document is parsed into a [`DescriptorDocument`] and resolved into a
//! [`CapabilityDescriptorSet`], which owns one map per kind and refuses names
//! that are already used by another kind.

use crate::coercion::Value;
use crate::error::{InstrError, InstrResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Value and accessor kinds
// =============================================================================

/// Declared type of a read-write property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// IEEE double
    #[default]
    #[serde(alias = "double")]
    Float,
    /// Signed 64-bit integer
    #[serde(alias = "integer")]
    Int,
    /// Raw response text
    #[serde(alias = "str")]
    String,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::String => "string",
        };
        write!(f, "{}", label)
    }
}

/// The three accessor kinds a descriptor can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessorKind {
    /// Query-only text property
    ReadOnly,
    /// Typed, validated, settable property
    ReadWrite,
    /// Binary numeric trace
    Trace,
}

impl fmt::Display for AccessorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AccessorKind::ReadOnly => "read-only",
            AccessorKind::ReadWrite => "read-write",
            AccessorKind::Trace => "trace",
        };
        write!(f, "{}", label)
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// A property that can only be queried, returned as raw text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOnlyProperty {
    /// Accessor name
    pub name: String,
    /// Command stem; the query suffix is appended at bind time
    pub command: String,
}

impl ReadOnlyProperty {
    /// Create a read-only property.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Check the descriptor can be bound.
    pub fn validate(&self) -> InstrResult<()> {
        require_command(&self.name, &self.command)
    }
}

/// A settable property with optional validation metadata.
///
/// `min_value` and `max_value` are exclusive: a value equal to either bound is
/// rejected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadWriteProperty {
    /// Accessor name (taken from the document key)
    #[serde(skip)]
    pub name: String,
    /// Command stem
    #[serde(default)]
    pub command: String,
    /// Extra token sent after the command, e.g. a channel selector
    #[serde(default)]
    pub suffix: String,
    /// Type responses are coerced to
    #[serde(default)]
    pub value_type: ValueType,
    /// Unit appended after the formatted value on writes
    #[serde(default)]
    pub value_unit: String,
    /// If present, only these literals may be written
    #[serde(default)]
    pub allowed_values: Option<Vec<Value>>,
    /// Exclusive lower bound
    #[serde(default)]
    pub min_value: Option<f64>,
    /// Exclusive upper bound
    #[serde(default)]
    pub max_value: Option<f64>,
    /// Free-form documentation
    #[serde(default)]
    pub doc_string: String,
}

impl ReadWriteProperty {
    /// Create a property with every option at its default.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    /// Set the suffix token.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Set the declared value type.
    pub fn with_value_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Set the unit appended on writes.
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.value_unit = unit.into();
        self
    }

    /// Restrict writes to a set of literals.
    pub fn with_allowed_values<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the exclusive lower bound.
    pub fn with_min(mut self, min: f64) -> Self {
        self.min_value = Some(min);
        self
    }

    /// Set the exclusive upper bound.
    pub fn with_max(mut self, max: f64) -> Self {
        self.max_value = Some(max);
        self
    }

    /// Set the documentation string.
    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc_string = doc.into();
        self
    }

    /// Check the descriptor can be bound.
    pub fn validate(&self) -> InstrResult<()> {
        require_command(&self.name, &self.command)?;
        if let (Some(min), Some(max)) = (self.min_value, self.max_value) {
            if min >= max {
                return Err(InstrError::descriptor(
                    &self.name,
                    format!("min_value {} is not below max_value {}", min, max),
                ));
            }
        }
        Ok(())
    }
}

/// A binary numeric trace.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinaryTrace {
    /// Accessor name (taken from the document key)
    #[serde(skip)]
    pub name: String,
    /// Command stem
    #[serde(default)]
    pub command: String,
    /// Trace selector sent after the command
    #[serde(default)]
    pub suffix: String,
}

impl BinaryTrace {
    /// Create a trace without a suffix.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            suffix: String::new(),
        }
    }

    /// Set the trace selector.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Check the descriptor can be bound.
    pub fn validate(&self) -> InstrResult<()> {
        require_command(&self.name, &self.command)
    }
}

fn require_command(name: &str, command: &str) -> InstrResult<()> {
    if command.trim().is_empty() {
        return Err(InstrError::descriptor(name, "no command specified"));
    }
    Ok(())
}

// =============================================================================
// Document form
// =============================================================================

/// An entry written either as a bare command string or as a full table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Declared<T> {
    /// Bare command string, all options default
    Short(String),
    /// Full descriptor table
    Long(T),
}

/// Parsed descriptor document, before name resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DescriptorDocument {
    /// Optional document version tag
    #[serde(default)]
    pub spec: Option<String>,
    /// `name -> command`
    #[serde(default)]
    pub read_only_props: Option<BTreeMap<String, String>>,
    /// `name -> command | table`
    #[serde(default)]
    pub read_write_props: Option<BTreeMap<String, Declared<ReadWriteProperty>>>,
    /// `name -> command | table`
    #[serde(default)]
    pub read_binary_traces: Option<BTreeMap<String, Declared<BinaryTrace>>>,
}

// =============================================================================
// Descriptor set
// =============================================================================

/// All descriptors of one instrument, one map per kind.
///
/// A name may appear in only one of the three maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapabilityDescriptorSet {
    read_only: BTreeMap<String, ReadOnlyProperty>,
    read_write: BTreeMap<String, ReadWriteProperty>,
    traces: BTreeMap<String, BinaryTrace>,
}

impl CapabilityDescriptorSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a parsed document, filling in names and rejecting clashes.
    ///
    /// Descriptors are validated as well, so a long-form entry without a
    /// `command` fails here rather than on first use.
    pub fn from_document(document: DescriptorDocument) -> InstrResult<Self> {
        let mut set = Self::new();

        for (name, command) in document.read_only_props.unwrap_or_default() {
            set.insert_read_only(ReadOnlyProperty { name, command })?;
        }

        for (name, entry) in document.read_write_props.unwrap_or_default() {
            let property = match entry {
                Declared::Short(command) => ReadWriteProperty::new(name, command),
                Declared::Long(mut property) => {
                    property.name = name;
                    property
                }
            };
            set.insert_read_write(property)?;
        }

        for (name, entry) in document.read_binary_traces.unwrap_or_default() {
            let trace = match entry {
                Declared::Short(command) => BinaryTrace::new(name, command),
                Declared::Long(mut trace) => {
                    trace.name = name;
                    trace
                }
            };
            set.insert_trace(trace)?;
        }

        set.validate()?;
        Ok(set)
    }

    /// Add a read-only property.
    pub fn insert_read_only(&mut self, property: ReadOnlyProperty) -> InstrResult<()> {
        self.check_free(&property.name)?;
        self.read_only.insert(property.name.clone(), property);
        Ok(())
    }

    /// Add a read-write property.
    pub fn insert_read_write(&mut self, property: ReadWriteProperty) -> InstrResult<()> {
        self.check_free(&property.name)?;
        self.read_write.insert(property.name.clone(), property);
        Ok(())
    }

    /// Add a trace.
    pub fn insert_trace(&mut self, trace: BinaryTrace) -> InstrResult<()> {
        self.check_free(&trace.name)?;
        self.traces.insert(trace.name.clone(), trace);
        Ok(())
    }

    /// Builder form of [`insert_read_only`](Self::insert_read_only).
    pub fn with_read_only(mut self, property: ReadOnlyProperty) -> InstrResult<Self> {
        self.insert_read_only(property)?;
        Ok(self)
    }

    /// Builder form of [`insert_read_write`](Self::insert_read_write).
    pub fn with_read_write(mut self, property: ReadWriteProperty) -> InstrResult<Self> {
        self.insert_read_write(property)?;
        Ok(self)
    }

    /// Builder form of [`insert_trace`](Self::insert_trace).
    pub fn with_trace(mut self, trace: BinaryTrace) -> InstrResult<Self> {
        self.insert_trace(trace)?;
        Ok(self)
    }

    fn check_free(&self, name: &str) -> InstrResult<()> {
        if name.is_empty() {
            return Err(InstrError::descriptor(name, "descriptor name is empty"));
        }
        match self.kind_of(name) {
            Some(kind) => Err(InstrError::descriptor(
                name,
                format!("name already declared as a {} accessor", kind),
            )),
            None => Ok(()),
        }
    }

    /// Validate every descriptor.
    pub fn validate(&self) -> InstrResult<()> {
        for property in self.read_only.values() {
            property.validate()?;
        }
        for property in self.read_write.values() {
            property.validate()?;
        }
        for trace in self.traces.values() {
            trace.validate()?;
        }
        Ok(())
    }

    /// Which kind, if any, a name is declared as.
    pub fn kind_of(&self, name: &str) -> Option<AccessorKind> {
        if self.read_only.contains_key(name) {
            Some(AccessorKind::ReadOnly)
        } else if self.read_write.contains_key(name) {
            Some(AccessorKind::ReadWrite)
        } else if self.traces.contains_key(name) {
            Some(AccessorKind::Trace)
        } else {
            None
        }
    }

    /// Read-only properties in name order.
    pub fn read_only(&self) -> impl Iterator<Item = &ReadOnlyProperty> {
        self.read_only.values()
    }

    /// Read-write properties in name order.
    pub fn read_write(&self) -> impl Iterator<Item = &ReadWriteProperty> {
        self.read_write.values()
    }

    /// Traces in name order.
    pub fn traces(&self) -> impl Iterator<Item = &BinaryTrace> {
        self.traces.values()
    }

    /// Look up a read-write property.
    pub fn read_write_property(&self, name: &str) -> Option<&ReadWriteProperty> {
        self.read_write.get(name)
    }

    /// Total number of descriptors across all kinds.
    pub fn len(&self) -> usize {
        self.read_only.len() + self.read_write.len() + self.traces.len()
    }

    /// Whether the set declares nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
