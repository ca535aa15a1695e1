//! # Rust Instr Core Library
//!
//! Declarative property and trace bindings for message-based laboratory
//! instruments. An instrument is described by a descriptor document (command
//! strings, value types, bounds, allowed values, units); this crate turns it
//! into validated get/set accessors with write confirmation and read-back.
//!
//! ## Crate Structure
//!
//! - **`transport`**: the `Transport` trait plus mock, serial and VISA
//!   implementations and trace block decoding.
//! - **`descriptor`**: the capability descriptor model (`ReadOnlyProperty`,
//!   `ReadWriteProperty`, `BinaryTrace`, `CapabilityDescriptorSet`).
//! - **`binding`**: the accessor binding engine. Precomputes wire strings,
//!   validates values and runs the write/confirm/read-back sequence.
//! - **`coercion`**: typed `Value`s, response parsing strategies and value
//!   format templates.
//! - **`readiness`**: readiness probes (always ready, status register bit).
//! - **`session`**: `InstrumentSession`, the by-name surface over one
//!   transport and one descriptor set.
//! - **`config`**: figment-based loading of descriptor documents and
//!   instrument profiles.
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: the `InstrError` enum returned by every accessor.

pub mod binding;
pub mod coercion;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod readiness;
pub mod session;
pub mod transport;

pub use binding::{Accessor, AccessorTable, ProtocolConstants};
pub use coercion::{ResponseParser, Value, ValueFormat};
pub use descriptor::{
    AccessorKind, BinaryTrace, CapabilityDescriptorSet, ReadOnlyProperty, ReadWriteProperty,
    ValueType,
};
pub use error::{InstrError, InstrResult};
pub use readiness::ReadinessProbe;
pub use session::{InstrumentSession, SessionBuilder};
pub use transport::{Transport, TransportError};
