//! Custom error types for the instrument binding layer.
//!
//! This module defines the primary error type, `InstrError`, returned by every
//! accessor operation. Using the `thiserror` crate, it gives callers one place to
//! match on the ways a property access can go wrong.
//!
//! ## Error Hierarchy
//!
//! - **`Validation`**: the caller-supplied value violates the declared constraints
//!   (allowed values, exclusive bounds, type, format template). Raised before any
//!   byte is written to the instrument. Retrying with the same value is pointless.
//! - **`Protocol`**: the instrument answered, but not as expected: the
//!   acknowledgement after a write did not match, or the value read back after a
//!   write differs from the value written. Never retried automatically.
//! - **`Format`**: a response could not be coerced into the declared value type.
//!   Usually a descriptor/type mismatch or a firmware quirk that needs a custom
//!   response parser.
//! - **`Transport`**: wraps [`TransportError`] unchanged. After a transport error the
//!   session should be considered unusable.
//! - **`Descriptor`**: a capability descriptor is unusable (missing command, name
//!   clash between kinds). Raised while building a descriptor set or binding a session.
//!
//! By using `#[from]`, `InstrError` can be created from transport errors directly,
//! so accessors propagate them with the `?` operator.

use crate::descriptor::{AccessorKind, ValueType};
use crate::transport::TransportError;
use thiserror::Error;

/// Convenience alias for results using the binding error type.
pub type InstrResult<T> = std::result::Result<T, InstrError>;

/// Primary error type for property, trace and session operations.
#[derive(Error, Debug)]
pub enum InstrError {
    /// Value rejected before any write occurred.
    #[error("Validation error on '{property}': {reason}")]
    Validation {
        /// Property the value was meant for
        property: String,
        /// Which constraint failed
        reason: String,
    },

    /// Device response did not match expectation.
    #[error("Protocol error on '{property}': {message}")]
    Protocol {
        /// Property being written or read
        property: String,
        /// What was expected and what came back
        message: String,
    },

    /// Device response could not be parsed into the declared type.
    #[error("Format error: cannot parse {response:?} as {expected}")]
    Format {
        /// Raw response text
        response: String,
        /// Declared value type
        expected: ValueType,
    },

    /// I/O failure reported by the transport.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Capability descriptor is unusable.
    #[error("Descriptor error for '{name}': {reason}")]
    Descriptor {
        /// Descriptor name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// Value format template could not be understood.
    #[error("Invalid value format template {template:?}: {reason}")]
    InvalidFormat {
        /// Template as configured
        template: String,
        /// Parse failure
        reason: String,
    },

    /// No accessor is bound under this name.
    #[error("No property or trace named '{0}'")]
    UnknownAccessor(String),

    /// The accessor exists but does not support the requested operation.
    #[error("'{name}' is a {actual} accessor, not a {requested} accessor")]
    WrongAccessorKind {
        /// Accessor name
        name: String,
        /// Kind that was requested
        requested: AccessorKind,
        /// Kind that is actually bound
        actual: AccessorKind,
    },
}

impl InstrError {
    pub(crate) fn validation(property: &str, reason: impl Into<String>) -> Self {
        InstrError::Validation {
            property: property.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(property: &str, message: impl Into<String>) -> Self {
        InstrError::Protocol {
            property: property.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn descriptor(name: &str, reason: impl Into<String>) -> Self {
        InstrError::Descriptor {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may reasonably keep using the session after this error.
    ///
    /// Transport failures are fatal to a session; everything else leaves the
    /// connection in a usable state.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, InstrError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_convert() {
        let err: InstrError = TransportError::Closed.into();
        assert!(matches!(err, InstrError::Transport(TransportError::Closed)));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_validation_message_names_property() {
        let err = InstrError::validation("voltage", "10 >= max_value 10");
        assert!(err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "Validation error on 'voltage': 10 >= max_value 10"
        );
    }

    #[test]
    fn test_format_error_message() {
        let err = InstrError::Format {
            response: "abc".to_string(),
            expected: ValueType::Float,
        };
        assert_eq!(err.to_string(), "Format error: cannot parse \"abc\" as float");
    }
}
