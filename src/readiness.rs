//! Readiness probes.
//!
//! Some instruments report whether a sweep or acquisition has finished through
//! a status register. The session asks its probe; instruments without such a
//! register are always considered ready.

use crate::error::{InstrError, InstrResult};
use crate::transport::Transport;
use tracing::debug;

/// Decides whether the instrument is ready for the next operation.
pub trait ReadinessProbe: Send + Sync {
    /// Probe the instrument.
    fn is_ready(&self, transport: &mut dyn Transport) -> InstrResult<bool>;
}

/// Probe for instruments without a status register.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReady;

impl ReadinessProbe for AlwaysReady {
    fn is_ready(&self, _transport: &mut dyn Transport) -> InstrResult<bool> {
        Ok(true)
    }
}

/// Polls an integer status register and tests one bit.
///
/// With the default bit 0 this reads the "operation complete" flag that SCPI
/// analyzers expose through `STAT:OPER:COND?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRegisterProbe {
    query: String,
    bit: u8,
    label: String,
}

impl StatusRegisterProbe {
    /// Probe `bit` of the register returned by `query`.
    pub fn new(query: impl Into<String>, bit: u8) -> Self {
        Self {
            query: query.into(),
            bit: bit.min(63),
            label: "status".to_string(),
        }
    }

    /// Name used in errors and logs.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Register query.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Tested bit.
    pub fn bit(&self) -> u8 {
        self.bit
    }
}

impl ReadinessProbe for StatusRegisterProbe {
    fn is_ready(&self, transport: &mut dyn Transport) -> InstrResult<bool> {
        let response = transport.query(&self.query)?;
        let trimmed = response.trim();
        // Registers are sometimes reported in float notation, e.g. "1.000E+00"
        let register = trimmed
            .parse::<u64>()
            .ok()
            .or_else(|| {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= u64::MAX as f64)
                    .map(|f| f as u64)
            })
            .ok_or_else(|| {
                InstrError::protocol(
                    &self.label,
                    format!("status register reply {:?} is not an integer", response),
                )
            })?;
        let ready = register & (1 << self.bit) != 0;
        debug!(probe = %self.label, register, ready, "readiness probed");
        Ok(ready)
    }
}
