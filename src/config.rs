//! Configuration loading using Figment
//!
//! Two kinds of files are loaded here:
//!
//! 1. **Descriptor documents** (YAML or TOML) listing an instrument's
//!    properties and traces, see [`crate::descriptor`].
//! 2. **Instrument profiles** ([`InstrumentConfig`]) naming a descriptor file
//!    and everything else a session needs: protocol constants, response
//!    parser, readiness probe, trace encoding, transport and init commands.
//!
//! Profiles can be overridden from the environment with the `RUST_INSTR_`
//! prefix, using `__` for nesting:
//!
//! ```text
//! RUST_INSTR_LOG_LEVEL=debug
//! RUST_INSTR_PROTOCOL__EXPECTED_SET_RESPONSE=OK
//! ```
//!
//! # Example
//! ```no_run
//! use rust_instr::config::InstrumentConfig;
//! use std::path::Path;
//!
//! let config = InstrumentConfig::load_from(Path::new("config/profiles/yokogawa_aq6370c.yaml"))?;
//! let mut session = config.open_session()?;
//! println!("{}", session.read_text("name")?);
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::binding::ProtocolConstants;
use crate::coercion::{FirstNumberParser, ResponseParser, StandardParser, ValueFormat};
use crate::descriptor::{CapabilityDescriptorSet, DescriptorDocument};
use crate::readiness::{AlwaysReady, ReadinessProbe, StatusRegisterProbe};
use crate::session::{InstrumentSession, SessionBuilder};
use crate::transport::{open_transport, TraceEncoding, TransportConfig};
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Prefix of environment variables overriding profile values.
pub const ENV_PREFIX: &str = "RUST_INSTR_";

/// Error types for config loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    /// File not found
    #[error("Config file not found: {0}")]
    NotFound(String),

    /// Extension is neither YAML nor TOML
    #[error("Unsupported config format: {0} (expected .yaml, .yml or .toml)")]
    UnsupportedFormat(String),

    /// Parse error (invalid YAML/TOML or unknown keys)
    #[error("Failed to parse config: {0}")]
    ParseError(String),

    /// Validation error
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

fn file_figment(path: &Path) -> Result<Figment> {
    if !path.exists() {
        return Err(ConfigLoadError::NotFound(path.display().to_string()).into());
    }
    match path.extension().and_then(|s| s.to_str()) {
        Some("yaml") | Some("yml") => Ok(Figment::new().merge(Yaml::file(path))),
        Some("toml") => Ok(Figment::new().merge(Toml::file(path))),
        _ => Err(ConfigLoadError::UnsupportedFormat(path.display().to_string()).into()),
    }
}

fn resolve(document: DescriptorDocument) -> Result<CapabilityDescriptorSet> {
    CapabilityDescriptorSet::from_document(document)
        .map_err(|e| ConfigLoadError::ValidationError(e.to_string()).into())
}

// =============================================================================
// Descriptor documents
// =============================================================================

/// Load a descriptor document from a `.yaml`, `.yml` or `.toml` file.
///
/// Long-form entries with unknown keys, missing commands and names declared
/// under two kinds are all rejected here.
pub fn load_descriptor_set(path: &Path) -> Result<CapabilityDescriptorSet> {
    debug!("Loading descriptors from: {}", path.display());

    let document: DescriptorDocument = file_figment(path)?
        .extract()
        .with_context(|| format!("Failed to parse descriptor file: {}", path.display()))?;
    let set = resolve(document)
        .with_context(|| format!("Invalid descriptor file: {}", path.display()))?;

    info!("Loaded {} descriptors from {}", set.len(), path.display());
    Ok(set)
}

/// Load a descriptor document from a YAML string.
pub fn load_descriptor_set_from_str(yaml: &str) -> Result<CapabilityDescriptorSet> {
    let document: DescriptorDocument = serde_yaml::from_str(yaml)
        .map_err(|e| ConfigLoadError::ParseError(e.to_string()))
        .with_context(|| "Failed to parse YAML descriptor document")?;
    resolve(document)
}

/// Load a descriptor document from a TOML string.
pub fn load_descriptor_set_from_toml_str(content: &str) -> Result<CapabilityDescriptorSet> {
    let document: DescriptorDocument = toml::from_str(content)
        .map_err(|e| ConfigLoadError::ParseError(e.to_string()))
        .with_context(|| "Failed to parse TOML descriptor document")?;
    resolve(document)
}

// =============================================================================
// Strategy selection
// =============================================================================

/// Which [`ResponseParser`] a profile uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseParserConfig {
    /// [`StandardParser`]
    #[default]
    Standard,
    /// [`FirstNumberParser`]
    FirstNumber,
}

impl ResponseParserConfig {
    /// Instantiate the parser.
    pub fn build(&self) -> Box<dyn ResponseParser> {
        match self {
            ResponseParserConfig::Standard => Box::new(StandardParser),
            ResponseParserConfig::FirstNumber => Box::new(FirstNumberParser),
        }
    }
}

/// Which [`ReadinessProbe`] a profile uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessConfig {
    /// [`AlwaysReady`]
    #[default]
    Always,
    /// [`StatusRegisterProbe`]
    StatusBit {
        /// Register query
        query: String,
        /// Tested bit
        #[serde(default)]
        bit: u8,
        /// Name used in logs
        #[serde(default = "default_probe_label")]
        label: String,
    },
}

fn default_probe_label() -> String {
    "status".to_string()
}

impl ReadinessConfig {
    /// Instantiate the probe.
    pub fn build(&self) -> Box<dyn ReadinessProbe> {
        match self {
            ReadinessConfig::Always => Box::new(AlwaysReady),
            ReadinessConfig::StatusBit { query, bit, label } => {
                Box::new(StatusRegisterProbe::new(query.clone(), *bit).with_label(label.clone()))
            }
        }
    }
}

// =============================================================================
// Instrument profiles
// =============================================================================

/// Everything needed to open a session to one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstrumentConfig {
    /// Instrument name used in logs
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Descriptor document, relative to the profile file
    pub descriptors: PathBuf,
    /// Protocol constants
    #[serde(default)]
    pub protocol: ProtocolConstants,
    /// Response parsing strategy
    #[serde(default)]
    pub parser: ResponseParserConfig,
    /// Readiness probe
    #[serde(default)]
    pub readiness: ReadinessConfig,
    /// Trace wire encoding
    #[serde(default)]
    pub trace_encoding: TraceEncoding,
    /// Transport settings
    #[serde(default)]
    pub transport: TransportConfig,
    /// Commands written once after the session opens
    #[serde(default)]
    pub init_commands: Vec<String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl InstrumentConfig {
    /// Minimal profile for `descriptors` with every option at its default.
    pub fn new(name: impl Into<String>, descriptors: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            log_level: default_log_level(),
            descriptors: descriptors.into(),
            protocol: ProtocolConstants::default(),
            parser: ResponseParserConfig::default(),
            readiness: ReadinessConfig::default(),
            trace_encoding: TraceEncoding::default(),
            transport: TransportConfig::default(),
            init_commands: Vec::new(),
            base_dir: PathBuf::new(),
        }
    }

    /// Load a profile and apply `RUST_INSTR_` environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading instrument profile from: {}", path.display());

        let mut config: InstrumentConfig = file_figment(path)?
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to parse instrument profile: {}", path.display()))?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        config
            .validate()
            .map_err(ConfigLoadError::ValidationError)
            .with_context(|| format!("Invalid instrument profile: {}", path.display()))?;

        info!("Loaded instrument profile: {}", config.name);
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Instrument name must not be empty".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        ValueFormat::parse(&self.protocol.value_format).map_err(|e| e.to_string())?;

        if let ReadinessConfig::StatusBit { query, bit, .. } = &self.readiness {
            if query.trim().is_empty() {
                return Err("Status register query must not be empty".to_string());
            }
            if *bit > 63 {
                return Err(format!("Invalid status bit {}. Must be 0-63", bit));
            }
        }

        match &self.transport {
            TransportConfig::Serial {
                port, baud_rate, ..
            } => {
                if port.trim().is_empty() {
                    return Err("Serial port must not be empty".to_string());
                }
                if *baud_rate == 0 {
                    return Err("Serial baud_rate must be positive".to_string());
                }
            }
            TransportConfig::Visa { resource, .. } if resource.trim().is_empty() => {
                return Err("VISA resource must not be empty".to_string());
            }
            _ => {}
        }

        Ok(())
    }

    /// Descriptor path resolved against the profile's directory.
    pub fn descriptor_path(&self) -> PathBuf {
        if self.descriptors.is_absolute() {
            self.descriptors.clone()
        } else {
            self.base_dir.join(&self.descriptors)
        }
    }

    /// Load the referenced descriptor document.
    pub fn load_descriptors(&self) -> Result<CapabilityDescriptorSet> {
        load_descriptor_set(&self.descriptor_path())
    }

    /// Session builder carrying this profile's settings.
    pub fn session_builder(&self, descriptors: CapabilityDescriptorSet) -> SessionBuilder {
        InstrumentSession::builder(descriptors)
            .name(self.name.clone())
            .protocol(self.protocol.clone())
            .boxed_parser(self.parser.build())
            .boxed_readiness(self.readiness.build())
            .init_commands(self.init_commands.iter().cloned())
    }

    /// Load descriptors, open the transport and open a session.
    pub fn open_session(&self) -> Result<InstrumentSession> {
        let descriptors = self.load_descriptors()?;
        let transport = open_transport(&self.transport, self.trace_encoding.clone())
            .with_context(|| format!("Failed to open transport for '{}'", self.name))?;
        self.session_builder(descriptors)
            .open(transport)
            .with_context(|| format!("Failed to open session for '{}'", self.name))
    }
}
