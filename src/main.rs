//! CLI Entry Point for rust-instr
//!
//! Provides command-line access to instruments described by a profile:
//! - Checking descriptor documents without hardware
//! - Reading and writing properties
//! - Fetching traces and probing readiness
//!
//! # Usage
//!
//! ```bash
//! rust-instr check config/instruments/yokogawa_aq6370c.yaml
//! rust-instr get --profile config/profiles/yokogawa_aq6370c.yaml center
//! rust-instr set --profile config/profiles/onefive_katana.yaml power 120
//! rust-instr trace --profile config/profiles/yokogawa_aq6370c.yaml data
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_instr::binding::{Accessor, AccessorTable, ProtocolConstants};
use rust_instr::config::{load_descriptor_set, InstrumentConfig};
use rust_instr::descriptor::CapabilityDescriptorSet;
use rust_instr::logging::{self, OutputFormat, TracingConfig};
use rust_instr::{InstrError, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "rust-instr")]
#[command(about = "Declarative property and trace access for lab instruments", long_about = None)]
struct Cli {
    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a descriptor document and show the accessors it binds to
    Check {
        /// Descriptor document (.yaml, .yml or .toml)
        descriptors: PathBuf,
    },

    /// Show the accessors of an instrument profile
    List {
        /// Instrument profile
        #[arg(long)]
        profile: PathBuf,
    },

    /// Read a property
    Get {
        /// Instrument profile
        #[arg(long)]
        profile: PathBuf,
        /// Property name
        name: String,
    },

    /// Write a property
    Set {
        /// Instrument profile
        #[arg(long)]
        profile: PathBuf,
        /// Property name
        name: String,
        /// New value, parsed as the property's declared type
        value: String,
    },

    /// Fetch a trace, one sample per line
    Trace {
        /// Instrument profile
        #[arg(long)]
        profile: PathBuf,
        /// Trace name
        name: String,
    },

    /// Ask the instrument whether it is ready
    Ready {
        /// Instrument profile
        #[arg(long)]
        profile: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check { descriptors } => {
            init_logging(cli.log_level.as_deref(), cli.json_logs, "info")?;
            check(&descriptors)
        }
        Commands::List { profile } => {
            let config = load_profile(&profile, cli.log_level.as_deref(), cli.json_logs)?;
            let descriptors = config.load_descriptors()?;
            print_accessors(&descriptors, &config.protocol)
        }
        Commands::Get { profile, name } => {
            let config = load_profile(&profile, cli.log_level.as_deref(), cli.json_logs)?;
            let mut session = config.open_session()?;
            let value = session.get(&name)?;
            println!("{}", value);
            session.close()?;
            Ok(())
        }
        Commands::Set {
            profile,
            name,
            value,
        } => {
            let config = load_profile(&profile, cli.log_level.as_deref(), cli.json_logs)?;
            let mut session = config.open_session()?;
            let value_type = session
                .descriptors()
                .read_write_property(&name)
                .map(|p| p.value_type)
                .ok_or_else(|| match session.accessor(&name) {
                    Some(accessor) => InstrError::WrongAccessorKind {
                        name: name.clone(),
                        requested: rust_instr::AccessorKind::ReadWrite,
                        actual: accessor.kind(),
                    },
                    None => InstrError::UnknownAccessor(name.clone()),
                })?;
            let value = Value::parse_as(&value, value_type)
                .with_context(|| format!("'{}' expects a {} value", name, value_type))?;
            session.set(&name, value.clone())?;
            println!("{} = {}", name, value);
            session.close()?;
            Ok(())
        }
        Commands::Trace { profile, name } => {
            let config = load_profile(&profile, cli.log_level.as_deref(), cli.json_logs)?;
            let mut session = config.open_session()?;
            for sample in session.read_trace(&name)? {
                println!("{}", sample);
            }
            session.close()?;
            Ok(())
        }
        Commands::Ready { profile } => {
            let config = load_profile(&profile, cli.log_level.as_deref(), cli.json_logs)?;
            let mut session = config.open_session()?;
            let ready = session.is_ready()?;
            println!("{}", if ready { "ready" } else { "busy" });
            session.close()?;
            Ok(())
        }
    }
}

fn init_logging(level: Option<&str>, json: bool, default_level: &str) -> Result<()> {
    let level =
        logging::parse_log_level(level.unwrap_or(default_level)).map_err(anyhow::Error::msg)?;
    let format = if json {
        OutputFormat::Json
    } else {
        OutputFormat::Compact
    };
    logging::init(TracingConfig::new(level).with_format(format)).map_err(anyhow::Error::msg)
}

fn load_profile(path: &Path, log_level: Option<&str>, json: bool) -> Result<InstrumentConfig> {
    let config = InstrumentConfig::load_from(path)?;
    init_logging(log_level, json, &config.log_level)?;
    Ok(config)
}

fn check(path: &Path) -> Result<()> {
    let descriptors = load_descriptor_set(path)?;
    print_accessors(&descriptors, &ProtocolConstants::default())
}

fn print_accessors(
    descriptors: &CapabilityDescriptorSet,
    constants: &ProtocolConstants,
) -> Result<()> {
    let table = AccessorTable::bind(descriptors, constants)?;
    println!("{} accessors", table.len());
    for accessor in table.iter() {
        let detail = match accessor {
            Accessor::ReadWrite(a) => {
                let property = a.descriptor();
                let mut detail = format!("{} -> {:?}", property.value_type, a.query());
                if let Some(min) = property.min_value {
                    detail.push_str(&format!(", > {}", min));
                }
                if let Some(max) = property.max_value {
                    detail.push_str(&format!(", < {}", max));
                }
                if !property.value_unit.is_empty() {
                    detail.push_str(&format!(", unit {}", property.value_unit));
                }
                detail
            }
            other => format!("{:?}", other.query()),
        };
        println!("  {:<24} {:<10} {}", accessor.name(), accessor.kind().to_string(), detail);
    }
    Ok(())
}
