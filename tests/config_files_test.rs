//! The descriptor documents and profiles shipped under `config/` must load.

use rust_instr::config::{load_descriptor_set, InstrumentConfig, ReadinessConfig, ResponseParserConfig};
use rust_instr::descriptor::{AccessorKind, ValueType};
use rust_instr::transport::{ElementType, TraceEncoding, TransportConfig};
use rust_instr::{AccessorTable, ProtocolConstants, Value};
use std::path::PathBuf;

fn config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

#[test]
fn test_every_descriptor_document_binds() {
    let dir = config_dir().join("instruments");
    let mut loaded = 0;
    for entry in std::fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        let set = load_descriptor_set(&path)
            .unwrap_or_else(|e| panic!("{}: {:#}", path.display(), e));
        assert!(!set.is_empty(), "{} is empty", path.display());
        AccessorTable::bind(&set, &ProtocolConstants::default())
            .unwrap_or_else(|e| panic!("{}: {}", path.display(), e));
        loaded += 1;
    }
    assert!(loaded >= 4);
}

#[test]
fn test_example_document_short_and_long_forms() {
    let set = load_descriptor_set(&config_dir().join("instruments/example.yaml")).unwrap();

    assert_eq!(set.kind_of("name"), Some(AccessorKind::ReadOnly));
    assert_eq!(set.kind_of("data"), Some(AccessorKind::Trace));

    let prop1 = set.read_write_property("prop1").unwrap();
    assert_eq!(prop1.command, "test:prop1");
    assert_eq!(prop1.suffix, "chan1");
    assert_eq!(prop1.value_type, ValueType::Float);
    assert_eq!(
        prop1.allowed_values,
        Some(vec![Value::Float(0.0), Value::Float(1.0)])
    );

    let prop2 = set.read_write_property("prop2").unwrap();
    assert_eq!(prop2.command, "test:prop2");
    assert_eq!(prop2.value_type, ValueType::Float);
    assert!(prop2.allowed_values.is_none());
}

#[test]
fn test_example_profile_opens_mock_session() {
    let config = InstrumentConfig::load_from(&config_dir().join("profiles/example.yaml")).unwrap();
    assert_eq!(config.transport, TransportConfig::Mock);

    let session = config.open_session().unwrap();
    assert_eq!(session.name(), "example");
    assert_eq!(session.accessor_count(), 5);
    session.close().unwrap();
}

#[test]
fn test_katana_profile_protocol() {
    let config =
        InstrumentConfig::load_from(&config_dir().join("profiles/onefive_katana.yaml")).unwrap();

    assert_eq!(config.protocol.get_suffix, "");
    assert_eq!(config.protocol.set_separator, "=");
    assert_eq!(config.protocol.expected_set_response.as_deref(), Some("OK"));
    assert_eq!(config.protocol.value_format, "{:d}");
    assert_eq!(config.parser, ResponseParserConfig::FirstNumber);
    assert!(matches!(
        config.transport,
        TransportConfig::Serial { baud_rate: 19200, .. }
    ));

    let descriptors = config.load_descriptors().unwrap();
    let table = AccessorTable::bind(&descriptors, &config.protocol).unwrap();
    assert_eq!(table.get("power").unwrap().query(), "pow ");
    assert_eq!(table.get("temperature").unwrap().query(), "temp");
}

#[test]
fn test_yokogawa_profile_trace_and_readiness() {
    let config =
        InstrumentConfig::load_from(&config_dir().join("profiles/yokogawa_aq6370c.yaml")).unwrap();

    assert_eq!(config.init_commands.len(), 2);
    assert!(matches!(
        config.trace_encoding,
        TraceEncoding::Binary {
            element: ElementType::F64,
            ..
        }
    ));
    assert!(matches!(
        config.readiness,
        ReadinessConfig::StatusBit { bit: 0, ref query, .. } if query == "STAT:OPER:COND?"
    ));
    assert!(config.descriptor_path().ends_with("instruments/yokogawa_aq6370c.yaml"));
}
