//! End-to-end set/get behaviour of bound properties over the mock transport.

use rust_instr::coercion::FirstNumberParser;
use rust_instr::descriptor::{CapabilityDescriptorSet, ReadWriteProperty, ValueType};
use rust_instr::transport::{MockCall, MockRegister, MockTransport};
use rust_instr::{InstrError, InstrumentSession, ProtocolConstants, Value};
use tracing_test::traced_test;

fn voltage_source() -> CapabilityDescriptorSet {
    CapabilityDescriptorSet::new()
        .with_read_write(
            ReadWriteProperty::new("volt", "VOLT")
                .with_min(0.0)
                .with_max(10.0)
                .with_doc("Output voltage"),
        )
        .unwrap()
}

#[test]
fn test_set_writes_then_reads_back() {
    let descriptors = voltage_source();
    let register = MockRegister::new("VOLT  ", "VOLT? ");
    let transport = MockTransport::new().with_register(register);
    let handle = transport.handle();

    let mut session = InstrumentSession::builder(descriptors)
        .open_with(transport)
        .unwrap();

    session.set("volt", 5).unwrap();

    assert_eq!(
        handle.calls(),
        vec![
            MockCall::Write("VOLT  5".to_string()),
            MockCall::Query("VOLT? ".to_string()),
        ]
    );
    assert_eq!(session.get("volt").unwrap(), Value::Float(5.0));
}

#[test]
fn test_bounds_are_exclusive_and_checked_before_writing() {
    let transport = MockTransport::new().with_register(MockRegister::new("VOLT  ", "VOLT? "));
    let handle = transport.handle();
    let mut session = InstrumentSession::builder(voltage_source())
        .open_with(transport)
        .unwrap();

    for rejected in [0.0, 10.0, -0.5, 12.0] {
        let err = session.set("volt", rejected).unwrap_err();
        assert!(
            matches!(err, InstrError::Validation { ref property, .. } if property == "volt"),
            "{} should be rejected, got {:?}",
            rejected,
            err
        );
    }
    assert!(handle.calls().is_empty());

    session.set("volt", 9.5).unwrap();
    assert_eq!(handle.writes(), vec!["VOLT  9.5".to_string()]);
}

#[test]
fn test_text_for_numeric_property_is_rejected() {
    let transport = MockTransport::new();
    let handle = transport.handle();
    let mut session = InstrumentSession::builder(voltage_source())
        .open_with(transport)
        .unwrap();

    let err = session.set("volt", "five").unwrap_err();
    assert!(matches!(err, InstrError::Validation { .. }));
    assert!(handle.calls().is_empty());
}

#[test]
#[traced_test]
fn test_failed_confirmation_skips_read_back() {
    let descriptors = CapabilityDescriptorSet::new()
        .with_read_write(ReadWriteProperty::new("power", "pow").with_value_type(ValueType::Int))
        .unwrap();
    let constants = ProtocolConstants {
        get_suffix: String::new(),
        set_separator: "=".to_string(),
        expected_set_response: Some("done".to_string()),
        value_format: "{:d}".to_string(),
    };
    let transport = MockTransport::new()
        .with_register(MockRegister::new("pow= ", "pow "))
        .with_rejection("fail");
    let handle = transport.handle();

    let mut session = InstrumentSession::builder(descriptors)
        .protocol(constants)
        .open_with(transport)
        .unwrap();

    let err = session.set("power", 120).unwrap_err();
    assert!(matches!(err, InstrError::Protocol { ref property, .. } if property == "power"));
    assert_eq!(
        handle.calls(),
        vec![MockCall::Write("pow= 120".to_string()), MockCall::Read]
    );
    assert!(logs_contain("set not confirmed"));

    assert_eq!(session.get("power").unwrap(), Value::Int(0));
    assert_eq!(handle.register_value("pow "), Some("0".to_string()));
}

#[test]
fn test_padded_confirmation_is_rejected() {
    let transport = MockTransport::new()
        .with_register(MockRegister::new("VOLT  ", "VOLT? "))
        .with_confirmation(" done ");
    let handle = transport.handle();
    let mut session = InstrumentSession::builder(voltage_source())
        .expected_set_response("done")
        .open_with(transport)
        .unwrap();

    let err = session.set("volt", 5).unwrap_err();
    assert!(matches!(err, InstrError::Protocol { ref property, .. } if property == "volt"));
    assert!(handle.queries().is_empty());
}

#[test]
fn test_confirmed_set_reads_back() {
    let descriptors = CapabilityDescriptorSet::new()
        .with_read_write(ReadWriteProperty::new("power", "pow").with_value_type(ValueType::Int))
        .unwrap();
    let transport = MockTransport::new()
        .with_register(MockRegister::new("pow= ", "pow "))
        .with_confirmation("done");
    let handle = transport.handle();

    let mut session = InstrumentSession::builder(descriptors)
        .get_suffix("")
        .set_separator("=")
        .expected_set_response("done")
        .value_format("{:d}")
        .open_with(transport)
        .unwrap();

    session.set("power", 120).unwrap();
    assert_eq!(
        handle.calls(),
        vec![
            MockCall::Write("pow= 120".to_string()),
            MockCall::Read,
            MockCall::Query("pow ".to_string()),
        ]
    );
    assert_eq!(handle.register_value("pow "), Some("120".to_string()));
}

#[test]
#[traced_test]
fn test_read_back_mismatch_is_protocol_error() {
    let transport = MockTransport::new()
        .with_register(MockRegister::new("VOLT  ", "VOLT? ").with_initial("1").ignore_writes());
    let mut session = InstrumentSession::builder(voltage_source())
        .open_with(transport)
        .unwrap();

    let err = session.set("volt", 5.0).unwrap_err();
    assert!(matches!(err, InstrError::Protocol { .. }));
    assert!(err.is_recoverable());
    assert!(logs_contain("read-back mismatch"));
}

#[test]
fn test_unit_and_suffix_flow_into_wire_strings() {
    let property = ReadWriteProperty::new("center", ":SENS:WAV:CENT")
        .with_suffix("TRA")
        .with_unit("NM");
    let constants = ProtocolConstants::default();
    let register = MockRegister::for_property(&property, &constants).with_initial("1550");
    let descriptors = CapabilityDescriptorSet::new()
        .with_read_write(property)
        .unwrap();
    let transport = MockTransport::new().with_register(register);
    let handle = transport.handle();

    let mut session = InstrumentSession::builder(descriptors)
        .open_with(transport)
        .unwrap();

    assert_eq!(session.get("center").unwrap(), Value::Float(1550.0));
    session.set("center", 1310).unwrap();

    assert_eq!(
        handle.writes(),
        vec![":SENS:WAV:CENT  TRA1310NM".to_string()]
    );
    assert_eq!(
        handle.queries(),
        vec![":SENS:WAV:CENT? TRA".to_string(), ":SENS:WAV:CENT? TRA".to_string()]
    );
}

#[test]
fn test_allowed_values_accept_numeric_equivalents() {
    let descriptors = CapabilityDescriptorSet::new()
        .with_read_write(
            ReadWriteProperty::new("mode", "MODE")
                .with_value_type(ValueType::Int)
                .with_allowed_values([0, 1]),
        )
        .unwrap();
    let transport = MockTransport::new().with_register(MockRegister::new("MODE  ", "MODE? "));
    let handle = transport.handle();
    let mut session = InstrumentSession::builder(descriptors)
        .open_with(transport)
        .unwrap();

    session.set("mode", 1.0).unwrap();
    assert_eq!(handle.writes(), vec!["MODE  1".to_string()]);

    let err = session.set("mode", 2).unwrap_err();
    assert!(matches!(err, InstrError::Validation { .. }));
}

#[test]
fn test_transport_failure_propagates_unchanged() {
    let transport = MockTransport::new().with_register(MockRegister::new("VOLT  ", "VOLT? "));
    let handle = transport.handle();
    let mut session = InstrumentSession::builder(voltage_source())
        .open_with(transport)
        .unwrap();

    handle.fail_next();
    let err = session.get("volt").unwrap_err();
    assert!(matches!(err, InstrError::Transport(_)));

    assert_eq!(session.get("volt").unwrap(), Value::Float(0.0));
}

#[test]
fn test_alternate_parser_keeps_round_trip() {
    let descriptors = CapabilityDescriptorSet::new()
        .with_read_write(ReadWriteProperty::new("power", "pow").with_value_type(ValueType::Int))
        .unwrap();
    let transport = MockTransport::new().with_register(MockRegister::new("pow= ", "pow "));
    let handle = transport.handle();
    let mut session = InstrumentSession::builder(descriptors)
        .get_suffix("")
        .set_separator("=")
        .parser(FirstNumberParser)
        .open_with(transport)
        .unwrap();

    session.set("power", 350).unwrap();
    assert_eq!(handle.register_value("pow "), Some("350".to_string()));

    handle.set_response("pow ", "power setpoint 350 permille");
    assert_eq!(session.get("power").unwrap(), Value::Int(350));
}
