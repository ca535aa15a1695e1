use rust_instr::descriptor::{BinaryTrace, CapabilityDescriptorSet};
use rust_instr::transport::block::{self, BlockHeader, ByteOrder, ElementType, TraceEncoding};
use rust_instr::transport::{MockCall, MockTransport, TransportError};
use rust_instr::{InstrError, InstrumentSession};

fn analyzer() -> CapabilityDescriptorSet {
    CapabilityDescriptorSet::new()
        .with_trace(BinaryTrace::new("wavelength", ":TRAC:X").with_suffix("TRA"))
        .unwrap()
        .with_trace(BinaryTrace::new("data", ":TRAC:Y").with_suffix("TRA"))
        .unwrap()
}

fn ieee_block(payload: &[u8]) -> Vec<u8> {
    let length = payload.len().to_string();
    let mut raw = format!("#{}{}", length.len(), length).into_bytes();
    raw.extend_from_slice(payload);
    raw.extend_from_slice(b"\r\n");
    raw
}

#[test]
fn test_trace_query_and_little_endian_f64_block() {
    let mut payload = Vec::new();
    for sample in [1.5e-6_f64, 1.5001e-6, 1.5002e-6] {
        payload.extend_from_slice(&sample.to_le_bytes());
    }
    let transport = MockTransport::new()
        .with_trace_encoding(TraceEncoding::ieee_f64())
        .with_trace_block(":TRAC:X? TRA", ieee_block(&payload));
    let handle = transport.handle();
    let mut session = InstrumentSession::builder(analyzer())
        .open_with(transport)
        .unwrap();

    let samples = session.read_trace("wavelength").unwrap();
    assert_eq!(samples, vec![1.5e-6, 1.5001e-6, 1.5002e-6]);
    assert_eq!(
        handle.calls(),
        vec![MockCall::ReadBinary(":TRAC:X? TRA".to_string())]
    );
}

#[test]
fn test_big_endian_f32_block() {
    let mut payload = Vec::new();
    for sample in [0.25_f32, -3.5] {
        payload.extend_from_slice(&sample.to_be_bytes());
    }
    let encoding = TraceEncoding::Binary {
        element: ElementType::F32,
        byte_order: ByteOrder::Big,
        header: BlockHeader::Ieee488,
        terminated: true,
        max_bytes: block::DEFAULT_MAX_BLOCK_BYTES,
    };
    let transport = MockTransport::new()
        .with_trace_encoding(encoding)
        .with_trace_block(":TRAC:Y? TRA", ieee_block(&payload));
    let mut session = InstrumentSession::builder(analyzer())
        .open_with(transport)
        .unwrap();

    assert_eq!(session.read_trace("data").unwrap(), vec![0.25, -3.5]);
}

#[test]
fn test_ascii_trace() {
    let transport = MockTransport::new()
        .with_trace_encoding(TraceEncoding::ascii())
        .with_trace_block(":TRAC:Y? TRA", b"-60.1, -59.8,-20.25\n".to_vec());
    let mut session = InstrumentSession::builder(analyzer())
        .open_with(transport)
        .unwrap();

    let mut trace = session.trace("data").unwrap();
    assert_eq!(trace.name(), "data");
    assert_eq!(trace.get().unwrap(), vec![-60.1, -59.8, -20.25]);
}

#[test]
fn test_truncated_block_is_transport_error() {
    let mut raw = ieee_block(&1.0_f64.to_le_bytes());
    raw.truncate(6);
    let transport = MockTransport::new()
        .with_trace_encoding(TraceEncoding::ieee_f64())
        .with_trace_block(":TRAC:Y? TRA", raw);
    let mut session = InstrumentSession::builder(analyzer())
        .open_with(transport)
        .unwrap();

    let err = session.read_trace("data").unwrap_err();
    assert!(matches!(
        err,
        InstrError::Transport(TransportError::UnexpectedEof)
    ));
}

#[test]
fn test_headerless_block_with_fixed_points() {
    let encoding = TraceEncoding::Binary {
        element: ElementType::F64,
        byte_order: ByteOrder::Little,
        header: BlockHeader::Empty { points: 2 },
        terminated: false,
        max_bytes: block::DEFAULT_MAX_BLOCK_BYTES,
    };
    let mut raw = Vec::new();
    raw.extend_from_slice(&7.0_f64.to_le_bytes());
    raw.extend_from_slice(&8.0_f64.to_le_bytes());

    let samples = block::read_block(&mut raw.as_slice(), &encoding).unwrap();
    assert_eq!(samples, vec![7.0, 8.0]);
}
