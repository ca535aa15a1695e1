//! Trace data encodings.
//!
//! Instruments return traces either as binary blocks or as separated ASCII
//! lists. Binary blocks usually carry an IEEE-488.2 definite-length header:
//!
//! ```text
//! #  4  0032  <32 data bytes>  \n
//! ^  ^  ^
//! |  |  +-- byte count, written with <n> digits
//! |  +----- number of length digits <n>
//! +-------- block start
//! ```
//!
//! Some analyzers send a bare run of samples with a fixed point count instead
//! ([`BlockHeader::Empty`]). Samples are `f32` or `f64` in either byte order;
//! `f32` samples widen to `f64`.

use super::TransportError;
use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Sample width on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 4-byte IEEE single
    #[default]
    F32,
    /// 8-byte IEEE double
    F64,
}

impl ElementType {
    /// Bytes per sample.
    pub fn size(self) -> usize {
        match self {
            ElementType::F32 => 4,
            ElementType::F64 => 8,
        }
    }
}

/// Byte order of binary samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

/// How the length of a binary block is announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockHeader {
    /// `#<n><len>` definite-length header
    #[default]
    Ieee488,
    /// No header; the block always holds `points` samples
    Empty {
        /// Samples per block
        points: usize,
    },
}

/// Full description of how a transport decodes traces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEncoding {
    /// Binary samples
    Binary {
        /// Sample width
        #[serde(default)]
        element: ElementType,
        /// Sample byte order
        #[serde(default)]
        byte_order: ByteOrder,
        /// Length announcement
        #[serde(default)]
        header: BlockHeader,
        /// Whether a line terminator follows the data bytes
        #[serde(default = "default_terminated")]
        terminated: bool,
        /// Largest block accepted, in data bytes
        #[serde(default = "default_max_bytes")]
        max_bytes: usize,
    },
    /// Text list of numbers
    Ascii {
        /// Separator between numbers
        #[serde(default = "default_separator")]
        separator: String,
    },
}

impl Default for TraceEncoding {
    fn default() -> Self {
        TraceEncoding::Binary {
            element: ElementType::default(),
            byte_order: ByteOrder::default(),
            header: BlockHeader::default(),
            terminated: true,
            max_bytes: DEFAULT_MAX_BLOCK_BYTES,
        }
    }
}

fn default_terminated() -> bool {
    true
}

/// Default cap on the data bytes of one block (64 MiB).
pub const DEFAULT_MAX_BLOCK_BYTES: usize = 64 * 1024 * 1024;

fn default_max_bytes() -> usize {
    DEFAULT_MAX_BLOCK_BYTES
}

fn default_separator() -> String {
    ",".to_string()
}

impl TraceEncoding {
    /// Little-endian `f64` samples behind an IEEE-488.2 header.
    pub fn ieee_f64() -> Self {
        TraceEncoding::Binary {
            element: ElementType::F64,
            byte_order: ByteOrder::Little,
            header: BlockHeader::Ieee488,
            terminated: true,
            max_bytes: DEFAULT_MAX_BLOCK_BYTES,
        }
    }

    /// Comma separated ASCII list.
    pub fn ascii() -> Self {
        TraceEncoding::Ascii {
            separator: default_separator(),
        }
    }

    /// Whether traces arrive as a text line rather than a byte block.
    pub fn is_ascii(&self) -> bool {
        matches!(self, TraceEncoding::Ascii { .. })
    }
}

/// Decode a run of raw samples.
pub fn decode_samples(
    data: &[u8],
    element: ElementType,
    order: ByteOrder,
) -> Result<Vec<f64>, TransportError> {
    let size = element.size();
    if data.len() % size != 0 {
        return Err(TransportError::MalformedBlock(format!(
            "{} data bytes is not a multiple of the {}-byte sample size",
            data.len(),
            size
        )));
    }

    let mut buf = data;
    let mut samples = Vec::with_capacity(data.len() / size);
    while buf.has_remaining() {
        let sample = match (element, order) {
            (ElementType::F32, ByteOrder::Little) => f64::from(buf.get_f32_le()),
            (ElementType::F32, ByteOrder::Big) => f64::from(buf.get_f32()),
            (ElementType::F64, ByteOrder::Little) => buf.get_f64_le(),
            (ElementType::F64, ByteOrder::Big) => buf.get_f64(),
        };
        samples.push(sample);
    }
    Ok(samples)
}

/// Parse a separated ASCII trace. An empty line is an empty trace.
pub fn parse_ascii(text: &str, separator: &str) -> Result<Vec<f64>, TransportError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(separator)
        .map(|field| {
            let field = field.trim();
            field.parse::<f64>().map_err(|_| {
                TransportError::MalformedBlock(format!("{:?} is not a number", field))
            })
        })
        .collect()
}

/// Read one binary block from `reader`.
///
/// ASCII encodings are line based and handled by the transports themselves;
/// passing one here is a [`TransportError::MalformedBlock`].
pub fn read_block<R: Read + ?Sized>(
    reader: &mut R,
    encoding: &TraceEncoding,
) -> Result<Vec<f64>, TransportError> {
    let (element, byte_order, header, terminated, max_bytes) = match encoding {
        TraceEncoding::Binary {
            element,
            byte_order,
            header,
            terminated,
            max_bytes,
        } => (*element, *byte_order, *header, *terminated, *max_bytes),
        TraceEncoding::Ascii { .. } => {
            return Err(TransportError::MalformedBlock(
                "ASCII traces are not binary blocks".to_string(),
            ))
        }
    };

    let length = match header {
        BlockHeader::Ieee488 => read_ieee_header(reader)?,
        BlockHeader::Empty { points } => points.checked_mul(element.size()).ok_or_else(|| {
            TransportError::MalformedBlock(format!("{} points overflow the block size", points))
        })?,
    };
    if length > max_bytes {
        return Err(TransportError::MalformedBlock(format!(
            "block of {} bytes exceeds the {} byte limit",
            length, max_bytes
        )));
    }

    let mut data = vec![0u8; length];
    reader.read_exact(&mut data)?;
    if terminated {
        read_terminator(reader)?;
    }
    decode_samples(&data, element, byte_order)
}

fn read_byte<R: Read + ?Sized>(reader: &mut R) -> Result<u8, TransportError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

fn read_ieee_header<R: Read + ?Sized>(reader: &mut R) -> Result<usize, TransportError> {
    let start = read_byte(reader)?;
    if start != b'#' {
        return Err(TransportError::MalformedBlock(format!(
            "expected '#', found {:?}",
            char::from(start)
        )));
    }

    let digits = match read_byte(reader)? {
        b'0' => {
            return Err(TransportError::MalformedBlock(
                "indefinite-length blocks are not supported".to_string(),
            ))
        }
        d @ b'1'..=b'9' => usize::from(d - b'0'),
        other => {
            return Err(TransportError::MalformedBlock(format!(
                "invalid length digit count {:?}",
                char::from(other)
            )))
        }
    };

    let mut length = vec![0u8; digits];
    reader.read_exact(&mut length)?;
    std::str::from_utf8(&length)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            TransportError::MalformedBlock(format!(
                "invalid block length {:?}",
                String::from_utf8_lossy(&length)
            ))
        })
}

fn read_terminator<R: Read + ?Sized>(reader: &mut R) -> Result<(), TransportError> {
    match read_byte(reader)? {
        b'\n' => Ok(()),
        b'\r' if read_byte(reader)? == b'\n' => Ok(()),
        other => Err(TransportError::MalformedBlock(format!(
            "expected block terminator, found {:?}",
            char::from(other)
        ))),
    }
}

/// Encode samples the way an instrument would send them.
///
/// Used by simulated instruments. ASCII encodings produce the text line
/// without a terminator.
pub fn encode(samples: &[f64], encoding: &TraceEncoding) -> Vec<u8> {
    match encoding {
        TraceEncoding::Ascii { separator } => samples
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(separator)
            .into_bytes(),
        TraceEncoding::Binary {
            element,
            byte_order,
            header,
            terminated,
            ..
        } => {
            let mut data = BytesMut::with_capacity(samples.len() * element.size());
            for &sample in samples {
                match (element, byte_order) {
                    (ElementType::F32, ByteOrder::Little) => data.put_f32_le(sample as f32),
                    (ElementType::F32, ByteOrder::Big) => data.put_f32(sample as f32),
                    (ElementType::F64, ByteOrder::Little) => data.put_f64_le(sample),
                    (ElementType::F64, ByteOrder::Big) => data.put_f64(sample),
                }
            }

            let mut block = Vec::with_capacity(data.len() + 12);
            if *header == BlockHeader::Ieee488 {
                let length = data.len().to_string();
                block.push(b'#');
                block.extend_from_slice(length.len().to_string().as_bytes());
                block.extend_from_slice(length.as_bytes());
            }
            block.extend_from_slice(&data);
            if *terminated {
                block.push(b'\n');
            }
            block
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_ieee_block_f32_le() {
        let mut raw = b"#18".to_vec();
        raw.extend_from_slice(&1.5f32.to_le_bytes());
        raw.extend_from_slice(&(-2.0f32).to_le_bytes());
        raw.push(b'\n');

        let samples = read_block(&mut Cursor::new(raw), &TraceEncoding::default()).unwrap();
        assert_eq!(samples, vec![1.5, -2.0]);
    }

    #[test]
    fn test_ieee_block_f64_be_crlf() {
        let encoding = TraceEncoding::Binary {
            element: ElementType::F64,
            byte_order: ByteOrder::Big,
            header: BlockHeader::Ieee488,
            terminated: true,
            max_bytes: DEFAULT_MAX_BLOCK_BYTES,
        };
        let mut raw = b"#216".to_vec();
        raw.extend_from_slice(&1550.25f64.to_be_bytes());
        raw.extend_from_slice(&1550.5f64.to_be_bytes());
        raw.extend_from_slice(b"\r\n");

        let samples = read_block(&mut Cursor::new(raw), &encoding).unwrap();
        assert_eq!(samples, vec![1550.25, 1550.5]);
    }

    #[test]
    fn test_empty_block_is_empty_trace() {
        let samples =
            read_block(&mut Cursor::new(b"#10\n".to_vec()), &TraceEncoding::default()).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_headerless_fixed_points() {
        let encoding = TraceEncoding::Binary {
            element: ElementType::F32,
            byte_order: ByteOrder::Little,
            header: BlockHeader::Empty { points: 3 },
            terminated: false,
            max_bytes: DEFAULT_MAX_BLOCK_BYTES,
        };
        let raw = encode(&[0.5, 1.0, 2.0], &encoding);
        assert_eq!(raw.len(), 12);
        let samples = read_block(&mut Cursor::new(raw), &encoding).unwrap();
        assert_eq!(samples, vec![0.5, 1.0, 2.0]);
    }

    #[test]
    fn test_encode_matches_decoder() {
        let encoding = TraceEncoding::ieee_f64();
        let raw = encode(&[1.0, 2.0, 3.0], &encoding);
        assert!(raw.starts_with(b"#224"));
        let samples = read_block(&mut Cursor::new(raw), &encoding).unwrap();
        assert_eq!(samples, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_indefinite_length_rejected() {
        let err = read_block(&mut Cursor::new(b"#0abcd\n".to_vec()), &TraceEncoding::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::MalformedBlock(_)));
    }

    #[test]
    fn test_truncated_block_is_eof() {
        let err = read_block(&mut Cursor::new(b"#18\x00\x00".to_vec()), &TraceEncoding::default())
            .unwrap_err();
        assert!(matches!(err, TransportError::UnexpectedEof));
    }

    #[test]
    fn test_oversized_block_rejected_before_reading() {
        let encoding = TraceEncoding::Binary {
            element: ElementType::F64,
            byte_order: ByteOrder::Little,
            header: BlockHeader::Ieee488,
            terminated: true,
            max_bytes: 16,
        };
        // Announces 999999999 bytes but carries none
        let err = read_block(&mut Cursor::new(b"#9999999999".to_vec()), &encoding).unwrap_err();
        assert!(matches!(err, TransportError::MalformedBlock(ref m) if m.contains("limit")));

        let mut raw = b"#216".to_vec();
        raw.extend_from_slice(&[0u8; 16]);
        raw.push(b'\n');
        assert_eq!(read_block(&mut Cursor::new(raw), &encoding).unwrap(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_headerless_point_count_overflow_rejected() {
        let encoding = TraceEncoding::Binary {
            element: ElementType::F64,
            byte_order: ByteOrder::Little,
            header: BlockHeader::Empty { points: usize::MAX },
            terminated: false,
            max_bytes: DEFAULT_MAX_BLOCK_BYTES,
        };
        let err = read_block(&mut Cursor::new(Vec::new()), &encoding).unwrap_err();
        assert!(matches!(err, TransportError::MalformedBlock(ref m) if m.contains("overflow")));
    }

    #[test]
    fn test_max_bytes_from_yaml() {
        let encoding: TraceEncoding =
            serde_yaml::from_str("kind: binary\nmax_bytes: 4096\n").unwrap();
        assert!(matches!(encoding, TraceEncoding::Binary { max_bytes: 4096, .. }));
    }

    #[test]
    fn test_odd_byte_count_rejected() {
        let err = decode_samples(&[0, 0, 0], ElementType::F32, ByteOrder::Little).unwrap_err();
        assert!(matches!(err, TransportError::MalformedBlock(_)));
    }

    #[test]
    fn test_ascii_traces() {
        assert_eq!(parse_ascii("1.5, 2.5,3E+00\n", ",").unwrap(), vec![1.5, 2.5, 3.0]);
        assert!(parse_ascii("", ",").unwrap().is_empty());
        assert!(parse_ascii("1.0,nope", ",").is_err());
    }

    #[test]
    fn test_encoding_from_yaml() {
        let encoding: TraceEncoding =
            serde_yaml::from_str("kind: binary\nelement: f64\nheader:\n  type: empty\n  points: 751\n")
                .unwrap();
        assert_eq!(
            encoding,
            TraceEncoding::Binary {
                element: ElementType::F64,
                byte_order: ByteOrder::Little,
                header: BlockHeader::Empty { points: 751 },
                terminated: true,
                max_bytes: DEFAULT_MAX_BLOCK_BYTES,
            }
        );
    }
}
