//! Value format templates for write commands.
//!
//! A template holds exactly one `{...}` placeholder with optional literal text
//! around it. Supported placeholders:
//!
//! | Placeholder        | Renders                                  |
//! |--------------------|------------------------------------------|
//! | `{}`               | the value as-is                          |
//! | `{:d}` `{:5d}` `{:03d}` | an integer, optionally padded       |
//! | `{:f}` `{:.3f}` `{:.3}` | fixed-point (default 6 decimals)    |
//! | `{:e}` `{:.2e}`    | exponent notation                        |
//! | `{:x}` `{:04X}`    | hexadecimal, lower or upper case         |

use super::value::Value;
use crate::error::{InstrError, InstrResult};
use regex::Regex;
use std::sync::LazyLock;

/// Cached regex for placeholder extraction (compiled once).
static PLACEHOLDER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(?::([^}]*))?\}").expect("Invalid placeholder regex"));

/// Parsed form of a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSpec {
    /// `{}`
    Display,
    /// `{:d}` with optional width and zero padding
    Integer {
        /// Minimum field width
        width: usize,
        /// Pad with zeros instead of spaces
        zero_pad: bool,
    },
    /// `{:.Nf}`
    Fixed {
        /// Digits after the decimal point
        precision: usize,
    },
    /// `{:e}` / `{:.Ne}`
    Exponent {
        /// Digits after the decimal point, shortest form when absent
        precision: Option<usize>,
    },
    /// `{:x}` / `{:X}`
    Hex {
        /// Minimum field width, zero padded
        width: usize,
        /// Upper-case digits
        upper: bool,
    },
}

/// A compiled value format template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueFormat {
    template: String,
    prefix: String,
    spec: FormatSpec,
    suffix: String,
}

impl Default for ValueFormat {
    fn default() -> Self {
        Self {
            template: "{}".to_string(),
            prefix: String::new(),
            spec: FormatSpec::Display,
            suffix: String::new(),
        }
    }
}

impl ValueFormat {
    /// Compile a template.
    pub fn parse(template: &str) -> InstrResult<Self> {
        let invalid = |reason: &str| InstrError::InvalidFormat {
            template: template.to_string(),
            reason: reason.to_string(),
        };

        let mut captures = PLACEHOLDER_REGEX.captures_iter(template);
        let caps = captures
            .next()
            .ok_or_else(|| invalid("no placeholder"))?;
        if captures.next().is_some() {
            return Err(invalid("more than one placeholder"));
        }

        let whole = caps.get(0).ok_or_else(|| invalid("no placeholder"))?;
        let spec_text = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let spec = parse_spec(spec_text).ok_or_else(|| invalid("unsupported placeholder"))?;

        Ok(Self {
            template: template.to_string(),
            prefix: template[..whole.start()].to_string(),
            spec,
            suffix: template[whole.end()..].to_string(),
        })
    }

    /// The template as configured.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The parsed placeholder.
    pub fn spec(&self) -> FormatSpec {
        self.spec
    }

    /// Render `value` for a write to `property`.
    ///
    /// A value the placeholder cannot represent (text into `{:d}`, a fraction
    /// into `{:x}`) is a validation error, raised before anything is written.
    pub fn render(&self, value: &Value, property: &str) -> InstrResult<String> {
        let body = match self.spec {
            FormatSpec::Display => value.to_string(),
            FormatSpec::Integer { width, zero_pad } => {
                let i = self.integer(value, property)?;
                if zero_pad {
                    format!("{:0width$}", i, width = width)
                } else {
                    format!("{:width$}", i, width = width)
                }
            }
            FormatSpec::Fixed { precision } => {
                format!("{:.precision$}", self.number(value, property)?, precision = precision)
            }
            FormatSpec::Exponent { precision } => {
                let x = self.number(value, property)?;
                match precision {
                    Some(p) => format!("{:.p$e}", x, p = p),
                    None => format!("{:e}", x),
                }
            }
            FormatSpec::Hex { width, upper } => {
                let i = self.integer(value, property)?;
                let u = u64::try_from(i).map_err(|_| {
                    InstrError::validation(property, format!("{} cannot be rendered as hex", i))
                })?;
                if upper {
                    format!("{:0width$X}", u, width = width)
                } else {
                    format!("{:0width$x}", u, width = width)
                }
            }
        };
        Ok(format!("{}{}{}", self.prefix, body, self.suffix))
    }

    fn number(&self, value: &Value, property: &str) -> InstrResult<f64> {
        value.as_f64().ok_or_else(|| {
            InstrError::validation(
                property,
                format!("{:?} does not fit template {:?}", value, self.template),
            )
        })
    }

    fn integer(&self, value: &Value, property: &str) -> InstrResult<i64> {
        value.as_i64().ok_or_else(|| {
            InstrError::validation(
                property,
                format!("{} does not fit integer template {:?}", value, self.template),
            )
        })
    }
}

fn parse_spec(spec: &str) -> Option<FormatSpec> {
    if spec.is_empty() {
        return Some(FormatSpec::Display);
    }

    let (body, kind) = match spec.chars().last() {
        Some(c @ ('d' | 'f' | 'e' | 'x' | 'X')) => (&spec[..spec.len() - 1], Some(c)),
        _ => (spec, None),
    };

    let (width_text, precision_text) = match body.split_once('.') {
        Some((w, p)) => (w, Some(p)),
        None => (body, None),
    };
    let zero_pad = width_text.starts_with('0') && width_text.len() > 1;
    let width = if width_text.is_empty() {
        0
    } else {
        width_text.parse::<usize>().ok()?
    };
    let precision = match precision_text {
        Some(p) => Some(p.parse::<usize>().ok()?),
        None => None,
    };

    match kind {
        Some('d') if precision.is_none() => Some(FormatSpec::Integer { width, zero_pad }),
        Some('f') if width == 0 => Some(FormatSpec::Fixed {
            precision: precision.unwrap_or(6),
        }),
        Some('e') if width == 0 => Some(FormatSpec::Exponent { precision }),
        Some(c @ ('x' | 'X')) if precision.is_none() => Some(FormatSpec::Hex {
            width,
            upper: c == 'X',
        }),
        None if width == 0 => precision.map(|precision| FormatSpec::Fixed { precision }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(template: &str, value: impl Into<Value>) -> String {
        ValueFormat::parse(template)
            .unwrap()
            .render(&value.into(), "p")
            .unwrap()
    }

    #[test]
    fn test_display_template() {
        assert_eq!(render("{}", 5), "5");
        assert_eq!(render("{}", 2.5), "2.5");
        assert_eq!(render("{}", "ON"), "ON");
    }

    #[test]
    fn test_integer_templates() {
        assert_eq!(render("{:d}", 42), "42");
        assert_eq!(render("{:d}", 42.0), "42");
        assert_eq!(render("{:03d}", 7), "007");
        assert_eq!(render("{:4d}", 7), "   7");
    }

    #[test]
    fn test_integer_template_rejects_fraction() {
        let format = ValueFormat::parse("{:d}").unwrap();
        let err = format.render(&Value::Float(5.5), "p").unwrap_err();
        assert!(matches!(err, InstrError::Validation { .. }));
    }

    #[test]
    fn test_float_templates() {
        assert_eq!(render("{:.3f}", 1.5), "1.500");
        assert_eq!(render("{:f}", 1), "1.000000");
        assert_eq!(render("{:.6}", 0.0125), "0.012500");
        assert_eq!(render("{:.2e}", 1500.0), "1.50e3");
    }

    #[test]
    fn test_hex_templates() {
        assert_eq!(render("{:x}", 255), "ff");
        assert_eq!(render("{:04X}", 255), "00FF");
    }

    #[test]
    fn test_literal_text_kept() {
        assert_eq!(render("<{:d}>", 3), "<3>");
    }

    #[test]
    fn test_invalid_templates() {
        for template in ["", "no placeholder", "{}{}", "{:q}", "{:.2d}", "{:5f}"] {
            assert!(
                matches!(
                    ValueFormat::parse(template),
                    Err(InstrError::InvalidFormat { .. })
                ),
                "template {:?} should be rejected",
                template
            );
        }
    }
}
