//! Typed property values.

use crate::descriptor::ValueType;
use crate::error::{InstrError, InstrResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value read from or written to a property.
///
/// Equality is numeric across `Int` and `Float`, so `Int(1) == Float(1.0)`.
/// This mirrors how instruments echo settings back: a value written as `5`
/// commonly reads back as `5.000E+00`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Integer literal
    Int(i64),
    /// Floating-point literal
    Float(f64),
    /// Text literal
    Text(String),
}

impl Value {
    /// Numeric view, `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(_) => None,
        }
    }

    /// Integer view; floats qualify only when they carry no fraction.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if is_integral(*f) => Some(*f as i64),
            _ => None,
        }
    }

    /// Text view, `None` for numbers.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value type this literal naturally has.
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::String,
        }
    }

    /// Convert to the declared type of `property` before validation.
    ///
    /// Integers widen to floats, integral floats narrow to integers and numbers
    /// render to text. Text never converts to a number.
    pub fn coerce_to(self, target: ValueType, property: &str) -> InstrResult<Value> {
        match (target, self) {
            (ValueType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ValueType::Float, v @ Value::Float(_)) => Ok(v),
            (ValueType::Int, v @ Value::Int(_)) => Ok(v),
            (ValueType::Int, Value::Float(f)) => {
                if is_integral(f) {
                    Ok(Value::Int(f as i64))
                } else {
                    Err(InstrError::validation(
                        property,
                        format!("{} is not an integer", f),
                    ))
                }
            }
            (ValueType::String, v @ Value::Text(_)) => Ok(v),
            (ValueType::String, v) => Ok(Value::Text(v.to_string())),
            (numeric, Value::Text(s)) => Err(InstrError::validation(
                property,
                format!("text {:?} given for a {} property", s, numeric),
            )),
        }
    }

    /// Parse command-line text according to a declared type.
    pub fn parse_as(text: &str, value_type: ValueType) -> InstrResult<Value> {
        super::parse(text, value_type)
    }
}

fn is_integral(f: f64) -> bool {
    f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Text(_), _) | (_, Value::Text(_)) => false,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<f32> for Value {
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_equality_across_variants() {
        assert_eq!(Value::Int(5), Value::Float(5.0));
        assert_ne!(Value::Int(5), Value::Float(5.5));
        assert_ne!(Value::Text("5".into()), Value::Int(5));
    }

    #[test]
    fn test_coerce_int_into_float_property() {
        let v = Value::Int(3).coerce_to(ValueType::Float, "p").unwrap();
        assert!(matches!(v, Value::Float(f) if f == 3.0));
    }

    #[test]
    fn test_coerce_fractional_float_into_int_property_fails() {
        let err = Value::Float(2.5).coerce_to(ValueType::Int, "p").unwrap_err();
        assert!(matches!(err, InstrError::Validation { .. }));
        assert!(matches!(
            Value::Float(2.0).coerce_to(ValueType::Int, "p").unwrap(),
            Value::Int(2)
        ));
    }

    #[test]
    fn test_coerce_text_into_numeric_fails() {
        assert!(Value::from("high").coerce_to(ValueType::Float, "p").is_err());
        assert_eq!(
            Value::Int(7).coerce_to(ValueType::String, "p").unwrap(),
            Value::from("7")
        );
    }
}
