//! Response parsing strategies.
//!
//! Most instruments answer a query with a bare number, which [`StandardParser`]
//! handles. Instruments with chattier grammars get their own strategy, chosen
//! when the session is built rather than baked into the engine.

use super::value::Value;
use crate::descriptor::ValueType;
use crate::error::{InstrError, InstrResult};
use regex::Regex;
use std::sync::LazyLock;

/// First signed decimal number in a line.
static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?(?:\d*\.\d+|\d+)").expect("Invalid number regex"));

/// Standalone on/off token.
static SWITCH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(on|off)\b").expect("Invalid switch regex"));

/// Turns a raw response into a typed value.
pub trait ResponseParser: Send + Sync {
    /// Parse `response` as `value_type`.
    fn parse(&self, response: &str, value_type: ValueType) -> InstrResult<Value>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Parse a response the plain way.
///
/// Floats and integers ignore surrounding whitespace; strings are returned
/// untouched.
pub fn parse(response: &str, value_type: ValueType) -> InstrResult<Value> {
    let format_error = || InstrError::Format {
        response: response.to_string(),
        expected: value_type,
    };
    match value_type {
        ValueType::Float => response
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format_error()),
        ValueType::Int => response
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| format_error()),
        ValueType::String => Ok(Value::Text(response.to_string())),
    }
}

/// Default strategy, see [`parse`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardParser;

impl ResponseParser for StandardParser {
    fn parse(&self, response: &str, value_type: ValueType) -> InstrResult<Value> {
        parse(response, value_type)
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// For instruments that wrap readings in prose, e.g. `"laser power 120 mW"`.
///
/// Takes the first number in the response. Without a number, an `on`/`off`
/// word reads as 1/0. String properties are passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstNumberParser;

impl ResponseParser for FirstNumberParser {
    fn parse(&self, response: &str, value_type: ValueType) -> InstrResult<Value> {
        if value_type == ValueType::String {
            return Ok(Value::Text(response.to_string()));
        }
        let format_error = || InstrError::Format {
            response: response.to_string(),
            expected: value_type,
        };

        let number = match NUMBER_REGEX.find(response) {
            Some(m) => m.as_str().parse::<f64>().map_err(|_| format_error())?,
            None => match SWITCH_REGEX.captures(response) {
                Some(caps) if caps[1].eq_ignore_ascii_case("on") => 1.0,
                Some(_) => 0.0,
                None => return Err(format_error()),
            },
        };

        match value_type {
            ValueType::Int => Value::Float(number)
                .as_i64()
                .map(Value::Int)
                .ok_or_else(format_error),
            _ => Ok(Value::Float(number)),
        }
    }

    fn name(&self) -> &'static str {
        "first_number"
    }
}
