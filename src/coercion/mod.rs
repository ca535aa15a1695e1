//! Value coercion between response text and typed values.
//!
//! - [`parse`] / [`ResponseParser`]: response text → [`Value`]
//! - [`ValueFormat`]: [`Value`] → command text

pub mod format;
pub mod parser;
pub mod value;

pub use format::{FormatSpec, ValueFormat};
pub use parser::{parse, FirstNumberParser, ResponseParser, StandardParser};
pub use value::Value;
