//! Normalisation: deterministic re-serialisation of validated JSON.
//!
//! The canonical form is what gets stored next to the document and what
//! the visualiser receives: pretty-printed with a four-space indent, keys
//! in the order the model produced them, non-ASCII text written as-is.
//! Values are never touched, so `normalize(parse(normalize(v)))` is
//! byte-for-byte `normalize(v)`.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::Value;

const INDENT: &[u8] = b"    ";

/// Serialise `value` in canonical form.
pub fn normalize(value: &Value) -> Result<String, serde_json::Error> {
    let mut buf = Vec::with_capacity(256);
    let mut ser = Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    value.serialize(&mut ser)?;
    // serde_json only ever writes valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Parse `text` and return its canonical form.
pub fn normalize_str(text: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(text)?;
    normalize(&value)
}
