//! Form and query-string encoding of request parameters.
//!
//! Nested objects and arrays are flattened into bracketed key paths
//! (`metadata[plan]=gold`, `items[0][price]=price_1`), then both keys and
//! values are percent-escaped. Pair order follows the insertion order of
//! `Params`.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};

/// Ordered request parameters.
pub type Params = Map<String, Value>;

/// Everything except RFC 3986 unreserved characters is escaped, brackets
/// in keys included.
const FORM: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Encode `params` as `application/x-www-form-urlencoded` text. The same
/// output is used for query strings.
pub fn encode_params(params: &Params) -> String {
    flatten_params(params)
        .iter()
        .map(|(key, value)| format!("{}={}", escape(key), escape(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Flatten `params` into unescaped `(bracketed key, value)` pairs.
///
/// `null` becomes an empty value. Empty objects and arrays produce nothing.
pub fn flatten_params(params: &Params) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        flatten(key.clone(), value, &mut pairs);
    }
    pairs
}

fn flatten(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(format!("{prefix}[{key}]"), nested, out);
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                flatten(format!("{prefix}[{index}]"), nested, out);
            }
        }
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Null => out.push((prefix, String::new())),
        Value::Bool(_) | Value::Number(_) => out.push((prefix, value.to_string())),
    }
}

fn escape(raw: &str) -> String {
    utf8_percent_encode(raw, FORM).to_string()
}

/// Split an encoded query or form string back into unescaped pairs.
///
/// `+` is read as a space so bodies produced by other form encoders decode
/// the same way.
pub fn decode_pairs(encoded: &str) -> Vec<(String, String)> {
    encoded
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (unescape(key), unescape(value))
        })
        .collect()
}

fn unescape(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
