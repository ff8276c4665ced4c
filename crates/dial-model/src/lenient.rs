//! Field deserializers for the loosely typed backend JSON.
//!
//! The simulator backend is inconsistent about scalar encoding: times may be
//! numbers, numeric strings, `null` or the string `"None"`; flags may be
//! booleans or `"True"`/`"False"`. These helpers accept every observed form
//! and reject anything else with a decode error.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn is_none_marker(s: &str) -> bool {
    matches!(s.trim(), "" | "None" | "none" | "null" | "undefined")
}

/// Interpret a JSON value as an optional unsigned integer.
pub fn value_to_opt_u64(value: &Value) -> Result<Option<u64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return Ok(Some(v));
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 => Ok(Some(f as u64)),
                _ => Err(format!("expected a non-negative integer, got {n}")),
            }
        }
        Value::String(s) if is_none_marker(s) => Ok(None),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("expected an integer string, got {s:?}")),
        other => Err(format!("expected an integer, got {other}")),
    }
}

/// Optional integer field.
pub fn opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    value_to_opt_u64(&value).map_err(D::Error::custom)
}

/// Required integer field.
pub fn required_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    opt_u64(deserializer)?.ok_or_else(|| D::Error::custom("missing integer"))
}

/// Boolean field that may be encoded as `"True"`/`"False"`.
pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::Number(n) => Ok(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" | "none" => Ok(false),
            _ => Err(D::Error::custom(format!("expected a boolean, got {s:?}"))),
        },
        other => Err(D::Error::custom(format!("expected a boolean, got {other}"))),
    }
}

/// Optional identifier where `"None"` means absent.
pub fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if is_none_marker(&s) => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!("expected an id, got {other}"))),
    }
}

/// A list of strings, also accepting the Python repr `"['a', 'b']"`.
pub fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(D::Error::custom(format!("expected a string, got {other}"))),
            })
            .collect(),
        Value::String(s) => parse_python_list(&s).map_err(D::Error::custom),
        other => Err(D::Error::custom(format!("expected a list, got {other}"))),
    }
}

/// Parse `"['a', 'b']"` or `"[]"` into its items.
pub fn parse_python_list(raw: &str) -> Result<Vec<String>, String> {
    let trimmed = raw.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| format!("expected a bracketed list, got {raw:?}"))?;
    Ok(inner
        .split(',')
        .map(|item| item.trim().trim_matches(|c| c == '\'' || c == '"').to_string())
        .filter(|item| !item.is_empty())
        .collect())
}
