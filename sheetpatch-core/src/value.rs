//! Grid values and their normalisation into typed cell values

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A value as held by an editing grid, before any typing is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<RawValue>),
    Record(BTreeMap<String, RawValue>),
}

impl RawValue {
    /// Short name of the variant, used in failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "boolean",
            RawValue::Number(_) => "number",
            RawValue::Text(_) => "text",
            RawValue::List(_) => "list",
            RawValue::Record(_) => "record",
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            RawValue::Null => serde_json::Value::Null,
            RawValue::Bool(b) => serde_json::Value::Bool(*b),
            RawValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            RawValue::Text(s) => serde_json::Value::String(s.clone()),
            RawValue::List(items) => {
                serde_json::Value::Array(items.iter().map(RawValue::to_json).collect())
            }
            RawValue::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Bool(b),
            serde_json::Value::Number(n) => n.as_f64().map_or(RawValue::Null, RawValue::Number),
            serde_json::Value::String(s) => RawValue::Text(s),
            serde_json::Value::Array(items) => {
                RawValue::List(items.into_iter().map(RawValue::from).collect())
            }
            serde_json::Value::Object(map) => {
                RawValue::Record(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<bool> for RawValue {
    fn from(value: bool) -> Self {
        RawValue::Bool(value)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => Ok(()),
            RawValue::Bool(b) => write!(f, "{}", b),
            RawValue::Number(n) => write!(f, "{}", n),
            RawValue::Text(s) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

/// Cell value after normalisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TypedValue {
    Blank,
    Number(f64),
    Boolean(bool),
    Text(String),
}

impl TypedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            TypedValue::Blank => "blank",
            TypedValue::Number(_) => "number",
            TypedValue::Boolean(_) => "boolean",
            TypedValue::Text(_) => "text",
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Blank => Ok(()),
            TypedValue::Number(n) => write!(f, "{}", n),
            TypedValue::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            TypedValue::Text(s) => f.write_str(s),
        }
    }
}

/// Normalise a grid value into a typed cell value. Never fails.
pub fn normalize(raw: &RawValue) -> TypedValue {
    normalize_inner(raw, true)
}

fn normalize_inner(raw: &RawValue, unwrap_record: bool) -> TypedValue {
    match raw {
        RawValue::Null => TypedValue::Blank,
        RawValue::Number(n) if n.is_nan() => TypedValue::Text("NaN".to_string()),
        RawValue::Number(n) => TypedValue::Number(*n),
        RawValue::Bool(b) => TypedValue::Boolean(*b),
        RawValue::Text(s) => normalize_text(s),
        RawValue::Record(map) if unwrap_record && map.contains_key("v") => {
            normalize_inner(&map["v"], false)
        }
        structured => {
            let text = structured.to_json().to_string();
            log::debug!("Coercing {} value to text: {}", structured.kind(), text);
            normalize_text(&text)
        }
    }
}

fn normalize_text(text: &str) -> TypedValue {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return TypedValue::Blank;
    }
    match parse_decimal(trimmed) {
        Some(n) => TypedValue::Number(n),
        None => TypedValue::Text(text.to_string()),
    }
}

/// Plain decimal literals only: `inf`, `NaN` and friends stay text.
fn parse_decimal(text: &str) -> Option<f64> {
    let looks_numeric = text
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'));
    if !looks_numeric {
        return None;
    }
    text.parse::<f64>().ok().filter(|n| n.is_finite())
}
