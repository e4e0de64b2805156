// src/payload.rs
//
// Wire types returned by the spreadsheet-backed data source.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// --- Sheet Query Payload ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPayload {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub headers: Vec<String>,
    /// ISO `YYYY-MM-DD` per column when the column is a calendar day
    #[serde(default, rename = "headersISO", deserialize_with = "lenient_optional_strings")]
    pub headers_iso: Option<Vec<String>>,
    #[serde(default)]
    pub rows: Vec<RawRow>,
    /// Authoritative date-column indices; inferred from `headers_iso` when absent
    #[serde(default)]
    pub date_cols: Option<Vec<usize>>,
    #[serde(default)]
    pub frozen_left: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(default, deserialize_with = "lenient_strings")]
    pub v: Vec<String>,
    #[serde(default, deserialize_with = "lenient_optional_strings")]
    pub bg: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_optional_strings")]
    pub fc: Option<Vec<String>>,
    /// Backend-computed "counted as attended" flag per column
    #[serde(default, deserialize_with = "lenient_optional_flags")]
    pub att: Option<Vec<bool>>,
}

impl RawRow {
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            v: values.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_att(mut self, att: Vec<bool>) -> Self {
        self.att = Some(att);
        self
    }
}

// --- Login Verification ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub is_admin: Option<bool>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub warehouse_key: Option<String>,
}

// --- Lenient Coercion Helpers ---
// Spreadsheet cells arrive as whatever type the sheet stored: numbers, dates
// rendered as strings, booleans, or null for empty cells.

pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn value_is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .iter()
        .map(value_to_text)
        .collect())
}

fn lenient_optional_strings<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values.map(|vals| vals.iter().map(value_to_text).collect()))
}

fn lenient_optional_flags<'de, D>(deserializer: D) -> Result<Option<Vec<bool>>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values.map(|vals| vals.iter().map(value_is_truthy).collect()))
}
