// src/normalize.rs
//
// Turns a raw sheet payload into header-keyed rows. Blank rows are dropped,
// the employee name is mirrored into a canonical field, and schedule sheets
// get a per-row attendance summary.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::aggregate::{summarize_row, AttendanceSummary};
use crate::classifier::ExclusionSets;
use crate::dates::DateColumns;
use crate::payload::RawPayload;

pub const NAME_FIELD: &str = "姓名";

/// Exact header labels tried, in order, when locating the name column
pub const NAME_LABELS: &[&str] = &["姓名", "Name", "name", "員工姓名", "中文姓名"];

/// Sheets whose name contains this marker are schedules
pub const SCHEDULE_SHEET_MARKER: &str = "班表";

// Whitespace, NBSP, zero-width marks, bidi controls and other format
// characters that spreadsheets leave behind in "empty" cells
static INVISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\s\p{Cf}\x{00A0}\x{200B}-\x{200F}\x{2028}-\x{202F}\x{2060}-\x{206F}\x{FEFF}]+")
        .expect("valid invisible-character regex")
});

static NAME_FALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)name|姓名").expect("valid name fallback regex"));

pub fn strip_invisible(text: &str) -> String {
    INVISIBLE.replace_all(text, "").into_owned()
}

pub fn is_blank_cell(text: &str) -> bool {
    INVISIBLE.replace_all(text, "").is_empty()
}

// --- Options ---

#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub sheet_name: String,
    /// Off for sheet types where attendance makes no sense (hours reports)
    pub compute_attendance: bool,
    pub exclusions: ExclusionSets,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            sheet_name: String::new(),
            compute_attendance: true,
            exclusions: ExclusionSets::default(),
        }
    }
}

impl NormalizeOptions {
    pub fn for_sheet<S: Into<String>>(sheet_name: S) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            ..Default::default()
        }
    }

    pub fn without_attendance(mut self) -> Self {
        self.compute_attendance = false;
        self
    }

    pub fn with_exclusions(mut self, exclusions: ExclusionSets) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn attendance_enabled(&self) -> bool {
        self.compute_attendance && self.sheet_name.contains(SCHEDULE_SHEET_MARKER)
    }
}

// --- Normalized Types ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRow {
    pub id: String,
    /// Column key -> raw cell text, plus the canonical name field. Serialized
    /// inline next to `id` and the `_`-prefixed side channels.
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    /// Raw cells by column index
    #[serde(rename = "_values")]
    pub values: Vec<String>,
    #[serde(rename = "_bg", skip_serializing_if = "Option::is_none")]
    pub bg: Option<Vec<String>>,
    #[serde(rename = "_fc", skip_serializing_if = "Option::is_none")]
    pub fc: Option<Vec<String>>,
    #[serde(rename = "_att", skip_serializing_if = "Option::is_none")]
    pub att: Option<Vec<bool>>,
    #[serde(rename = "_attendance", skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceSummary>,
    #[serde(rename = "_attendanceRate", skip_serializing_if = "Option::is_none")]
    pub attendance_rate: Option<f64>,
}

impl NormalizedRow {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Canonical employee name, trimmed; empty when the sheet has no name column.
    pub fn name(&self) -> &str {
        self.get(NAME_FIELD).map(str::trim).unwrap_or("")
    }

    pub fn cell(&self, column: usize) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn att_flags(&self) -> Option<&[bool]> {
        self.att.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedSheet {
    /// Display labels as received
    pub headers: Vec<String>,
    /// Addressable key per column (`col_<n>` for blank headers)
    pub keys: Vec<String>,
    #[serde(rename = "headersISO", skip_serializing_if = "Option::is_none")]
    pub headers_iso: Option<Vec<String>>,
    pub date_columns: DateColumns,
    pub frozen_left: usize,
    pub name_column: Option<usize>,
    pub rows: Vec<NormalizedRow>,
}

impl NormalizedSheet {
    pub fn rows_for(&self, employee: &str) -> Vec<NormalizedRow> {
        let employee = employee.trim();
        self.rows
            .iter()
            .filter(|r| r.name() == employee)
            .cloned()
            .collect()
    }
}

// --- Normalization ---

pub fn column_key(header: &str, index: usize) -> String {
    let trimmed = header.trim();
    if trimmed.is_empty() {
        format!("col_{}", index + 1)
    } else {
        trimmed.to_string()
    }
}

/// Exact label match first (in `NAME_LABELS` order), then substring fallback.
pub fn locate_name_column(headers: &[String]) -> Option<usize> {
    NAME_LABELS
        .iter()
        .find_map(|label| headers.iter().position(|h| h.trim() == *label))
        .or_else(|| headers.iter().position(|h| NAME_FALLBACK.is_match(h)))
}

pub fn normalize(payload: &RawPayload, options: &NormalizeOptions) -> NormalizedSheet {
    let headers = payload.headers.clone();
    let keys: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| column_key(h, i))
        .collect();

    let date_columns = DateColumns::resolve(
        &headers,
        payload.headers_iso.as_deref(),
        payload.date_cols.as_deref(),
    );
    let name_column = locate_name_column(&headers);
    match name_column {
        Some(idx) => debug!("Name column resolved to '{}' (index {})", keys[idx], idx),
        None => debug!("No name column found among {} headers", headers.len()),
    }

    let with_attendance = options.attendance_enabled();
    let mut rows = Vec::with_capacity(payload.rows.len());
    let mut dropped = 0usize;

    for raw in &payload.rows {
        if raw.v.iter().all(|cell| is_blank_cell(cell)) {
            dropped += 1;
            continue;
        }

        let mut fields = BTreeMap::new();
        for (i, key) in keys.iter().enumerate() {
            fields.insert(key.clone(), raw.v.get(i).cloned().unwrap_or_default());
        }
        if let Some(idx) = name_column {
            fields.insert(
                NAME_FIELD.to_string(),
                raw.v.get(idx).cloned().unwrap_or_default(),
            );
        }

        let mut row = NormalizedRow {
            id: format!("gas_{}", rows.len()),
            fields,
            values: raw.v.clone(),
            bg: raw.bg.clone(),
            fc: raw.fc.clone(),
            att: raw.att.clone(),
            attendance: None,
            attendance_rate: None,
        };

        if with_attendance {
            let summary = summarize_row(&row, &date_columns, &options.exclusions);
            row.attendance_rate = Some(summary.rate);
            row.attendance = Some(summary);
        }
        rows.push(row);
    }

    info!(
        "Normalized sheet '{}': {} rows kept, {} blank rows dropped, {} date columns, attendance {}",
        options.sheet_name,
        rows.len(),
        dropped,
        date_columns.len(),
        if with_attendance { "computed" } else { "skipped" }
    );

    NormalizedSheet {
        headers,
        keys,
        headers_iso: payload.headers_iso.clone(),
        date_columns,
        frozen_left: payload.frozen_left.unwrap_or(0),
        name_column,
        rows,
    }
}
