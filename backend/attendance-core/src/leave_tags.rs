// src/leave_tags.rs
//
// Groups leave/absence tokens by tag across a date range. Wide sheets have one
// column per day (matrix mode); long sheets have one row per leave event with
// dedicated date and leave-type columns (record mode).

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::classifier::tokenize;
use crate::dates::{iso_or_raw, natural_compare, DateColumns};
use crate::normalize::NormalizedRow;

/// Header labels for the date column of a record-mode sheet
pub const RECORD_DATE_LABELS: &[&str] = &["日期", "請假日期", "Date", "date"];
/// Header labels for the leave-type column of a record-mode sheet
pub const RECORD_LEAVE_LABELS: &[&str] = &["假別", "請假類別", "類別", "Leave", "leave"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    Matrix,
    Record,
}

#[derive(Debug, Clone, Copy)]
pub enum TagSource<'a> {
    Matrix(&'a DateColumns),
    Record {
        date_column: usize,
        leave_column: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDates {
    pub tag: String,
    /// Unique, sorted date labels
    pub dates: Vec<String>,
}

impl TagDates {
    pub fn joined(&self) -> String {
        self.dates.join("、")
    }
}

/// Finds the (date, leave-type) column pair of a record-mode sheet.
pub fn locate_record_columns(headers: &[String]) -> Option<(usize, usize)> {
    let find = |labels: &[&str]| {
        labels
            .iter()
            .find_map(|label| headers.iter().position(|h| h.trim() == *label))
    };
    Some((find(RECORD_DATE_LABELS)?, find(RECORD_LEAVE_LABELS)?))
}

/// Tag -> dates it occurs on. Record-mode dates are parsed to ISO when they
/// match a known pattern (month/day forms use `default_year`), else kept raw.
pub fn extract_tag_dates(
    rows: &[NormalizedRow],
    source: TagSource<'_>,
    default_year: i32,
) -> Vec<TagDates> {
    let mut by_tag: HashMap<String, HashSet<String>> = HashMap::new();

    match source {
        TagSource::Matrix(date_columns) => {
            for row in rows {
                for col in date_columns.iter() {
                    let tokens = tokenize(row.cell(col.index));
                    if tokens.is_empty() {
                        continue;
                    }
                    let label = col.display_label();
                    for token in tokens {
                        by_tag.entry(token).or_default().insert(label.clone());
                    }
                }
            }
        }
        TagSource::Record {
            date_column,
            leave_column,
        } => {
            for row in rows {
                let raw_date = row.cell(date_column).trim();
                if raw_date.is_empty() {
                    continue;
                }
                let date = iso_or_raw(raw_date, default_year);
                for token in tokenize(row.cell(leave_column)) {
                    by_tag.entry(token).or_default().insert(date.clone());
                }
            }
        }
    }

    let mut tags: Vec<TagDates> = by_tag
        .into_iter()
        .map(|(tag, dates)| {
            let mut dates: Vec<String> = dates.into_iter().collect();
            dates.sort_by(|a, b| natural_compare(a, b));
            TagDates { tag, dates }
        })
        .collect();
    tags.sort_by(|a, b| natural_compare(&a.tag, &b.tag));

    debug!("Extracted {} leave tags from {} rows", tags.len(), rows.len());
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize, NormalizeOptions};
    use crate::payload::{RawPayload, RawRow};

    #[test]
    fn matrix_mode_groups_tokens_by_tag() {
        let payload = RawPayload {
            headers: vec!["姓名".into(), "3/10".into(), "3/9".into(), "3/2".into()],
            headers_iso: Some(vec![
                "".into(),
                "2025-03-10".into(),
                "2025-03-09".into(),
                "2025-03-02".into(),
            ]),
            rows: vec![
                RawRow::from_values(["王小明", "病假、事假", "病假", ""]),
                RawRow::from_values(["王小明", "病假", "", "公假"]),
            ],
            ..Default::default()
        };
        let sheet = normalize(&payload, &NormalizeOptions::for_sheet("請假明細"));
        let tags = extract_tag_dates(&sheet.rows, TagSource::Matrix(&sheet.date_columns), 2025);

        let names: Vec<&str> = tags.iter().map(|t| t.tag.as_str()).collect();
        assert_eq!(names, vec!["公假", "事假", "病假"]);

        let sick = tags.iter().find(|t| t.tag == "病假").unwrap();
        assert_eq!(sick.dates, vec!["3/9", "3/10"]);
        assert_eq!(sick.joined(), "3/9、3/10");
    }

    #[test]
    fn record_mode_parses_free_text_dates() {
        let payload = RawPayload {
            headers: vec!["姓名".into(), "日期".into(), "假別".into()],
            rows: vec![
                RawRow::from_values(["王小明", "2025/3/5", "病假"]),
                RawRow::from_values(["王小明", "3月5日", "病假"]),
                RawRow::from_values(["王小明", "3/1", "事假/病假"]),
                RawRow::from_values(["王小明", "待補", "喪假"]),
                RawRow::from_values(["王小明", "", "婚假"]),
            ],
            ..Default::default()
        };
        let sheet = normalize(&payload, &NormalizeOptions::for_sheet("請假紀錄"));
        let (date_column, leave_column) = locate_record_columns(&sheet.headers).unwrap();
        let tags = extract_tag_dates(
            &sheet.rows,
            TagSource::Record {
                date_column,
                leave_column,
            },
            2025,
        );

        let sick = tags.iter().find(|t| t.tag == "病假").unwrap();
        assert_eq!(sick.dates, vec!["2025-03-01", "2025-03-05"]);
        let funeral = tags.iter().find(|t| t.tag == "喪假").unwrap();
        assert_eq!(funeral.dates, vec!["待補"]);
        assert!(tags.iter().all(|t| t.tag != "婚假"), "rows without a date are skipped");
    }

    #[test]
    fn record_columns_need_both_labels() {
        let headers: Vec<String> = vec!["姓名".into(), "日期".into()];
        assert_eq!(locate_record_columns(&headers), None);
    }
}
