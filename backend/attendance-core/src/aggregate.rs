// src/aggregate.rs
//
// Folds per-cell classifications into attendance summaries: per row for the
// main result table, and per employee (deduplicated by date across rows) for
// rankings and range statistics.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::classifier::ExclusionSets;
use crate::dates::DateColumns;
use crate::normalize::NormalizedRow;

pub const NORMAL_RATE_THRESHOLD: f64 = 0.90;
pub const LOW_RATE_THRESHOLD: f64 = 0.75;
pub const DEFAULT_RANKING_SIZE: usize = 5;

// --- Summary Types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Normal,
    Low,
    Abnormal,
}

impl AttendanceStatus {
    pub fn from_rate(rate: f64) -> Self {
        if rate >= NORMAL_RATE_THRESHOLD {
            AttendanceStatus::Normal
        } else if rate >= LOW_RATE_THRESHOLD {
            AttendanceStatus::Low
        } else {
            AttendanceStatus::Abnormal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttendanceStatus::Normal => "正常",
            AttendanceStatus::Low => "偏低",
            AttendanceStatus::Abnormal => "異常",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceSummary {
    pub rate: f64,
    pub attended: u32,
    pub expected: u32,
    pub status: AttendanceStatus,
}

impl AttendanceSummary {
    pub fn from_counts(attended: u32, expected: u32) -> Self {
        let rate = if expected > 0 {
            (attended as f64 / expected as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            rate,
            attended,
            expected,
            status: AttendanceStatus::from_rate(rate),
        }
    }

    /// e.g. `90% (9/10)`
    pub fn display(&self) -> String {
        format!(
            "{}% ({}/{})",
            (self.rate * 100.0).round() as i64,
            self.attended,
            self.expected
        )
    }
}

// --- Per-row Aggregation ---

pub fn summarize_row(
    row: &NormalizedRow,
    date_columns: &DateColumns,
    exclusions: &ExclusionSets,
) -> AttendanceSummary {
    let mut expected = 0u32;
    let mut attended = 0u32;
    for col in date_columns.iter() {
        let class = exclusions.classify(row.cell(col.index), row.att_flags(), col.index);
        if class.is_expected() {
            expected += 1;
        }
        if class.is_attended() {
            attended += 1;
        }
    }
    AttendanceSummary::from_counts(attended, expected)
}

/// Writes `_attendance`/`_attendanceRate` on every row.
pub fn annotate_rows(
    rows: &mut [NormalizedRow],
    date_columns: &DateColumns,
    exclusions: &ExclusionSets,
) {
    for row in rows.iter_mut() {
        let summary = summarize_row(row, date_columns, exclusions);
        row.attendance_rate = Some(summary.rate);
        row.attendance = Some(summary);
    }
}

// --- Per-employee Aggregation ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeAttendance {
    pub name: String,
    /// Rows that contributed, in source order
    pub row_ids: Vec<String>,
    pub summary: AttendanceSummary,
}

#[derive(Default)]
struct DateSets {
    should: HashSet<String>,
    attended: HashSet<String>,
}

/// One entry per employee in first-seen order. A date shared by several of an
/// employee's rows counts once.
pub fn aggregate_by_employee<'a, I>(
    rows: I,
    date_columns: &DateColumns,
    exclusions: &ExclusionSets,
) -> Vec<EmployeeAttendance>
where
    I: IntoIterator<Item = &'a NormalizedRow>,
{
    let mut row_count = 0usize;
    let mut order: Vec<(String, Vec<String>)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut sets: Vec<DateSets> = Vec::new();

    for row in rows {
        row_count += 1;
        let name = row.name();
        if name.is_empty() {
            continue;
        }
        let pos = *positions.entry(name.to_string()).or_insert_with(|| {
            order.push((name.to_string(), Vec::new()));
            sets.push(DateSets::default());
            order.len() - 1
        });
        order[pos].1.push(row.id.clone());

        let entry = &mut sets[pos];
        for col in date_columns.iter() {
            let cell = row.cell(col.index);
            if !exclusions.should_attend(cell) {
                continue;
            }
            let identity = col.identity();
            if exclusions.actually_attended(cell, row.att_flags(), col.index) {
                entry.attended.insert(identity.clone());
            }
            entry.should.insert(identity);
        }
    }

    debug!(
        "Aggregated {} rows into {} employees over {} date columns",
        row_count,
        order.len(),
        date_columns.len()
    );

    order
        .into_iter()
        .zip(sets)
        .map(|((name, row_ids), dates)| EmployeeAttendance {
            name,
            row_ids,
            summary: AttendanceSummary::from_counts(
                dates.attended.len() as u32,
                dates.should.len() as u32,
            ),
        })
        .collect()
}

pub fn aggregate_map(
    rows: &[NormalizedRow],
    date_columns: &DateColumns,
    exclusions: &ExclusionSets,
) -> HashMap<String, AttendanceSummary> {
    aggregate_by_employee(rows, date_columns, exclusions)
        .into_iter()
        .map(|e| (e.name, e.summary))
        .collect()
}

// --- Rankings ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ranking {
    pub worst: Vec<EmployeeAttendance>,
    pub best: Vec<EmployeeAttendance>,
}

/// Worst `size` by ascending rate (ties keep first-seen order) and best
/// `size` from the same list reversed. Employees with nothing expected are
/// left out.
pub fn rank(employees: &[EmployeeAttendance], size: usize) -> Ranking {
    let mut ascending: Vec<EmployeeAttendance> = employees
        .iter()
        .filter(|e| e.summary.expected > 0)
        .cloned()
        .collect();
    ascending.sort_by(|a, b| a.summary.rate.total_cmp(&b.summary.rate));

    let worst = ascending.iter().take(size).cloned().collect();
    let best = ascending.iter().rev().take(size).cloned().collect();
    Ranking { worst, best }
}

// --- Range Statistics ---

fn restrict_to_employee<'a>(
    rows: &'a [NormalizedRow],
    employee: Option<&str>,
) -> Vec<&'a NormalizedRow> {
    match employee.map(str::trim).filter(|e| !e.is_empty()) {
        Some(name) => rows.iter().filter(|r| r.name() == name).collect(),
        None => rows.iter().collect(),
    }
}

/// Per-employee statistics over every date up to and including `end`, dates
/// ordered by ISO date then label. `None` when `end` names no date column.
pub fn range_statistics(
    rows: &[NormalizedRow],
    date_columns: &DateColumns,
    exclusions: &ExclusionSets,
    end: &str,
    employee: Option<&str>,
) -> Option<Vec<EmployeeAttendance>> {
    let prefix = date_columns.prefix_through(end)?;
    let selected = restrict_to_employee(rows, employee);
    Some(aggregate_by_employee(selected, &prefix, exclusions))
}

/// Per-employee statistics over exactly one date column.
pub fn day_statistics(
    rows: &[NormalizedRow],
    date_columns: &DateColumns,
    exclusions: &ExclusionSets,
    day: &str,
    employee: Option<&str>,
) -> Option<Vec<EmployeeAttendance>> {
    let single = date_columns.single(day)?;
    let selected = restrict_to_employee(rows, employee);
    Some(aggregate_by_employee(selected, &single, exclusions))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_boundaries() {
        assert_eq!(AttendanceStatus::from_rate(0.90), AttendanceStatus::Normal);
        assert_eq!(AttendanceStatus::from_rate(0.8999999), AttendanceStatus::Low);
        assert_eq!(AttendanceStatus::from_rate(0.75), AttendanceStatus::Low);
        assert_eq!(AttendanceStatus::from_rate(0.7499999), AttendanceStatus::Abnormal);
        assert_eq!(AttendanceStatus::from_rate(1.0), AttendanceStatus::Normal);
    }

    #[test]
    fn zero_expected_means_zero_rate() {
        let summary = AttendanceSummary::from_counts(0, 0);
        assert_eq!(summary.rate, 0.0);
        assert_eq!(summary.status, AttendanceStatus::Abnormal);
    }

    #[test]
    fn nine_of_ten_is_normal_and_displays_percent() {
        let summary = AttendanceSummary::from_counts(9, 10);
        assert_eq!(summary.status, AttendanceStatus::Normal);
        assert_eq!(summary.display(), "90% (9/10)");
    }
}
