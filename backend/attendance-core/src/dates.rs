// src/dates.rs
//
// Date-column resolution, free-text date parsing and the label ordering used
// everywhere a list of dates or tags is sorted.

use chrono::{Datelike, Local, NaiveDate};
use icu_collator::{Collator, CollatorOptions, Numeric};
use icu_locid::Locale;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid ISO date regex"));

pub fn is_iso_date(text: &str) -> bool {
    ISO_DATE.is_match(text.trim())
}

// --- Date Columns ---

/// One column that represents a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateColumn {
    pub index: usize,
    /// Raw header text
    pub label: String,
    pub iso: Option<String>,
}

impl DateColumn {
    /// Identity used to deduplicate the same day across several rows:
    /// ISO date, else header text, else the column index.
    pub fn identity(&self) -> String {
        if let Some(iso) = self.iso.as_deref().filter(|s| !s.is_empty()) {
            return iso.to_string();
        }
        let label = self.label.trim();
        if !label.is_empty() {
            return label.to_string();
        }
        self.index.to_string()
    }

    /// `M/D` rendering of the ISO date, else the raw header.
    pub fn display_label(&self) -> String {
        self.iso
            .as_deref()
            .and_then(|iso| NaiveDate::parse_from_str(iso, "%Y-%m-%d").ok())
            .map(|d| format!("{}/{}", d.month(), d.day()))
            .unwrap_or_else(|| self.label.trim().to_string())
    }

    /// True when `key` names this column by identity, ISO date or label.
    pub fn matches(&self, key: &str) -> bool {
        let key = key.trim();
        !key.is_empty()
            && (self.identity() == key
                || self.iso.as_deref() == Some(key)
                || self.label.trim() == key
                || self.display_label() == key)
    }
}

/// Validated set of date columns carried alongside the headers. Built once per
/// payload; nothing else re-derives which columns are dates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateColumns {
    columns: Vec<DateColumn>,
}

impl DateColumns {
    /// Uses `explicit` when supplied, otherwise infers from `headers_iso`.
    /// Out-of-range indices, duplicates and columns whose header is blank are
    /// dropped.
    pub fn resolve(
        headers: &[String],
        headers_iso: Option<&[String]>,
        explicit: Option<&[usize]>,
    ) -> Self {
        let candidates: Vec<usize> = match explicit {
            Some(cols) => cols.to_vec(),
            None => {
                let inferred = infer_date_columns(headers_iso.unwrap_or(&[]));
                debug!("Inferred {} date columns from ISO headers", inferred.len());
                inferred
            }
        };

        let mut columns: Vec<DateColumn> = Vec::with_capacity(candidates.len());
        for index in candidates {
            let Some(label) = headers.get(index) else {
                continue;
            };
            if label.trim().is_empty() || columns.iter().any(|c| c.index == index) {
                continue;
            }
            let iso = headers_iso
                .and_then(|iso| iso.get(index))
                .map(|s| s.trim().to_string())
                .filter(|s| is_iso_date(s));
            columns.push(DateColumn {
                index,
                label: label.clone(),
                iso,
            });
        }
        Self { columns }
    }

    pub fn from_columns(columns: Vec<DateColumn>) -> Self {
        Self { columns }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DateColumn> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.columns.iter().any(|c| c.index == index)
    }

    pub fn find(&self, key: &str) -> Option<&DateColumn> {
        self.columns.iter().find(|c| c.matches(key))
    }

    /// Columns ordered by ISO date, then by label.
    pub fn sorted(&self) -> Vec<DateColumn> {
        let mut sorted = self.columns.clone();
        sorted.sort_by(compare_date_columns);
        sorted
    }

    /// Sorted prefix ending at (and including) the column matching `end`.
    pub fn prefix_through(&self, end: &str) -> Option<DateColumns> {
        let sorted = self.sorted();
        let stop = sorted.iter().position(|c| c.matches(end))?;
        Some(Self::from_columns(sorted.into_iter().take(stop + 1).collect()))
    }

    /// Just the column matching `day`.
    pub fn single(&self, day: &str) -> Option<DateColumns> {
        self.find(day).map(|c| Self::from_columns(vec![c.clone()]))
    }
}

/// Indices whose ISO header looks like `YYYY-MM-DD`.
pub fn infer_date_columns(headers_iso: &[String]) -> Vec<usize> {
    headers_iso
        .iter()
        .enumerate()
        .filter(|(_, iso)| is_iso_date(iso))
        .map(|(i, _)| i)
        .collect()
}

pub fn compare_date_columns(a: &DateColumn, b: &DateColumn) -> Ordering {
    let a_iso = a.iso.as_deref().unwrap_or("");
    let b_iso = b.iso.as_deref().unwrap_or("");
    a_iso
        .cmp(b_iso)
        .then_with(|| natural_compare(&a.label, &b.label))
}

// --- Free-text Date Parsing ---

type DateMatcher = fn(&Captures<'_>, i32) -> Option<NaiveDate>;

static DATE_PATTERNS: Lazy<Vec<(Regex, DateMatcher)>> = Lazy::new(|| {
    vec![
        // 2025/3/5, 2025-03-05, 2025.3.5
        (
            Regex::new(r"^(\d{4})[/\-.](\d{1,2})[/\-.](\d{1,2})").expect("valid ymd regex"),
            match_year_month_day as DateMatcher,
        ),
        // 3/5 in the default year
        (
            Regex::new(r"^(\d{1,2})[/\-](\d{1,2})$").expect("valid md regex"),
            match_month_day as DateMatcher,
        ),
        // 2025年3月5日
        (
            Regex::new(r"^(\d{4})年(\d{1,2})月(\d{1,2})日?").expect("valid cjk ymd regex"),
            match_year_month_day as DateMatcher,
        ),
        // 3月5日
        (
            Regex::new(r"^(\d{1,2})月(\d{1,2})日?").expect("valid cjk md regex"),
            match_month_day as DateMatcher,
        ),
    ]
});

fn capture_number<T: std::str::FromStr>(caps: &Captures<'_>, group: usize) -> Option<T> {
    caps.get(group)?.as_str().parse().ok()
}

fn match_year_month_day(caps: &Captures<'_>, _default_year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        capture_number(caps, 1)?,
        capture_number(caps, 2)?,
        capture_number(caps, 3)?,
    )
}

fn match_month_day(caps: &Captures<'_>, default_year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(default_year, capture_number(caps, 1)?, capture_number(caps, 2)?)
}

/// Tries each known pattern in order; first match wins. Month/day forms
/// without a year use `default_year`.
pub fn parse_sheet_date(text: &str, default_year: i32) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATE_PATTERNS.iter().find_map(|(pattern, matcher)| {
        pattern
            .captures(text)
            .and_then(|caps| matcher(&caps, default_year))
    })
}

/// ISO rendering of a free-text date, or the trimmed raw text when no pattern
/// matches.
pub fn iso_or_raw(text: &str, default_year: i32) -> String {
    parse_sheet_date(text, default_year)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| text.trim().to_string())
}

pub fn current_year() -> i32 {
    Local::now().year()
}

// --- Label Ordering ---

// Traditional Chinese sheets, so stroke order rather than pinyin
const LABEL_LOCALE: &str = "zh-u-co-stroke";

thread_local! {
    static LABEL_COLLATOR: Option<Collator> = build_label_collator();
}

fn build_label_collator() -> Option<Collator> {
    let locale: Locale = match LABEL_LOCALE.parse() {
        Ok(locale) => locale,
        Err(e) => {
            warn!("Invalid collation locale {}: {}", LABEL_LOCALE, e);
            return None;
        }
    };
    let mut options = CollatorOptions::new();
    options.numeric = Some(Numeric::On);
    match Collator::try_new(&(&locale).into(), options) {
        Ok(collator) => Some(collator),
        Err(e) => {
            warn!("Falling back to code point label ordering: {}", e);
            None
        }
    }
}

/// Ordering for sheet labels and leave tags: Chinese stroke-order collation
/// with digit runs compared by numeric value. Ties (and a missing collator)
/// fall back to `code_point_compare` so the order stays total.
pub fn natural_compare(a: &str, b: &str) -> Ordering {
    LABEL_COLLATOR.with(|collator| match collator {
        Some(collator) => collator
            .compare(a, b)
            .then_with(|| code_point_compare(a, b)),
        None => code_point_compare(a, b),
    })
}

/// Digit runs by value, everything else by lower-cased code point.
fn code_point_compare(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek().copied(), b_chars.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let na = take_digits(&mut a_chars);
                let nb = take_digits(&mut b_chars);
                let ord = compare_digit_runs(&na, &nb);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca
                    .to_lowercase()
                    .cmp(cb.to_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                a_chars.next();
                b_chars.next();
            }
        }
    }
}

fn take_digits<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}
