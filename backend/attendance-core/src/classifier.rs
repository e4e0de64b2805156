// src/classifier.rs
//
// Per-cell attendance rules for schedule sheets. A cell holds free text such
// as "休", "A1" or "病假/公假"; these rules decide whether the day counted
// toward the expected total and whether it was attended.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// --- Default Exclusion Tokens ---

/// Day-off and not-employed markers. A cell made only of these does not
/// count toward the expected total.
pub const DEFAULT_RATE_DENOMINATOR_EXCLUSIONS: &[&str] = &[
    "休", "例", "例假", "休假", "例休", "國", "國定", "國定假日", "特休", "補休", "離", "離職",
    "未到職", "停職",
];

/// Leave types that still count as presence (official duty elsewhere).
pub const DEFAULT_ABSENCE_EXCLUSIONS: &[&str] = &["公假", "公出", "出差", "支援", "教育訓練", "訓練"];

static TOKEN_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[、，,;／/\r\n]+").expect("valid separator regex"));

static SHIFT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid shift code regex"));

/// Splits a cell into leave/shift tokens. Multiple codes can share one cell.
pub fn tokenize(cell: &str) -> Vec<String> {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    TOKEN_SEPARATORS
        .split(trimmed)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

// --- Exclusion Sets ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionSets {
    /// Tokens that remove a day from the expected total
    pub rate_denominator: HashSet<String>,
    /// Tokens that force a day to count as attended
    pub absence: HashSet<String>,
}

impl Default for ExclusionSets {
    fn default() -> Self {
        Self {
            rate_denominator: DEFAULT_RATE_DENOMINATOR_EXCLUSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            absence: DEFAULT_ABSENCE_EXCLUSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl ExclusionSets {
    /// Defaults plus caller-supplied additions.
    pub fn with_additions<I, J, S, T>(denominator_extra: I, absence_extra: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let mut sets = Self::default();
        sets.rate_denominator
            .extend(denominator_extra.into_iter().map(Into::into));
        sets.absence.extend(absence_extra.into_iter().map(Into::into));
        sets
    }

    // --- Cell Rules ---

    /// Empty cells are expected workdays. A non-empty cell is excluded only
    /// when every token is a day-off token.
    pub fn should_attend(&self, cell: &str) -> bool {
        let tokens = tokenize(cell);
        tokens.is_empty() || tokens.iter().any(|t| !self.rate_denominator.contains(t))
    }

    /// Presence implied by the cell text alone: an absence-exclusion token,
    /// or a single ASCII shift code such as "A1".
    pub fn auto_attend(&self, cell: &str) -> bool {
        let tokens = tokenize(cell);
        if tokens.iter().any(|t| self.absence.contains(t)) {
            return true;
        }
        matches!(tokens.as_slice(), [only] if SHIFT_CODE.is_match(only))
    }

    /// Auto-attend, otherwise the backend flag for this column. A missing or
    /// empty flag array means not attended.
    pub fn actually_attended(&self, cell: &str, att: Option<&[bool]>, column: usize) -> bool {
        if self.auto_attend(cell) {
            return true;
        }
        match att {
            Some(flags) if !flags.is_empty() => flags.get(column).copied().unwrap_or(false),
            _ => false,
        }
    }

    pub fn classify(&self, cell: &str, att: Option<&[bool]>, column: usize) -> CellClass {
        if !self.should_attend(cell) {
            return CellClass::Excluded;
        }
        if self.actually_attended(cell, att, column) {
            CellClass::Attended
        } else {
            CellClass::Missed
        }
    }
}

/// Outcome of one date cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellClass {
    /// Not an expected workday
    Excluded,
    Attended,
    Missed,
}

impl CellClass {
    pub fn is_expected(self) -> bool {
        !matches!(self, CellClass::Excluded)
    }

    pub fn is_attended(self) -> bool {
        matches!(self, CellClass::Attended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_all_separators() {
        assert_eq!(tokenize(" 病假、公假，A1,B2;事假／休/補休\n特休 "), vec![
            "病假", "公假", "A1", "B2", "事假", "休", "補休", "特休"
        ]);
        assert!(tokenize("   ").is_empty());
        assert_eq!(tokenize("休//"), vec!["休"]);
    }

    #[test]
    fn with_additions_extends_defaults() {
        let sets = ExclusionSets::with_additions(["颱風假"], ["外訓"]);
        assert!(sets.rate_denominator.contains("颱風假"));
        assert!(sets.rate_denominator.contains("休"));
        assert!(sets.absence.contains("外訓"));
        assert!(!sets.should_attend("颱風假"));
        assert!(sets.auto_attend("外訓"));
    }

    #[test]
    fn classify_combines_rules() {
        let sets = ExclusionSets::default();
        assert_eq!(sets.classify("休", Some(&[true]), 0), CellClass::Excluded);
        assert_eq!(sets.classify("A1", None, 0), CellClass::Attended);
        assert_eq!(sets.classify("", Some(&[false]), 0), CellClass::Missed);
        assert_eq!(sets.classify("", Some(&[true]), 0), CellClass::Attended);
    }
}
