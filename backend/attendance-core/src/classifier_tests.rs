// src/classifier_tests.rs

#[cfg(test)]
mod tests {
    use crate::classifier::*;

    #[test]
    fn test_day_off_cell_is_not_expected() {
        let sets = ExclusionSets::default();
        assert!(!sets.should_attend("休"), "A pure day-off cell should not be expected");
        assert!(!sets.should_attend("例假"));
        assert!(!sets.should_attend("離"));
        assert!(!sets.should_attend(" 休、特休 "), "Every token is a day-off token");
    }

    #[test]
    fn test_mixed_tokens_are_expected() {
        let sets = ExclusionSets::default();
        // 加班 is not a day-off token, so the day still counts
        assert!(sets.should_attend("休/加班"));
        assert!(sets.should_attend("病假"));
    }

    #[test]
    fn test_empty_cell_is_expected() {
        let sets = ExclusionSets::default();
        assert!(sets.should_attend(""));
        assert!(sets.should_attend("   "));
    }

    #[test]
    fn test_alnum_shift_code_auto_attends() {
        let sets = ExclusionSets::default();
        assert!(sets.auto_attend("A1"));
        assert!(sets.actually_attended("A1", Some(&[false, false]), 1));
        assert!(sets.actually_attended("A1", None, 0));
    }

    #[test]
    fn test_non_alnum_or_multi_token_codes_do_not_auto_attend() {
        let sets = ExclusionSets::default();
        assert!(!sets.auto_attend("9:00-18:00"));
        assert!(!sets.auto_attend("A1/B2"), "Only a single token counts as a shift code");
        assert!(!sets.auto_attend("早班"));
        assert!(!sets.auto_attend(""));
    }

    #[test]
    fn test_absence_exclusion_token_forces_attended() {
        let sets = ExclusionSets::default();
        assert!(sets.auto_attend("公假"));
        assert!(sets.auto_attend("病假、出差"));
        assert!(sets.actually_attended("出差", Some(&[false]), 0));
    }

    #[test]
    fn test_falls_back_to_backend_flag() {
        let sets = ExclusionSets::default();
        let cell = "9:00-18:00";
        assert!(sets.actually_attended(cell, Some(&[false, true]), 1));
        assert!(!sets.actually_attended(cell, Some(&[true, false]), 1));
        assert!(!sets.actually_attended(cell, None, 1));
        // Empty flag array is treated like a missing one
        assert!(!sets.actually_attended(cell, Some(&[]), 0));
        // Column beyond the flag array
        assert!(!sets.actually_attended(cell, Some(&[true]), 4));
    }
}
