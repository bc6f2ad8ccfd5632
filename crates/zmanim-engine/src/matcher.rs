//! Rule applicability: does a rule produce an occurrence on a given date?
//!
//! Evaluation order:
//!
//! 1. The date must fall inside the rule's validity window. The window's end
//!    is `valid_until` plus one day.
//! 2. Every restriction entry must have at least one tag present.
//! 3. If exclusions are defined, [`exclusion_admits`] decides.
//! 4. Otherwise the rule applies.
//!
//! The day-of-week is always one of the date's tags, so weekday-only rules
//! need no separate code path.

use chrono::NaiveDate;

use crate::daytype::DayTagSet;
use crate::rule::{EventTypeRule, PredicateEntry};

/// Whether `rule` produces an occurrence on `date`, whose tags are `tags`.
pub fn applies(date: NaiveDate, tags: &DayTagSet, rule: &EventTypeRule) -> bool {
    if !within_validity(date, rule) {
        return false;
    }
    if !rule
        .restrictions
        .iter()
        .all(|entry| entry.is_satisfied_by(tags))
    {
        return false;
    }
    if !rule.exclusions.is_empty() {
        return exclusion_admits(tags, &rule.exclusions);
    }
    true
}

fn within_validity(date: NaiveDate, rule: &EventTypeRule) -> bool {
    if date < rule.valid_from {
        return false;
    }
    match rule.valid_until {
        Some(until) => date <= until.succ_opt().unwrap_or(until),
        None => true,
    }
}

/// Exclusion policy, kept exactly as the legacy scheduler evaluated it.
///
/// Entries are visited in order; the first entry with none of its tags
/// present admits the date immediately. If every entry has a tag present the
/// date is rejected. This is not "excluded when an entry matches": a rule
/// excluding `{YomTov}` and `{Taanis}` still runs on a Yom Tov, because the
/// `{Taanis}` entry is absent.
pub fn exclusion_admits(tags: &DayTagSet, exclusions: &[PredicateEntry]) -> bool {
    for entry in exclusions {
        if !entry.is_satisfied_by(tags) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daytype::DayTag;
    use crate::ids::RuleId;
    use crate::rule::RuleDraft;
    use chrono::NaiveTime;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tag_set(list: &[DayTag]) -> DayTagSet {
        list.iter().copied().collect()
    }

    fn rule(draft: RuleDraft) -> EventTypeRule {
        EventTypeRule::from_draft(RuleId::new(), draft, date(2024, 1, 1)).unwrap()
    }

    fn draft() -> RuleDraft {
        RuleDraft::fixed("Shacharis", NaiveTime::from_hms_opt(6, 30, 0).unwrap())
    }

    #[test]
    fn test_no_predicates_applies_every_day_in_window() {
        let r = rule(draft());
        for d in date(2024, 1, 1).iter_days().take(14) {
            assert!(applies(d, &DayTagSet::for_weekday(d), &r));
        }
    }

    #[test]
    fn test_before_valid_from_does_not_apply() {
        let r = rule(draft().valid_from(date(2024, 2, 1)));
        let d = date(2024, 1, 31);
        assert!(!applies(d, &DayTagSet::for_weekday(d), &r));
    }

    #[test]
    fn test_window_end_includes_day_after_valid_until() {
        let r = rule(draft().valid_until(date(2024, 3, 10)));
        for (d, expected) in [
            (date(2024, 3, 10), true),
            (date(2024, 3, 11), true),
            (date(2024, 3, 12), false),
        ] {
            assert_eq!(applies(d, &DayTagSet::for_weekday(d), &r), expected, "{d}");
        }
    }

    #[test]
    fn test_restrictions_are_conjunction_of_disjunctions() {
        let r = rule(draft().restrict(&["Monday", "Tuesday"]).restrict(&["RoshChodesh"]));
        let d = date(2024, 1, 1);
        assert!(applies(d, &tag_set(&[DayTag::Monday, DayTag::RoshChodesh]), &r));
        assert!(applies(d, &tag_set(&[DayTag::Tuesday, DayTag::RoshChodesh]), &r));
        assert!(!applies(d, &tag_set(&[DayTag::Wednesday, DayTag::RoshChodesh]), &r));
        assert!(!applies(d, &tag_set(&[DayTag::Monday]), &r));
    }

    #[test]
    fn test_weekday_restriction_without_feed_tags() {
        let r = rule(draft().restrict(&["Saturday"]));
        let saturday = date(2024, 1, 6);
        let sunday = date(2024, 1, 7);
        assert!(applies(saturday, &DayTagSet::for_weekday(saturday), &r));
        assert!(!applies(sunday, &DayTagSet::for_weekday(sunday), &r));
    }

    // These pin the legacy exclusion semantics described on `exclusion_admits`.

    #[test]
    fn test_legacy_exclusion_single_entry_rejects_when_present() {
        let r = rule(draft().exclude(&["YomTov"]));
        let d = date(2024, 4, 23);
        assert!(!applies(d, &tag_set(&[DayTag::Tuesday, DayTag::YomTov]), &r));
        assert!(applies(d, &tag_set(&[DayTag::Tuesday]), &r));
    }

    #[test]
    fn test_legacy_exclusion_admits_if_any_entry_absent() {
        let r = rule(draft().exclude(&["YomTov"]).exclude(&["Taanis"]));
        let d = date(2024, 4, 23);
        assert!(applies(d, &tag_set(&[DayTag::Tuesday, DayTag::YomTov]), &r));
        assert!(!applies(d, &tag_set(&[DayTag::YomTov, DayTag::Taanis]), &r));
    }

    #[test]
    fn test_legacy_exclusion_runs_after_restrictions_pass() {
        let r = rule(draft().restrict(&["Monday"]).exclude(&["RoshChodesh"]));
        let d = date(2024, 1, 1);
        assert!(!applies(d, &tag_set(&[DayTag::Monday, DayTag::RoshChodesh]), &r));
        assert!(applies(d, &tag_set(&[DayTag::Monday]), &r));
        assert!(!applies(d, &tag_set(&[DayTag::Tuesday]), &r));
    }

    #[test]
    fn test_exclusion_admits_with_no_entries_is_false() {
        assert!(!exclusion_admits(&tag_set(&[DayTag::Monday]), &[]));
    }
}
