//! Event-type rules: the recurrence definitions occurrences are materialized from.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::astronomy::ReferencePoint;
use crate::daytype::{DayTag, DayTagSet};
use crate::error::{EngineError, Result};
use crate::ids::RuleId;
use crate::time::TimeSpec;

// ── Predicates ──────────────────────────────────────────────────────────────

/// One restriction or exclusion entry: satisfied when any of its tags is present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredicateEntry(BTreeSet<DayTag>);

impl PredicateEntry {
    /// Parse free-text terms into a tag set.
    ///
    /// A tag belongs to the entry if its name occurs as a substring of any
    /// term, so both `["Monday", "Tuesday"]` and `["Monday,Tuesday"]` yield
    /// the same entry.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidPredicate`] if no term names a known tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use zmanim_engine::{DayTag, PredicateEntry};
    ///
    /// let entry = PredicateEntry::parse(&["Monday,Thursday"]).unwrap();
    /// assert!(entry.tags().any(|t| t == DayTag::Thursday));
    /// assert!(PredicateEntry::parse(&["", "  "]).is_err());
    /// ```
    pub fn parse<S: AsRef<str>>(terms: &[S]) -> Result<Self> {
        let tags: BTreeSet<DayTag> = terms
            .iter()
            .flat_map(|term| DayTag::mentioned_in(term.as_ref()))
            .collect();
        if tags.is_empty() {
            let joined: Vec<&str> = terms.iter().map(AsRef::as_ref).collect();
            return Err(EngineError::InvalidPredicate(format!(
                "no known day type in {:?}",
                joined
            )));
        }
        Ok(Self(tags))
    }

    /// Build an entry from explicit tags.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidPredicate`] if `tags` is empty.
    pub fn from_tags(tags: impl IntoIterator<Item = DayTag>) -> Result<Self> {
        let tags: BTreeSet<DayTag> = tags.into_iter().collect();
        if tags.is_empty() {
            return Err(EngineError::InvalidPredicate("empty entry".to_string()));
        }
        Ok(Self(tags))
    }

    pub fn tags(&self) -> impl Iterator<Item = DayTag> + '_ {
        self.0.iter().copied()
    }

    /// Whether at least one of this entry's tags is in `tags`.
    pub fn is_satisfied_by(&self, tags: &DayTagSet) -> bool {
        self.0.iter().any(|tag| tags.contains(*tag))
    }
}

/// Parse raw entries, dropping the ones that name no known tag.
pub fn parse_entries(raw: &[Vec<String>], kind: &str) -> Vec<PredicateEntry> {
    raw.iter()
        .filter_map(|terms| match PredicateEntry::parse(terms) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(kind, "dropping {kind} entry: {err}");
                None
            }
        })
        .collect()
}

// ── Rules ───────────────────────────────────────────────────────────────────

/// The authoring input for a rule, as submitted by a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub name: String,
    pub time: TimeSpec,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_until: Option<NaiveDate>,
    /// Each entry is a list of free-text terms naming day types.
    #[serde(default)]
    pub restrictions: Vec<Vec<String>>,
    #[serde(default)]
    pub exclusions: Vec<Vec<String>>,
}

impl RuleDraft {
    pub fn new(name: impl Into<String>, time: TimeSpec) -> Self {
        Self {
            name: name.into(),
            time,
            valid_from: None,
            valid_until: None,
            restrictions: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn fixed(name: impl Into<String>, time: NaiveTime) -> Self {
        Self::new(name, TimeSpec::Fixed(time))
    }

    pub fn derived(name: impl Into<String>, reference: ReferencePoint, offset_minutes: i32) -> Self {
        Self::new(name, TimeSpec::derived(reference, offset_minutes))
    }

    /// Every day at sunset.
    pub fn daily_sunset(name: impl Into<String>) -> Self {
        Self::derived(name, ReferencePoint::Sunset, 0)
    }

    pub fn valid_from(mut self, date: NaiveDate) -> Self {
        self.valid_from = Some(date);
        self
    }

    pub fn valid_until(mut self, date: NaiveDate) -> Self {
        self.valid_until = Some(date);
        self
    }

    pub fn restrict(mut self, terms: &[&str]) -> Self {
        self.restrictions
            .push(terms.iter().map(|t| t.to_string()).collect());
        self
    }

    pub fn exclude(mut self, terms: &[&str]) -> Self {
        self.exclusions
            .push(terms.iter().map(|t| t.to_string()).collect());
        self
    }
}

/// A stored recurrence definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTypeRule {
    pub id: RuleId,
    pub name: String,
    pub time: TimeSpec,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    /// Last date through which occurrences are fully materialized.
    pub watermark: Option<NaiveDate>,
    pub restrictions: Vec<PredicateEntry>,
    pub exclusions: Vec<PredicateEntry>,
}

impl EventTypeRule {
    /// Build a rule from a draft. `valid_from` defaults to `today` and is
    /// never earlier than it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRange`] if the draft's `valid_until` is
    /// before its own `valid_from`. An end date before `today` is accepted.
    pub fn from_draft(id: RuleId, draft: RuleDraft, today: NaiveDate) -> Result<Self> {
        let mut rule = Self {
            id,
            name: String::new(),
            time: draft.time,
            valid_from: today,
            valid_until: None,
            watermark: None,
            restrictions: Vec::new(),
            exclusions: Vec::new(),
        };
        rule.apply(draft, today)?;
        Ok(rule)
    }

    /// A copy of this rule with the draft's definition applied; id and
    /// watermark are kept.
    pub fn revised(&self, draft: RuleDraft, today: NaiveDate) -> Result<Self> {
        let mut rule = self.clone();
        rule.apply(draft, today)?;
        Ok(rule)
    }

    fn apply(&mut self, draft: RuleDraft, today: NaiveDate) -> Result<()> {
        // Compared with the requested start, before it is moved up to `today`.
        if let (Some(from), Some(until)) = (draft.valid_from, draft.valid_until) {
            if until < from {
                return Err(EngineError::InvalidRange(format!(
                    "rule '{}' ends {until}, before it starts {from}",
                    draft.name
                )));
            }
        }
        let valid_from = draft.valid_from.map_or(today, |from| from.max(today));
        self.restrictions = parse_entries(&draft.restrictions, "restriction");
        self.exclusions = parse_entries(&draft.exclusions, "exclusion");
        self.name = draft.name;
        self.time = draft.time;
        self.valid_from = valid_from;
        self.valid_until = draft.valid_until;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_entry_from_separate_terms() {
        let entry = PredicateEntry::parse(&["Monday", "Tuesday"]).unwrap();
        assert_eq!(entry.tags().collect::<Vec<_>>(), vec![DayTag::Monday, DayTag::Tuesday]);
    }

    #[test]
    fn test_parse_entry_ignores_unknown_words() {
        let entry = PredicateEntry::parse(&["only on RoshChodesh please"]).unwrap();
        assert_eq!(entry.tags().collect::<Vec<_>>(), vec![DayTag::RoshChodesh]);
    }

    #[test]
    fn test_parse_entry_rejects_nothing_known() {
        let err = PredicateEntry::parse(&["Purim"]).unwrap_err();
        assert!(err.to_string().contains("Invalid predicate"), "got: {err}");
        assert!(PredicateEntry::parse::<&str>(&[]).is_err());
    }

    #[test]
    fn test_from_tags_rejects_empty() {
        assert!(PredicateEntry::from_tags([]).is_err());
        assert!(PredicateEntry::from_tags([DayTag::Taanis]).is_ok());
    }

    #[test]
    fn test_invalid_entries_are_dropped_at_write_time() {
        let draft = RuleDraft::fixed("Shacharis", NaiveTime::from_hms_opt(6, 0, 0).unwrap())
            .restrict(&[""])
            .restrict(&["Monday", "Thursday"])
            .exclude(&["nonsense"]);
        let rule = EventTypeRule::from_draft(RuleId::new(), draft, date(2024, 1, 1)).unwrap();
        assert_eq!(rule.restrictions.len(), 1);
        assert!(rule.exclusions.is_empty());
    }

    #[test]
    fn test_valid_from_defaults_to_today_and_is_never_backdated() {
        let time = NaiveTime::from_hms_opt(6, 0, 0).unwrap();
        let today = date(2024, 5, 1);

        let rule = EventTypeRule::from_draft(RuleId::new(), RuleDraft::fixed("a", time), today)
            .unwrap();
        assert_eq!(rule.valid_from, today);

        let past = RuleDraft::fixed("b", time).valid_from(date(2023, 1, 1));
        let rule = EventTypeRule::from_draft(RuleId::new(), past, today).unwrap();
        assert_eq!(rule.valid_from, today);

        let future = RuleDraft::fixed("c", time).valid_from(date(2024, 6, 1));
        let rule = EventTypeRule::from_draft(RuleId::new(), future, today).unwrap();
        assert_eq!(rule.valid_from, date(2024, 6, 1));
    }

    #[test]
    fn test_window_ending_before_start_is_rejected() {
        let draft = RuleDraft::daily_sunset("Shkia")
            .valid_from(date(2024, 6, 1))
            .valid_until(date(2024, 5, 1));
        let err = EventTypeRule::from_draft(RuleId::new(), draft, date(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRange(_)));
    }

    #[test]
    fn test_window_ending_before_today_is_accepted() {
        let today = date(2024, 1, 11);
        let draft = RuleDraft::daily_sunset("Shkia").valid_until(date(2024, 1, 10));
        let rule = EventTypeRule::from_draft(RuleId::new(), draft, today).unwrap();
        assert_eq!(rule.valid_from, today);
        assert_eq!(rule.valid_until, Some(date(2024, 1, 10)));

        let draft = RuleDraft::daily_sunset("Shkia")
            .valid_from(date(2024, 1, 1))
            .valid_until(date(2024, 1, 5));
        let revised = rule.revised(draft, today).unwrap();
        assert_eq!(revised.valid_from, today);
    }

    #[test]
    fn test_revised_keeps_identity_and_watermark() {
        let today = date(2024, 1, 1);
        let mut rule =
            EventTypeRule::from_draft(RuleId::new(), RuleDraft::daily_sunset("Shkia"), today)
                .unwrap();
        rule.watermark = Some(date(2024, 3, 1));
        let revised = rule
            .revised(RuleDraft::derived("Mincha", ReferencePoint::Sunset, -15), today)
            .unwrap();
        assert_eq!(revised.id, rule.id);
        assert_eq!(revised.watermark, rule.watermark);
        assert_eq!(revised.name, "Mincha");
    }

    #[test]
    fn test_draft_deserializes_with_defaults() {
        let draft: RuleDraft = serde_json::from_str(
            r#"{"name": "Maariv", "time": {"derived": {"reference": "tzais"}},
                "restrictions": [["Sunday,Monday,Tuesday,Wednesday,Thursday"]]}"#,
        )
        .unwrap();
        assert_eq!(draft.time, TimeSpec::derived(ReferencePoint::Tzais, 0));
        assert!(draft.exclusions.is_empty());
        assert!(draft.valid_from.is_none());
    }
}
