//! Persistence contract for rules, predicates and occurrences.
//!
//! The engine holds no connection state of its own; every operation goes
//! through an injected [`OccurrenceStore`]. [`InMemoryStore`] is a complete
//! implementation suitable for tests, previews and embedding.

use std::collections::HashMap;
use std::ops::{Bound, RangeBounds};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::ids::{OccurrenceId, RuleId};
use crate::rule::{EventTypeRule, PredicateEntry};
use crate::time::{format_short_time, Derivation, ResolvedTime};

// ── Occurrences ─────────────────────────────────────────────────────────────

/// A materialized event on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: OccurrenceId,
    /// Owning rule; `None` for ad-hoc occurrences.
    pub rule_id: Option<RuleId>,
    pub date: NaiveDate,
    pub name: String,
    pub time: NaiveTime,
    /// The reference point and offset the time was derived from, if any.
    pub derivation: Option<Derivation>,
    /// The time is a fallback because its reference point did not resolve.
    #[serde(default)]
    pub needs_review: bool,
}

impl Occurrence {
    /// An occurrence produced by `rule` on `date`.
    pub fn materialized(rule: &EventTypeRule, date: NaiveDate, resolved: ResolvedTime) -> Self {
        Self {
            id: OccurrenceId::new(),
            rule_id: Some(rule.id),
            date,
            name: rule.name.clone(),
            time: resolved.time,
            derivation: rule.time.derivation(),
            needs_review: resolved.fallback,
        }
    }

    pub fn display_time(&self) -> String {
        format_short_time(self.time)
    }
}

/// Caller-supplied fields of an ad-hoc occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceDraft {
    pub name: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

// ── Date windows ────────────────────────────────────────────────────────────

/// A possibly open-ended range of dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: Bound<NaiveDate>,
    end: Bound<NaiveDate>,
}

impl DateWindow {
    pub fn all() -> Self {
        Self {
            start: Bound::Unbounded,
            end: Bound::Unbounded,
        }
    }

    /// Dates strictly after `date`.
    pub fn after(date: NaiveDate) -> Self {
        Self {
            start: Bound::Excluded(date),
            end: Bound::Unbounded,
        }
    }

    /// `(after, through]`
    pub fn after_through(after: NaiveDate, through: NaiveDate) -> Self {
        Self {
            start: Bound::Excluded(after),
            end: Bound::Included(through),
        }
    }

    /// `[start, end]`
    pub fn inclusive(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: Bound::Included(start),
            end: Bound::Included(end),
        }
    }

    pub fn includes(&self, date: NaiveDate) -> bool {
        self.contains(&date)
    }
}

impl RangeBounds<NaiveDate> for DateWindow {
    fn start_bound(&self) -> Bound<&NaiveDate> {
        self.start.as_ref()
    }

    fn end_bound(&self) -> Bound<&NaiveDate> {
        self.end.as_ref()
    }
}

// ── Store contract ──────────────────────────────────────────────────────────

/// Rule, predicate and occurrence persistence.
///
/// Reads must reflect prior writes made through the same store. Methods take
/// `&self` so one store can serve reconciliations of different rules from
/// several threads.
pub trait OccurrenceStore: Send + Sync {
    /// Insert a rule together with its predicates.
    fn insert_rule(&self, rule: &EventTypeRule) -> Result<()>;

    /// Load a rule with its predicates.
    fn rule(&self, id: RuleId) -> Result<Option<EventTypeRule>>;

    fn rules(&self) -> Result<Vec<EventTypeRule>>;

    /// Overwrite a rule's own fields (name, time, window, watermark); its
    /// predicates are left alone.
    fn update_rule(&self, rule: &EventTypeRule) -> Result<()>;

    fn set_watermark(&self, id: RuleId, watermark: Option<NaiveDate>) -> Result<()>;

    /// Remove the rule row only.
    fn delete_rule(&self, id: RuleId) -> Result<()>;

    fn replace_predicates(
        &self,
        id: RuleId,
        restrictions: &[PredicateEntry],
        exclusions: &[PredicateEntry],
    ) -> Result<()>;

    fn delete_predicates(&self, id: RuleId) -> Result<()>;

    fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<()>;

    fn occurrence(&self, id: OccurrenceId) -> Result<Option<Occurrence>>;

    fn update_occurrence(&self, occurrence: &Occurrence) -> Result<()>;

    fn delete_occurrence(&self, id: OccurrenceId) -> Result<()>;

    /// A rule's occurrences inside `window`, ordered by date then time.
    fn occurrences_for_rule(&self, rule: RuleId, window: DateWindow) -> Result<Vec<Occurrence>>;

    /// All occurrences inside `window`, ordered by date then time.
    fn occurrences_in(&self, window: DateWindow) -> Result<Vec<Occurrence>>;

    /// Delete a rule's occurrences inside `window`, returning how many were removed.
    fn delete_rule_occurrences(&self, rule: RuleId, window: DateWindow) -> Result<usize>;
}

// ── In-memory store ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Predicates {
    restrictions: Vec<PredicateEntry>,
    exclusions: Vec<PredicateEntry>,
}

#[derive(Debug, Default)]
struct Tables {
    rules: HashMap<RuleId, EventTypeRule>,
    predicates: HashMap<RuleId, Predicates>,
    occurrences: HashMap<OccurrenceId, Occurrence>,
}

impl Tables {
    fn joined_rule(&self, rule: &EventTypeRule) -> EventTypeRule {
        let mut rule = rule.clone();
        match self.predicates.get(&rule.id) {
            Some(predicates) => {
                rule.restrictions = predicates.restrictions.clone();
                rule.exclusions = predicates.exclusions.clone();
            }
            None => {
                rule.restrictions.clear();
                rule.exclusions.clear();
            }
        }
        rule
    }

    fn rule_mut(&mut self, id: RuleId) -> Result<&mut EventTypeRule> {
        self.rules.get_mut(&id).ok_or(EngineError::RuleNotFound(id))
    }
}

/// An [`OccurrenceStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| EngineError::Store("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| EngineError::Store("store lock poisoned".to_string()))
    }

    #[cfg(test)]
    pub(crate) fn has_predicates(&self, id: RuleId) -> bool {
        self.read().is_ok_and(|tables| tables.predicates.contains_key(&id))
    }
}

fn sorted(mut occurrences: Vec<Occurrence>) -> Vec<Occurrence> {
    occurrences.sort_by(|a, b| {
        (a.date, a.time, &a.name, a.id).cmp(&(b.date, b.time, &b.name, b.id))
    });
    occurrences
}

impl OccurrenceStore for InMemoryStore {
    fn insert_rule(&self, rule: &EventTypeRule) -> Result<()> {
        let mut tables = self.write()?;
        if tables.rules.contains_key(&rule.id) {
            return Err(EngineError::Store(format!("rule {} already exists", rule.id)));
        }
        tables.predicates.insert(
            rule.id,
            Predicates {
                restrictions: rule.restrictions.clone(),
                exclusions: rule.exclusions.clone(),
            },
        );
        tables.rules.insert(rule.id, rule.clone());
        Ok(())
    }

    fn rule(&self, id: RuleId) -> Result<Option<EventTypeRule>> {
        let tables = self.read()?;
        Ok(tables.rules.get(&id).map(|rule| tables.joined_rule(rule)))
    }

    fn rules(&self) -> Result<Vec<EventTypeRule>> {
        let tables = self.read()?;
        let mut rules: Vec<EventTypeRule> = tables
            .rules
            .values()
            .map(|rule| tables.joined_rule(rule))
            .collect();
        rules.sort_by(|a, b| (&a.name, a.id).cmp(&(&b.name, b.id)));
        Ok(rules)
    }

    fn update_rule(&self, rule: &EventTypeRule) -> Result<()> {
        let mut tables = self.write()?;
        let stored = tables.rule_mut(rule.id)?;
        stored.name = rule.name.clone();
        stored.time = rule.time;
        stored.valid_from = rule.valid_from;
        stored.valid_until = rule.valid_until;
        stored.watermark = rule.watermark;
        Ok(())
    }

    fn set_watermark(&self, id: RuleId, watermark: Option<NaiveDate>) -> Result<()> {
        self.write()?.rule_mut(id)?.watermark = watermark;
        Ok(())
    }

    fn delete_rule(&self, id: RuleId) -> Result<()> {
        self.write()?
            .rules
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::RuleNotFound(id))
    }

    fn replace_predicates(
        &self,
        id: RuleId,
        restrictions: &[PredicateEntry],
        exclusions: &[PredicateEntry],
    ) -> Result<()> {
        let mut tables = self.write()?;
        tables.rule_mut(id)?;
        tables.predicates.insert(
            id,
            Predicates {
                restrictions: restrictions.to_vec(),
                exclusions: exclusions.to_vec(),
            },
        );
        Ok(())
    }

    fn delete_predicates(&self, id: RuleId) -> Result<()> {
        self.write()?.predicates.remove(&id);
        Ok(())
    }

    fn insert_occurrences(&self, occurrences: &[Occurrence]) -> Result<()> {
        let mut tables = self.write()?;
        if let Some(dup) = occurrences
            .iter()
            .find(|o| tables.occurrences.contains_key(&o.id))
        {
            return Err(EngineError::Store(format!("occurrence {} already exists", dup.id)));
        }
        tables
            .occurrences
            .extend(occurrences.iter().map(|o| (o.id, o.clone())));
        Ok(())
    }

    fn occurrence(&self, id: OccurrenceId) -> Result<Option<Occurrence>> {
        Ok(self.read()?.occurrences.get(&id).cloned())
    }

    fn update_occurrence(&self, occurrence: &Occurrence) -> Result<()> {
        let mut tables = self.write()?;
        let stored = tables
            .occurrences
            .get_mut(&occurrence.id)
            .ok_or(EngineError::OccurrenceNotFound(occurrence.id))?;
        *stored = occurrence.clone();
        Ok(())
    }

    fn delete_occurrence(&self, id: OccurrenceId) -> Result<()> {
        self.write()?
            .occurrences
            .remove(&id)
            .map(|_| ())
            .ok_or(EngineError::OccurrenceNotFound(id))
    }

    fn occurrences_for_rule(&self, rule: RuleId, window: DateWindow) -> Result<Vec<Occurrence>> {
        let tables = self.read()?;
        Ok(sorted(
            tables
                .occurrences
                .values()
                .filter(|o| o.rule_id == Some(rule) && window.includes(o.date))
                .cloned()
                .collect(),
        ))
    }

    fn occurrences_in(&self, window: DateWindow) -> Result<Vec<Occurrence>> {
        let tables = self.read()?;
        Ok(sorted(
            tables
                .occurrences
                .values()
                .filter(|o| window.includes(o.date))
                .cloned()
                .collect(),
        ))
    }

    fn delete_rule_occurrences(&self, rule: RuleId, window: DateWindow) -> Result<usize> {
        let mut tables = self.write()?;
        let before = tables.occurrences.len();
        tables
            .occurrences
            .retain(|_, o| !(o.rule_id == Some(rule) && window.includes(o.date)));
        Ok(before - tables.occurrences.len())
    }
}
