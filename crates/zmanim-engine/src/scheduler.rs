//! Watermark-based materialization of rule occurrences.
//!
//! Each rule carries a watermark: the last date through which its
//! occurrences are known to be complete. [`PopulationScheduler::ensure_up_to_date`]
//! moves the watermark to a requested horizon, deleting occurrences past it
//! (shrink) or classifying, matching and inserting the dates up to it (grow).
//! The watermark is always written last, so a failed pass leaves the rule
//! under-populated and the same call can simply be repeated.
//!
//! Reconciliations of different rules share nothing but the classifier's
//! year cache and may run on separate threads.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, info};

use crate::astronomy::{AstronomicalProvider, NoaaCalculator};
use crate::config::EngineConfig;
use crate::daytype::{DayTypeClassifier, DayTypeFeed};
use crate::error::{EngineError, Result};
use crate::ids::{OccurrenceId, RuleId};
use crate::matcher::applies;
use crate::rule::{EventTypeRule, RuleDraft};
use crate::store::{DateWindow, Occurrence, OccurrenceDraft, OccurrenceStore};
use crate::time::{TimeResolver, TimeSpec};

/// What one reconciliation changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub rule_id: RuleId,
    pub inserted: usize,
    pub deleted: usize,
    /// Inserted occurrences whose time fell back to midnight.
    pub degraded: usize,
    pub watermark: Option<NaiveDate>,
    /// The rule already covered the requested span; nothing was touched.
    pub skipped: bool,
}

impl Reconciliation {
    fn unchanged(rule: &EventTypeRule) -> Self {
        Self {
            rule_id: rule.id,
            inserted: 0,
            deleted: 0,
            degraded: 0,
            watermark: rule.watermark,
            skipped: true,
        }
    }
}

/// Materializes rules into an [`OccurrenceStore`].
///
/// `F` supplies day types, `A` the astronomical reference times for the
/// resolver's location, and `S` persists rules and occurrences. Every
/// operation takes `today` explicitly so passes are reproducible.
pub struct PopulationScheduler<F, A, S> {
    classifier: DayTypeClassifier<F>,
    resolver: TimeResolver<A>,
    store: S,
    default_horizon_days: u32,
}

impl<F, S> PopulationScheduler<F, NoaaCalculator, S>
where
    F: DayTypeFeed,
    S: OccurrenceStore,
{
    /// Build a scheduler for the configured location using the bundled
    /// NOAA calculator.
    ///
    /// # Errors
    ///
    /// Returns the location's validation error if the configured location is
    /// invalid.
    pub fn from_config(config: &EngineConfig, feed: F, store: S) -> Result<Self> {
        let classifier = if config.feed.cache_years {
            DayTypeClassifier::new(feed)
        } else {
            DayTypeClassifier::uncached(feed)
        };
        let resolver = TimeResolver::new(NoaaCalculator::new(), config.location()?);
        Ok(Self::new(classifier, resolver, store)
            .with_default_horizon_days(config.population.default_horizon_days))
    }
}

impl<F, A, S> PopulationScheduler<F, A, S>
where
    F: DayTypeFeed,
    A: AstronomicalProvider,
    S: OccurrenceStore,
{
    /// Create a scheduler with a default horizon of 30 days.
    pub fn new(classifier: DayTypeClassifier<F>, resolver: TimeResolver<A>, store: S) -> Self {
        Self {
            classifier,
            resolver,
            store,
            default_horizon_days: 30,
        }
    }

    /// Horizon used by [`create_rule`](Self::create_rule) when the caller
    /// gives none, in days after `today`.
    pub fn with_default_horizon_days(mut self, days: u32) -> Self {
        self.default_horizon_days = days;
        self
    }

    /// The backing store, for reads and direct maintenance.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The day-type classifier; call `invalidate` on it after a feed changes.
    pub fn classifier(&self) -> &DayTypeClassifier<F> {
        &self.classifier
    }

    /// The time resolver for this scheduler's location.
    pub fn resolver(&self) -> &TimeResolver<A> {
        &self.resolver
    }

    fn load_rule(&self, id: RuleId) -> Result<EventTypeRule> {
        self.store.rule(id)?.ok_or(EngineError::RuleNotFound(id))
    }

    // ── Reconciliation ──────────────────────────────────────────────────────

    /// Bring a rule's occurrences in line with `horizon` and set its
    /// watermark to `horizon`.
    ///
    /// With a watermark past `horizon`, occurrences in `(horizon, watermark]`
    /// are deleted. Otherwise the dates in `(watermark, horizon]` are
    /// materialized, or `[today, horizon]` for a rule with no watermark.
    ///
    /// # Errors
    ///
    /// [`EngineError::RuleNotFound`] for an unknown id;
    /// [`EngineError::FeedUnavailable`] if classification fails, in which
    /// case the watermark is left as it was.
    pub fn ensure_up_to_date(
        &self,
        rule_id: RuleId,
        horizon: NaiveDate,
        today: NaiveDate,
    ) -> Result<Reconciliation> {
        let rule = self.load_rule(rule_id)?;
        let mut report = Reconciliation {
            rule_id,
            inserted: 0,
            deleted: 0,
            degraded: 0,
            watermark: Some(horizon),
            skipped: false,
        };

        match rule.watermark {
            Some(watermark) if watermark > horizon => {
                report.deleted = self
                    .store
                    .delete_rule_occurrences(rule_id, DateWindow::after_through(horizon, watermark))?;
            }
            watermark => {
                let start = match watermark {
                    Some(w) => w.succ_opt(),
                    None => Some(today.max(rule.valid_from)),
                };
                if let Some(start) = start.filter(|s| *s <= horizon) {
                    self.grow(&rule, start, horizon, &mut report)?;
                }
            }
        }

        self.store.set_watermark(rule_id, Some(horizon))?;
        info!(
            rule = %rule_id,
            name = %rule.name,
            from = ?rule.watermark,
            to = %horizon,
            inserted = report.inserted,
            deleted = report.deleted,
            degraded = report.degraded,
            "reconciled rule"
        );
        Ok(report)
    }

    /// Materialize a rule through December 31 of `year`.
    ///
    /// Skipped when the watermark already reaches year-end. Otherwise starts
    /// the day after the watermark, or on January 1 of `year` for a rule
    /// with none, and never before `today`.
    pub fn populate_for_year(
        &self,
        rule_id: RuleId,
        year: i32,
        today: NaiveDate,
    ) -> Result<Reconciliation> {
        let rule = self.load_rule(rule_id)?;
        let year_end = NaiveDate::from_ymd_opt(year, 12, 31)
            .ok_or_else(|| EngineError::InvalidRange(format!("year {year} out of range")))?;

        if rule.watermark.is_some_and(|w| w >= year_end) {
            debug!(rule = %rule_id, year, "watermark already covers year");
            return Ok(Reconciliation::unchanged(&rule));
        }

        let start = match rule.watermark {
            Some(w) => w.succ_opt(),
            None => NaiveDate::from_ymd_opt(year, 1, 1),
        }
        .map(|start| start.max(today));

        let mut report = Reconciliation {
            rule_id,
            inserted: 0,
            deleted: 0,
            degraded: 0,
            watermark: Some(year_end),
            skipped: false,
        };
        if let Some(start) = start.filter(|s| *s <= year_end) {
            self.grow(&rule, start, year_end, &mut report)?;
        }
        self.store.set_watermark(rule_id, Some(year_end))?;
        info!(
            rule = %rule_id,
            year,
            inserted = report.inserted,
            degraded = report.degraded,
            "populated rule for year"
        );
        Ok(report)
    }

    /// [`populate_for_year`](Self::populate_for_year) for every stored rule.
    pub fn populate_year_for_all(&self, year: i32, today: NaiveDate) -> Result<Vec<Reconciliation>> {
        self.store
            .rules()?
            .iter()
            .map(|rule| self.populate_for_year(rule.id, year, today))
            .collect()
    }

    /// Materialize `[start, end]` for `rule`. Any of the rule's occurrences
    /// already in the range are replaced, so an interrupted earlier pass
    /// leaves no duplicates.
    fn grow(
        &self,
        rule: &EventTypeRule,
        start: NaiveDate,
        end: NaiveDate,
        report: &mut Reconciliation,
    ) -> Result<()> {
        let tags = self.classifier.classify_range(start, end)?;

        let occurrences: Vec<Occurrence> = tags
            .iter()
            .filter(|(date, tags)| applies(**date, tags, rule))
            .map(|(date, _)| {
                Occurrence::materialized(rule, *date, self.resolver.resolve(*date, &rule.time))
            })
            .collect();
        debug!(
            rule = %rule.id,
            %start,
            %end,
            candidates = tags.len(),
            matched = occurrences.len(),
            "matched date range"
        );

        report.deleted += self
            .store
            .delete_rule_occurrences(rule.id, DateWindow::inclusive(start, end))?;
        self.store.insert_occurrences(&occurrences)?;
        report.inserted += occurrences.len();
        report.degraded += occurrences.iter().filter(|o| o.needs_review).count();
        Ok(())
    }

    // ── Rule lifecycle ──────────────────────────────────────────────────────

    /// Store a new rule and materialize it through `horizon`, or through
    /// `today` plus the default horizon when none is given.
    ///
    /// If materialization fails the rule stays stored without a watermark;
    /// calling [`ensure_up_to_date`](Self::ensure_up_to_date) later completes it.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{NaiveDate, NaiveTime};
    /// use zmanim_engine::{
    ///     DayTypeClassifier, EmptyFeed, InMemoryStore, Location, NoaaCalculator,
    ///     PopulationScheduler, RuleDraft, TimeResolver,
    /// };
    ///
    /// let scheduler = PopulationScheduler::new(
    ///     DayTypeClassifier::new(EmptyFeed),
    ///     TimeResolver::new(NoaaCalculator::new(), Location::lakewood()),
    ///     InMemoryStore::new(),
    /// );
    /// let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    /// let draft = RuleDraft::fixed("Shacharis", NaiveTime::from_hms_opt(6, 0, 0).unwrap())
    ///     .restrict(&["Monday", "Thursday"]);
    ///
    /// let (rule, report) = scheduler
    ///     .create_rule(draft, today, NaiveDate::from_ymd_opt(2024, 1, 14))
    ///     .unwrap();
    /// assert_eq!(report.inserted, 4);
    /// assert_eq!(rule.watermark, NaiveDate::from_ymd_opt(2024, 1, 14));
    /// ```
    pub fn create_rule(
        &self,
        draft: RuleDraft,
        today: NaiveDate,
        horizon: Option<NaiveDate>,
    ) -> Result<(EventTypeRule, Reconciliation)> {
        let horizon = match horizon {
            Some(h) => h,
            None => today
                .checked_add_days(Days::new(u64::from(self.default_horizon_days)))
                .ok_or_else(|| EngineError::InvalidRange(format!("horizon past {today}")))?,
        };
        let rule = EventTypeRule::from_draft(RuleId::new(), draft, today)?;
        self.store.insert_rule(&rule)?;
        info!(rule = %rule.id, name = %rule.name, "created rule");

        let report = self.ensure_up_to_date(rule.id, horizon, today)?;
        Ok((self.load_rule(rule.id)?, report))
    }

    /// Replace a rule's definition and regenerate its populated span.
    ///
    /// Future occurrences through the old watermark are deleted, predicates
    /// and fields are replaced (`valid_from` is never moved before `today`),
    /// and the span through the old watermark is materialized again under
    /// the new definition. Occurrences on or before `today` are kept.
    ///
    /// A watermark on or before `today` is left where it is, and a rule
    /// never materialized stays that way; only its definition changes.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRange`] if the draft ends before its own
    /// `valid_from`, checked before anything is written.
    pub fn update_rule(
        &self,
        rule_id: RuleId,
        draft: RuleDraft,
        today: NaiveDate,
    ) -> Result<(EventTypeRule, Reconciliation)> {
        let existing = self.load_rule(rule_id)?;
        let mut revised = existing.revised(draft, today)?;
        let old_watermark = existing.watermark;

        let mut deleted = 0;
        if let Some(w) = old_watermark.filter(|w| *w > today) {
            self.store.set_watermark(rule_id, Some(today))?;
            deleted = self
                .store
                .delete_rule_occurrences(rule_id, DateWindow::after_through(today, w))?;
            revised.watermark = Some(today);
        }

        self.store
            .replace_predicates(rule_id, &revised.restrictions, &revised.exclusions)?;
        self.store.update_rule(&revised)?;
        info!(rule = %rule_id, name = %revised.name, deleted, "updated rule");

        let mut report = match old_watermark {
            Some(w) => self.ensure_up_to_date(rule_id, w, today)?,
            None => Reconciliation::unchanged(&revised),
        };
        report.deleted += deleted;
        Ok((self.load_rule(rule_id)?, report))
    }

    /// Delete a rule, its predicates and its occurrences after `today`.
    /// Returns the number of occurrences removed.
    pub fn delete_rule(&self, rule_id: RuleId, today: NaiveDate) -> Result<usize> {
        self.load_rule(rule_id)?;
        self.store.delete_predicates(rule_id)?;
        let deleted = self
            .store
            .delete_rule_occurrences(rule_id, DateWindow::after(today))?;
        self.store.delete_rule(rule_id)?;
        info!(rule = %rule_id, deleted, "deleted rule");
        Ok(deleted)
    }

    // ── Occurrences ─────────────────────────────────────────────────────────

    /// Re-resolve every derived occurrence in `window` from its stored
    /// reference point and offset. Returns how many changed.
    pub fn recompute_derived_times(&self, window: DateWindow) -> Result<usize> {
        let mut changed = 0;
        for mut occurrence in self.store.occurrences_in(window)? {
            let Some(derivation) = occurrence.derivation else {
                continue;
            };
            let resolved = self
                .resolver
                .resolve(occurrence.date, &TimeSpec::Derived(derivation));
            if resolved.time != occurrence.time || resolved.fallback != occurrence.needs_review {
                occurrence.time = resolved.time;
                occurrence.needs_review = resolved.fallback;
                self.store.update_occurrence(&occurrence)?;
                changed += 1;
            }
        }
        debug!(changed, "recomputed derived times");
        Ok(changed)
    }

    /// Add a one-off occurrence that belongs to no rule.
    pub fn add_occurrence(&self, draft: OccurrenceDraft) -> Result<Occurrence> {
        let occurrence = Occurrence {
            id: OccurrenceId::new(),
            rule_id: None,
            date: draft.date,
            name: draft.name,
            time: draft.time,
            derivation: None,
            needs_review: false,
        };
        self.store
            .insert_occurrences(std::slice::from_ref(&occurrence))?;
        Ok(occurrence)
    }

    /// Edit a one-off occurrence.
    ///
    /// # Errors
    ///
    /// [`EngineError::RuleOwnedOccurrence`] if the occurrence was produced by
    /// a rule; change the rule instead.
    pub fn update_occurrence(&self, id: OccurrenceId, draft: OccurrenceDraft) -> Result<Occurrence> {
        let mut occurrence = self
            .store
            .occurrence(id)?
            .ok_or(EngineError::OccurrenceNotFound(id))?;
        if occurrence.rule_id.is_some() {
            return Err(EngineError::RuleOwnedOccurrence(id));
        }
        occurrence.name = draft.name;
        occurrence.date = draft.date;
        occurrence.time = draft.time;
        self.store.update_occurrence(&occurrence)?;
        Ok(occurrence)
    }

    /// Remove a single occurrence, rule-owned or not.
    pub fn delete_occurrence(&self, id: OccurrenceId) -> Result<()> {
        self.store.delete_occurrence(id)
    }

    /// Every occurrence on `date`, ordered by time.
    pub fn occurrences_on(&self, date: NaiveDate) -> Result<Vec<Occurrence>> {
        self.store.occurrences_in(DateWindow::inclusive(date, date))
    }
}
