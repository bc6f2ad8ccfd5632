//! Wall-clock time resolution for occurrences.
//!
//! A rule's time is either fixed or derived from an astronomical reference
//! point plus a signed minute offset. Derived times are evaluated in the
//! configured location's time zone.

use chrono::{Duration, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::astronomy::{AstronomicalProvider, ReferencePoint};
use crate::error::EngineError;
use crate::location::Location;

/// A reference point and the minutes to add to it (negative for "before").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Derivation {
    pub reference: ReferencePoint,
    #[serde(default)]
    pub offset_minutes: i32,
}

impl Derivation {
    pub fn new(reference: ReferencePoint, offset_minutes: i32) -> Self {
        Self {
            reference,
            offset_minutes,
        }
    }
}

/// How a rule decides the clock time of its occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSpec {
    Fixed(NaiveTime),
    Derived(Derivation),
}

impl TimeSpec {
    pub fn derived(reference: ReferencePoint, offset_minutes: i32) -> Self {
        TimeSpec::Derived(Derivation::new(reference, offset_minutes))
    }

    pub fn derivation(&self) -> Option<Derivation> {
        match self {
            TimeSpec::Fixed(_) => None,
            TimeSpec::Derived(derivation) => Some(*derivation),
        }
    }
}

/// A resolved clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTime {
    pub time: NaiveTime,
    /// The reference instant did not exist and midnight was used in its place.
    pub fallback: bool,
}

/// Resolves [`TimeSpec`]s at one fixed location.
pub struct TimeResolver<A> {
    provider: A,
    location: Location,
}

impl<A: AstronomicalProvider> TimeResolver<A> {
    pub fn new(provider: A, location: Location) -> Self {
        Self { provider, location }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn provider(&self) -> &A {
        &self.provider
    }

    /// Local wall-clock time of `reference` on `date`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnresolvableReference`] when the provider has no
    /// instant for that date.
    pub fn reference_time(
        &self,
        date: NaiveDate,
        reference: ReferencePoint,
    ) -> Result<NaiveTime, EngineError> {
        self.provider
            .reference_instant(date, &self.location, reference)
            .map(|instant| instant.with_timezone(&self.location.timezone).time())
            .ok_or(EngineError::UnresolvableReference { date, reference })
    }

    /// Resolve `spec` on `date`.
    ///
    /// Offsets wrap around midnight. When a derived reference cannot be
    /// resolved, the offset is applied to 00:00 and the result is marked as a
    /// fallback so callers can flag it for review.
    pub fn resolve(&self, date: NaiveDate, spec: &TimeSpec) -> ResolvedTime {
        let derivation = match spec {
            TimeSpec::Fixed(time) => {
                return ResolvedTime {
                    time: *time,
                    fallback: false,
                }
            }
            TimeSpec::Derived(derivation) => derivation,
        };

        let (base, fallback) = match self.reference_time(date, derivation.reference) {
            Ok(time) => (time, false),
            Err(err) => {
                warn!(%date, location = %self.location.name, "{err}; falling back to midnight");
                (NaiveTime::default(), true)
            }
        };
        let (time, _) =
            base.overflowing_add_signed(Duration::minutes(i64::from(derivation.offset_minutes)));
        ResolvedTime { time, fallback }
    }
}

/// Short 12-hour clock string, e.g. `7:12 PM`.
pub fn format_short_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}
