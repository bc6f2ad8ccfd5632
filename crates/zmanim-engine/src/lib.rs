//! # zmanim-engine
//!
//! Recurring congregational events for one fixed location.
//!
//! Rules say which kinds of days an event happens on (weekdays, Rosh
//! Chodesh, fasts, Yom Tov, ...) and at what time, either a fixed clock
//! time or an offset from an astronomical reference point such as sunset.
//! The engine classifies dates from a Hebrew-calendar feed, decides where
//! each rule applies, resolves times and keeps the stored occurrences in
//! step with every rule through a per-rule watermark.
//!
//! ## Modules
//!
//! - [`daytype`] — day-type tags and the feed-backed classifier
//! - [`feed`] — static, empty and Hebcal-archive feeds
//! - [`rule`] — rule drafts, stored rules and parsed predicates
//! - [`matcher`] — whether a rule applies on a date
//! - [`astronomy`] — reference points and the NOAA solar calculator
//! - [`time`] — fixed and derived time resolution
//! - [`store`] — the persistence contract and an in-memory store
//! - [`scheduler`] — watermark reconciliation and the rule lifecycle
//! - [`location`] — the configured place
//! - [`config`] — TOML configuration
//! - [`error`] — Error types
//!
//! ## Example
//!
//! ```
//! use chrono::NaiveDate;
//! use zmanim_engine::{classify_entry, DayTag, FeedEntry, PredicateEntry};
//!
//! let entry = FeedEntry {
//!     date: NaiveDate::from_ymd_opt(2024, 2, 10).unwrap(),
//!     title: "Rosh Chodesh Adar I".to_string(),
//!     category: "roshchodesh".to_string(),
//!     memo: String::new(),
//!     is_yom_tov: false,
//! };
//! let mut tags = classify_entry(&entry);
//! tags.insert(DayTag::Saturday);
//!
//! let shabbos_rosh_chodesh = PredicateEntry::parse(&["RoshChodesh"]).unwrap();
//! assert!(shabbos_rosh_chodesh.is_satisfied_by(&tags));
//! ```

pub mod astronomy;
pub mod config;
pub mod daytype;
pub mod error;
pub mod feed;
pub mod ids;
pub mod location;
pub mod matcher;
pub mod rule;
pub mod scheduler;
pub mod store;
pub mod time;

pub use astronomy::{day_times, AstronomicalProvider, DayTime, NoaaCalculator, ReferencePoint};
pub use config::{EngineConfig, FeedConfig, LocationConfig, PopulationConfig};
pub use daytype::{
    classify_date, classify_entry, DayTag, DayTagSet, DayTypeClassifier, DayTypeFeed, FeedEntry,
};
pub use error::{EngineError, Result};
pub use feed::{hebcal_year_url, parse_hebcal_json, EmptyFeed, HebcalArchive, StaticFeed};
pub use ids::{OccurrenceId, RuleId};
pub use location::Location;
pub use matcher::{applies, exclusion_admits};
pub use rule::{EventTypeRule, PredicateEntry, RuleDraft};
pub use scheduler::{PopulationScheduler, Reconciliation};
pub use store::{DateWindow, InMemoryStore, Occurrence, OccurrenceDraft, OccurrenceStore};
pub use time::{format_short_time, Derivation, ResolvedTime, TimeResolver, TimeSpec};
