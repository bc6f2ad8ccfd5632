//! Error types for zmanim-engine operations.

use chrono::NaiveDate;
use thiserror::Error;

use crate::astronomy::ReferencePoint;
use crate::ids::{OccurrenceId, RuleId};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Day-type feed unavailable for {year}: {reason}")]
    FeedUnavailable { year: i32, reason: String },

    #[error("No {reference} on {date} at the configured location")]
    UnresolvableReference {
        date: NaiveDate,
        reference: ReferencePoint,
    },

    #[error("Rule not found: {0}")]
    RuleNotFound(RuleId),

    #[error("Occurrence not found: {0}")]
    OccurrenceNotFound(OccurrenceId),

    #[error("Occurrence {0} belongs to a rule and cannot be edited directly")]
    RuleOwnedOccurrence(OccurrenceId),

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Invalid location: {0}")]
    InvalidLocation(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
