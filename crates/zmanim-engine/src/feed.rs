//! Day-type feed implementations.
//!
//! - [`StaticFeed`] — entries held in memory
//! - [`EmptyFeed`] — no annotations; dates classify by day-of-week only
//! - [`HebcalArchive`] — per-year Hebcal JSON downloads stored on disk

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use serde::Deserialize;

use crate::daytype::{DayTypeFeed, FeedEntry};
use crate::error::{EngineError, Result};

/// Hebcal query returning one Gregorian year of major/minor holidays, minor
/// fasts, special Shabbatot and Rosh Chodesh as JSON, with Sephardic
/// transliterations.
pub fn hebcal_year_url(year: i32) -> String {
    format!(
        "https://www.hebcal.com/hebcal/?cfg=json&v=1&year={year}&i=off&maj=on&min=on&nx=on&mf=on&ss=on&lg=s"
    )
}

/// A feed backed by a fixed list of entries.
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    entries: Vec<FeedEntry>,
}

impl StaticFeed {
    pub fn new(entries: Vec<FeedEntry>) -> Self {
        Self { entries }
    }
}

impl DayTypeFeed for StaticFeed {
    fn fetch_year(&self, year: i32) -> Result<Vec<FeedEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.date.year() == year)
            .cloned()
            .collect())
    }
}

/// A feed with no annotations at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyFeed;

impl DayTypeFeed for EmptyFeed {
    fn fetch_year(&self, _year: i32) -> Result<Vec<FeedEntry>> {
        Ok(Vec::new())
    }
}

/// Reads `<dir>/<year>.json` files saved from [`hebcal_year_url`].
#[derive(Debug, Clone)]
pub struct HebcalArchive {
    dir: PathBuf,
}

impl HebcalArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn year_path(&self, year: i32) -> PathBuf {
        self.dir.join(format!("{year}.json"))
    }
}

impl DayTypeFeed for HebcalArchive {
    fn fetch_year(&self, year: i32) -> Result<Vec<FeedEntry>> {
        let path = self.year_path(year);
        let text = fs::read_to_string(&path).map_err(|e| EngineError::FeedUnavailable {
            year,
            reason: format!("{}: {}", path.display(), e),
        })?;
        parse_hebcal_json(year, &text)
    }
}

// ── Hebcal wire format ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct HebcalItem {
    title: String,
    date: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    memo: Option<String>,
    #[serde(default)]
    yomtov: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HebcalDocument {
    Wrapped { items: Vec<HebcalItem> },
    Bare(Vec<HebcalItem>),
}

/// Parse a Hebcal JSON response: either the full response object with an
/// `items` array or a bare array of items.
///
/// Item dates may be plain dates or datetimes; only the date part is used.
///
/// # Errors
///
/// Returns [`EngineError::FeedUnavailable`] if the document or any item date
/// is malformed.
pub fn parse_hebcal_json(year: i32, text: &str) -> Result<Vec<FeedEntry>> {
    let document: HebcalDocument =
        serde_json::from_str(text).map_err(|e| EngineError::FeedUnavailable {
            year,
            reason: format!("malformed feed document: {e}"),
        })?;
    let items = match document {
        HebcalDocument::Wrapped { items } => items,
        HebcalDocument::Bare(items) => items,
    };

    items
        .into_iter()
        .map(|item| {
            let date = item
                .date
                .get(..10)
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .ok_or_else(|| EngineError::FeedUnavailable {
                    year,
                    reason: format!("bad date '{}' on '{}'", item.date, item.title),
                })?;
            Ok(FeedEntry {
                date,
                title: item.title,
                category: item.category.unwrap_or_default(),
                memo: item.memo.unwrap_or_default(),
                is_yom_tov: item.yomtov,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "title": "Hebcal 2024",
        "items": [
            {"title": "Rosh Chodesh Sh'vat", "date": "2024-01-11", "category": "roshchodesh", "memo": "Start of month"},
            {"title": "Pesach I", "date": "2024-04-23", "category": "holiday", "yomtov": true},
            {"title": "Candle lighting: 7:22pm", "date": "2024-04-22T19:22:00-04:00", "category": "candles", "memo": null}
        ]
    }"#;

    #[test]
    fn test_parse_wrapped_document() {
        let entries = parse_hebcal_json(2024, SAMPLE).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].category, "roshchodesh");
        assert!(entries[1].is_yom_tov);
        assert_eq!(entries[2].date, NaiveDate::from_ymd_opt(2024, 4, 22).unwrap());
        assert_eq!(entries[2].memo, "");
    }

    #[test]
    fn test_parse_bare_array() {
        let entries = parse_hebcal_json(
            2024,
            r#"[{"title": "Tish'a B'Av", "date": "2024-08-13", "category": "holiday"}]"#,
        )
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_yom_tov);
    }

    #[test]
    fn test_parse_malformed_is_feed_unavailable() {
        let err = parse_hebcal_json(2024, "<html>rate limited</html>").unwrap_err();
        assert!(matches!(err, EngineError::FeedUnavailable { year: 2024, .. }));
    }

    #[test]
    fn test_parse_bad_date_is_feed_unavailable() {
        let err = parse_hebcal_json(2024, r#"[{"title": "x", "date": "soon"}]"#).unwrap_err();
        assert!(err.to_string().contains("bad date"), "got: {err}");
    }

    #[test]
    fn test_missing_archive_year_is_feed_unavailable() {
        let archive = HebcalArchive::new("/nonexistent/zmanim-feed");
        let err = archive.fetch_year(2031).unwrap_err();
        assert!(matches!(err, EngineError::FeedUnavailable { year: 2031, .. }));
    }

    #[test]
    fn test_static_feed_filters_by_year() {
        let feed = StaticFeed::new(parse_hebcal_json(2024, SAMPLE).unwrap());
        assert_eq!(feed.fetch_year(2024).unwrap().len(), 3);
        assert!(feed.fetch_year(2025).unwrap().is_empty());
    }

    #[test]
    fn test_year_url_names_year() {
        assert!(hebcal_year_url(2026).contains("year=2026"));
        assert!(hebcal_year_url(2026).contains("cfg=json"));
    }
}
