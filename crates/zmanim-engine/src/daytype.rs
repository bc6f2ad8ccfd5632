//! Day-type classification.
//!
//! Every date carries a set of [`DayTag`]s: always its day-of-week name, plus
//! whatever the Hebrew-calendar feed's annotations for that date imply
//! (holiday, new month, fast day, ...). Rule predicates are evaluated against
//! this set and nothing else.
//!
//! Feed data is fetched one Gregorian year at a time. [`DayTypeClassifier`]
//! memoizes fetched years so a reconciliation spanning a year boundary makes
//! one feed call per distinct year, and repeated passes make none.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, Result};

// ── Tags ────────────────────────────────────────────────────────────────────

/// A semantic classification of a calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayTag {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    /// Full festival day, other than the high holy days.
    YomTov,
    RoshHashana,
    YomKippur,
    RoshChodesh,
    CholHamoed,
    #[serde(rename = "TishaB'av")]
    TishaBav,
    /// A minor fast day.
    Taanis,
    Chanuka,
}

impl DayTag {
    /// The full tag vocabulary.
    pub const VOCABULARY: [DayTag; 15] = [
        DayTag::Sunday,
        DayTag::Monday,
        DayTag::Tuesday,
        DayTag::Wednesday,
        DayTag::Thursday,
        DayTag::Friday,
        DayTag::Saturday,
        DayTag::YomTov,
        DayTag::RoshHashana,
        DayTag::YomKippur,
        DayTag::RoshChodesh,
        DayTag::CholHamoed,
        DayTag::TishaBav,
        DayTag::Taanis,
        DayTag::Chanuka,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DayTag::Sunday => "Sunday",
            DayTag::Monday => "Monday",
            DayTag::Tuesday => "Tuesday",
            DayTag::Wednesday => "Wednesday",
            DayTag::Thursday => "Thursday",
            DayTag::Friday => "Friday",
            DayTag::Saturday => "Saturday",
            DayTag::YomTov => "YomTov",
            DayTag::RoshHashana => "RoshHashana",
            DayTag::YomKippur => "YomKippur",
            DayTag::RoshChodesh => "RoshChodesh",
            DayTag::CholHamoed => "CholHamoed",
            DayTag::TishaBav => "TishaB'av",
            DayTag::Taanis => "Taanis",
            DayTag::Chanuka => "Chanuka",
        }
    }

    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayTag::Monday,
            Weekday::Tue => DayTag::Tuesday,
            Weekday::Wed => DayTag::Wednesday,
            Weekday::Thu => DayTag::Thursday,
            Weekday::Fri => DayTag::Friday,
            Weekday::Sat => DayTag::Saturday,
            Weekday::Sun => DayTag::Sunday,
        }
    }

    /// Tags whose name appears anywhere inside `text`.
    ///
    /// No tag name is a substring of another, so the result does not depend on
    /// how `text` separates its terms.
    pub fn mentioned_in(text: &str) -> impl Iterator<Item = DayTag> + '_ {
        Self::VOCABULARY
            .into_iter()
            .filter(move |tag| text.contains(tag.as_str()))
    }
}

impl fmt::Display for DayTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DayTag {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::VOCABULARY
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or_else(|| EngineError::InvalidPredicate(format!("unknown day type '{s}'")))
    }
}

/// The tags that apply to one date.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayTagSet(BTreeSet<DayTag>);

impl DayTagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set holding only the day-of-week tag for `date`.
    pub fn for_weekday(date: NaiveDate) -> Self {
        let mut set = Self::new();
        set.insert(DayTag::from_weekday(date.weekday()));
        set
    }

    pub fn insert(&mut self, tag: DayTag) -> bool {
        self.0.insert(tag)
    }

    pub fn contains(&self, tag: DayTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn extend(&mut self, other: &DayTagSet) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = DayTag> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<DayTag> for DayTagSet {
    fn from_iter<I: IntoIterator<Item = DayTag>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for DayTagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|tag| tag.as_str()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

// ── Feed ────────────────────────────────────────────────────────────────────

/// One annotation from the Hebrew-calendar feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub is_yom_tov: bool,
}

/// Source of per-year calendar annotations.
///
/// Implementations return every entry they have for the Gregorian `year`;
/// the classifier discards entries outside the range it was asked about.
pub trait DayTypeFeed: Send + Sync {
    /// # Errors
    ///
    /// Returns [`EngineError::FeedUnavailable`] if the data cannot be fetched
    /// or is malformed.
    fn fetch_year(&self, year: i32) -> Result<Vec<FeedEntry>>;
}

impl<F: DayTypeFeed + ?Sized> DayTypeFeed for &F {
    fn fetch_year(&self, year: i32) -> Result<Vec<FeedEntry>> {
        (**self).fetch_year(year)
    }
}

impl<F: DayTypeFeed + ?Sized> DayTypeFeed for Arc<F> {
    fn fetch_year(&self, year: i32) -> Result<Vec<FeedEntry>> {
        (**self).fetch_year(year)
    }
}

// ── Classification ──────────────────────────────────────────────────────────

/// Derive the tags implied by a single feed entry (day-of-week not included).
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use zmanim_engine::{classify_entry, DayTag, FeedEntry};
///
/// let entry = FeedEntry {
///     date: NaiveDate::from_ymd_opt(2024, 10, 3).unwrap(),
///     title: "Rosh Hashana 5785".to_string(),
///     category: "holiday".to_string(),
///     memo: String::new(),
///     is_yom_tov: true,
/// };
/// let tags = classify_entry(&entry);
/// assert!(tags.contains(DayTag::RoshHashana));
/// assert!(!tags.contains(DayTag::YomTov));
/// ```
pub fn classify_entry(entry: &FeedEntry) -> DayTagSet {
    let title = entry.title.trim();
    let lower_title = title.to_ascii_lowercase();
    let lower_memo = entry.memo.to_ascii_lowercase();

    let rosh_hashana = names_holiday(&lower_title, "rosh hashana");
    let yom_kippur = names_holiday(&lower_title, "yom kippur");
    let tisha_bav = names_holiday(&lower_title, "tish'a b'av");

    let mut tags = DayTagSet::new();
    if entry.is_yom_tov
        && !lower_title.contains("rosh hashana")
        && !lower_title.contains("yom kippur")
    {
        tags.insert(DayTag::YomTov);
    }
    if entry.category.eq_ignore_ascii_case("roshchodesh") {
        tags.insert(DayTag::RoshChodesh);
    }
    if title.contains("CH''M") {
        tags.insert(DayTag::CholHamoed);
    }
    if yom_kippur {
        tags.insert(DayTag::YomKippur);
    }
    if rosh_hashana {
        tags.insert(DayTag::RoshHashana);
    }
    if tisha_bav {
        tags.insert(DayTag::TishaBav);
    }
    if lower_memo.contains("fast")
        && !yom_kippur
        && !tisha_bav
        && !is_fast_of_firstborn(&lower_title, &lower_memo)
        && !lower_title.starts_with("erev tish'a b'av")
    {
        tags.insert(DayTag::Taanis);
    }
    if lower_title.contains("chanuka") {
        tags.insert(DayTag::Chanuka);
    }
    tags
}

/// Tags for `date`: its day-of-week plus everything its feed entries imply.
pub fn classify_date<'a>(
    date: NaiveDate,
    entries: impl IntoIterator<Item = &'a FeedEntry>,
) -> DayTagSet {
    let mut tags = DayTagSet::for_weekday(date);
    for entry in entries {
        tags.extend(&classify_entry(entry));
    }
    tags
}

/// Whether a (lowercased) title names `holiday` itself, optionally followed by
/// a year number, a day ordinal (`II`) or `(observed)`.
fn names_holiday(title: &str, holiday: &str) -> bool {
    let Some(rest) = title.strip_prefix(holiday) else {
        return false;
    };
    let rest = rest.trim_end_matches(" (observed)");
    if rest.is_empty() {
        return true;
    }
    rest.starts_with(' ')
        && rest
            .trim()
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, 'i' | 'v' | 'x'))
}

fn is_fast_of_firstborn(title: &str, memo: &str) -> bool {
    memo.contains("first born")
        || memo.contains("firstborn")
        || title.contains("first born")
        || title.contains("bechorot")
}

// ── Classifier ──────────────────────────────────────────────────────────────

type YearCache = RwLock<HashMap<i32, Arc<Vec<FeedEntry>>>>;

/// Batches feed access per year and classifies date ranges.
pub struct DayTypeClassifier<F> {
    feed: F,
    cache: Option<YearCache>,
}

impl<F: DayTypeFeed> DayTypeClassifier<F> {
    /// A classifier that memoizes each fetched year until [`invalidate`](Self::invalidate).
    pub fn new(feed: F) -> Self {
        Self {
            feed,
            cache: Some(RwLock::new(HashMap::new())),
        }
    }

    /// A classifier that fetches every year afresh on each call.
    pub fn uncached(feed: F) -> Self {
        Self { feed, cache: None }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Drop every memoized year.
    pub fn invalidate(&self) {
        if let Some(cache) = &self.cache {
            cache.write().unwrap_or_else(|e| e.into_inner()).clear();
        }
    }

    /// Classify every date in `[start, end]`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidRange`] if `start > end`, or
    /// [`EngineError::FeedUnavailable`] if any spanned year cannot be fetched.
    pub fn classify_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, DayTagSet>> {
        if start > end {
            return Err(EngineError::InvalidRange(format!(
                "start {start} is after end {end}"
            )));
        }

        let mut by_date: HashMap<NaiveDate, Vec<&FeedEntry>> = HashMap::new();
        let years: Vec<Arc<Vec<FeedEntry>>> = (start.year()..=end.year())
            .map(|year| self.year_entries(year))
            .collect::<Result<_>>()?;
        for entry in years.iter().flat_map(|entries| entries.iter()) {
            if (start..=end).contains(&entry.date) {
                by_date.entry(entry.date).or_default().push(entry);
            }
        }

        let classified = start
            .iter_days()
            .take_while(|date| *date <= end)
            .map(|date| {
                let entries = by_date.get(&date).map(Vec::as_slice).unwrap_or_default();
                (date, classify_date(date, entries.iter().copied()))
            })
            .collect();
        Ok(classified)
    }

    /// Classify a single date.
    pub fn classify(&self, date: NaiveDate) -> Result<DayTagSet> {
        let mut range = self.classify_range(date, date)?;
        Ok(range
            .remove(&date)
            .unwrap_or_else(|| DayTagSet::for_weekday(date)))
    }

    fn year_entries(&self, year: i32) -> Result<Arc<Vec<FeedEntry>>> {
        let Some(cache) = &self.cache else {
            return Ok(Arc::new(self.feed.fetch_year(year)?));
        };

        if let Some(hit) = cache.read().unwrap_or_else(|e| e.into_inner()).get(&year) {
            return Ok(Arc::clone(hit));
        }

        // Fetched outside the lock; a concurrent miss may fetch the same year twice.
        let fetched = Arc::new(self.feed.fetch_year(year)?);
        debug!(year, entries = fetched.len(), "fetched day-type feed year");
        let mut guard = cache.write().unwrap_or_else(|e| e.into_inner());
        Ok(Arc::clone(guard.entry(year).or_insert(fetched)))
    }
}
