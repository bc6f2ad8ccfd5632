//! Engine configuration loaded from TOML.
//!
//! ```toml
//! [location]
//! name = "Lakewood, NJ"
//! latitude = 40.09596
//! longitude = -74.22213
//! elevation = 0.0
//! timezone = "America/New_York"
//!
//! [feed]
//! archive_dir = "feed"
//! cache_years = true
//!
//! [population]
//! default_horizon_days = 30
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::location::Location;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub location: LocationConfig,
    pub feed: FeedConfig,
    pub population: PopulationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub timezone: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        let lakewood = Location::lakewood();
        Self {
            name: lakewood.name,
            latitude: lakewood.latitude,
            longitude: lakewood.longitude,
            elevation: lakewood.elevation,
            timezone: lakewood.timezone.name().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Directory of `<year>.json` Hebcal files. Without one, dates are
    /// classified by day-of-week only.
    pub archive_dir: Option<PathBuf>,
    /// Memoize fetched feed years for the life of the classifier.
    pub cache_years: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            archive_dir: None,
            cache_years: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// Horizon used when a rule is created without an explicit one.
    pub default_horizon_days: u32,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            default_horizon_days: 30,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Config`] for malformed TOML, or the location's
    /// validation error for bad coordinates or time zone.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.location()?;
        Ok(config)
    }

    /// Load from a file. A relative `feed.archive_dir` is resolved against
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(dir), Some(parent)) = (&config.feed.archive_dir, path.parent()) {
            if dir.is_relative() {
                config.feed.archive_dir = Some(parent.join(dir));
            }
        }
        Ok(config)
    }

    /// The validated location.
    pub fn location(&self) -> Result<Location> {
        let l = &self.location;
        Location::new(&l.name, l.latitude, l.longitude, l.elevation, &l.timezone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_lakewood_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config.location().unwrap(), Location::lakewood());
        assert!(config.feed.archive_dir.is_none());
        assert!(config.feed.cache_years);
        assert_eq!(config.population.default_horizon_days, 30);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [location]
            name = "Jerusalem"
            latitude = 31.778
            longitude = 35.2354
            elevation = 754.0
            timezone = "Asia/Jerusalem"

            [population]
            default_horizon_days = 90
            "#,
        )
        .unwrap();
        let location = config.location().unwrap();
        assert_eq!(location.timezone.name(), "Asia/Jerusalem");
        assert_eq!(config.population.default_horizon_days, 90);
        assert!(config.feed.cache_years);
    }

    #[test]
    fn test_bad_timezone_rejected_at_load() {
        let err = EngineConfig::from_toml_str("[location]\ntimezone = \"Mars/Olympus\"").unwrap_err();
        assert!(matches!(err, EngineError::InvalidTimezone(_)), "got: {err}");
    }

    #[test]
    fn test_bad_latitude_rejected_at_load() {
        let err = EngineConfig::from_toml_str("[location]\nlatitude = 123.0").unwrap_err();
        assert!(matches!(err, EngineError::InvalidLocation(_)), "got: {err}");
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let err = EngineConfig::from_toml_str("[location\n").unwrap_err();
        assert!(err.to_string().contains("Configuration error"), "got: {err}");
    }

    #[test]
    fn test_load_resolves_relative_archive_dir() {
        let dir = std::env::temp_dir().join(format!("zmanim-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("zmanim.toml");
        std::fs::write(&path, "[feed]\narchive_dir = \"feed\"\ncache_years = false\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.feed.archive_dir, Some(dir.join("feed")));
        assert!(!config.feed.cache_years);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
