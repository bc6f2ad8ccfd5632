//! The fixed geographic location zmanim are computed for.

use chrono_tz::Tz;
use serde::Serialize;

use crate::error::EngineError;

/// A named place with coordinates, elevation and an IANA time zone.
///
/// Latitude is positive north, longitude positive east, elevation in meters
/// above sea level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    #[serde(serialize_with = "serialize_tz")]
    pub timezone: Tz,
}

impl Location {
    /// Build a location, validating coordinates and the time zone name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidLocation`] for out-of-range or non-finite
    /// coordinates and [`EngineError::InvalidTimezone`] if `timezone` is not an
    /// IANA zone name.
    ///
    /// # Examples
    ///
    /// ```
    /// use zmanim_engine::Location;
    ///
    /// let jerusalem = Location::new("Jerusalem", 31.778, 35.2354, 754.0, "Asia/Jerusalem").unwrap();
    /// assert_eq!(jerusalem.timezone.name(), "Asia/Jerusalem");
    /// assert!(Location::new("Nowhere", 91.0, 0.0, 0.0, "UTC").is_err());
    /// ```
    pub fn new(
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        elevation: f64,
        timezone: &str,
    ) -> Result<Self, EngineError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(EngineError::InvalidLocation(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(EngineError::InvalidLocation(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        if !elevation.is_finite() || elevation < 0.0 {
            return Err(EngineError::InvalidLocation(format!(
                "elevation {elevation} must be a non-negative number of meters"
            )));
        }
        Ok(Self {
            name: name.into(),
            latitude,
            longitude,
            elevation,
            timezone: parse_timezone(timezone)?,
        })
    }

    /// Lakewood, NJ at sea level.
    pub fn lakewood() -> Self {
        Self {
            name: "Lakewood, NJ".to_string(),
            latitude: 40.09596,
            longitude: -74.22213,
            elevation: 0.0,
            timezone: chrono_tz::America::New_York,
        }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::lakewood()
    }
}

/// Parse an IANA timezone string into `Tz`.
pub(crate) fn parse_timezone(s: &str) -> Result<Tz, EngineError> {
    s.parse::<Tz>()
        .map_err(|_| EngineError::InvalidTimezone(format!("'{}'", s)))
}

fn serialize_tz<S: serde::Serializer>(tz: &Tz, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(tz.name())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_location_accepts_valid_input() {
        let loc = Location::new("Lakewood, NJ", 40.09596, -74.22213, 0.0, "America/New_York")
            .unwrap();
        assert_eq!(loc, Location::lakewood());
    }

    #[test]
    fn test_new_location_rejects_bad_longitude() {
        let err = Location::new("x", 10.0, 181.0, 0.0, "UTC").unwrap_err();
        assert!(err.to_string().contains("Invalid location"), "got: {err}");
    }

    #[test]
    fn test_new_location_rejects_nan() {
        assert!(Location::new("x", f64::NAN, 0.0, 0.0, "UTC").is_err());
        assert!(Location::new("x", 0.0, 0.0, f64::INFINITY, "UTC").is_err());
    }

    #[test]
    fn test_new_location_rejects_unknown_timezone() {
        let err = Location::new("x", 10.0, 10.0, 0.0, "Invalid/Zone").unwrap_err();
        assert!(err.to_string().contains("Invalid timezone"), "got: {err}");
    }
}
