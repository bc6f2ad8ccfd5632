//! Astronomical reference instants ("zmanim") for a date and location.
//!
//! The engine only depends on the [`AstronomicalProvider`] contract. The
//! bundled [`NoaaCalculator`] implements it with the NOAA solar-position
//! equations, which are accurate to about a minute for inhabited latitudes.
//!
//! # Reference points
//!
//! GRA variants divide the day from sunrise to sunset into twelve
//! proportional hours (*shaos zmaniyos*). MGA variants use a day running from
//! 72 minutes before sunrise to 72 minutes after sunset.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// The closed set of astronomical reference points a rule's time can derive from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferencePoint {
    /// Dawn: the sun 16.1° below the eastern horizon.
    Alos,
    Sunrise,
    /// Latest Shema, Magen Avraham.
    SofZmanShmaMga,
    /// Latest Shema, Vilna Gaon.
    SofZmanShmaGra,
    SofZmanTfilaMga,
    SofZmanTfilaGra,
    /// Solar transit.
    Chatzos,
    /// Earliest afternoon prayer, 6.5 proportional hours into the day.
    MinchaGedola,
    /// 9.5 proportional hours into the day.
    MinchaKetana,
    /// 10.75 proportional hours into the day.
    PlagHamincha,
    Sunset,
    /// Nightfall: the sun 8.5° below the western horizon.
    Tzais,
}

impl ReferencePoint {
    /// Every reference point, in the order they occur on a normal day.
    pub const ALL: [ReferencePoint; 12] = [
        ReferencePoint::Alos,
        ReferencePoint::Sunrise,
        ReferencePoint::SofZmanShmaMga,
        ReferencePoint::SofZmanShmaGra,
        ReferencePoint::SofZmanTfilaMga,
        ReferencePoint::SofZmanTfilaGra,
        ReferencePoint::Chatzos,
        ReferencePoint::MinchaGedola,
        ReferencePoint::MinchaKetana,
        ReferencePoint::PlagHamincha,
        ReferencePoint::Sunset,
        ReferencePoint::Tzais,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReferencePoint::Alos => "Alos Hashachar",
            ReferencePoint::Sunrise => "Sunrise",
            ReferencePoint::SofZmanShmaMga => "Sof Zman Shma (MGA)",
            ReferencePoint::SofZmanShmaGra => "Sof Zman Shma (GRA)",
            ReferencePoint::SofZmanTfilaMga => "Sof Zman Tfila (MGA)",
            ReferencePoint::SofZmanTfilaGra => "Sof Zman Tfila (GRA)",
            ReferencePoint::Chatzos => "Chatzos",
            ReferencePoint::MinchaGedola => "Mincha Gedola",
            ReferencePoint::MinchaKetana => "Mincha Ketana",
            ReferencePoint::PlagHamincha => "Plag Hamincha",
            ReferencePoint::Sunset => "Sunset",
            ReferencePoint::Tzais => "Tzais",
        }
    }
}

impl fmt::Display for ReferencePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Source of reference instants.
///
/// Implementations must be deterministic for a given date, location and
/// reference point. `None` means the instant does not exist on that date
/// (polar day or night) or could not be computed.
pub trait AstronomicalProvider: Send + Sync {
    fn reference_instant(
        &self,
        date: NaiveDate,
        location: &Location,
        reference: ReferencePoint,
    ) -> Option<DateTime<Utc>>;
}

impl<P: AstronomicalProvider + ?Sized> AstronomicalProvider for &P {
    fn reference_instant(
        &self,
        date: NaiveDate,
        location: &Location,
        reference: ReferencePoint,
    ) -> Option<DateTime<Utc>> {
        (**self).reference_instant(date, location, reference)
    }
}

/// One line of a daily zmanim listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayTime {
    pub reference: ReferencePoint,
    /// Local wall-clock time at the location, absent when the instant does not exist.
    pub time: Option<NaiveTime>,
}

/// List every reference point for `date`, as local wall-clock times.
pub fn day_times<P: AstronomicalProvider + ?Sized>(
    provider: &P,
    date: NaiveDate,
    location: &Location,
) -> Vec<DayTime> {
    ReferencePoint::ALL
        .iter()
        .map(|&reference| DayTime {
            reference,
            time: provider
                .reference_instant(date, location, reference)
                .map(|instant| instant.with_timezone(&location.timezone).time()),
        })
        .collect()
}

// ── NOAA calculator ─────────────────────────────────────────────────────────

/// Zenith of the sun's upper limb at geometric sunrise/sunset, including refraction.
const GEOMETRIC_ZENITH: f64 = 90.0 + 50.0 / 60.0;
const ALOS_ZENITH: f64 = 90.0 + 16.1;
const TZAIS_ZENITH: f64 = 90.0 + 8.5;
const EARTH_RADIUS_KM: f64 = 6356.9;
const MGA_OFFSET_MINUTES: f64 = 72.0;
const JULIAN_UNIX_EPOCH: f64 = 2_440_587.5;
const JULIAN_J2000: f64 = 2_451_545.0;

/// [`AstronomicalProvider`] backed by the NOAA solar-position algorithm.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoaaCalculator;

impl NoaaCalculator {
    pub fn new() -> Self {
        Self
    }

    fn after_utc_midnight(day: NaiveDate, minutes: f64) -> Option<DateTime<Utc>> {
        if !minutes.is_finite() {
            return None;
        }
        let midnight = day.and_hms_opt(0, 0, 0)?.and_utc();
        Some(midnight + Duration::seconds((minutes * 60.0).round() as i64))
    }

    /// The UTC day whose solar noon falls on the local calendar day `date`.
    ///
    /// Equal to `date` unless the zone's offset is far from the longitude's
    /// mean solar time, as in `Pacific/Apia` (UTC+13 at 171.8°W).
    fn solar_day(&self, date: NaiveDate, location: &Location) -> Option<NaiveDate> {
        let noon_minutes = self.solar_noon_minutes(date, location.longitude);
        let noon = Self::after_utc_midnight(date, noon_minutes)?;
        let local = noon.with_timezone(&location.timezone).date_naive();
        date.checked_add_signed(date.signed_duration_since(local))
    }

    /// Minutes after UTC midnight of `date` at which the sun crosses the meridian.
    fn solar_noon_minutes(&self, date: NaiveDate, longitude: f64) -> f64 {
        let first_guess = 720.0 - 4.0 * longitude;
        let eq_time = equation_of_time(julian_centuries(date, first_guess));
        720.0 - 4.0 * longitude - eq_time
    }

    /// Minutes after UTC midnight at which the sun reaches `zenith` in the
    /// morning (`rising`) or evening.
    fn zenith_crossing_minutes(
        &self,
        date: NaiveDate,
        location: &Location,
        zenith: f64,
        rising: bool,
    ) -> Option<f64> {
        let noon = self.solar_noon_minutes(date, location.longitude);
        let mut estimate = noon;
        // Two passes: the declination at the first estimate refines the second.
        for _ in 0..2 {
            let t = julian_centuries(date, estimate);
            let hour_angle = hour_angle_degrees(location.latitude, sun_declination(t), zenith)?;
            let delta = 4.0 * hour_angle;
            let eq_time = equation_of_time(t);
            let transit = 720.0 - 4.0 * location.longitude - eq_time;
            estimate = if rising { transit - delta } else { transit + delta };
        }
        Some(estimate)
    }

    fn elevated_zenith(location: &Location) -> f64 {
        let elevation_km = location.elevation / 1000.0;
        let dip = (EARTH_RADIUS_KM / (EARTH_RADIUS_KM + elevation_km))
            .acos()
            .to_degrees();
        GEOMETRIC_ZENITH + dip
    }

    fn sunrise(&self, date: NaiveDate, location: &Location) -> Option<f64> {
        self.zenith_crossing_minutes(date, location, Self::elevated_zenith(location), true)
    }

    fn sunset(&self, date: NaiveDate, location: &Location) -> Option<f64> {
        self.zenith_crossing_minutes(date, location, Self::elevated_zenith(location), false)
    }

    fn minutes_for(
        &self,
        date: NaiveDate,
        location: &Location,
        reference: ReferencePoint,
    ) -> Option<f64> {
        let gra = |hours: f64| -> Option<f64> {
            let rise = self.sunrise(date, location)?;
            let set = self.sunset(date, location)?;
            Some(rise + (set - rise) / 12.0 * hours)
        };
        let mga = |hours: f64| -> Option<f64> {
            let start = self.sunrise(date, location)? - MGA_OFFSET_MINUTES;
            let end = self.sunset(date, location)? + MGA_OFFSET_MINUTES;
            Some(start + (end - start) / 12.0 * hours)
        };

        match reference {
            ReferencePoint::Alos => {
                self.zenith_crossing_minutes(date, location, ALOS_ZENITH, true)
            }
            ReferencePoint::Sunrise => self.sunrise(date, location),
            ReferencePoint::SofZmanShmaMga => mga(3.0),
            ReferencePoint::SofZmanShmaGra => gra(3.0),
            ReferencePoint::SofZmanTfilaMga => mga(4.0),
            ReferencePoint::SofZmanTfilaGra => gra(4.0),
            ReferencePoint::Chatzos => Some(self.solar_noon_minutes(date, location.longitude)),
            ReferencePoint::MinchaGedola => gra(6.5),
            ReferencePoint::MinchaKetana => gra(9.5),
            ReferencePoint::PlagHamincha => gra(10.75),
            ReferencePoint::Sunset => self.sunset(date, location),
            ReferencePoint::Tzais => {
                self.zenith_crossing_minutes(date, location, TZAIS_ZENITH, false)
            }
        }
    }
}

impl AstronomicalProvider for NoaaCalculator {
    fn reference_instant(
        &self,
        date: NaiveDate,
        location: &Location,
        reference: ReferencePoint,
    ) -> Option<DateTime<Utc>> {
        let day = self.solar_day(date, location)?;
        let minutes = self.minutes_for(day, location, reference)?;
        Self::after_utc_midnight(day, minutes)
    }
}

// ── Solar position helpers ──────────────────────────────────────────────────

/// Julian centuries since J2000.0 at `minutes` after UTC midnight of `date`.
fn julian_centuries(date: NaiveDate, minutes: f64) -> f64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN);
    let days = (date - epoch).num_days() as f64 + minutes / 1440.0;
    (JULIAN_UNIX_EPOCH + days - JULIAN_J2000) / 36525.0
}

fn geom_mean_long_sun(t: f64) -> f64 {
    (280.46646 + t * (36000.76983 + 0.0003032 * t)).rem_euclid(360.0)
}

fn geom_mean_anomaly_sun(t: f64) -> f64 {
    357.52911 + t * (35999.05029 - 0.0001537 * t)
}

fn eccentricity_earth_orbit(t: f64) -> f64 {
    0.016708634 - t * (0.000042037 + 0.0000001267 * t)
}

fn sun_equation_of_center(t: f64) -> f64 {
    let m = geom_mean_anomaly_sun(t).to_radians();
    m.sin() * (1.914602 - t * (0.004817 + 0.000014 * t))
        + (2.0 * m).sin() * (0.019993 - 0.000101 * t)
        + (3.0 * m).sin() * 0.000289
}

fn sun_apparent_long(t: f64) -> f64 {
    let true_long = geom_mean_long_sun(t) + sun_equation_of_center(t);
    let omega = 125.04 - 1934.136 * t;
    true_long - 0.00569 - 0.00478 * omega.to_radians().sin()
}

fn obliquity_correction(t: f64) -> f64 {
    let seconds = 21.448 - t * (46.8150 + t * (0.00059 - t * 0.001813));
    let mean = 23.0 + (26.0 + seconds / 60.0) / 60.0;
    let omega = 125.04 - 1934.136 * t;
    mean + 0.00256 * omega.to_radians().cos()
}

fn sun_declination(t: f64) -> f64 {
    let e = obliquity_correction(t).to_radians();
    let lambda = sun_apparent_long(t).to_radians();
    (e.sin() * lambda.sin()).asin().to_degrees()
}

/// Equation of time in minutes.
fn equation_of_time(t: f64) -> f64 {
    let epsilon = obliquity_correction(t).to_radians();
    let l0 = geom_mean_long_sun(t).to_radians();
    let e = eccentricity_earth_orbit(t);
    let m = geom_mean_anomaly_sun(t).to_radians();
    let y = (epsilon / 2.0).tan().powi(2);

    let eq = y * (2.0 * l0).sin() - 2.0 * e * m.sin()
        + 4.0 * e * y * m.sin() * (2.0 * l0).cos()
        - 0.5 * y * y * (4.0 * l0).sin()
        - 1.25 * e * e * (2.0 * m).sin();
    4.0 * eq.to_degrees()
}

/// Hour angle in degrees at which the sun sits at `zenith`, or `None` if it never does.
fn hour_angle_degrees(latitude: f64, declination: f64, zenith: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let dec = declination.to_radians();
    let cos_h = zenith.to_radians().cos() / (lat.cos() * dec.cos()) - lat.tan() * dec.tan();
    if !(-1.0..=1.0).contains(&cos_h) {
        return None;
    }
    Some(cos_h.acos().to_degrees())
}
