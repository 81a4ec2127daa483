//! # Tide Station Configuration Library
//!
//! Host-side toolkit for the configuration surface of a tide and buoy e-paper
//! display. The firmware on the device is configured by a C header (`config.h`)
//! holding eight compile-time constants; this library models those constants,
//! validates them and moves them between TOML, Rust and C.
//!
//! ## Representations
//!
//! ```text
//! tide-config.toml  ──load──▶  Config  ──render──▶  config.h
//!         ▲                     │  ▲                    │
//!         └──────save───────────┘  └──────parse─────────┘
//! ```
//!
//! ## Modules
//! - [`config`]: the typed [`config::Config`] and its TOML persistence
//! - [`header`]: rendering and parsing of the `config.h` contract
//! - [`validate`]: range, credential, station and timezone checks
//! - [`posix_tz`]: POSIX TZ string parser and offset evaluator
//! - [`timezone`]: IANA zone lookup, POSIX derivation and cross-checking
//! - [`secrets`]: redacted credentials and `.gitignore` coverage
//! - [`stations`]: online verification against NOAA CO-OPS and NDBC
//! - [`icons`]: weather icon generation and 4bpp C header output
//!
//! ## Core Types
//! - [`GeoPosition`]: the device's fixed position in degrees
//! - [`StationId`]: a numeric station code kept as text

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;
pub mod header;
pub mod icons;
pub mod posix_tz;
pub mod secrets;
pub mod stations;
pub mod timezone;
pub mod validate;

/// Mean Earth radius used for great-circle distances.
const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A fixed geographic position in decimal degrees.
///
/// Latitude is positive north, longitude positive east, matching the
/// `LATITUDE` / `LONGITUDE` macros.
///
/// # Example
/// ```
/// use tide_station_lib::GeoPosition;
///
/// let santa_cruz = GeoPosition { latitude: 36.97, longitude: -122.01 };
/// let monterey = GeoPosition { latitude: 36.6088, longitude: -121.9042 };
///
/// let km = santa_cruz.distance_km(&monterey);
/// assert!((39.0..42.0).contains(&km));
/// assert!(santa_cruz.in_range());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPosition {
    /// True when both coordinates are finite and inside their valid ranges.
    pub fn in_range(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Great-circle distance to `other` in kilometres (haversine).
    pub fn distance_km(&self, other: &GeoPosition) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.longitude - self.longitude).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

/// A station code such as `"9413450"` (NOAA tide gauge) or `"46236"` (NDBC buoy).
///
/// Station codes are numeric but are kept as text: leading zeros matter and the
/// firmware splices them into request URLs verbatim.
///
/// # Example
/// ```
/// use tide_station_lib::StationId;
///
/// let tide = StationId::from("9413450");
/// assert!(tide.is_numeric());
/// assert_eq!(tide.as_str(), "9413450");
///
/// assert!(!StationId::from("").is_numeric());
/// assert!(!StationId::from("41NL1").is_numeric());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationId(String);

impl StationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Non-empty and made only of ASCII digits.
    pub fn is_numeric(&self) -> bool {
        !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl From<&str> for StationId {
    fn from(value: &str) -> Self {
        StationId(value.to_string())
    }
}

impl From<String> for StationId {
    fn from(value: String) -> Self {
        StationId(value)
    }
}

impl fmt::Display for StationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
