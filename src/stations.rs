//! # Online Station Verification
//!
//! Station ids can be well-formed and still wrong: a digit off and the device
//! shows tides for a harbour on the other side of the country. This module asks
//! the data providers whether the configured stations exist and whether they
//! make sense for the configured location.
//!
//! ## Data Sources
//!
//! ### NOAA CO-OPS Metadata API (tide gauge)
//! - **URL**: `https://api.tidesandcurrents.noaa.gov/mdapi/prod/webapi/stations/{id}.json`
//! - **Format**: JSON, `{"count": 1, "stations": [{"id", "name", "state", "lat", "lng", "timezonecorr", ...}]}`
//!
//! ### NDBC Realtime Feed (buoy)
//! - **URL**: `https://www.ndbc.noaa.gov/data/realtime2/{id}.txt`
//! - **Format**: whitespace-separated columns, newest observation first:
//!   ```text
//!   #YY  MM DD hh mm WDIR WSPD GST  WVHT   DPD   APD MWD   PRES  ATMP  WTMP  DEWP  VIS PTDY  TIDE
//!   #yr  mo dy hr mn degT m/s  m/s     m   sec   sec degT   hPa  degC  degC  degC  nmi  hPa    ft
//!   2025 07 24 12 30 290  6.0  8.0   1.2    12   6.8 280 1014.2  15.1  14.9  12.0   MM   MM    MM
//!   ```
//!   `MM` marks a missing value.
//!
//! ## Findings
//! - tide gauge more than [`MAX_GAUGE_DISTANCE_KM`] from the configured position
//! - tide gauge's standard-time correction differs from the configured zone
//! - newest buoy observation older than [`MAX_BUOY_AGE_HOURS`]
//!
//! Parsing and evaluation are pure functions; only the two `async` lookups
//! touch the network.

use crate::config::Config;
use crate::posix_tz::PosixTz;
use crate::{GeoPosition, StationId};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

const NOAA_MDAPI: &str = "https://api.tidesandcurrents.noaa.gov/mdapi/prod/webapi/stations";
const NDBC_REALTIME: &str = "https://www.ndbc.noaa.gov/data/realtime2";

/// HTTP timeout for each lookup
const TIMEOUT_SECS: u64 = 20;

/// A gauge further away than this probably belongs to another location.
pub const MAX_GAUGE_DISTANCE_KM: f64 = 100.0;

/// A buoy silent for longer than this is probably decommissioned or adrift.
pub const MAX_BUOY_AGE_HOURS: i64 = 24;

/// Errors that can occur while looking up a station.
#[derive(Error, Debug)]
pub enum StationError {
    /// HTTP request failed (network, server, or protocol error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider does not know the station
    #[error("station {0} not found")]
    NotFound(String),

    /// JSON body did not match the expected shape
    #[error("malformed metadata: {0}")]
    Json(#[from] serde_json::Error),

    /// Text feed did not match the expected layout
    #[error("malformed feed: {0}")]
    Feed(String),
}

/// Tide gauge metadata from NOAA CO-OPS.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TideStationInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
    pub lat: f64,
    pub lng: f64,
    /// Standard-time offset from UTC in hours, e.g. -8
    #[serde(default)]
    pub timezonecorr: Option<i32>,
}

impl TideStationInfo {
    pub fn position(&self) -> GeoPosition {
        GeoPosition {
            latitude: self.lat,
            longitude: self.lng,
        }
    }
}

#[derive(Deserialize)]
struct StationsResponse {
    #[serde(default)]
    stations: Vec<TideStationInfo>,
}

/// Newest observation from an NDBC buoy.
#[derive(Clone, Debug, PartialEq)]
pub struct BuoyObservation {
    pub time: DateTime<Utc>,
    /// Significant wave height, metres
    pub wave_height_m: Option<f32>,
    /// Dominant wave period, seconds
    pub dominant_period_s: Option<f32>,
    /// Wind speed, m/s
    pub wind_speed_ms: Option<f32>,
    /// Sea level pressure, hPa
    pub pressure_hpa: Option<f32>,
    /// Sea surface temperature, °C
    pub water_temp_c: Option<f32>,
}

/// Something suspicious about a station that exists.
#[derive(Clone, Debug, PartialEq)]
pub enum StationFinding {
    GaugeTooFar {
        name: String,
        distance_km: f64,
    },
    GaugeTimezone {
        station_hours: i32,
        configured_hours: f64,
    },
    BuoyStale {
        age_hours: i64,
    },
}

impl fmt::Display for StationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationFinding::GaugeTooFar { name, distance_km } => write!(
                f,
                "tide station {} is {:.0} km from the configured position",
                name, distance_km
            ),
            StationFinding::GaugeTimezone {
                station_hours,
                configured_hours,
            } => write!(
                f,
                "tide station uses UTC{:+} standard time, TIMEZONE_POSIX uses UTC{:+}",
                station_hours, configured_hours
            ),
            StationFinding::BuoyStale { age_hours } => {
                write!(f, "newest buoy observation is {} hours old", age_hours)
            }
        }
    }
}

/// Outcome of [`verify_stations`].
#[derive(Debug)]
pub struct StationReport {
    pub tide: Result<TideStationInfo, StationError>,
    pub buoy: Result<BuoyObservation, StationError>,
    pub findings: Vec<StationFinding>,
}

impl StationReport {
    /// Both stations were found. Findings are warnings and do not count.
    pub fn is_ok(&self) -> bool {
        self.tide.is_ok() && self.buoy.is_ok()
    }
}

/// HTTP client with the timeout and user agent used for every lookup.
pub fn http_client() -> Result<Client, StationError> {
    Ok(Client::builder()
        .timeout(std::time::Duration::from_secs(TIMEOUT_SECS))
        .user_agent(concat!("tide-station/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Fetch tide gauge metadata from NOAA CO-OPS.
pub async fn lookup_tide_station(
    client: &Client,
    id: &StationId,
) -> Result<TideStationInfo, StationError> {
    let url = format!("{}/{}.json", NOAA_MDAPI, id);
    let response = client.get(&url).send().await?;
    if response.status().is_client_error() {
        return Err(StationError::NotFound(id.to_string()));
    }
    let body = response.error_for_status()?.text().await?;
    parse_tide_station(&body, id)
}

/// Fetch the newest observation of an NDBC buoy.
pub async fn latest_buoy_observation(
    client: &Client,
    id: &StationId,
) -> Result<BuoyObservation, StationError> {
    let url = format!("{}/{}.txt", NDBC_REALTIME, id);
    let response = client.get(&url).send().await?;
    if response.status().is_client_error() {
        return Err(StationError::NotFound(id.to_string()));
    }
    let body = response.error_for_status()?.text().await?;
    parse_buoy_feed(&body)
}

/// Look up both stations concurrently and evaluate them against `config`.
pub async fn verify_stations(
    client: &Client,
    config: &Config,
    now: DateTime<Utc>,
) -> StationReport {
    let (tide, buoy) = tokio::join!(
        lookup_tide_station(client, &config.stations.tide),
        latest_buoy_observation(client, &config.stations.buoy),
    );
    let findings = evaluate(config, tide.as_ref().ok(), buoy.as_ref().ok(), now);
    StationReport {
        tide,
        buoy,
        findings,
    }
}

/// Compare looked-up stations with the configuration.
pub fn evaluate(
    config: &Config,
    tide: Option<&TideStationInfo>,
    buoy: Option<&BuoyObservation>,
    now: DateTime<Utc>,
) -> Vec<StationFinding> {
    let mut findings = Vec::new();

    if let Some(station) = tide {
        let distance_km = config.position().distance_km(&station.position());
        if distance_km > MAX_GAUGE_DISTANCE_KM {
            findings.push(StationFinding::GaugeTooFar {
                name: station.name.clone(),
                distance_km,
            });
        }

        let configured = config
            .effective_posix(now.year())
            .ok()
            .and_then(|posix| PosixTz::parse(&posix).ok())
            .map(|tz| f64::from(tz.std_utc_offset()) / 3600.0);
        if let (Some(station_hours), Some(configured_hours)) = (station.timezonecorr, configured) {
            if (f64::from(station_hours) - configured_hours).abs() > f64::EPSILON {
                findings.push(StationFinding::GaugeTimezone {
                    station_hours,
                    configured_hours,
                });
            }
        }
    }

    if let Some(observation) = buoy {
        let age = now.signed_duration_since(observation.time);
        if age > Duration::hours(MAX_BUOY_AGE_HOURS) {
            findings.push(StationFinding::BuoyStale {
                age_hours: age.num_hours(),
            });
        }
    }

    findings
}

/// Parse a CO-OPS metadata response for station `id`.
pub fn parse_tide_station(body: &str, id: &StationId) -> Result<TideStationInfo, StationError> {
    let response: StationsResponse = serde_json::from_str(body)?;
    response
        .stations
        .into_iter()
        .find(|s| s.id == id.as_str())
        .ok_or_else(|| StationError::NotFound(id.to_string()))
}

/// Parse the newest row of an NDBC realtime2 standard meteorological feed.
pub fn parse_buoy_feed(body: &str) -> Result<BuoyObservation, StationError> {
    let mut lines = body.lines();
    let header = lines
        .next()
        .and_then(|l| l.strip_prefix('#'))
        .ok_or_else(|| StationError::Feed("missing #YY header".to_string()))?;
    let columns: Vec<&str> = header.split_whitespace().collect();

    let row = lines
        .find(|l| !l.starts_with('#') && !l.trim().is_empty())
        .ok_or_else(|| StationError::Feed("no observations".to_string()))?;
    let values: Vec<&str> = row.split_whitespace().collect();
    if values.len() != columns.len() {
        return Err(StationError::Feed(format!(
            "row has {} fields, header has {}",
            values.len(),
            columns.len()
        )));
    }

    let field = |name: &str| -> Option<&str> {
        columns
            .iter()
            .position(|c| *c == name)
            .map(|i| values[i])
    };
    let int = |name: &str| -> Result<u32, StationError> {
        field(name)
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StationError::Feed(format!("bad or missing {}", name)))
    };
    let measurement = |name: &str| -> Option<f32> {
        field(name).filter(|v| *v != "MM").and_then(|v| v.parse().ok())
    };

    let year = int("YY")? as i32;
    let time = NaiveDate::from_ymd_opt(year, int("MM")?, int("DD")?)
        .and_then(|d| d.and_hms_opt(int("hh").ok()?, int("mm").ok()?, 0))
        .ok_or_else(|| StationError::Feed("invalid observation time".to_string()))?
        .and_utc();

    Ok(BuoyObservation {
        time,
        wave_height_m: measurement("WVHT"),
        dominant_period_s: measurement("DPD"),
        wind_speed_ms: measurement("WSPD"),
        pressure_hpa: measurement("PRES"),
        water_temp_c: measurement("WTMP"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const MONTEREY_JSON: &str = r#"{
        "count": 1,
        "units": null,
        "stations": [{
            "tidal": true,
            "greatlakes": false,
            "shefcode": "MTYC1",
            "state": "CA",
            "timezone": "PST",
            "timezonecorr": -8,
            "observedst": true,
            "id": "9413450",
            "name": "Monterey",
            "lat": 36.6088,
            "lng": -121.9042,
            "affiliations": "NWLON"
        }]
    }"#;

    const BUOY_FEED: &str = "\
#YY  MM DD hh mm WDIR WSPD GST  WVHT   DPD   APD MWD   PRES  ATMP  WTMP  DEWP  VIS PTDY  TIDE
#yr  mo dy hr mn degT m/s  m/s     m   sec   sec degT   hPa  degC  degC  degC  nmi  hPa    ft
2025 07 24 12 30  MM   MM   MM   1.2    12   6.8 280     MM    MM  14.9    MM   MM   MM    MM
2025 07 24 12 00  MM   MM   MM   1.3    12   6.9 281     MM    MM  14.8    MM   MM   MM    MM
";

    #[test]
    fn test_parse_tide_station() {
        let info = parse_tide_station(MONTEREY_JSON, &StationId::from("9413450")).unwrap();
        assert_eq!(info.name, "Monterey");
        assert_eq!(info.state.as_deref(), Some("CA"));
        assert_eq!(info.timezonecorr, Some(-8));
    }

    #[test]
    fn test_parse_tide_station_wrong_id() {
        let err = parse_tide_station(MONTEREY_JSON, &StationId::from("8418150")).unwrap_err();
        assert!(matches!(err, StationError::NotFound(id) if id == "8418150"));

        let err = parse_tide_station(r#"{"count":0,"stations":[]}"#, &StationId::from("1")).unwrap_err();
        assert!(matches!(err, StationError::NotFound(_)));
    }

    #[test]
    fn test_parse_buoy_feed_newest_row() {
        let obs = parse_buoy_feed(BUOY_FEED).unwrap();
        assert_eq!(obs.time, Utc.with_ymd_and_hms(2025, 7, 24, 12, 30, 0).unwrap());
        assert_eq!(obs.wave_height_m, Some(1.2));
        assert_eq!(obs.dominant_period_s, Some(12.0));
        assert_eq!(obs.water_temp_c, Some(14.9));
        assert_eq!(obs.wind_speed_ms, None);
        assert_eq!(obs.pressure_hpa, None);
    }

    #[test]
    fn test_parse_buoy_feed_errors() {
        assert!(matches!(parse_buoy_feed(""), Err(StationError::Feed(_))));
        let header_only: String = BUOY_FEED.lines().take(2).collect::<Vec<_>>().join("\n");
        assert!(matches!(parse_buoy_feed(&header_only), Err(StationError::Feed(_))));
        let ragged = BUOY_FEED.replace("2025 07 24 12 30  MM", "2025 07 24 12 30");
        assert!(matches!(parse_buoy_feed(&ragged), Err(StationError::Feed(_))));
    }

    #[test]
    fn test_evaluate_nearby_gauge_and_fresh_buoy() {
        let config = Config::example();
        let station = parse_tide_station(MONTEREY_JSON, &config.stations.tide).unwrap();
        let buoy = parse_buoy_feed(BUOY_FEED).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 7, 24, 14, 0, 0).unwrap();

        assert!(evaluate(&config, Some(&station), Some(&buoy), now).is_empty());
    }

    #[test]
    fn test_report_ok_needs_both_stations() {
        let report = StationReport {
            tide: parse_tide_station(MONTEREY_JSON, &StationId::from("9413450")),
            buoy: parse_buoy_feed(BUOY_FEED),
            findings: vec![StationFinding::BuoyStale { age_hours: 30 }],
        };
        assert!(report.is_ok());

        let report = StationReport {
            tide: Err(StationError::NotFound("9413451".to_string())),
            ..report
        };
        assert!(!report.is_ok());
    }

    #[test]
    fn test_evaluate_flags_distant_gauge_and_stale_buoy() {
        let mut config = Config::example();
        // Portland, ME with the Monterey gauge.
        config.location.latitude = 43.66;
        config.location.longitude = -70.25;
        config.location.timezone = "America/New_York".to_string();
        config.location.timezone_posix = Some("EST5EDT,M3.2.0,M11.1.0".to_string());

        let station = parse_tide_station(MONTEREY_JSON, &config.stations.tide).unwrap();
        let buoy = parse_buoy_feed(BUOY_FEED).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 7, 27, 12, 30, 0).unwrap();

        let findings = evaluate(&config, Some(&station), Some(&buoy), now);
        assert_eq!(findings.len(), 3);
        assert!(matches!(findings[0], StationFinding::GaugeTooFar { distance_km, .. } if distance_km > 4000.0));
        assert_eq!(
            findings[1],
            StationFinding::GaugeTimezone {
                station_hours: -8,
                configured_hours: -5.0,
            }
        );
        assert_eq!(findings[2], StationFinding::BuoyStale { age_hours: 72 });
    }
}
