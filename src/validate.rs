//! # Configuration Validation
//!
//! A C compiler accepts any value for the configuration macros, so mistakes
//! only show up on the device: a swapped sign on `LONGITUDE`, a POSIX rule for
//! the wrong coast, a station id with a typo. [`validate`] checks everything
//! that can be checked offline and returns the findings as data.
//!
//! | Check | Severity |
//! |---|---|
//! | latitude in [-90, 90], longitude in [-180, 180], both finite | error |
//! | SSID 1-32 bytes | error |
//! | password 8-63 characters or 64 hex digits | error |
//! | empty password (open network), non-ASCII password | warning |
//! | template placeholders left in credentials | warning |
//! | station ids non-empty digits | error |
//! | tide id not 7 digits, buoy id not 5 digits | warning |
//! | `TIMEZONE` is an IANA zone, `TIMEZONE_POSIX` parses | error |
//! | both timezone strings give the same offsets in the reference year and its neighbours | error |

use crate::config::Config;
use crate::posix_tz::{PosixTz, PosixTzError};
use crate::timezone::{self, format_utc_offset, TimezoneError};
use crate::StationId;
use chrono::{DateTime, Utc};
use std::fmt;

const PLACEHOLDER_PREFIX: &str = "YOUR_";
const MAX_SSID_BYTES: usize = 32;
const TIDE_ID_LEN: usize = 7;
const BUOY_ID_LEN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

/// One finding about a configuration.
#[derive(Clone, Debug, PartialEq)]
pub enum Issue {
    LatitudeOutOfRange(f64),
    LongitudeOutOfRange(f64),
    EmptySsid,
    SsidTooLong(usize),
    PasswordLength(usize),
    NonAsciiPassword,
    OpenNetwork,
    Placeholder {
        field: &'static str,
    },
    NonNumericStation {
        field: &'static str,
        id: String,
    },
    UnusualStationLength {
        field: &'static str,
        id: String,
        expected: usize,
    },
    UnknownTimezone(String),
    InvalidPosix {
        posix: String,
        error: PosixTzError,
    },
    PosixUnavailable(String),
    TimezoneMismatch {
        timezone: String,
        posix: String,
        year: i32,
        count: usize,
        checked: usize,
        first_at: DateTime<Utc>,
        iana_offset: i32,
        posix_offset: i32,
    },
}

impl Issue {
    pub fn severity(&self) -> Severity {
        match self {
            Issue::NonAsciiPassword
            | Issue::OpenNetwork
            | Issue::Placeholder { .. }
            | Issue::UnusualStationLength { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Issue::LatitudeOutOfRange(v) => write!(f, "LATITUDE {} is outside [-90, 90]", v),
            Issue::LongitudeOutOfRange(v) => write!(f, "LONGITUDE {} is outside [-180, 180]", v),
            Issue::EmptySsid => write!(f, "CFG_WIFI_SSID is empty"),
            Issue::SsidTooLong(n) => {
                write!(f, "CFG_WIFI_SSID is {} bytes, the limit is {}", n, MAX_SSID_BYTES)
            }
            Issue::PasswordLength(n) => write!(
                f,
                "CFG_WIFI_PASSWORD is {} characters, WPA needs 8-63 or 64 hex digits",
                n
            ),
            Issue::NonAsciiPassword => {
                write!(f, "CFG_WIFI_PASSWORD contains non-ASCII characters")
            }
            Issue::OpenNetwork => write!(
                f,
                "CFG_WIFI_PASSWORD is empty, the device will join an open network"
            ),
            Issue::Placeholder { field } => {
                write!(f, "{} still holds the template placeholder", field)
            }
            Issue::NonNumericStation { field, id } => {
                write!(f, "{} \"{}\" must be a non-empty string of digits", field, id)
            }
            Issue::UnusualStationLength { field, id, expected } => write!(
                f,
                "{} \"{}\" has {} digits, {} is usual",
                field,
                id,
                id.len(),
                expected
            ),
            Issue::UnknownTimezone(name) => write!(f, "TIMEZONE \"{}\" is not an IANA zone", name),
            Issue::InvalidPosix { posix, error } => {
                write!(f, "TIMEZONE_POSIX \"{}\" is invalid: {}", posix, error)
            }
            Issue::PosixUnavailable(reason) => {
                write!(f, "TIMEZONE_POSIX could not be derived: {}", reason)
            }
            Issue::TimezoneMismatch {
                timezone,
                posix,
                year,
                count,
                checked,
                first_at,
                iana_offset,
                posix_offset,
            } => write!(
                f,
                "TIMEZONE_POSIX \"{}\" disagrees with {} at {} of {} instants in {}; first at {}: {} vs {}",
                posix,
                timezone,
                count,
                checked,
                year,
                first_at.format("%Y-%m-%d %H:%M:%SZ"),
                format_utc_offset(*iana_offset),
                format_utc_offset(*posix_offset)
            ),
        }
    }
}

/// All findings for one configuration.
#[derive(Clone, Debug, Default)]
pub struct ValidationReport {
    pub issues: Vec<Issue>,
}

impl ValidationReport {
    /// True when there are no errors; warnings are allowed.
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Warning)
    }
}

/// Check a configuration. `year` is the reference year for timezone checks.
pub fn validate(config: &Config, year: i32) -> ValidationReport {
    let mut issues = Vec::new();
    check_position(config, &mut issues);
    check_wifi(config, &mut issues);
    check_station("TIDE_STATION", &config.stations.tide, TIDE_ID_LEN, &mut issues);
    check_station("BUOY_STATION", &config.stations.buoy, BUOY_ID_LEN, &mut issues);
    check_timezone(config, year, &mut issues);
    ValidationReport { issues }
}

fn check_position(config: &Config, issues: &mut Vec<Issue>) {
    let lat = config.location.latitude;
    let lon = config.location.longitude;
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        issues.push(Issue::LatitudeOutOfRange(lat));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        issues.push(Issue::LongitudeOutOfRange(lon));
    }
}

fn check_wifi(config: &Config, issues: &mut Vec<Issue>) {
    let ssid = &config.wifi.ssid;
    if ssid.is_empty() {
        issues.push(Issue::EmptySsid);
    } else if ssid.len() > MAX_SSID_BYTES {
        issues.push(Issue::SsidTooLong(ssid.len()));
    }
    if ssid.starts_with(PLACEHOLDER_PREFIX) {
        issues.push(Issue::Placeholder {
            field: "CFG_WIFI_SSID",
        });
    }

    let password = config.wifi.password.expose();
    if password.is_empty() {
        issues.push(Issue::OpenNetwork);
        return;
    }
    if password.starts_with(PLACEHOLDER_PREFIX) {
        issues.push(Issue::Placeholder {
            field: "CFG_WIFI_PASSWORD",
        });
    }
    let is_raw_psk = password.len() == 64 && password.bytes().all(|b| b.is_ascii_hexdigit());
    let chars = config.wifi.password.len();
    if !is_raw_psk && !(8..=63).contains(&chars) {
        issues.push(Issue::PasswordLength(chars));
    }
    if !password.is_ascii() {
        issues.push(Issue::NonAsciiPassword);
    }
}

fn check_station(field: &'static str, id: &StationId, expected: usize, issues: &mut Vec<Issue>) {
    if !id.is_numeric() {
        issues.push(Issue::NonNumericStation {
            field,
            id: id.to_string(),
        });
    } else if id.as_str().len() != expected {
        issues.push(Issue::UnusualStationLength {
            field,
            id: id.to_string(),
            expected,
        });
    }
}

fn check_timezone(config: &Config, year: i32, issues: &mut Vec<Issue>) {
    let name = &config.location.timezone;
    if timezone::resolve(name).is_err() {
        issues.push(Issue::UnknownTimezone(name.clone()));
    }

    let Some(posix) = &config.location.timezone_posix else {
        // Derivation already checks the rule against the neighbouring years.
        match timezone::derive_posix(name, year) {
            Ok(_) | Err(TimezoneError::Unknown(_)) => {}
            Err(e) => issues.push(Issue::PosixUnavailable(e.to_string())),
        }
        return;
    };

    if let Err(error) = PosixTz::parse(posix) {
        issues.push(Issue::InvalidPosix {
            posix: posix.clone(),
            error,
        });
        return;
    }

    // The firmware keeps the rule for years, so the neighbours must agree too.
    for checked_year in [year, year - 1, year + 1] {
        match timezone::check_consistency(name, posix, checked_year) {
            Ok(report) => {
                if let Some(first) = report.mismatches.first() {
                    issues.push(Issue::TimezoneMismatch {
                        timezone: name.clone(),
                        posix: posix.clone(),
                        year: checked_year,
                        count: report.mismatches.len(),
                        checked: report.checked,
                        first_at: first.at,
                        iana_offset: first.iana_offset,
                        posix_offset: first.posix_offset,
                    });
                    return;
                }
            }
            // Unknown zone is already reported; the POSIX string parsed above.
            Err(TimezoneError::Unknown(_)) | Err(TimezoneError::Posix(_)) => return,
            Err(e) => {
                issues.push(Issue::PosixUnavailable(e.to_string()));
                return;
            }
        }
    }
}
