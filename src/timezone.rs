//! # IANA / POSIX Timezone Bridging
//!
//! The configuration carries the timezone twice: `TIMEZONE` is the IANA name a
//! person reads ("America/Los_Angeles") and `TIMEZONE_POSIX` is the rule string
//! the firmware hands to `tzset()` ("PST8PDT,M3.2.0,M11.1.0"). Nothing in the C
//! toolchain checks that the two agree, so this module does it against the IANA
//! database shipped with `chrono-tz`.
//!
//! ## Transition Detection
//! Offsets are sampled once per day across the year; when two consecutive
//! samples differ, the exact second of the change is found by bisection. Both
//! deriving a POSIX rule and cross-checking use the same scan.

use crate::posix_tz::{PosixTz, PosixTzError, RuleDate, Transition};
use chrono::{DateTime, Datelike, NaiveDate, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use thiserror::Error;

const DAY: i64 = 86_400;

/// Spacing of the regular samples taken by [`check_consistency`].
const SAMPLE_STEP: i64 = 6 * 3600;

/// Years either side of the reference year a derived rule must also reproduce.
const RULE_CHECK_YEARS: i32 = 1;

#[derive(Error, Debug)]
pub enum TimezoneError {
    #[error("unknown IANA timezone: {0}")]
    Unknown(String),

    #[error("invalid POSIX TZ string: {0}")]
    Posix(#[from] PosixTzError),

    #[error("{name} has {count} offset transitions in {year}; a POSIX rule needs 0 or 2")]
    Irregular { name: String, year: i32, count: usize },

    /// The rule derived for `year` does not reproduce the zone in `other_year`.
    #[error("{name} follows no fixed yearly rule: the rule for {year} disagrees with the zone at {mismatches} instants in {other_year}")]
    NoYearlyRule {
        name: String,
        year: i32,
        other_year: i32,
        mismatches: usize,
    },

    #[error("year {0} is out of range")]
    YearOutOfRange(i32),
}

/// A change of UTC offset at `at` (first second of the new offset).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetChange {
    pub at: DateTime<Utc>,
    pub before: i32,
    pub after: i32,
}

/// An instant where the IANA zone and the POSIX rule disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OffsetMismatch {
    pub at: DateTime<Utc>,
    pub iana_offset: i32,
    pub posix_offset: i32,
}

/// Outcome of [`check_consistency`].
#[derive(Clone, Debug)]
pub struct ConsistencyReport {
    pub year: i32,
    /// Number of instants compared.
    pub checked: usize,
    pub mismatches: Vec<OffsetMismatch>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Look up an IANA timezone name.
pub fn resolve(name: &str) -> Result<Tz, TimezoneError> {
    name.parse::<Tz>()
        .map_err(|_| TimezoneError::Unknown(name.to_string()))
}

/// UTC offset of `tz` at `instant`, seconds east of UTC.
pub fn iana_offset_at(tz: &Tz, instant: DateTime<Utc>) -> i32 {
    tz.offset_from_utc_datetime(&instant.naive_utc())
        .fix()
        .local_minus_utc()
}

/// Abbreviation of `tz` at `instant` ("PST", "+0530", ...).
pub fn iana_abbreviation_at(tz: &Tz, instant: DateTime<Utc>) -> String {
    tz.from_utc_datetime(&instant.naive_utc())
        .format("%Z")
        .to_string()
}

/// All offset changes of `offset_at` in `[from, to)`.
pub fn find_transitions(
    offset_at: impl Fn(DateTime<Utc>) -> i32,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<OffsetChange> {
    let at = |t: i64| DateTime::from_timestamp(t, 0).unwrap_or(from);

    let mut changes = Vec::new();
    let (start, end) = (from.timestamp(), to.timestamp());
    let mut t = start;
    let mut current = offset_at(from);

    while t < end {
        let next = (t + DAY).min(end);
        let next_offset = offset_at(at(next));
        if next_offset != current {
            // Invariant: offset(lo) == current, offset(hi) != current.
            let (mut lo, mut hi) = (t, next);
            while hi - lo > 1 {
                let mid = lo + (hi - lo) / 2;
                if offset_at(at(mid)) == current {
                    lo = mid;
                } else {
                    hi = mid;
                }
            }
            let after = offset_at(at(hi));
            changes.push(OffsetChange {
                at: at(hi),
                before: current,
                after,
            });
            current = after;
            // Rescan from the change in case the day holds another one.
            t = hi;
            continue;
        }
        t = next;
    }
    changes.retain(|c| c.at.timestamp() < end);
    changes
}

fn year_bounds(year: i32) -> Result<(DateTime<Utc>, DateTime<Utc>), TimezoneError> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or(TimezoneError::YearOutOfRange(year))?;
    let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or(TimezoneError::YearOutOfRange(year))?;
    Ok((start.and_utc(), end.and_utc()))
}

/// Offset changes of an IANA zone during `year` (UTC calendar year).
pub fn iana_transitions(tz: &Tz, year: i32) -> Result<Vec<OffsetChange>, TimezoneError> {
    let (start, end) = year_bounds(year)?;
    Ok(find_transitions(|t| iana_offset_at(tz, t), start, end))
}

/// Encode the rules an IANA zone follows in `year` as a POSIX TZ string.
///
/// Zones without DST become `ABBR<offset>`; zones with exactly two changes in
/// the year become `STD<offset>DST[<offset>],Mm.w.d[/time],Mm.w.d[/time]`.
/// Rules that cannot be expressed (one change, or more than two) are an error,
/// and so is a rule that does not also hold in the neighbouring years: zones
/// whose dates move from year to year have no POSIX equivalent.
///
/// ```
/// use tide_station_lib::timezone::derive_posix;
///
/// assert_eq!(derive_posix("America/Los_Angeles", 2025).unwrap(), "PST8PDT,M3.2.0,M11.1.0");
/// assert_eq!(derive_posix("Asia/Tokyo", 2025).unwrap(), "JST-9");
/// ```
pub fn derive_posix(name: &str, year: i32) -> Result<String, TimezoneError> {
    Ok(derive_posix_tz(name, year)?.to_string())
}

/// [`derive_posix`] returning the structured rule.
pub fn derive_posix_tz(name: &str, year: i32) -> Result<PosixTz, TimezoneError> {
    let tz = resolve(name)?;
    let rule = rule_in_year(&tz, name, year)?;

    for other_year in (year - RULE_CHECK_YEARS..=year + RULE_CHECK_YEARS).filter(|y| *y != year) {
        let mismatches = compare(&tz, &rule, other_year)?.mismatches.len();
        if mismatches > 0 {
            return Err(TimezoneError::NoYearlyRule {
                name: name.to_string(),
                year,
                other_year,
                mismatches,
            });
        }
    }
    Ok(rule)
}

fn rule_in_year(tz: &Tz, name: &str, year: i32) -> Result<PosixTz, TimezoneError> {
    let changes = iana_transitions(tz, year)?;

    match changes.as_slice() {
        [] => {
            let (start, _) = year_bounds(year)?;
            Ok(PosixTz::fixed(
                iana_abbreviation_at(tz, start),
                iana_offset_at(tz, start),
            ))
        }
        [a, b] => {
            let (to_dst, to_std) = if a.after > a.before { (a, b) } else { (b, a) };
            let std_offset = to_dst.before;
            let dst_offset = to_dst.after;
            Ok(PosixTz::with_dst(
                iana_abbreviation_at(tz, to_std.at),
                std_offset,
                iana_abbreviation_at(tz, to_dst.at),
                dst_offset,
                rule_for(to_dst),
                rule_for(to_std),
            ))
        }
        other => Err(TimezoneError::Irregular {
            name: name.to_string(),
            year,
            count: other.len(),
        }),
    }
}

/// Express a change as `Mm.w.d/time` in the wall-clock time before it.
fn rule_for(change: &OffsetChange) -> Transition {
    let local = change.at.naive_utc() + chrono::Duration::seconds(i64::from(change.before));
    let date = local.date();
    let day = date.day();
    let dim = crate::posix_tz::days_in_month(date.year(), date.month()).unwrap_or(31);
    let week = if day + 7 > dim { 5 } else { (day - 1) / 7 + 1 };

    Transition {
        date: RuleDate::MonthWeekDay {
            month: date.month() as u8,
            week: week as u8,
            weekday: date.weekday().num_days_from_sunday() as u8,
        },
        time: local.num_seconds_from_midnight() as i32,
    }
}

/// Compare an IANA zone with a POSIX rule across `year`.
///
/// Offsets are compared every six hours and one second either side of every
/// change made by either representation.
pub fn check_consistency(
    name: &str,
    posix: &str,
    year: i32,
) -> Result<ConsistencyReport, TimezoneError> {
    let tz = resolve(name)?;
    let rule = PosixTz::parse(posix)?;
    compare(&tz, &rule, year)
}

fn compare(tz: &Tz, rule: &PosixTz, year: i32) -> Result<ConsistencyReport, TimezoneError> {
    let (start, end) = year_bounds(year)?;

    let iana = |t: DateTime<Utc>| iana_offset_at(tz, t);
    let posix_at = |t: DateTime<Utc>| rule.utc_offset_at(t);

    let mut instants: Vec<i64> = (start.timestamp()..end.timestamp())
        .step_by(SAMPLE_STEP as usize)
        .collect();
    for change in find_transitions(iana, start, end)
        .into_iter()
        .chain(find_transitions(posix_at, start, end))
    {
        let t = change.at.timestamp();
        instants.extend([t - 1, t]);
    }
    instants.sort_unstable();
    instants.dedup();

    let mismatches = instants
        .iter()
        .filter_map(|&t| DateTime::from_timestamp(t, 0))
        .filter_map(|at| {
            let (iana_offset, posix_offset) = (iana(at), posix_at(at));
            (iana_offset != posix_offset).then_some(OffsetMismatch {
                at,
                iana_offset,
                posix_offset,
            })
        })
        .collect();

    Ok(ConsistencyReport {
        year,
        checked: instants.len(),
        mismatches,
    })
}

/// Format seconds east of UTC as `UTC-07:00`.
pub fn format_utc_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { '-' } else { '+' };
    let s = seconds.unsigned_abs();
    format!("UTC{}{:02}:{:02}", sign, s / 3600, (s / 60) % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_and_unknown() {
        assert!(resolve("America/Los_Angeles").is_ok());
        assert!(matches!(
            resolve("America/Santa_Cruz"),
            Err(TimezoneError::Unknown(_))
        ));
    }

    #[test]
    fn test_derive_posix_common_zones() {
        assert_eq!(
            derive_posix("America/Los_Angeles", 2025).unwrap(),
            "PST8PDT,M3.2.0,M11.1.0"
        );
        assert_eq!(
            derive_posix("America/New_York", 2025).unwrap(),
            "EST5EDT,M3.2.0,M11.1.0"
        );
        assert_eq!(
            derive_posix("Europe/Berlin", 2025).unwrap(),
            "CET-1CEST,M3.5.0,M10.5.0/3"
        );
        assert_eq!(
            derive_posix("Australia/Sydney", 2025).unwrap(),
            "AEST-10AEDT,M10.1.0,M4.1.0/3"
        );
        assert_eq!(derive_posix("Pacific/Honolulu", 2025).unwrap(), "HST10");
        assert_eq!(derive_posix("Etc/UTC", 2025).unwrap(), "UTC0");
    }

    #[test]
    fn test_derived_rule_is_consistent_in_following_years() {
        let posix = derive_posix("America/Los_Angeles", 2025).unwrap();
        for year in [2024, 2026, 2027] {
            let report = check_consistency("America/Los_Angeles", &posix, year).unwrap();
            assert!(report.is_consistent(), "{} mismatched in {}", posix, year);
        }
    }

    #[test]
    fn test_derive_rejects_zone_without_yearly_rule() {
        // Ramadan-based dates: two changes in 2025, different ones in 2024.
        let err = derive_posix("Africa/Casablanca", 2025).unwrap_err();
        assert!(matches!(
            err,
            TimezoneError::NoYearlyRule { year: 2025, other_year: 2024, mismatches, .. } if mismatches > 0
        ));

        assert!(matches!(
            derive_posix("America/Santiago", 2025),
            Err(TimezoneError::NoYearlyRule { .. })
        ));
    }

    #[test]
    fn test_derive_rejects_single_transition() {
        // DST ended in February 2019 and never started again.
        assert!(matches!(
            derive_posix("America/Sao_Paulo", 2019),
            Err(TimezoneError::Irregular { year: 2019, count: 1, .. })
        ));
    }

    #[test]
    fn test_consistency_detects_wrong_offset() {
        let report = check_consistency("America/Los_Angeles", "EST5EDT,M3.2.0,M11.1.0", 2025).unwrap();
        assert!(!report.is_consistent());
        assert_eq!(report.mismatches.len(), report.checked);
        let first = report.mismatches[0];
        assert_eq!(first.iana_offset, -8 * 3600);
        assert_eq!(first.posix_offset, -5 * 3600);
    }

    #[test]
    fn test_consistency_detects_wrong_rule_dates() {
        // EU rules with Pacific offsets: wrong only around the transitions.
        let report = check_consistency("America/Los_Angeles", "PST8PDT,M3.5.0,M10.5.0", 2025).unwrap();
        assert!(!report.is_consistent());
        assert!(report.mismatches.len() < report.checked / 2);
    }

    #[test]
    fn test_consistency_rejects_missing_dst() {
        let report = check_consistency("America/Los_Angeles", "PST8", 2025).unwrap();
        assert!(!report.is_consistent());
        assert!(report
            .mismatches
            .iter()
            .all(|m| m.iana_offset == -7 * 3600 && m.posix_offset == -8 * 3600));
    }

    #[test]
    fn test_iana_transitions_found_to_the_second() {
        let tz = resolve("America/Los_Angeles").unwrap();
        let changes = iana_transitions(&tz, 2025).unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].at.to_rfc3339(), "2025-03-09T10:00:00+00:00");
        assert_eq!(changes[0].before, -8 * 3600);
        assert_eq!(changes[0].after, -7 * 3600);
        assert_eq!(changes[1].at.to_rfc3339(), "2025-11-02T09:00:00+00:00");
    }

    #[test]
    fn test_format_utc_offset() {
        assert_eq!(format_utc_offset(-7 * 3600), "UTC-07:00");
        assert_eq!(format_utc_offset(19_800), "UTC+05:30");
        assert_eq!(format_utc_offset(0), "UTC+00:00");
    }
}
