//! # POSIX TZ Strings
//!
//! Parser and evaluator for the `TZ` environment variable format used by the
//! firmware's `setenv("TZ", TIMEZONE_POSIX)` / `tzset()` call:
//!
//! ```text
//! std offset [dst [offset] [,start[/time],end[/time]]]
//! ```
//!
//! - `std` / `dst`: three or more letters, or `<...>` quoted (`<+0530>`)
//! - `offset`: `[+-]hh[:mm[:ss]]`, positive **west** of Greenwich
//! - `start` / `end`: `Jn` (1-365, Feb 29 never counted), `n` (0-365),
//!   or `Mm.w.d` (month, week 1-5 where 5 is "last", weekday 0 = Sunday)
//! - `time`: local wall-clock time of the change, default `02:00:00`,
//!   may be negative or exceed 24h (up to ±167h)
//!
//! A DST name without rules falls back to the US rules `M3.2.0,M11.1.0`, the
//! same default glibc applies.
//!
//! All offsets exposed by this module are **seconds east of UTC** (the chrono
//! convention); the inverted POSIX sign only appears in the text form.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default transition time: 02:00 local.
const DEFAULT_TIME: i32 = 2 * 3600;

/// Largest hour value allowed in a rule time.
const MAX_RULE_HOURS: i32 = 167;

/// Errors produced while parsing a POSIX TZ string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PosixTzError {
    #[error("empty TZ string")]
    Empty,

    #[error("expected {expected} at byte {pos}")]
    Expected { expected: &'static str, pos: usize },

    #[error("{what} out of range at byte {pos}")]
    OutOfRange { what: &'static str, pos: usize },

    #[error("unexpected trailing input at byte {pos}")]
    Trailing { pos: usize },
}

/// Day on which a transition happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuleDate {
    /// `Jn`: day 1-365, February 29 is never counted.
    Julian1(u16),
    /// `n`: zero-based day 0-365, February 29 counted.
    Julian0(u16),
    /// `Mm.w.d`: weekday `weekday` of week `week` in `month`; week 5 is the last.
    MonthWeekDay { month: u8, week: u8, weekday: u8 },
}

/// A transition: a day plus a local time in seconds after midnight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub date: RuleDate,
    pub time: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct DstRule {
    name: String,
    utc_offset: i32,
    start: Transition,
    end: Transition,
}

/// A parsed POSIX TZ rule.
///
/// # Example
/// ```
/// use chrono::{TimeZone, Utc};
/// use tide_station_lib::posix_tz::PosixTz;
///
/// let tz: PosixTz = "PST8PDT,M3.2.0,M11.1.0".parse().unwrap();
/// let winter = Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap();
/// let summer = Utc.with_ymd_and_hms(2025, 7, 15, 12, 0, 0).unwrap();
///
/// assert_eq!(tz.utc_offset_at(winter), -8 * 3600);
/// assert_eq!(tz.utc_offset_at(summer), -7 * 3600);
/// assert_eq!(tz.abbreviation_at(summer), "PDT");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PosixTz {
    std_name: String,
    std_offset: i32,
    dst: Option<DstRule>,
}

impl PosixTz {
    /// Parse a POSIX TZ string.
    pub fn parse(input: &str) -> Result<Self, PosixTzError> {
        if input.is_empty() {
            return Err(PosixTzError::Empty);
        }
        let mut p = Parser::new(input);
        let std_name = p.name()?;
        let std_offset = -p.offset(24, "UTC offset")?;

        if p.at_end() {
            return Ok(Self::fixed(std_name, std_offset));
        }

        let dst_name = p.name()?;
        let dst_offset = if p.at_end() || p.peek() == Some(b',') {
            std_offset + 3600
        } else {
            -p.offset(24, "DST offset")?
        };

        let (start, end) = if p.at_end() {
            (
                Transition {
                    date: RuleDate::MonthWeekDay { month: 3, week: 2, weekday: 0 },
                    time: DEFAULT_TIME,
                },
                Transition {
                    date: RuleDate::MonthWeekDay { month: 11, week: 1, weekday: 0 },
                    time: DEFAULT_TIME,
                },
            )
        } else {
            p.expect(b',', "','")?;
            let start = p.transition()?;
            p.expect(b',', "','")?;
            let end = p.transition()?;
            (start, end)
        };

        if !p.at_end() {
            return Err(PosixTzError::Trailing { pos: p.pos });
        }

        Ok(Self::with_dst(std_name, std_offset, dst_name, dst_offset, start, end))
    }

    /// A zone without daylight saving time. `utc_offset` is seconds east of UTC.
    pub fn fixed(name: impl Into<String>, utc_offset: i32) -> Self {
        PosixTz {
            std_name: name.into(),
            std_offset: utc_offset,
            dst: None,
        }
    }

    /// A zone with daylight saving time. Offsets are seconds east of UTC.
    pub fn with_dst(
        std_name: impl Into<String>,
        std_offset: i32,
        dst_name: impl Into<String>,
        dst_offset: i32,
        start: Transition,
        end: Transition,
    ) -> Self {
        PosixTz {
            std_name: std_name.into(),
            std_offset,
            dst: Some(DstRule {
                name: dst_name.into(),
                utc_offset: dst_offset,
                start,
                end,
            }),
        }
    }

    pub fn std_name(&self) -> &str {
        &self.std_name
    }

    /// Standard-time offset, seconds east of UTC.
    pub fn std_utc_offset(&self) -> i32 {
        self.std_offset
    }

    pub fn dst_name(&self) -> Option<&str> {
        self.dst.as_ref().map(|d| d.name.as_str())
    }

    /// Daylight-time offset, seconds east of UTC.
    pub fn dst_utc_offset(&self) -> Option<i32> {
        self.dst.as_ref().map(|d| d.utc_offset)
    }

    pub fn has_dst(&self) -> bool {
        self.dst.is_some()
    }

    /// True when daylight saving time is in effect at `instant`.
    pub fn is_dst_at(&self, instant: DateTime<Utc>) -> bool {
        let Some(dst) = &self.dst else {
            return false;
        };
        let t = instant.timestamp();

        // Rules are evaluated for the local standard-time year.
        let local_year = DateTime::from_timestamp(t + i64::from(self.std_offset), 0)
            .map(|d| d.year())
            .unwrap_or_else(|| instant.year());

        let (Some(start), Some(end)) = (
            transition_utc(&dst.start, local_year, self.std_offset),
            transition_utc(&dst.end, local_year, dst.utc_offset),
        ) else {
            return false;
        };

        if start < end {
            start <= t && t < end
        } else {
            // Southern hemisphere: DST spans the new year.
            !(end <= t && t < start)
        }
    }

    /// UTC offset in effect at `instant`, seconds east of UTC.
    pub fn utc_offset_at(&self, instant: DateTime<Utc>) -> i32 {
        match &self.dst {
            Some(dst) if self.is_dst_at(instant) => dst.utc_offset,
            _ => self.std_offset,
        }
    }

    /// Abbreviation in effect at `instant` (`PST` / `PDT`).
    pub fn abbreviation_at(&self, instant: DateTime<Utc>) -> &str {
        match &self.dst {
            Some(dst) if self.is_dst_at(instant) => &dst.name,
            _ => &self.std_name,
        }
    }
}

impl FromStr for PosixTz {
    type Err = PosixTzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PosixTz::parse(s)
    }
}

impl fmt::Display for PosixTz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_name(f, &self.std_name)?;
        write_hms(f, -self.std_offset)?;
        if let Some(dst) = &self.dst {
            write_name(f, &dst.name)?;
            if dst.utc_offset != self.std_offset + 3600 {
                write_hms(f, -dst.utc_offset)?;
            }
            for transition in [&dst.start, &dst.end] {
                f.write_str(",")?;
                match transition.date {
                    RuleDate::Julian1(n) => write!(f, "J{}", n)?,
                    RuleDate::Julian0(n) => write!(f, "{}", n)?,
                    RuleDate::MonthWeekDay { month, week, weekday } => {
                        write!(f, "M{}.{}.{}", month, week, weekday)?
                    }
                }
                if transition.time != DEFAULT_TIME {
                    f.write_str("/")?;
                    write_hms(f, transition.time)?;
                }
            }
        }
        Ok(())
    }
}

impl RuleDate {
    /// Resolve the rule to a calendar day in `year`.
    pub fn day_in(&self, year: i32) -> Option<NaiveDate> {
        match *self {
            RuleDate::Julian1(n) => {
                let leap_shift = u32::from(is_leap(year) && n >= 60);
                NaiveDate::from_yo_opt(year, u32::from(n) + leap_shift)
            }
            RuleDate::Julian0(n) => NaiveDate::from_yo_opt(year, u32::from(n) + 1)
                .or_else(|| NaiveDate::from_ymd_opt(year, 12, 31)),
            RuleDate::MonthWeekDay { month, week, weekday } => {
                let month = u32::from(month);
                let first = NaiveDate::from_ymd_opt(year, month, 1)?;
                let first_wd = first.weekday().num_days_from_sunday();
                let mut day = 1 + (u32::from(weekday) + 7 - first_wd) % 7 + (u32::from(week) - 1) * 7;
                let dim = days_in_month(year, month)?;
                while day > dim {
                    day -= 7;
                }
                NaiveDate::from_ymd_opt(year, month, day)
            }
        }
    }
}

/// Days in `month` of `year`.
pub(crate) fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some(next.signed_duration_since(first).num_days() as u32)
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Unix time of a transition whose local time is measured in `offset_before`.
fn transition_utc(transition: &Transition, year: i32, offset_before: i32) -> Option<i64> {
    let day = transition.date.day_in(year)?;
    let midnight = day.and_hms_opt(0, 0, 0)?.and_utc().timestamp();
    Some(midnight + i64::from(transition.time) - i64::from(offset_before))
}

fn write_name(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if name.chars().all(|c| c.is_ascii_alphabetic()) {
        f.write_str(name)
    } else {
        write!(f, "<{}>", name)
    }
}

/// `[-]h[:mm[:ss]]` with the shortest exact form.
fn write_hms(f: &mut fmt::Formatter<'_>, seconds: i32) -> fmt::Result {
    if seconds < 0 {
        f.write_str("-")?;
    }
    let s = seconds.unsigned_abs();
    let (h, m, sec) = (s / 3600, (s / 60) % 60, s % 60);
    write!(f, "{}", h)?;
    if m != 0 || sec != 0 {
        write!(f, ":{:02}", m)?;
    }
    if sec != 0 {
        write!(f, ":{:02}", sec)?;
    }
    Ok(())
}

/// Byte-level cursor over the TZ string.
struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Parser {
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8, expected: &'static str) -> Result<(), PosixTzError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(PosixTzError::Expected { expected, pos: self.pos })
        }
    }

    fn name(&mut self) -> Result<String, PosixTzError> {
        let start = self.pos;
        if self.peek() == Some(b'<') {
            self.pos += 1;
            let inner = self.pos;
            while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'+' || b == b'-')
            {
                self.pos += 1;
            }
            let name = &self.bytes[inner..self.pos];
            self.expect(b'>', "'>'")?;
            if name.len() < 3 {
                return Err(PosixTzError::Expected {
                    expected: "zone name of at least 3 characters",
                    pos: start,
                });
            }
            return Ok(String::from_utf8_lossy(name).into_owned());
        }

        while matches!(self.peek(), Some(b) if b.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        if self.pos - start < 3 {
            return Err(PosixTzError::Expected {
                expected: "zone name of at least 3 letters",
                pos: start,
            });
        }
        Ok(String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned())
    }

    fn number(&mut self, max_digits: usize, expected: &'static str) -> Result<i32, PosixTzError> {
        let start = self.pos;
        while self.pos - start < max_digits && matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(PosixTzError::Expected { expected, pos: start });
        }
        Ok(self.bytes[start..self.pos]
            .iter()
            .fold(0, |acc, b| acc * 10 + i32::from(b - b'0')))
    }

    /// `[+-]hh[:mm[:ss]]` in seconds, sign as written.
    fn offset(&mut self, max_hours: i32, what: &'static str) -> Result<i32, PosixTzError> {
        let start = self.pos;
        let sign = match self.peek() {
            Some(b'-') => {
                self.pos += 1;
                -1
            }
            Some(b'+') => {
                self.pos += 1;
                1
            }
            _ => 1,
        };
        let hours = self.number(3, "hours")?;
        if hours > max_hours {
            return Err(PosixTzError::OutOfRange { what, pos: start });
        }
        let mut seconds = hours * 3600;
        for scale in [60, 1] {
            if self.peek() != Some(b':') {
                break;
            }
            self.pos += 1;
            let value = self.number(2, "minutes or seconds")?;
            if value > 59 {
                return Err(PosixTzError::OutOfRange { what, pos: start });
            }
            seconds += value * scale;
        }
        Ok(sign * seconds)
    }

    fn transition(&mut self) -> Result<Transition, PosixTzError> {
        let date = self.rule_date()?;
        let time = if self.peek() == Some(b'/') {
            self.pos += 1;
            self.offset(MAX_RULE_HOURS, "transition time")?
        } else {
            DEFAULT_TIME
        };
        Ok(Transition { date, time })
    }

    fn rule_date(&mut self) -> Result<RuleDate, PosixTzError> {
        let start = self.pos;
        match self.peek() {
            Some(b'J') => {
                self.pos += 1;
                let n = self.number(3, "Julian day")?;
                if !(1..=365).contains(&n) {
                    return Err(PosixTzError::OutOfRange { what: "Julian day", pos: start });
                }
                Ok(RuleDate::Julian1(n as u16))
            }
            Some(b'M') => {
                self.pos += 1;
                let month = self.number(2, "month")?;
                self.expect(b'.', "'.'")?;
                let week = self.number(1, "week")?;
                self.expect(b'.', "'.'")?;
                let weekday = self.number(1, "weekday")?;
                if !(1..=12).contains(&month) || !(1..=5).contains(&week) || weekday > 6 {
                    return Err(PosixTzError::OutOfRange { what: "Mm.w.d rule", pos: start });
                }
                Ok(RuleDate::MonthWeekDay {
                    month: month as u8,
                    week: week as u8,
                    weekday: weekday as u8,
                })
            }
            Some(b) if b.is_ascii_digit() => {
                let n = self.number(3, "day of year")?;
                if n > 365 {
                    return Err(PosixTzError::OutOfRange { what: "day of year", pos: start });
                }
                Ok(RuleDate::Julian0(n as u16))
            }
            _ => Err(PosixTzError::Expected {
                expected: "transition date (Jn, n or Mm.w.d)",
                pos: start,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_fixed_zone() {
        let tz = PosixTz::parse("UTC0").unwrap();
        assert!(!tz.has_dst());
        assert_eq!(tz.utc_offset_at(utc(2025, 6, 1, 0, 0)), 0);
        assert_eq!(tz.to_string(), "UTC0");
    }

    #[test]
    fn test_quoted_name_and_minutes() {
        let tz = PosixTz::parse("<+0530>-5:30").unwrap();
        assert_eq!(tz.std_name(), "+0530");
        assert_eq!(tz.std_utc_offset(), 5 * 3600 + 30 * 60);
        assert_eq!(tz.to_string(), "<+0530>-5:30");
    }

    #[test]
    fn test_us_pacific_transitions_2025() {
        let tz = PosixTz::parse("PST8PDT,M3.2.0,M11.1.0").unwrap();

        // DST starts 2025-03-09 02:00 PST = 10:00 UTC.
        assert_eq!(tz.utc_offset_at(utc(2025, 3, 9, 9, 59)), -8 * 3600);
        assert_eq!(tz.utc_offset_at(utc(2025, 3, 9, 10, 0)), -7 * 3600);

        // DST ends 2025-11-02 02:00 PDT = 09:00 UTC.
        assert_eq!(tz.utc_offset_at(utc(2025, 11, 2, 8, 59)), -7 * 3600);
        assert_eq!(tz.utc_offset_at(utc(2025, 11, 2, 9, 0)), -8 * 3600);
    }

    #[test]
    fn test_default_rules_when_omitted() {
        let tz = PosixTz::parse("EST5EDT").unwrap();
        assert_eq!(tz.dst_utc_offset(), Some(-4 * 3600));
        assert_eq!(tz.to_string(), "EST5EDT,M3.2.0,M11.1.0");
        assert!(tz.is_dst_at(utc(2025, 7, 1, 12, 0)));
    }

    #[test]
    fn test_southern_hemisphere() {
        let tz = PosixTz::parse("AEST-10AEDT,M10.1.0,M4.1.0/3").unwrap();
        assert_eq!(tz.utc_offset_at(utc(2025, 1, 15, 0, 0)), 11 * 3600);
        assert_eq!(tz.utc_offset_at(utc(2025, 7, 15, 0, 0)), 10 * 3600);
        assert_eq!(tz.utc_offset_at(utc(2025, 12, 15, 0, 0)), 11 * 3600);
        assert_eq!(tz.abbreviation_at(utc(2025, 7, 15, 0, 0)), "AEST");
    }

    #[test]
    fn test_last_week_rule_eu() {
        let tz = PosixTz::parse("CET-1CEST,M3.5.0,M10.5.0/3").unwrap();
        // 2025-03-30 is the last Sunday of March; change at 01:00 UTC.
        assert_eq!(tz.utc_offset_at(utc(2025, 3, 30, 0, 59)), 3600);
        assert_eq!(tz.utc_offset_at(utc(2025, 3, 30, 1, 0)), 7200);
        assert_eq!(tz.to_string(), "CET-1CEST,M3.5.0,M10.5.0/3");
    }

    #[test]
    fn test_julian_dates() {
        assert_eq!(
            RuleDate::Julian1(60).day_in(2024),
            NaiveDate::from_ymd_opt(2024, 3, 1)
        );
        assert_eq!(
            RuleDate::Julian1(59).day_in(2024),
            NaiveDate::from_ymd_opt(2024, 2, 28)
        );
        assert_eq!(
            RuleDate::Julian0(59).day_in(2024),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            RuleDate::Julian0(365).day_in(2025),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
    }

    #[test]
    fn test_permanent_dst_rule() {
        let tz = PosixTz::parse("EST5EDT,0/0,J365/25").unwrap();
        assert_eq!(tz.utc_offset_at(utc(2025, 1, 1, 12, 0)), -4 * 3600);
        assert_eq!(tz.utc_offset_at(utc(2025, 12, 31, 12, 0)), -4 * 3600);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(PosixTz::parse(""), Err(PosixTzError::Empty));
        assert!(matches!(
            PosixTz::parse("PS8"),
            Err(PosixTzError::Expected { pos: 0, .. })
        ));
        assert!(matches!(
            PosixTz::parse("PST"),
            Err(PosixTzError::Expected { expected: "hours", pos: 3 })
        ));
        assert!(matches!(
            PosixTz::parse("PST25"),
            Err(PosixTzError::OutOfRange { .. })
        ));
        assert!(matches!(
            PosixTz::parse("PST8PDT,M13.2.0,M11.1.0"),
            Err(PosixTzError::OutOfRange { .. })
        ));
        assert!(matches!(
            PosixTz::parse("PST8PDT,M3.2.0"),
            Err(PosixTzError::Expected { expected: "','", .. })
        ));
        assert!(matches!(
            PosixTz::parse("PST8PDT,M3.2.0,M11.1.0x"),
            Err(PosixTzError::Trailing { .. })
        ));
    }
}
