//! Timestamp normalizer for publication dates found in feeds.
//!
//! Feeds put almost anything in `<pubDate>`, `<published>` and `<updated>`.
//! [`parse_timestamp`] tries a fixed list of layouts in order and returns the
//! first match converted to UTC. It never substitutes a default; callers pick
//! their own fallback (see `feed::parser`).

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,

    #[error("unrecognized timestamp format: {0:?}")]
    Unrecognized(String),
}

/// A supported timestamp layout, in the order [`parse_timestamp`] tries them.
///
/// Order matters: several layouts accept prefixes or subsets of others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `2006-01-02T15:04:05Z07:00`
    Rfc3339,
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123,
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Z,
    /// `Mon, 02 Jan 2006 15:04:05 GMT`
    Rfc1123Gmt,
    /// `Monday, 02 Jan 2006 15:04:05 -07:00`
    LongWeekdayColonZone,
    /// `2006-01-02T15:04:05Z`
    IsoUtc,
    /// `2006-01-02T15:04:05`, taken as UTC
    IsoNaive,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Z,
    /// `02 Jan 2006 15:04:05 -0700`
    NoWeekdayNumericZone,
    /// `2006-01-02`, midnight UTC
    DateOnly,
}

impl Layout {
    pub const ALL: [Layout; 10] = [
        Layout::Rfc3339,
        Layout::Rfc1123,
        Layout::Rfc1123Z,
        Layout::Rfc1123Gmt,
        Layout::LongWeekdayColonZone,
        Layout::IsoUtc,
        Layout::IsoNaive,
        Layout::Rfc822Z,
        Layout::NoWeekdayNumericZone,
        Layout::DateOnly,
    ];

    /// Parses already-trimmed input against this single layout.
    pub fn parse(self, s: &str) -> Option<DateTime<Utc>> {
        match self {
            Layout::Rfc3339 => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Layout::Rfc1123 => {
                let rest = strip_weekday(s, SHORT_WEEKDAYS)?;
                let (clock, zone) = rest.rsplit_once(' ')?;
                with_offset(naive(clock, DAY_MONTH_YEAR_TIME)?, alpha_zone(zone)?)
            }
            Layout::Rfc1123Z => {
                let rest = strip_weekday(s, SHORT_WEEKDAYS)?;
                let (clock, zone) = rest.rsplit_once(' ')?;
                with_offset(naive(clock, DAY_MONTH_YEAR_TIME)?, numeric_zone(zone, false)?)
            }
            Layout::Rfc1123Gmt => {
                let rest = strip_weekday(s, SHORT_WEEKDAYS)?;
                let clock = rest.strip_suffix(" GMT")?;
                Some(Utc.from_utc_datetime(&naive(clock, DAY_MONTH_YEAR_TIME)?))
            }
            Layout::LongWeekdayColonZone => {
                let rest = strip_weekday(s, LONG_WEEKDAYS)?;
                let (clock, zone) = rest.rsplit_once(' ')?;
                with_offset(naive(clock, DAY_MONTH_YEAR_TIME)?, numeric_zone(zone, true)?)
            }
            Layout::IsoUtc => {
                let clock = s.strip_suffix('Z')?;
                Some(Utc.from_utc_datetime(&naive(clock, ISO_TIME)?))
            }
            Layout::IsoNaive => Some(Utc.from_utc_datetime(&naive(s, ISO_TIME)?)),
            Layout::Rfc822Z => {
                let (clock, zone) = s.rsplit_once(' ')?;
                with_offset(naive(clock, "%d %b %y %H:%M")?, numeric_zone(zone, false)?)
            }
            Layout::NoWeekdayNumericZone => {
                let (clock, zone) = s.rsplit_once(' ')?;
                with_offset(naive(clock, DAY_MONTH_YEAR_TIME)?, numeric_zone(zone, false)?)
            }
            Layout::DateOnly => {
                let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
                Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
            }
        }
    }
}

const DAY_MONTH_YEAR_TIME: &str = "%d %b %Y %H:%M:%S%.f";
const ISO_TIME: &str = "%Y-%m-%dT%H:%M:%S%.f";

const SHORT_WEEKDAYS: &[&str] = &["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
const LONG_WEEKDAYS: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Parses a publication timestamp into UTC.
///
/// Input is trimmed first. Tries every [`Layout`] in [`Layout::ALL`] order and
/// returns the first success.
///
/// # Errors
///
/// [`TimestampError::Empty`] for blank input, [`TimestampError::Unrecognized`]
/// when no layout matches.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use feedmill::feed::parse_timestamp;
///
/// let ts = parse_timestamp("2023-01-15T10:00:00Z").unwrap();
/// assert_eq!(ts, Utc.with_ymd_and_hms(2023, 1, 15, 10, 0, 0).unwrap());
/// assert!(parse_timestamp("not a date").is_err());
/// ```
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(TimestampError::Empty);
    }

    Layout::ALL
        .iter()
        .find_map(|layout| layout.parse(s))
        .ok_or_else(|| TimestampError::Unrecognized(s.to_string()))
}

/// Removes a leading `"<weekday>, "` if the weekday is one of `names`.
///
/// Only the name is checked, not whether it agrees with the date.
fn strip_weekday<'a>(s: &'a str, names: &[&str]) -> Option<&'a str> {
    let (day, rest) = s.split_once(", ")?;
    names
        .iter()
        .any(|name| name.eq_ignore_ascii_case(day))
        .then_some(rest)
}

fn naive(s: &str, fmt: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, fmt).ok()
}

fn with_offset(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses `-0700` or, when `colon` is set, `-07:00`.
fn numeric_zone(zone: &str, colon: bool) -> Option<FixedOffset> {
    let sign = match zone.as_bytes().first()? {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let digits = &zone[1..];
    let (hours, minutes) = if colon {
        digits.split_once(':')?
    } else {
        (digits.get(..2)?, digits.get(2..)?)
    };
    if hours.len() != 2 || minutes.len() != 2 {
        return None;
    }
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Maps an alphabetic zone abbreviation to an offset.
///
/// Abbreviations outside the RFC 822 set are treated as UTC.
fn alpha_zone(zone: &str) -> Option<FixedOffset> {
    if zone.is_empty() || !zone.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let hours = match zone.to_ascii_uppercase().as_str() {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        _ if (3..=5).contains(&zone.len()) => 0,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn layout_of(s: &str) -> Option<Layout> {
        Layout::ALL.into_iter().find(|l| l.parse(s).is_some())
    }

    #[test]
    fn test_parse_rfc3339_utc() {
        assert_eq!(
            parse_timestamp("2023-01-15T10:00:00Z").unwrap(),
            utc(2023, 1, 15, 10, 0, 0)
        );
    }

    #[test]
    fn test_parse_rfc3339_with_offset_and_fraction() {
        assert_eq!(
            parse_timestamp("2023-01-15T12:30:00.250+02:30").unwrap(),
            utc(2023, 1, 15, 10, 0, 0) + chrono::Duration::milliseconds(250)
        );
    }

    #[test]
    fn test_parse_empty_and_blank() {
        assert_eq!(parse_timestamp(""), Err(TimestampError::Empty));
        assert_eq!(parse_timestamp("  \t\n"), Err(TimestampError::Empty));
    }

    #[test]
    fn test_parse_garbage() {
        assert_eq!(
            parse_timestamp(" not a date "),
            Err(TimestampError::Unrecognized("not a date".to_string()))
        );
        assert!(parse_timestamp("2023-13-45").is_err());
        assert!(parse_timestamp("Mon, 32 Jan 2006 15:04:05 GMT").is_err());
    }

    #[test]
    fn test_parse_rfc1123_named_zones() {
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 GMT").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 EST").unwrap(),
            utc(2006, 1, 2, 20, 4, 5)
        );
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 PDT").unwrap(),
            utc(2006, 1, 2, 22, 4, 5)
        );
        // Unknown abbreviation is taken as UTC.
        assert_eq!(
            parse_timestamp("Mon, 02 Jan 2006 15:04:05 CEST").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
    }

    #[test]
    fn test_parse_rfc1123_numeric_zone() {
        assert_eq!(
            parse_timestamp("Tue, 10 Jun 2003 04:00:00 +0200").unwrap(),
            utc(2003, 6, 10, 2, 0, 0)
        );
        assert_eq!(
            layout_of("Tue, 10 Jun 2003 04:00:00 +0200"),
            Some(Layout::Rfc1123Z)
        );
    }

    #[test]
    fn test_weekday_name_checked_but_not_date() {
        // 2 Jan 2006 was a Monday; the name alone is validated.
        assert_eq!(
            parse_timestamp("Fri, 02 Jan 2006 15:04:05 +0000").unwrap(),
            utc(2006, 1, 2, 15, 4, 5)
        );
        assert!(parse_timestamp("Xyz, 02 Jan 2006 15:04:05 +0000").is_err());
    }

    #[test]
    fn test_parse_long_weekday_colon_zone() {
        let s = "Monday, 02 Jan 2006 15:04:05 -07:00";
        assert_eq!(parse_timestamp(s).unwrap(), utc(2006, 1, 2, 22, 4, 5));
        assert_eq!(layout_of(s), Some(Layout::LongWeekdayColonZone));
    }

    #[test]
    fn test_parse_iso_without_zone() {
        let s = "2024-03-01T08:15:30";
        assert_eq!(parse_timestamp(s).unwrap(), utc(2024, 3, 1, 8, 15, 30));
        assert_eq!(layout_of(s), Some(Layout::IsoNaive));
    }

    #[test]
    fn test_rfc3339_wins_over_iso_utc() {
        assert_eq!(layout_of("2024-03-01T08:15:30Z"), Some(Layout::Rfc3339));
        assert!(Layout::IsoUtc.parse("2024-03-01T08:15:30Z").is_some());
    }

    #[test]
    fn test_parse_rfc822_two_digit_year() {
        let s = "02 Jan 06 15:04 -0700";
        assert_eq!(parse_timestamp(s).unwrap(), utc(2006, 1, 2, 22, 4, 0));
        assert_eq!(layout_of(s), Some(Layout::Rfc822Z));
    }

    #[test]
    fn test_parse_without_weekday() {
        let s = "02 Jan 2006 15:04:05 -0700";
        assert_eq!(parse_timestamp(s).unwrap(), utc(2006, 1, 2, 22, 4, 5));
        assert_eq!(layout_of(s), Some(Layout::NoWeekdayNumericZone));
    }

    #[test]
    fn test_parse_date_only() {
        assert_eq!(
            parse_timestamp("2021-07-04").unwrap(),
            utc(2021, 7, 4, 0, 0, 0)
        );
    }

    #[test]
    fn test_input_is_trimmed() {
        assert_eq!(
            parse_timestamp("\n   2021-07-04  ").unwrap(),
            utc(2021, 7, 4, 0, 0, 0)
        );
    }

    #[test]
    fn test_numeric_zone_rejects_malformed() {
        assert!(numeric_zone("0700", false).is_none());
        assert!(numeric_zone("+07:00", false).is_none());
        assert!(numeric_zone("+0700", true).is_none());
        assert!(numeric_zone("+0790", false).is_none());
        assert_eq!(
            numeric_zone("-0530", false),
            FixedOffset::west_opt(5 * 3600 + 30 * 60)
        );
    }

    #[test]
    fn test_layout_order_is_fixed() {
        assert_eq!(Layout::ALL.first(), Some(&Layout::Rfc3339));
        assert_eq!(Layout::ALL.last(), Some(&Layout::DateOnly));
    }
}
