use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete as nomchar;
use nom::combinator::{map, map_opt, opt, value};
use nom::sequence::{pair, tuple};
use nom::IResult;

use crate::filter::{DATE_FMT, FLOATING_DATETIME_FMT, UTC_DATETIME_FMT};

/// Parse a DATE or DATE-TIME value.
///
/// Floating and TZID-qualified values are read as if they were UTC,
/// DATE values resolve to midnight UTC.
pub fn date_time(dt: &str) -> Option<DateTime<Utc>> {
    tracing::trace!(raw_time = dt, "raw ical time");
    if is_date(dt) {
        return NaiveDate::parse_from_str(dt, DATE_FMT)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|v| v.and_utc());
    }

    let tmpl = match dt.chars().last() {
        Some('Z') => UTC_DATETIME_FMT,
        Some(_) => {
            tracing::trace!(raw_time = dt, "floating datetime read as UTC");
            FLOATING_DATETIME_FMT
        }
        None => return None,
    };

    NaiveDateTime::parse_from_str(dt, tmpl)
        .ok()
        .map(|v| v.and_utc())
}

/// A DATE value is exactly 8 digits, a DATE-TIME always carries a 'T'
pub fn is_date(dt: &str) -> bool {
    dt.len() == 8 && dt.bytes().all(|b| b.is_ascii_digit())
}

/// RFC5545 Period of Time, either explicit or start + duration
///
/// ```abnf
/// period     = period-explicit / period-start
/// period-explicit = date-time "/" date-time
/// period-start = date-time "/" dur-value
/// ```
pub fn period(text: &str) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let (start, rest) = text.split_once('/')?;
    let start = date_time(start)?;
    let end = match rest.chars().next() {
        Some('P') | Some('p') | Some('+') | Some('-') => {
            let (_, delta) = dur_value(rest).ok()?;
            start.checked_add_signed(delta)?
        }
        _ => date_time(rest)?,
    };
    Some((start, end))
}

/// RFC5545 TEXT unescaping: `\\`, `\;`, `\,`, `\n` and `\N`
pub fn unescape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// RFC3389 Duration Value
///
/// ```abnf
/// dur-value  = (["+"] / "-") "P" (dur-date / dur-time / dur-week)
/// dur-date   = dur-day [dur-time]
/// dur-time   = "T" (dur-hour / dur-minute / dur-second)
/// dur-week   = 1*DIGIT "W"
/// dur-hour   = 1*DIGIT "H" [dur-minute]
/// dur-minute = 1*DIGIT "M" [dur-second]
/// dur-second = 1*DIGIT "S"
/// dur-day    = 1*DIGIT "D"
/// ```
pub fn dur_value(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((
            dur_sign,
            tag_no_case("P"),
            alt((dur_date, dur_time, dur_week)),
        )),
        |(sign, _, delta)| delta.checked_mul(sign),
    )(text)
}

fn dur_sign(text: &str) -> IResult<&str, i32> {
    map(opt(alt((value(1, tag("+")), value(-1, tag("-"))))), |x| {
        x.unwrap_or(1)
    })(text)
}
fn dur_date(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(pair(dur_day, opt(dur_time)), |(day, time)| {
        day.checked_add(&time.unwrap_or(TimeDelta::zero()))
    })(text)
}
fn dur_time(text: &str) -> IResult<&str, TimeDelta> {
    map(
        pair(tag_no_case("T"), alt((dur_hour, dur_minute, dur_second))),
        |(_, x)| x,
    )(text)
}
fn dur_week(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(pair(nomchar::i64, tag_no_case("W")), |(i, _)| {
        TimeDelta::try_weeks(i)
    })(text)
}
fn dur_day(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(pair(nomchar::i64, tag_no_case("D")), |(i, _)| {
        TimeDelta::try_days(i)
    })(text)
}
fn dur_hour(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((nomchar::i64, tag_no_case("H"), opt(dur_minute))),
        |(i, _, mm)| {
            TimeDelta::try_hours(i)?.checked_add(&mm.unwrap_or(TimeDelta::zero()))
        },
    )(text)
}
fn dur_minute(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(
        tuple((nomchar::i64, tag_no_case("M"), opt(dur_second))),
        |(i, _, ms)| {
            TimeDelta::try_minutes(i)?.checked_add(&ms.unwrap_or(TimeDelta::zero()))
        },
    )(text)
}
fn dur_second(text: &str) -> IResult<&str, TimeDelta> {
    map_opt(pair(nomchar::i64, tag_no_case("S")), |(i, _)| {
        TimeDelta::try_seconds(i)
    })(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc5545_example1() {
        // A duration of 15 days, 5 hours, and 20 seconds would be:
        let to_parse = "P15DT5H0M20S";
        let (_, time_delta) = dur_value(to_parse).unwrap();
        assert_eq!(
            time_delta,
            TimeDelta::try_days(15).unwrap()
                + TimeDelta::try_hours(5).unwrap()
                + TimeDelta::try_seconds(20).unwrap()
        );
    }

    #[test]
    fn rfc5545_example2() {
        // A duration of 7 weeks would be:
        let to_parse = "P7W";
        let (_, time_delta) = dur_value(to_parse).unwrap();
        assert_eq!(time_delta, TimeDelta::try_weeks(7).unwrap());
    }

    #[test]
    fn rfc4791_example1() {
        // 10 minutes before
        let to_parse = "-PT10M";

        let (_, time_delta) = dur_value(to_parse).unwrap();
        assert_eq!(time_delta, TimeDelta::try_minutes(-10).unwrap());
    }

    #[test]
    fn overflowing_durations_are_rejected() {
        assert!(dur_value("P100000000D").is_ok());
        assert!(dur_value("P106751991167DT8H").is_err());
        assert!(dur_value("PT9223372036854775807H").is_err());
    }

    #[test]
    fn date_and_datetime() {
        assert_eq!(
            date_time("20060104T140000Z"),
            Some(Utc.with_ymd_and_hms(2006, 1, 4, 14, 0, 0).unwrap())
        );
        assert_eq!(
            date_time("20060104T140000"),
            Some(Utc.with_ymd_and_hms(2006, 1, 4, 14, 0, 0).unwrap())
        );
        assert_eq!(
            date_time("20060104"),
            Some(Utc.with_ymd_and_hms(2006, 1, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(date_time("not a date"), None);
        assert_eq!(date_time(""), None);
    }

    #[test]
    fn freebusy_periods() {
        let explicit = period("19970308T160000Z/19970308T163000Z").unwrap();
        assert_eq!(explicit.1 - explicit.0, TimeDelta::try_minutes(30).unwrap());

        let relative = period("19970308T230000Z/PT8H30M").unwrap();
        assert_eq!(
            relative.1,
            Utc.with_ymd_and_hms(1997, 3, 9, 7, 30, 0).unwrap()
        );

        assert!(period("19970308T230000Z").is_none());
    }

    #[test]
    fn text_unescape() {
        assert_eq!(unescape_text(r"Meeting\, room 3\; floor 2"), "Meeting, room 3; floor 2");
        assert_eq!(unescape_text(r"line1\nline2"), "line1\nline2");
        assert_eq!(unescape_text(r"back\\slash"), r"back\slash");
    }
}
