//! Field extraction from a single log line
//!
//! Supports Android logcat lines (`MM-DD HH:MM:SS.fff PID TID L TAG : msg`),
//! dated lines (`YYYY-MM-DD HH:MM:SS.fff ...`), time-of-day lines (`H:MM:SS.fff`)
//! and CAN trace exports whose first column is relative seconds. Lines pasted
//! into bug comments may carry a `Line N:` prefix.

use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;

/// Year used for logcat timestamps, which carry no year (leap year so 02-29 parses)
const LOGCAT_YEAR: i32 = 2000;

static LINE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Line\s+(\d+)\s*:\s*").unwrap());

static DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(\d{4})-)?(\d{1,2})-(\d{1,2})[ T]+(\d{1,2}):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap()
});

static TIME_OF_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d{1,2}):(\d{1,2}):(\d{1,2}(?:\.\d+)?)").unwrap());

static RELATIVE_SECONDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)(?:\s|$)").unwrap());

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

static KEYED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:int32Values|int64Values|floatValues|valOfGroup|values?|val)\b\s*[:=]?\s*\[?\s*(-?\d+(?:\.\d+)?)",
    )
    .unwrap()
});

static ASSIGNED_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[=:]\s*(-?\d+(?:\.\d+)?)\b").unwrap());

static METADATA_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:AreaID|halAreaId|Status|propertyId|halPropertyId|car_type)\b\s*[:=]?\s*-?\d+")
        .unwrap()
});

static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[\s(\[,])(-?\d+(?:\.\d+)?)(?:$|[\s)\],;])").unwrap());

static STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bStatus\s*:\s*(-?\d+)").unwrap());

/// Strip an optional `Line N:` prefix, returning the explicit line number if present
pub fn strip_line_prefix(line: &str) -> (&str, Option<usize>) {
    match LINE_PREFIX.captures(line) {
        Some(caps) => {
            let number = caps[1].parse().ok();
            (&line[caps[0].len()..], number)
        }
        None => (line, None),
    }
}

/// Parse the leading timestamp into seconds
pub fn parse_timestamp(line: &str) -> Option<f64> {
    if let Some(caps) = DATE_TIME.captures(line) {
        let year = caps
            .get(1)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(LOGCAT_YEAR);
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        let hour: u32 = caps[4].parse().ok()?;
        let minute: u32 = caps[5].parse().ok()?;
        let seconds: f64 = caps[6].parse().ok()?;

        let whole = seconds.trunc() as u32;
        let micros = ((seconds - seconds.trunc()) * 1_000_000.0).round() as u32;
        let datetime = NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_micro_opt(hour, minute, whole, micros.min(999_999))?;
        return Some(datetime.and_utc().timestamp_micros() as f64 / 1_000_000.0);
    }

    if let Some(caps) = TIME_OF_DAY.captures(line) {
        let hour: f64 = caps[1].parse().ok()?;
        let minute: f64 = caps[2].parse().ok()?;
        let seconds: f64 = caps[3].parse().ok()?;
        if minute >= 60.0 || seconds >= 61.0 {
            return None;
        }
        return Some(hour * 3600.0 + minute * 60.0 + seconds);
    }

    RELATIVE_SECONDS
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
}

/// Find the first identifier token accepted by `is_name`, returning it and its end offset
pub fn find_name<'a, F>(line: &'a str, mut is_name: F) -> Option<(&'a str, usize)>
where
    F: FnMut(&str) -> bool,
{
    IDENTIFIER
        .find_iter(line)
        .find(|m| is_name(m.as_str()))
        .map(|m| (m.as_str(), m.end()))
}

/// Parse the signal value that follows the signal name
pub fn parse_value(after_name: &str) -> Option<f64> {
    if let Some(caps) = KEYED_VALUE.captures(after_name) {
        return caps[1].parse().ok();
    }

    let without_metadata = METADATA_PAIR.replace_all(after_name, " ");
    if let Some(caps) = ASSIGNED_VALUE.captures(&without_metadata) {
        return caps[1].parse().ok();
    }

    BARE_NUMBER
        .captures(&without_metadata)
        .and_then(|caps| caps[1].parse().ok())
}

/// Parse a `Status: n` field
pub fn parse_status(line: &str) -> Option<i64> {
    STATUS.captures(line).and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_line_prefix() {
        let (rest, number) = strip_line_prefix("Line 167393: 01-14 08:55:49.864  1525  1683 D GMVHAL");
        assert_eq!(number, Some(167393));
        assert!(rest.starts_with("01-14"));

        let (rest, number) = strip_line_prefix("01-14 08:55:49.864");
        assert_eq!(number, None);
        assert_eq!(rest, "01-14 08:55:49.864");
    }

    #[test]
    fn test_logcat_timestamp() {
        let a = parse_timestamp("01-14 08:55:49.864  1525  1683 D GMVHAL  : x").unwrap();
        let b = parse_timestamp("01-14 08:55:50.100  1525  1683 D GMVHAL  : x").unwrap();
        assert!((b - a - 0.236).abs() < 1e-6);
    }

    #[test]
    fn test_dated_timestamp_crosses_midnight() {
        let a = parse_timestamp("2025-07-24 23:59:59.900 2631 29579 I ACM : x").unwrap();
        let b = parse_timestamp("2025-07-25 00:00:00.100 2631 29579 I ACM : x").unwrap();
        assert!((b - a - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_time_of_day_and_relative() {
        assert_eq!(parse_timestamp("0:1:1.500 ICC_SetCLMOn 1"), Some(61.5));
        assert_eq!(parse_timestamp("  12.345 CAN1 Rx TMS_CLMSts 1"), Some(12.345));
        assert_eq!(parse_timestamp("garbage line"), None);
        assert_eq!(parse_timestamp("13-45 08:55:49.864 bad month"), None);
    }

    #[test]
    fn test_find_name_is_token_exact() {
        let names = ["FOO_BAR"];
        let line = "vhal_set Property: VendorProperty::FOO_BAR_BAZ AreaID: 0";
        assert!(find_name(line, |t| names.contains(&t)).is_none());

        let line = "vhal_set Property: VendorProperty::FOO_BAR AreaID: 0";
        let (name, end) = find_name(line, |t| names.contains(&t)).unwrap();
        assert_eq!(name, "FOO_BAR");
        assert_eq!(&line[end..], " AreaID: 0");
    }

    #[test]
    fn test_parse_value_variants() {
        assert_eq!(parse_value(" AreaID: 16777216 Status: 0 int32Values: 2"), Some(2.0));
        assert_eq!(parse_value(" AreaID: 16777216 Status: 0 floatValues: [21.5]"), Some(21.5));
        assert_eq!(parse_value(" value 1 halPropertyId: 557843466 halAreaId 0"), Some(1.0));
        assert_eq!(parse_value(" = -3"), Some(-3.0));
        assert_eq!(parse_value(" 1"), Some(1.0));
        assert_eq!(parse_value(" AreaID: 16777216 Status: 0"), None);
        assert_eq!(parse_value(" no value here"), None);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status("Property: X AreaID: 1 Status: 2 int32Values: 0"), Some(2));
        assert_eq!(parse_status("Property: X int32Values: 0"), None);
    }
}
