//! Caller details encoded in phone-recorder file names, e.g.
//! `Call recording +15551234567_200605_114902.m4a`.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::catalog::CallerInfo;

static RE_EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.[^.]+$").unwrap());
static RE_PREFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^Call recording\s+(.+?)_(\d{6})_(\d{6})$").unwrap()
});
static RE_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)_(\d{6})_(\d{6})$").unwrap());

/// Parses a recording file name. Unrecognized names yield an empty
/// `CallerInfo`.
pub fn parse_recording_filename(file_name: &str) -> CallerInfo {
    let mut info = CallerInfo::default();
    let stem = RE_EXTENSION.replace(file_name, "");

    let Some(caps) = RE_PREFIXED
        .captures(&stem)
        .or_else(|| RE_BARE.captures(&stem))
    else {
        return info;
    };

    let identifier = caps[1].trim();
    if is_phone_number(identifier) {
        info.raw_phone = Some(identifier.to_string());
        info.phone_number = normalize_phone_number(identifier);
    } else if !identifier.is_empty() {
        info.caller_name = Some(identifier.to_string());
        info.caller_name_source = Some("filename".to_string());
    }

    info.call_datetime = parse_call_datetime(&caps[2], &caps[3]);
    info
}

/// Phone numbers start with `+` or `_`, or are mostly digits with at least
/// three of them. Anything with letters otherwise is a contact name.
pub fn is_phone_number(identifier: &str) -> bool {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return false;
    }
    if identifier.starts_with('+') || identifier.starts_with('_') {
        return true;
    }

    let total = identifier.chars().count();
    let digits = identifier.chars().filter(|c| c.is_ascii_digit()).count();
    if digits >= 3 && digits * 2 > total {
        return true;
    }
    if identifier.chars().any(char::is_alphabetic) {
        return false;
    }
    digits >= 3
}

/// Strips a leading `_`, keeps a leading `+`, drops every other non-digit.
/// Returns `None` below three digits.
pub fn normalize_phone_number(raw: &str) -> Option<String> {
    let phone = raw.trim();
    let phone = phone.strip_prefix('_').unwrap_or(phone);

    let (plus, rest) = match phone.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", phone),
    };
    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 3 {
        return None;
    }
    Some(format!("{}{}", plus, digits))
}

fn parse_call_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    let field = |s: &str, range: std::ops::Range<usize>| s.get(range)?.parse::<u32>().ok();

    let year = 2000 + field(date, 0..2)? as i32;
    let date = NaiveDate::from_ymd_opt(year, field(date, 2..4)?, field(date, 4..6)?)?;
    date.and_hms_opt(field(time, 0..2)?, field(time, 2..4)?, field(time, 4..6)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_international_number() {
        let info = parse_recording_filename("Call recording +15551234567_200605_114902.m4a");
        assert_eq!(info.phone_number.as_deref(), Some("+15551234567"));
        assert_eq!(info.raw_phone.as_deref(), Some("+15551234567"));
        assert_eq!(info.call_datetime, Some(dt(2020, 6, 5, 11, 49, 2)));
        assert!(info.caller_name.is_none());
    }

    #[test]
    fn test_short_extension_number() {
        let info = parse_recording_filename("Call recording _6900_190317_190817.m4a");
        assert_eq!(info.phone_number.as_deref(), Some("6900"));
        assert_eq!(info.raw_phone.as_deref(), Some("_6900"));
        assert_eq!(info.call_datetime, Some(dt(2019, 3, 17, 19, 8, 17)));
    }

    #[test]
    fn test_prefix_is_case_insensitive() {
        let info = parse_recording_filename("CALL RECORDING 037111121_200827_141229.M4A");
        assert_eq!(info.phone_number.as_deref(), Some("037111121"));
    }

    #[test]
    fn test_bare_pattern_without_prefix() {
        let info = parse_recording_filename("12345678_220101_120000.wav");
        assert_eq!(info.phone_number.as_deref(), Some("12345678"));
        assert_eq!(info.call_datetime, Some(dt(2022, 1, 1, 12, 0, 0)));
    }

    #[test]
    fn test_contact_name() {
        let info = parse_recording_filename("Call recording Mom Cell_210101_080000.m4a");
        assert!(info.phone_number.is_none());
        assert_eq!(info.caller_name.as_deref(), Some("Mom Cell"));
        assert_eq!(info.caller_name_source.as_deref(), Some("filename"));
    }

    #[test]
    fn test_non_latin_contact_name() {
        let info = parse_recording_filename("Call recording דני_210101_080000.m4a");
        assert_eq!(info.caller_name.as_deref(), Some("דני"));
    }

    #[test]
    fn test_unrecognized_name_is_empty() {
        assert_eq!(
            parse_recording_filename("random_audio_file.m4a"),
            CallerInfo::default()
        );
        assert_eq!(
            parse_recording_filename("Call recording +15551234567.m4a"),
            CallerInfo::default()
        );
    }

    #[test]
    fn test_invalid_date_keeps_phone() {
        let info = parse_recording_filename("Call recording +15551234567_201345_114902.m4a");
        assert_eq!(info.phone_number.as_deref(), Some("+15551234567"));
        assert!(info.call_datetime.is_none());
    }

    #[test]
    fn test_normalize_phone_number() {
        assert_eq!(normalize_phone_number("+1 (555) 123-4567").as_deref(), Some("+15551234567"));
        assert_eq!(normalize_phone_number("_6900").as_deref(), Some("6900"));
        assert_eq!(normalize_phone_number("12"), None);
        assert_eq!(normalize_phone_number("+1"), None);
    }

    #[test]
    fn test_is_phone_number() {
        assert!(is_phone_number("+972"));
        assert!(is_phone_number("_12"));
        assert!(is_phone_number("050-1234567"));
        assert!(!is_phone_number("Bob"));
        assert!(!is_phone_number("Bob 12"));
        assert!(!is_phone_number(""));
    }
}
