//! Provider rate-limit detection.
//!
//! The parser recognizes exactly two message forms:
//!
//! ```text
//! ...resets <h><am|pm> (UTC)
//! ...resets <Mon> <d>, <h><am|pm> (UTC)
//! ```
//!
//! The bare form resolves to the next occurrence at or after now + 1 s,
//! crossing midnight when needed. The dated form is an absolute UTC
//! instant. A parse that does not land in the future yields `None`.

pub mod state;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

pub use state::RateLimitStateManager;

static RE_DATED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)resets\s+([A-Za-z]{3})\s+(\d{1,2}),\s*(\d{1,2})\s*(am|pm)\s*\(UTC\)").unwrap()
});

static RE_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)resets\s+(\d{1,2})\s*(am|pm)\s*\(UTC\)").unwrap());

fn hour24(hour12: u32, meridiem: &str) -> Option<u32> {
    if hour12 == 0 || hour12 > 12 {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("pm");
    Some(match (hour12, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    })
}

fn month_number(abbrev: &str) -> Option<u32> {
    let n = match abbrev.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

pub fn parse_rate_limit_reset(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(caps) = RE_DATED.captures(text) {
        let month = month_number(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let hour = hour24(caps[3].parse().ok()?, &caps[4])?;
        // Resolved in the current UTC year; the instant is absolute.
        let reset = Utc
            .with_ymd_and_hms(now.year(), month, day, hour, 0, 0)
            .single()?;
        return if reset > now { Some(reset) } else { None };
    }

    if let Some(caps) = RE_BARE.captures(text) {
        let hour = hour24(caps[1].parse().ok()?, &caps[2])?;
        let today = now.date_naive();
        let mut reset = Utc.from_utc_datetime(&today.and_hms_opt(hour, 0, 0)?);
        if reset < now + Duration::seconds(1) {
            reset = reset + Duration::days(1);
        }
        return Some(reset);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 15, h, m, 0).unwrap()
    }

    #[test]
    fn test_bare_form_same_day() {
        let reset =
            parse_rate_limit_reset("You've hit your limit · resets 12pm (UTC)", at(10, 0)).unwrap();
        assert_eq!(reset, at(12, 0));
    }

    #[test]
    fn test_bare_form_crosses_midnight() {
        let reset = parse_rate_limit_reset("resets 9am (UTC)", at(22, 30)).unwrap();
        assert_eq!(reset, Utc.with_ymd_and_hms(2026, 2, 16, 9, 0, 0).unwrap());
    }

    #[test]
    fn test_bare_form_exact_now_rolls_over() {
        let reset = parse_rate_limit_reset("resets 10am (UTC)", at(10, 0)).unwrap();
        assert_eq!(reset, Utc.with_ymd_and_hms(2026, 2, 16, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_midnight_noon_mapping() {
        let reset = parse_rate_limit_reset("resets 12am (UTC)", at(22, 0)).unwrap();
        assert_eq!(reset, Utc.with_ymd_and_hms(2026, 2, 16, 0, 0, 0).unwrap());

        let reset = parse_rate_limit_reset("resets 12pm (UTC)", at(1, 0)).unwrap();
        assert_eq!(reset, at(12, 0));
    }

    #[test]
    fn test_dated_form_absolute() {
        let reset =
            parse_rate_limit_reset("limit reached · resets Feb 20, 3pm (UTC)", at(10, 0)).unwrap();
        assert_eq!(reset, Utc.with_ymd_and_hms(2026, 2, 20, 15, 0, 0).unwrap());
    }

    #[test]
    fn test_dated_form_in_past_is_none() {
        assert!(parse_rate_limit_reset("resets Jan 1, 1am (UTC)", at(10, 0)).is_none());
    }

    #[test]
    fn test_unrecognized_forms_are_none() {
        for text in [
            "resets at noon",
            "resets 13pm (UTC)",
            "resets 5pm",
            "everything is fine",
        ] {
            assert!(parse_rate_limit_reset(text, at(10, 0)).is_none(), "{text}");
        }
    }

    #[test]
    fn test_result_is_always_in_the_future() {
        let now = at(10, 0);
        for text in [
            "resets 12am (UTC)",
            "resets 10am (UTC)",
            "resets 11pm (UTC)",
            "resets Feb 20, 3pm (UTC)",
        ] {
            if let Some(reset) = parse_rate_limit_reset(text, now) {
                assert!(reset > now, "{text}");
            }
        }
    }
}
