//! Single timestamp-resolution policy shared by every source.
//!
//! Each marketplace emits registration times in a different, loosely-typed
//! shape: ISO-like strings (`2024-01-01T10:30:00`), relative Korean phrases
//! (`"5분 전"`, `"3일 전"`, `"방금 전"`, optionally prefixed with the bump
//! marker `"끌올"`), or epoch seconds. [`resolve`] maps any of them onto an
//! absolute [`NaiveDateTime`] against a caller-supplied reference instant,
//! and never fails: anything unparseable becomes the minimum sentinel, which
//! sorts last in recency ordering and fails every recency-window filter.

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

/// Fixed absolute formats, tried in descending precision order.
const ABSOLUTE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

static RELATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(분|시간|일|주|개월)\s*전$").expect("valid relative-time regex"));

/// Sentinel for unresolvable timestamps. Minimum representable instant.
pub fn min_timestamp() -> NaiveDateTime {
    NaiveDateTime::MIN
}

/// Resolve a loosely-typed upstream time string to an absolute timestamp.
///
/// Resolution order:
/// 1. relative Korean phrase (bump prefix stripped first) → `now − offset`,
///    with `"방금 전"` → `now` and months approximated as 30 days
/// 2. bare digits → epoch seconds
/// 3. fixed absolute formats, most precise first (trailing `Z` ignored)
/// 4. date-only (`%Y-%m-%d`) → midnight of that date
/// 5. anything else → [`min_timestamp`]
pub fn resolve(raw: Option<&str>, now: NaiveDateTime) -> NaiveDateTime {
    let Some(raw) = raw else {
        return min_timestamp();
    };
    let mut text = raw.trim().trim_end_matches('Z').trim();
    if let Some(rest) = text.strip_prefix("끌올") {
        text = rest.trim_start();
    }
    if text.is_empty() {
        return min_timestamp();
    }

    if text.contains("방금 전") {
        return now;
    }

    if let Some(caps) = RELATIVE_RE.captures(text) {
        let value: i64 = caps[1].parse().unwrap_or(0);
        let offset = match &caps[2] {
            "분" => Duration::minutes(value),
            "시간" => Duration::hours(value),
            "일" => Duration::days(value),
            "주" => Duration::weeks(value),
            // One month approximated as 30 days.
            "개월" => Duration::days(value * 30),
            _ => unreachable!(),
        };
        return now - offset;
    }

    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        if let Ok(secs) = text.parse::<i64>() {
            if let Some(dt) = DateTime::from_timestamp(secs, 0) {
                return dt.with_timezone(&Local).naive_local();
            }
        }
        return min_timestamp();
    }

    for fmt in ABSOLUTE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return dt;
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).unwrap_or_else(min_timestamp);
    }

    min_timestamp()
}

/// Format an epoch-seconds value the way the Bunjang API's own web frontend
/// displays it, minute precision local time.
pub fn epoch_to_display(secs: i64) -> Option<String> {
    let dt = DateTime::from_timestamp(secs, 0)?;
    Some(dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
}
