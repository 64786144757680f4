// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

/// Normalize a feed date to `YYYY-MM-DD`.
///
/// RFC 2822 is tried first, then ISO 8601 variants. Anything unparsable
/// yields an empty string.
pub fn parse_date_text(raw: &str) -> String {
    let s = raw.trim();
    if s.is_empty() {
        return String::new();
    }

    if let Some(dt) = parse_rfc2822_relaxed(s) {
        return dt.format("%Y-%m-%d").to_string();
    }
    if let Some(date) = parse_iso8601(s) {
        return date.format("%Y-%m-%d").to_string();
    }
    String::new()
}

fn parse_rfc2822_relaxed(s: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt);
    }

    let formats = ["%a, %d %b %Y %H:%M:%S %z", "%d %b %Y %H:%M:%S %z", "%a, %d %b %Y %H:%M %z"];
    formats
        .iter()
        .find_map(|format| DateTime::parse_from_str(s, format).ok())
}

fn parse_iso8601(s: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }

    let naive_formats = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];
    if let Some(dt) = naive_formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
    {
        return Some(dt.date());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// Parse a duration or timestamp given as plain seconds or `[hh:]mm:ss`.
///
/// Fractional seconds are truncated; negative totals clamp to zero.
pub fn parse_time_to_seconds(raw: &str) -> Option<u64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        let value: f64 = s.parse().ok()?;
        return Some(value.max(0.0) as u64);
    }

    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let mut nums = Vec::with_capacity(3);
    for part in &parts {
        let value: f64 = part.parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        nums.push(value as i64);
    }

    let (hh, mm, ss) = match nums.as_slice() {
        [mm, ss] => (0, *mm, *ss),
        [hh, mm, ss] => (*hh, *mm, *ss),
        _ => return None,
    };
    let total = hh
        .saturating_mul(3600)
        .saturating_add(mm.saturating_mul(60))
        .saturating_add(ss);
    Some(total.max(0) as u64)
}
