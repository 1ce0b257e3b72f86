//! Date extraction for DATE and ARRIVAL sort keys.
//!
//! Everything is normalized to UTC seconds since the epoch.

use chrono::{DateTime, NaiveDateTime};

use crate::parser::MessageData;

/// Parses an INTERNALDATE (`17-Jul-1996 02:44:25 -0700`).
#[must_use]
pub fn parse_internal_date(s: &str) -> Option<i64> {
    DateTime::parse_from_str(s.trim(), "%d-%b-%Y %H:%M:%S %z")
        .ok()
        .map(|d| d.timestamp())
}

/// Parses an RFC 2822 `Date:` header value.
///
/// Tolerates trailing comments such as `(PST)` and a missing zone, which is
/// taken as UTC.
#[must_use]
pub fn parse_header_date(s: &str) -> Option<i64> {
    let cleaned = strip_comments(s);
    let cleaned = cleaned.trim();
    if let Ok(d) = DateTime::parse_from_rfc2822(cleaned) {
        return Some(d.timestamp());
    }
    let without_day = cleaned
        .split_once(',')
        .map_or(cleaned, |(_, rest)| rest)
        .trim();
    ["%d %b %Y %H:%M:%S", "%d %b %Y %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(without_day, fmt).ok())
        .map(|naive| naive.and_utc().timestamp())
}

fn strip_comments(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut depth = 0usize;
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

/// ARRIVAL key: the INTERNALDATE.
#[must_use]
pub fn arrival(message: &MessageData) -> Option<i64> {
    message.internal_date.as_deref().and_then(parse_internal_date)
}

/// DATE key: the sent date, falling back to INTERNALDATE.
#[must_use]
pub fn sent(message: &MessageData) -> Option<i64> {
    message
        .envelope
        .as_ref()
        .and_then(|e| e.date.as_deref())
        .and_then(parse_header_date)
        .or_else(|| arrival(message))
}
