//! HTTP-date formatting and `Accept-Datetime` parsing.
//!
//! Everything on the wire uses the IMF-fixdate form
//! (`Sun, 06 Nov 1994 08:49:37 GMT`). Parsing is lenient about the weekday
//! name, which clients frequently get wrong, and normalizes to UTC. The
//! obsolete RFC 850 (`Sunday, 06-Nov-94 08:49:37 GMT`) and asctime
//! (`Sun Nov  6 08:49:37 1994`) forms are accepted too.

use crate::error::{Result, TimegateError};
use chrono::{DateTime, NaiveDateTime, Utc};

const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";
const DATE_TIME_FORMAT: &str = "%d %b %Y %H:%M:%S";
const DATE_TIME_OFFSET_FORMAT: &str = "%d %b %Y %H:%M:%S %z";
const RFC850_FORMAT: &str = "%d-%b-%y %H:%M:%S";
const ASCTIME_FORMAT: &str = "%b %e %H:%M:%S %Y";
const UTC_ZONE_NAMES: &[&str] = &["GMT", "UTC", "UT", "Z"];

pub fn format_http_date(datetime: &DateTime<Utc>) -> String {
    datetime.format(HTTP_DATE_FORMAT).to_string()
}

/// Parse an HTTP-date into a UTC instant.
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();
    // The weekday is redundant with the date, so it is not checked
    let without_weekday = match trimmed.split_once(',') {
        Some((_, rest)) => rest.trim(),
        None => trimmed,
    };

    if let Ok(with_offset) = DateTime::parse_from_str(without_weekday, DATE_TIME_OFFSET_FORMAT) {
        return Ok(with_offset.with_timezone(&Utc));
    }

    let naive_part = strip_utc_zone(without_weekday);
    NaiveDateTime::parse_from_str(naive_part, DATE_TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(naive_part, RFC850_FORMAT))
        .or_else(|_| parse_asctime(trimmed))
        .map(|naive| naive.and_utc())
        .map_err(|e| TimegateError::Validation(format!("invalid HTTP date '{}': {}", value, e)))
}

// asctime has no comma after the weekday and no zone
fn parse_asctime(value: &str) -> std::result::Result<NaiveDateTime, chrono::ParseError> {
    let without_weekday = match value.split_once(' ') {
        Some((_, rest)) => rest.trim_start(),
        None => value,
    };
    NaiveDateTime::parse_from_str(without_weekday, ASCTIME_FORMAT)
}

fn strip_utc_zone(value: &str) -> &str {
    match value.rsplit_once(' ') {
        Some((head, zone)) if UTC_ZONE_NAMES.iter().any(|z| z.eq_ignore_ascii_case(zone)) => {
            head.trim_end()
        }
        _ => value,
    }
}
