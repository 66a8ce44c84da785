//! Lenient HTTP date parsing.
//!
//! Servers send dates in RFC 1123 (`Sun, 06 Nov 1994 08:49:37 GMT`), RFC 850
//! (`Sunday, 06-Nov-94 08:49:37 GMT`) and asctime (`Sun Nov  6 08:49:37 1994`)
//! formats, plus a long tail of broken variants such as
//! `Thu 01-Dec-42 16:00:00 GMT` or `Thu,01 Dec 42 16:00:00 GMT`.
//!
//! Instead of trying a list of fixed patterns, the input is split into tokens
//! and each token is classified as time, day-of-month, month or year (the
//! cookie date algorithm of RFC 6265 §5.1.1). The weekday and zone name are
//! ignored; every date is taken as UTC.
//!
//! Two-digit years pivot at 69: `69..=99` become `1969..=1999`, `00..=68`
//! become `2000..=2068`.
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time};

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Parses an HTTP (or cookie) date. Returns `None` when the value is not a date.
pub fn parse_http_date(input: &str) -> Option<OffsetDateTime> {
    let mut time = None;
    let mut day = None;
    let mut month = None;
    let mut year = None;

    for token in input.split(is_delimiter).filter(|t| !t.is_empty()) {
        if time.is_none() {
            if let Some(t) = parse_time(token) {
                time = Some(t);
                continue;
            }
        }
        if day.is_none() {
            if let Some(d) = leading_digits(token, 1, 2) {
                day = Some(d);
                continue;
            }
        }
        if month.is_none() {
            if let Some(m) = parse_month(token) {
                month = Some(m);
                continue;
            }
        }
        if year.is_none() {
            if let Some(y) = leading_digits(token, 2, 4) {
                year = Some(y);
            }
        }
    }

    let (hour, minute, second) = time?;
    let day = day?;
    let month = month?;
    let year = expand_year(year?);

    if !(1..=31).contains(&day) || year < 1601 || hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    let date = Date::from_calendar_date(year as i32, month, day as u8).ok()?;
    let time = Time::from_hms(hour as u8, minute as u8, second as u8).ok()?;
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Formats a timestamp as an IMF-fixdate (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn fmt_http_date(at: OffsetDateTime) -> String {
    let at = at.to_offset(time::UtcOffset::UTC);
    format!(
        "{}, {:02} {} {} {:02}:{:02}:{:02} GMT",
        &at.weekday().to_string()[..3],
        at.day(),
        &at.month().to_string()[..3],
        at.year(),
        at.hour(),
        at.minute(),
        at.second(),
    )
}

fn is_delimiter(c: char) -> bool {
    !(c.is_ascii_alphanumeric() || c == ':' || !c.is_ascii())
}

fn expand_year(year: u32) -> u32 {
    match year {
        69..=99 => year + 1900,
        0..=68 => year + 2000,
        _ => year,
    }
}

/// `min..=max` leading digits, not followed by another digit.
fn leading_digits(token: &str, min: usize, max: usize) -> Option<u32> {
    let count = token.bytes().take_while(u8::is_ascii_digit).count();
    if count < min || count > max {
        return None;
    }
    token[..count].parse().ok()
}

/// `h[h]:m[m]:s[s]`, optionally followed by non-digit garbage.
fn parse_time(token: &str) -> Option<(u32, u32, u32)> {
    let mut parts = token.splitn(3, ':');
    let hour = leading_digits(parts.next()?, 1, 2)?;
    let minute = parts.next()?;
    if minute.len() > 2 {
        return None;
    }
    let minute = leading_digits(minute, 1, 2)?;
    let second = leading_digits(parts.next()?, 1, 2)?;
    Some((hour, minute, second))
}

fn parse_month(token: &str) -> Option<Month> {
    let prefix = token.get(..3)?.to_ascii_lowercase();
    let index = MONTHS.iter().position(|m| *m == prefix)?;
    Month::try_from(index as u8 + 1).ok()
}
