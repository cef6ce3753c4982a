//! Cell-level coercion of date, time and kWh values.

use time::{Date, Month, PrimitiveDateTime, Time};

use crate::table::{from_spreadsheet_serial, Cell};

pub fn parse_date(cell: &Cell) -> Option<Date> {
    match cell {
        Cell::Text(s) => parse_date_text(s.trim()),
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Number(n) => parse_date_number(*n),
        Cell::Empty | Cell::Time(_) | Cell::Bool(_) => None,
    }
}

fn parse_date_number(n: f64) -> Option<Date> {
    // 20240601 typed into a numeric cell
    if n.fract() == 0.0 && (10_000_101.0..=99_991_231.0).contains(&n) {
        return parse_compact_date(&format!("{}", n as u32));
    }
    from_spreadsheet_serial(n).map(|dt| dt.date())
}

/// Accepts `YYYY-MM-DD`, `YYYY/M/D`, `YYYY.MM.DD`, `MM/DD/YYYY`, `YYYYMMDD`
/// and `YYYY年M月D日`, optionally followed by a time part.
pub fn parse_date_text(s: &str) -> Option<Date> {
    let date_part = s.split(|c: char| c == 'T' || c == ' ').next()?;

    if let Some(rest) = date_part.strip_suffix('日') {
        let (year, rest) = rest.split_once('年')?;
        let (month, day) = rest.split_once('月')?;
        return calendar_date(year, month, day);
    }

    if date_part.len() == 8 && date_part.bytes().all(|b| b.is_ascii_digit()) {
        return parse_compact_date(date_part);
    }

    let parts: Vec<&str> = date_part
        .split(|c: char| matches!(c, '-' | '/' | '.'))
        .collect();
    match parts.as_slice() {
        [y, m, d] if y.len() == 4 => calendar_date(y, m, d),
        [m, d, y] if y.len() == 4 => calendar_date(y, m, d),
        _ => None,
    }
}

fn parse_compact_date(s: &str) -> Option<Date> {
    calendar_date(s.get(0..4)?, s.get(4..6)?, s.get(6..8)?)
}

fn calendar_date(year: &str, month: &str, day: &str) -> Option<Date> {
    let year: i32 = digits(year, 4, 4)?.parse().ok()?;
    let month: u8 = digits(month, 1, 2)?.parse().ok()?;
    let day: u8 = digits(day, 1, 2)?.parse().ok()?;
    Date::from_calendar_date(year, Month::try_from(month).ok()?, day).ok()
}

fn digits(s: &str, min: usize, max: usize) -> Option<&str> {
    let s = s.trim();
    (s.len() >= min && s.len() <= max && s.bytes().all(|b| b.is_ascii_digit())).then_some(s)
}

/// The first five characters of the cell's text form, which covers both
/// `HH:MM` and `HH:MM:SS`.
pub fn time_prefix(cell: &Cell) -> String {
    let text = match cell {
        Cell::Text(s) => s.trim().to_string(),
        Cell::Time(t) => format_hms(*t),
        Cell::DateTime(dt) => format_hms(dt.time()),
        Cell::Number(n) => n.to_string(),
        Cell::Bool(b) => b.to_string(),
        Cell::Empty => String::new(),
    };
    text.chars().take(5).collect()
}

fn format_hms(t: Time) -> String {
    format!("{:02}:{:02}:{:02}", t.hour(), t.minute(), t.second())
}

/// Parses `H:MM` or `HH:MM`. A trailing `:` left over from truncating
/// `H:MM:SS` is ignored.
pub fn parse_clock(s: &str) -> Option<Time> {
    let s = s.strip_suffix(':').unwrap_or(s);
    let (hour, minute) = s.split_once(':')?;
    let hour: u8 = digits(hour, 1, 2)?.parse().ok()?;
    let minute: u8 = digits(minute, 2, 2)?.parse().ok()?;
    Time::from_hms(hour, minute, 0).ok()
}

pub fn combine(date: Date, time_prefix: &str) -> Option<PrimitiveDateTime> {
    parse_clock(time_prefix).map(|t| PrimitiveDateTime::new(date, t))
}

pub fn parse_kwh(cell: &Cell) -> Option<f64> {
    let value = match cell {
        Cell::Number(n) => *n,
        Cell::Text(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}
