use time::{format_description::FormatItem, macros::format_description, Date, PrimitiveDateTime};

const CANONICAL_TS: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");

/// One 30-minute usage reading after normalization.
///
/// The site is not part of the record; every store operation is already
/// scoped to a single site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UsageRecord {
    pub ts: PrimitiveDateTime,
    pub kwh: f64,
}

impl UsageRecord {
    pub fn new(ts: PrimitiveDateTime, kwh: f64) -> Self {
        Self { ts, kwh }
    }

    /// `YYYY-MM-DDTHH:MM:SS`, the form persisted in the `ts` column.
    pub fn canonical_ts(&self) -> String {
        format_canonical_ts(self.ts)
    }
}

pub fn format_canonical_ts(ts: PrimitiveDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    )
}

pub fn parse_canonical_ts(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(s, CANONICAL_TS)
}

/// Inclusive bounds of a calendar day: `00:00:00` through `23:59:59`.
///
/// Readings stamped after `23:59:59` (sub-second) fall outside the day.
pub fn day_bounds(date: Date) -> (PrimitiveDateTime, PrimitiveDateTime) {
    (date.midnight(), date.with_time(time::macros::time!(23:59:59)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn canonical_ts_is_zero_padded() {
        let record = UsageRecord::new(datetime!(2024-06-01 09:30:00), 1.5);
        assert_eq!(record.canonical_ts(), "2024-06-01T09:30:00");
    }

    #[test]
    fn canonical_ts_parses_back() {
        let parsed = parse_canonical_ts("2024-12-31T23:30:00").unwrap();
        assert_eq!(parsed, datetime!(2024-12-31 23:30:00));
    }

    #[test]
    fn canonical_ts_rejects_space_separator() {
        assert!(parse_canonical_ts("2024-12-31 23:30:00").is_err());
    }

    #[test]
    fn day_bounds_cover_whole_day() {
        let (start, end) = day_bounds(date!(2024-06-01));
        assert_eq!(format_canonical_ts(start), "2024-06-01T00:00:00");
        assert_eq!(format_canonical_ts(end), "2024-06-01T23:59:59");
    }
}
