use serde::Serialize;
use usage_client::domain::UsageRecord;

use super::coerce;
use crate::table::{Cell, RawTable};

const ENGLISH_HEADERS: [&str; 3] = ["date", "time", "kwh"];
const JAPANESE_HEADERS: [&str; 3] = ["日付", "時刻", "使用量"];

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("required columns not found: {}", .missing.join(", "))]
    MissingColumns { missing: Vec<&'static str> },
}

/// Column positions of the three logical columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub date: usize,
    pub time: usize,
    pub kwh: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    InvalidDate,
    InvalidKwh,
    InvalidTimestamp,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::InvalidDate => "invalid_date",
            DropReason::InvalidKwh => "invalid_kwh",
            DropReason::InvalidTimestamp => "invalid_timestamp",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DroppedRow {
    /// Zero-based index into the table's data rows.
    pub row: usize,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub records: Vec<UsageRecord>,
    pub dropped: Vec<DroppedRow>,
}

fn position_of(headers: &[&str], name: &str) -> Option<usize> {
    headers.iter().position(|h| *h == name)
}

fn exact_match(headers: &[&str], names: [&str; 3]) -> Option<ColumnMap> {
    Some(ColumnMap {
        date: position_of(headers, names[0])?,
        time: position_of(headers, names[1])?,
        kwh: position_of(headers, names[2])?,
    })
}

fn is_date_header(h: &str) -> bool {
    h.eq_ignore_ascii_case("date") || h == "日付"
}

fn is_time_header(h: &str) -> bool {
    h.eq_ignore_ascii_case("time") || h == "時刻"
}

fn is_kwh_header(h: &str) -> bool {
    h.to_lowercase().contains("kwh") || matches!(h, "使用量" | "電力量")
}

/// Maps arbitrary headers onto date/time/kwh.
///
/// Exact English names win over exact Japanese names, which win over the
/// per-column heuristic. Within the heuristic the first matching column is
/// used.
pub fn resolve_columns<S: AsRef<str>>(headers: &[S]) -> Result<ColumnMap, SchemaError> {
    let trimmed: Vec<&str> = headers.iter().map(|h| h.as_ref().trim()).collect();

    if let Some(map) = exact_match(&trimmed, ENGLISH_HEADERS) {
        return Ok(map);
    }
    if let Some(map) = exact_match(&trimmed, JAPANESE_HEADERS) {
        return Ok(map);
    }

    let (mut date, mut time, mut kwh) = (None, None, None);
    for (idx, h) in trimmed.iter().enumerate() {
        if is_date_header(h) {
            date.get_or_insert(idx);
        } else if is_time_header(h) {
            time.get_or_insert(idx);
        } else if is_kwh_header(h) {
            kwh.get_or_insert(idx);
        }
    }

    match (date, time, kwh) {
        (Some(date), Some(time), Some(kwh)) => Ok(ColumnMap { date, time, kwh }),
        _ => {
            let missing = [("date", date), ("time", time), ("kwh", kwh)]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| name)
                .collect();
            Err(SchemaError::MissingColumns { missing })
        }
    }
}

/// Turns a raw table into canonical usage records.
///
/// Fails only when the columns cannot be resolved. Rows with an unparsable
/// date, a non-numeric kWh value or an invalid date+time combination are
/// skipped and reported in `dropped`; the order of surviving rows is kept.
pub fn normalize(table: &RawTable) -> Result<NormalizedTable, SchemaError> {
    let columns = resolve_columns(&table.headers)?;
    let mut out = NormalizedTable::default();

    for (idx, row) in table.rows.iter().enumerate() {
        match normalize_row(row, columns) {
            Ok(record) => out.records.push(record),
            Err(reason) => out.dropped.push(DroppedRow { row: idx, reason }),
        }
    }

    Ok(out)
}

fn normalize_row(row: &[Cell], columns: ColumnMap) -> Result<UsageRecord, DropReason> {
    let cell = |idx: usize| row.get(idx).unwrap_or(&Cell::Empty);

    let date = coerce::parse_date(cell(columns.date)).ok_or(DropReason::InvalidDate)?;
    let time = coerce::time_prefix(cell(columns.time));
    let kwh = coerce::parse_kwh(cell(columns.kwh)).ok_or(DropReason::InvalidKwh)?;
    let ts = coerce::combine(date, &time).ok_or(DropReason::InvalidTimestamp)?;

    Ok(UsageRecord::new(ts, kwh))
}
