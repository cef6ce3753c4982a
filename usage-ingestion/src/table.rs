use time::{macros::date, Duration, PrimitiveDateTime, Time};

/// A single value read from an upload.
///
/// Delimited sources only produce `Text` and `Empty`; workbook sources keep
/// the spreadsheet's own typing.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    DateTime(PrimitiveDateTime),
    Time(Time),
    Bool(bool),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }
}

/// Tabular input with unknown column naming: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row unless every cell in it is empty.
    pub fn push_row(&mut self, row: Vec<Cell>) {
        if row.iter().all(Cell::is_empty) {
            return;
        }
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One independently processed piece of an upload: a workbook sheet or a
/// whole delimited file. The label doubles as the site identifier.
#[derive(Debug, Clone)]
pub struct IngestUnit {
    pub label: String,
    pub table: RawTable,
}

const SECONDS_PER_DAY: f64 = 86_400.0;
// 9999-12-31 in the 1900 date system.
const MAX_SERIAL: f64 = 2_958_466.0;

/// Converts a spreadsheet serial date (1900 date system, fractional part is
/// the time of day) into a civil date-time.
pub fn from_spreadsheet_serial(serial: f64) -> Option<PrimitiveDateTime> {
    if !serial.is_finite() || !(0.0..MAX_SERIAL).contains(&serial) {
        return None;
    }
    let days = serial.trunc() as i64;
    let seconds = (serial.fract() * SECONDS_PER_DAY).round() as i64;
    date!(1899-12-30)
        .midnight()
        .checked_add(Duration::days(days) + Duration::seconds(seconds))
}

/// Time of day encoded by the fractional part of a serial value.
pub fn time_from_spreadsheet_serial(serial: f64) -> Option<Time> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let seconds = (serial.fract() * SECONDS_PER_DAY).round() as i64 % 86_400;
    Some(Time::MIDNIGHT + Duration::seconds(seconds))
}
