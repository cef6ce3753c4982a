use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Range, Reader};
use futures::Stream;

use crate::pipeline::{Envelope, PipelineError, Source};
use crate::table::{from_spreadsheet_serial, time_from_spreadsheet_serial, Cell, IngestUnit, RawTable};

/// A multi-sheet workbook with one sheet per site.
///
/// Each sheet becomes its own unit labelled with the sheet name. Sheets named
/// in `excluded_sheets` (the site directory sheet) are skipped.
pub struct WorkbookSource {
    path: PathBuf,
    excluded_sheets: Vec<String>,
}

impl WorkbookSource {
    pub fn new<P: Into<PathBuf>>(path: P, excluded_sheets: Vec<String>) -> Self {
        Self {
            path: path.into(),
            excluded_sheets,
        }
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from(s.as_str()),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            // Serials below one day carry only a time of day.
            if serial < 1.0 {
                time_from_spreadsheet_serial(serial).map_or(Cell::Empty, Cell::Time)
            } else {
                from_spreadsheet_serial(serial).map_or(Cell::Empty, Cell::DateTime)
            }
        }
    }
}

fn header_text(data: &Data) -> String {
    match data {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a worksheet range into a raw table. The first row that is not
/// entirely empty is taken as the header row.
pub fn table_from_range(range: &Range<Data>) -> RawTable {
    let mut rows = range
        .rows()
        .skip_while(|row| row.iter().all(|c| matches!(c, Data::Empty)));

    let Some(header_row) = rows.next() else {
        return RawTable::default();
    };

    let mut table = RawTable::new(header_row.iter().map(header_text));
    for row in rows {
        table.push_row(row.iter().map(cell_from_data).collect());
    }
    table
}

/// Builds one unit per sheet, in workbook order, skipping `excluded_sheets`.
/// `read_sheet` is only called for sheets that are kept.
fn sheet_units<F, E>(
    names: Vec<String>,
    excluded_sheets: &[String],
    mut read_sheet: F,
) -> Vec<Result<IngestUnit, PipelineError>>
where
    F: FnMut(&str) -> Result<Range<Data>, E>,
    E: std::fmt::Display,
{
    let mut units = Vec::new();
    for name in names {
        if excluded_sheets.iter().any(|excluded| excluded == &name) {
            tracing::debug!(sheet = %name, "skipping excluded sheet");
            continue;
        }

        let unit = read_sheet(&name)
            .map(|range| IngestUnit {
                table: table_from_range(&range),
                label: name.clone(),
            })
            .map_err(|e| PipelineError::source(&name, format!("failed to read sheet: {e}")));
        units.push(unit);
    }
    units
}

fn read_workbook(
    path: &Path,
    excluded_sheets: &[String],
) -> Result<Vec<Result<IngestUnit, PipelineError>>, PipelineError> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| PipelineError::source(path.display().to_string(), format!("failed to open workbook: {e}")))?;

    let names = workbook.sheet_names();
    Ok(sheet_units(names, excluded_sheets, |name| {
        workbook.worksheet_range(name)
    }))
}

#[async_trait::async_trait]
impl Source<IngestUnit> for WorkbookSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<IngestUnit>, PipelineError>> + Send>> {
        // The workbook is read in one go so no reader is held across yields.
        let path = self.path.clone();
        let excluded = self.excluded_sheets.clone();

        let s = async_stream::stream! {
            match read_workbook(&path, &excluded) {
                Ok(units) => {
                    for unit in units {
                        yield unit.map(Envelope::new);
                    }
                }
                Err(e) => {
                    metrics::counter!("workbook_source_errors_total").increment(1);
                    yield Err(e);
                }
            }
        };

        Box::pin(s)
    }
}
