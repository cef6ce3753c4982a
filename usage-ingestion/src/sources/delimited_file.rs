use std::{io::Read, path::PathBuf};

use futures::Stream;

use crate::pipeline::{Envelope, PipelineError, Source};
use crate::table::{Cell, IngestUnit, RawTable};

const UTF8_BOM: char = '\u{feff}';

/// A single delimited table (CSV, or pipe-delimited `.dat`) uploaded for one
/// explicitly named site.
///
/// The first record is the header row; column naming is left to the
/// normalizer.
pub struct DelimitedTableSource {
    path: PathBuf,
    site: String,
    delimiter: u8,
}

impl DelimitedTableSource {
    pub fn new<P: Into<PathBuf>>(site: impl Into<String>, path: P) -> Self {
        Self {
            path: path.into(),
            site: site.into(),
            delimiter: b',',
        }
    }

    /// Picks the delimiter from the file extension: `.dat` is pipe-delimited,
    /// anything else comma-delimited.
    pub fn for_path<P: Into<PathBuf>>(site: impl Into<String>, path: P) -> Self {
        let path = path.into();
        let is_dat = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dat"));
        let source = Self::new(site, path);
        if is_dat {
            source.with_delimiter(b'|')
        } else {
            source
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Reads a whole delimited table into memory.
pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> Result<RawTable, csv::Error> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let mut table = RawTable::new(
        headers
            .iter()
            .enumerate()
            .map(|(idx, h)| if idx == 0 { h.trim_start_matches(UTF8_BOM) } else { h }),
    );

    for result in rdr.records() {
        let record = result?;
        table.push_row(record.iter().map(Cell::from).collect());
    }

    Ok(table)
}

#[async_trait::async_trait]
impl Source<IngestUnit> for DelimitedTableSource {
    async fn stream(
        &self,
    ) -> std::pin::Pin<Box<dyn Stream<Item = Result<Envelope<IngestUnit>, PipelineError>> + Send>> {
        // Blocking read; uploads are a few thousand rows.
        let path = self.path.clone();
        let site = self.site.clone();
        let delimiter = self.delimiter;

        let s = async_stream::stream! {
            let table = std::fs::File::open(&path)
                .map_err(|e| PipelineError::source(&site, format!("failed to open {}: {e}", path.display())))
                .and_then(|file| {
                    read_delimited(file, delimiter)
                        .map_err(|e| PipelineError::source(&site, format!("failed to read table: {e}")))
                });

            match table {
                Ok(table) => {
                    tracing::debug!(site = %site, rows = table.len(), "read delimited table");
                    yield Ok(Envelope::new(IngestUnit { label: site, table }));
                }
                Err(e) => {
                    metrics::counter!("delimited_source_errors_total").increment(1);
                    yield Err(e);
                }
            }
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::io::Write;

    #[test]
    fn reads_headers_and_rows() {
        let csv = "date,time,kwh\n2024-06-01,00:00,1.5\n2024-06-01,00:30,\n";
        let table = read_delimited(csv.as_bytes(), b',').unwrap();

        assert_eq!(table.headers, vec!["date", "time", "kwh"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][2], Cell::Text("1.5".to_string()));
        assert_eq!(table.rows[1][2], Cell::Empty);
    }

    #[test]
    fn strips_byte_order_mark_and_skips_blank_rows() {
        let csv = "\u{feff}日付,時刻,使用量\n2024/6/1,0:00,1\n,,\n";
        let table = read_delimited(csv.as_bytes(), b',').unwrap();

        assert_eq!(table.headers[0], "日付");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn pipe_delimited() {
        let dat = "date|time|kwh\n2024-06-01|00:00|1.5\n";
        let table = read_delimited(dat.as_bytes(), b'|').unwrap();
        assert_eq!(table.rows[0].len(), 3);
    }

    #[test]
    fn ragged_rows_are_tolerated() {
        let csv = "date,time,kwh\n2024-06-01,00:00\n2024-06-01,00:30,2,extra\n";
        let table = read_delimited(csv.as_bytes(), b',').unwrap();
        assert_eq!(table.rows[0].len(), 2);
        assert_eq!(table.rows[1].len(), 4);
    }

    #[tokio::test]
    async fn stream_yields_one_unit_labelled_with_site() {
        let mut file = tempfile::Builder::new().suffix(".dat").tempfile().unwrap();
        writeln!(file, "date|time|kwh").unwrap();
        writeln!(file, "2024-06-01|00:00|1.5").unwrap();

        let source = DelimitedTableSource::for_path("笠神地区", file.path());
        let units: Vec<_> = source.stream().await.collect().await;

        assert_eq!(units.len(), 1);
        let unit = units.into_iter().next().unwrap().unwrap().payload;
        assert_eq!(unit.label, "笠神地区");
        assert_eq!(unit.table.headers, vec!["date", "time", "kwh"]);
    }

    #[tokio::test]
    async fn missing_file_is_a_unit_failure() {
        let source = DelimitedTableSource::new("site", "/definitely/not/here.csv");
        let units: Vec<_> = source.stream().await.collect().await;

        assert!(matches!(
            units.as_slice(),
            [Err(PipelineError::Source { unit, .. })] if unit == "site"
        ));
    }
}
