mod coerce;
mod normalizer;

pub use coerce::{parse_clock, parse_date_text};
pub use normalizer::{
    normalize, resolve_columns, ColumnMap, DropReason, DroppedRow, NormalizedTable, SchemaError,
};

use crate::pipeline::{Envelope, PipelineError, Transform};
use crate::table::IngestUnit;

/// A unit after normalization, still labelled with its site.
#[derive(Debug, Clone)]
pub struct NormalizedUnit {
    pub label: String,
    pub table: NormalizedTable,
}

/// Pipeline stage wrapping [`normalize`] with drop accounting.
#[derive(Clone, Default)]
pub struct UsageNormalization;

#[async_trait::async_trait]
impl Transform<IngestUnit, NormalizedUnit> for UsageNormalization {
    async fn apply(
        &self,
        input: Envelope<IngestUnit>,
    ) -> Result<Envelope<NormalizedUnit>, PipelineError> {
        let Envelope {
            payload: unit,
            received_at,
        } = input;

        let table = match normalize(&unit.table) {
            Ok(table) => table,
            Err(e) => {
                metrics::counter!("normalizer_schema_errors_total").increment(1);
                return Err(e.into());
            }
        };

        for dropped in &table.dropped {
            metrics::counter!("normalizer_rows_dropped_total", "reason" => dropped.reason.as_str())
                .increment(1);
            tracing::debug!(
                unit = %unit.label,
                row = dropped.row,
                reason = dropped.reason.as_str(),
                "dropped row"
            );
        }

        Ok(Envelope {
            payload: NormalizedUnit {
                label: unit.label,
                table,
            },
            received_at,
        })
    }
}
