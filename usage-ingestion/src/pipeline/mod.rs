mod report;

pub use report::{IngestReport, UnitOutcome, UnitReport};

use std::{pin::Pin, time::SystemTime};

use futures::{Stream, StreamExt};
use usage_client::db::StoreError;

use crate::table::IngestUnit;
use crate::transform::{DroppedRow, NormalizedUnit, SchemaError};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error in '{unit}': {reason}")]
    Source { unit: String, reason: String },
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    pub fn source(unit: impl Into<String>, reason: impl ToString) -> Self {
        Self::Source {
            unit: unit.into(),
            reason: reason.to_string(),
        }
    }
}

pub type UnitStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> UnitStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    /// Persists one unit and returns the number of records written.
    async fn write(&self, input: Envelope<T>) -> Result<u64, PipelineError>;
}

/// Drives every unit of a source through normalization into a sink.
///
/// Units are independent: a failing unit is recorded in the report and the
/// next unit is processed. Nothing already written is rolled back.
pub struct Pipeline<S, N, K> {
    pub source: S,
    pub normalizer: N,
    pub sink: K,
}

impl<S, N, K> Pipeline<S, N, K>
where
    S: Source<IngestUnit> + Send + Sync + 'static,
    N: Transform<IngestUnit, NormalizedUnit> + Send + Sync + 'static,
    K: Sink<NormalizedUnit> + Send + Sync + 'static,
{
    pub async fn run(self) -> IngestReport {
        let mut stream = self.source.stream().await;
        let mut report = IngestReport::default();

        while let Some(item) = stream.next().await {
            let unit = match item {
                Ok(env) => env,
                Err(e) => {
                    let label = match &e {
                        PipelineError::Source { unit, .. } => unit.clone(),
                        _ => String::new(),
                    };
                    Self::record_failure(&mut report, label, &e);
                    continue;
                }
            };

            let label = unit.payload.label.clone();
            match self.process(unit).await {
                Ok((rows, dropped)) => {
                    metrics::counter!("ingest_units_succeeded_total").increment(1);
                    tracing::info!(unit = %label, rows, dropped = dropped.len(), "unit ingested");
                    report.push(UnitReport {
                        label,
                        outcome: UnitOutcome::Succeeded { rows, dropped },
                    });
                }
                Err(e) => Self::record_failure(&mut report, label, &e),
            }
        }

        report
    }

    async fn process(
        &self,
        unit: Envelope<IngestUnit>,
    ) -> Result<(u64, Vec<DroppedRow>), PipelineError> {
        let normalized = self.normalizer.apply(unit).await?;
        let dropped = normalized.payload.table.dropped.clone();
        let rows = self.sink.write(normalized).await?;
        Ok((rows, dropped))
    }

    fn record_failure(report: &mut IngestReport, label: String, e: &PipelineError) {
        metrics::counter!("ingest_units_failed_total").increment(1);
        tracing::warn!(unit = %label, error = %e, "unit skipped");
        report.push(UnitReport {
            label,
            outcome: UnitOutcome::Failed {
                reason: e.to_string(),
            },
        });
    }
}
