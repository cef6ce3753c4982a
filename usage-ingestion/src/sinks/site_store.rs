use std::time::Duration;

use usage_client::db::{SiteStore, StoreError};

use crate::pipeline::{Envelope, PipelineError, Sink};
use crate::transform::NormalizedUnit;

/// Writes normalized units into their site's store, creating the store on
/// first use.
pub struct SiteStoreSink {
    store: SiteStore,
    max_retries: u32,
    retry_backoff: Duration,
}

impl SiteStoreSink {
    pub fn new(store: SiteStore, max_retries: u32, retry_backoff: Duration) -> Self {
        Self {
            store,
            max_retries,
            retry_backoff,
        }
    }

    pub fn store(&self) -> &SiteStore {
        &self.store
    }

    async fn write_unit(&self, unit: &NormalizedUnit) -> Result<u64, StoreError> {
        self.store.init(&unit.label).await?;
        self.store.upsert(&unit.label, &unit.table.records).await
    }
}

// Only database errors (busy, locked) can clear up on their own.
fn is_retryable(e: &StoreError) -> bool {
    matches!(e, StoreError::Database(_))
}

#[async_trait::async_trait]
impl Sink<NormalizedUnit> for SiteStoreSink {
    async fn write(&self, input: Envelope<NormalizedUnit>) -> Result<u64, PipelineError> {
        let unit = &input.payload;

        let mut attempt: u32 = 0;
        loop {
            match self.write_unit(unit).await {
                Ok(rows) => {
                    metrics::counter!("site_store_upserted_records_total").increment(rows);

                    if let Ok(dur) = std::time::SystemTime::now().duration_since(input.received_at) {
                        metrics::histogram!("ingest_unit_latency_seconds").record(dur.as_secs_f64());
                    }

                    return Ok(rows);
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e) => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        site = %unit.label,
                        error = %e,
                        attempt,
                        "site store write failed, retrying with backoff"
                    );
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(site = %unit.label, error = %e, "site store write failed, giving up");
                    metrics::counter!("site_store_errors_total").increment(1);
                    return Err(e.into());
                }
            }
        }
    }
}
