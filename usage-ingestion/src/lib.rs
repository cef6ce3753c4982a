pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod table;
pub mod transform;

pub use pipeline::{Envelope, IngestReport, Pipeline};

use config::AppConfig;
use pipeline::Source;
use sinks::SiteStoreSink;
use table::IngestUnit;
use transform::UsageNormalization;

/// Runs every unit of `source` through normalization into the configured
/// site stores.
pub async fn ingest<S>(cfg: &AppConfig, source: S) -> IngestReport
where
    S: Source<IngestUnit> + Send + Sync + 'static,
{
    let sink = SiteStoreSink::new(cfg.site_store(), cfg.sink.max_retries, cfg.retry_backoff());
    let pipeline = Pipeline {
        source,
        normalizer: UsageNormalization,
        sink,
    };
    pipeline.run().await
}
