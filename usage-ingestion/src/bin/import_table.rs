use anyhow::{bail, Result};
use std::env;
use usage_ingestion::{
    config::AppConfig, ingest, metrics_server, observability, sources::DelimitedTableSource,
};

/// Ingest one delimited table (`.csv`, or pipe-delimited `.dat`) for a site.
///
/// Usage:
///   import_table <site> <path_to_table>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: import_table <site> <table_file_path>");
    }
    let site = &args[1];
    let file_path = &args[2];

    let cfg = AppConfig::load()?;
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let source = DelimitedTableSource::for_path(site.as_str(), file_path);
    let report = ingest(&cfg, source).await;
    tracing::info!(site = %site, rows = report.total_rows(), "table import finished");

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
