use anyhow::{bail, Result};
use std::env;
use usage_ingestion::{config::AppConfig, ingest, metrics_server, observability, sources::WorkbookSource};

/// Ingest every site sheet of a workbook into the per-site stores.
///
/// Usage:
///   import_workbook <path_to_workbook>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        bail!("usage: import_workbook <workbook_path>");
    }
    let file_path = &args[1];

    // Load configuration (USAGE_INGESTION_CONFIG can point to a specific file).
    let cfg = AppConfig::load()?;
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let source = WorkbookSource::new(file_path, cfg.workbook.excluded_sheets.clone());
    let report = ingest(&cfg, source).await;

    if report.succeeded().next().is_none() {
        tracing::warn!("no sheet with date/time/kwh columns was imported");
    }
    tracing::info!(
        imported = report.succeeded().count(),
        skipped = report.failed().count(),
        rows = report.total_rows(),
        "workbook import finished"
    );

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
