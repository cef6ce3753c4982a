use anyhow::{bail, Result};
use serde::Serialize;
use std::env;
use time::{macros::format_description, Date};
use usage_ingestion::{config::AppConfig, observability};

#[derive(Serialize)]
struct Row {
    ts: String,
    kwh: f64,
}

/// Print one site's readings for a day as JSON, ascending by timestamp.
///
/// Usage:
///   query_day <site> <YYYY-MM-DD>
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: query_day <site> <YYYY-MM-DD>");
    }
    let site = &args[1];
    let date = Date::parse(&args[2], format_description!("[year]-[month]-[day]"))
        .map_err(|e| anyhow::anyhow!("invalid date '{}': {e}", args[2]))?;

    let cfg = AppConfig::load()?;
    let records = cfg.site_store().query_day(site, date).await?;
    if records.is_empty() {
        tracing::warn!(site = %site, %date, "no readings for that day");
    }

    let rows: Vec<Row> = records
        .iter()
        .map(|r| Row {
            ts: r.canonical_ts(),
            kwh: r.kwh,
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}
