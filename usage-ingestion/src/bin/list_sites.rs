use anyhow::Result;
use usage_ingestion::{config::AppConfig, observability};

/// Print the sites that have a store, one per line.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let sites = cfg.site_store().catalog().list_sites().await?;
    if sites.is_empty() {
        tracing::info!(root = %cfg.storage.root.display(), "no site stores yet");
    }

    for site in sites {
        println!("{site}");
    }
    Ok(())
}
