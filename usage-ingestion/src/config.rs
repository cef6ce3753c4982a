use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

use usage_client::db::{SiteStore, StoreConfig};

const CONFIG_ENV: &str = "USAGE_INGESTION_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "usage-ingestion.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("db"),
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: 500,
            max_retries: 2,
            retry_backoff_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkbookConfig {
    pub excluded_sheets: Vec<String>,
}

impl Default for WorkbookConfig {
    fn default() -> Self {
        Self {
            excluded_sheets: vec!["需要場所リスト".to_string(), "site list".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub sink: SinkConfig,
    pub workbook: WorkbookConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Loads the TOML file named by `USAGE_INGESTION_CONFIG`, falling back to
    /// `usage-ingestion.toml` and then to built-in defaults when that file
    /// does not exist.
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        match env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path),
            Err(_) if fs::metadata(DEFAULT_CONFIG_PATH).is_ok() => Self::from_file(DEFAULT_CONFIG_PATH),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        Ok(cfg)
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            root: self.storage.root.clone(),
            busy_timeout: Duration::from_millis(self.storage.busy_timeout_ms),
            batch_size: self.sink.batch_size,
        }
    }

    pub fn site_store(&self) -> SiteStore {
        SiteStore::new(self.store_config())
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.sink.retry_backoff_ms)
    }
}
