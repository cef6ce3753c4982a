use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection},
    Connection, QueryBuilder, Sqlite,
};
use time::{Date, PrimitiveDateTime};

use super::{Catalog, StoreError};
use crate::domain::{day_bounds, format_canonical_ts, parse_canonical_ts, UsageRecord};

const CREATE_USAGE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS usage (
        site TEXT NOT NULL,
        ts   TEXT NOT NULL,
        kwh  REAL NOT NULL,
        PRIMARY KEY (site, ts)
    )
"#;

const CREATE_TS_INDEX: &str = "CREATE INDEX IF NOT EXISTS idx_usage_ts ON usage(ts)";

/// File extension of a per-site store.
pub(crate) const STORE_EXTENSION: &str = "db";

// SQLite allows 32766 bound parameters per statement; each row binds three.
const MAX_ROWS_PER_STATEMENT: usize = 32_766 / 3;

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding one SQLite file per site.
    pub root: PathBuf,
    pub busy_timeout: Duration,
    /// Maximum rows per multi-row INSERT statement.
    pub batch_size: usize,
}

impl StoreConfig {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            busy_timeout: Duration::from_secs(5),
            batch_size: 500,
        }
    }

    /// `batch_size` clamped to what one SQLite statement can bind.
    pub fn rows_per_statement(&self) -> usize {
        self.batch_size.clamp(1, MAX_ROWS_PER_STATEMENT)
    }
}

/// Filesystem-safe name of a site's store: path separators become `_`.
pub fn storage_name(site: &str) -> String {
    site.replace(|c: char| c == '/' || c == '\\', "_")
}

#[derive(Debug, sqlx::FromRow)]
struct UsageRow {
    ts: String,
    kwh: f64,
}

impl TryFrom<UsageRow> for UsageRecord {
    type Error = StoreError;

    fn try_from(row: UsageRow) -> Result<Self, Self::Error> {
        let ts = parse_canonical_ts(&row.ts)
            .map_err(|_| StoreError::CorruptTimestamp { value: row.ts.clone() })?;
        Ok(UsageRecord::new(ts, row.kwh))
    }
}

/// Per-site usage persistence.
///
/// Every site lives in its own SQLite file under the configured root. Each
/// operation opens a connection, does its work and closes it again; nothing
/// is held between calls.
#[derive(Debug, Clone)]
pub struct SiteStore {
    config: StoreConfig,
}

impl SiteStore {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn catalog(&self) -> Catalog {
        Catalog::new(&self.config.root)
    }

    pub fn path_for_site(&self, site: &str) -> PathBuf {
        self.config
            .root
            .join(format!("{}.{STORE_EXTENSION}", storage_name(site)))
    }

    async fn connect(&self, path: &Path, create: bool) -> Result<SqliteConnection, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .busy_timeout(self.config.busy_timeout);
        Ok(SqliteConnection::connect_with(&options).await?)
    }

    async fn exists(&self, path: &Path) -> Result<bool, StoreError> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    /// Create the site's store and schema if missing. Safe to repeat.
    pub async fn init(&self, site: &str) -> Result<PathBuf, StoreError> {
        tokio::fs::create_dir_all(&self.config.root)
            .await
            .map_err(|e| StoreError::io(&self.config.root, e))?;

        let path = self.path_for_site(site);
        let mut conn = self.connect(&path, true).await?;
        sqlx::query(CREATE_USAGE_TABLE).execute(&mut conn).await?;
        sqlx::query(CREATE_TS_INDEX).execute(&mut conn).await?;
        conn.close().await?;

        tracing::debug!(site = %site, path = %path.display(), "site store ready");
        Ok(path)
    }

    /// Insert-or-replace `records` keyed by `(site, ts)` in one transaction.
    ///
    /// Returns the number of records presented, which under replace
    /// semantics equals the number of rows written.
    pub async fn upsert(&self, site: &str, records: &[UsageRecord]) -> Result<u64, StoreError> {
        let path = self.path_for_site(site);
        if !self.exists(&path).await? {
            return Err(StoreError::NotInitialized {
                site: site.to_string(),
            });
        }
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect(&path, false).await?;
        let mut tx = conn.begin().await?;
        for chunk in records.chunks(self.config.rows_per_statement()) {
            let mut builder =
                QueryBuilder::<Sqlite>::new("INSERT OR REPLACE INTO usage (site, ts, kwh) ");
            builder.push_values(chunk, |mut b, record| {
                b.push_bind(site)
                    .push_bind(record.canonical_ts())
                    .push_bind(record.kwh);
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        conn.close().await?;

        tracing::debug!(site = %site, rows = records.len(), "upserted usage records");
        Ok(records.len() as u64)
    }

    /// Readings with `start <= ts <= end`, ascending. A site without a store
    /// yields an empty result; an unreadable store is an error.
    ///
    /// The file holds a single site, so rows are not filtered by the `site`
    /// column. Either the original name or its [`storage_name`] finds them.
    pub async fn query_range(
        &self,
        site: &str,
        start: PrimitiveDateTime,
        end: PrimitiveDateTime,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let path = self.path_for_site(site);
        if !self.exists(&path).await? {
            return Ok(Vec::new());
        }

        let mut conn = self.connect(&path, false).await?;
        let rows = sqlx::query_as::<_, UsageRow>(
            r#"
            SELECT ts, kwh
            FROM usage
            WHERE ts BETWEEN ? AND ?
            ORDER BY ts ASC
            "#,
        )
        .bind(format_canonical_ts(start))
        .bind(format_canonical_ts(end))
        .fetch_all(&mut conn)
        .await?;
        conn.close().await?;

        rows.into_iter().map(UsageRecord::try_from).collect()
    }

    pub async fn query_day(&self, site: &str, date: Date) -> Result<Vec<UsageRecord>, StoreError> {
        let (start, end) = day_bounds(date);
        self.query_range(site, start, end).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::{date, datetime};

    fn store(dir: &TempDir) -> SiteStore {
        SiteStore::new(StoreConfig::new(dir.path().join("db")))
    }

    fn rec(ts: PrimitiveDateTime, kwh: f64) -> UsageRecord {
        UsageRecord::new(ts, kwh)
    }

    #[test]
    fn storage_name_replaces_separators() {
        assert_eq!(storage_name("A/B"), "A_B");
        assert_eq!(storage_name("north\\east"), "north_east");
        assert_eq!(storage_name("極楽寺地区"), "極楽寺地区");
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let first = store.init("site-1").await.unwrap();
        let second = store.init("site-1").await.unwrap();
        assert_eq!(first, second);
        assert!(first.exists());
    }

    #[tokio::test]
    async fn concurrent_init_for_same_site_succeeds() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let (a, b) = tokio::join!(store.init("site-1"), store.init("site-1"));
        assert!(a.is_ok());
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn site_with_slash_is_stored_flat_under_root() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let path = store.init("A/B").await.unwrap();
        assert_eq!(path, dir.path().join("db").join("A_B.db"));
        assert!(!dir.path().join("db").join("A").exists());

        store
            .upsert("A/B", &[rec(datetime!(2024-06-01 00:30:00), 1.0)])
            .await
            .unwrap();
        let rows = store.query_day("A/B", date!(2024-06-01)).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn upsert_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init("s").await.unwrap();

        let records = vec![
            rec(datetime!(2024-06-01 00:00:00), 1.0),
            rec(datetime!(2024-06-01 00:30:00), 2.0),
        ];
        assert_eq!(store.upsert("s", &records).await.unwrap(), 2);
        assert_eq!(store.upsert("s", &records).await.unwrap(), 2);

        let rows = store.query_day("s", date!(2024-06-01)).await.unwrap();
        assert_eq!(rows, records);
    }

    #[tokio::test]
    async fn later_upsert_replaces_value() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init("s").await.unwrap();

        let t = datetime!(2024-06-01 12:00:00);
        store.upsert("s", &[rec(t, 5.0)]).await.unwrap();
        store.upsert("s", &[rec(t, 7.0)]).await.unwrap();

        let rows = store.query_day("s", date!(2024-06-01)).await.unwrap();
        assert_eq!(rows, vec![rec(t, 7.0)]);
    }

    #[tokio::test]
    async fn duplicate_timestamps_in_one_batch_keep_last() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init("s").await.unwrap();

        let t = datetime!(2024-06-01 08:00:00);
        store.upsert("s", &[rec(t, 1.0), rec(t, 3.0)]).await.unwrap();

        let rows = store.query_day("s", date!(2024-06-01)).await.unwrap();
        assert_eq!(rows, vec![rec(t, 3.0)]);
    }

    #[tokio::test]
    async fn upsert_spanning_several_statements() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::new(dir.path());
        config.batch_size = 7;
        let store = SiteStore::new(config);
        store.init("s").await.unwrap();

        let day = date!(2024-06-01);
        let records: Vec<_> = (0..48)
            .map(|i| {
                let ts = day.midnight() + time::Duration::minutes(30 * i);
                rec(ts, i as f64)
            })
            .collect();
        assert_eq!(store.upsert("s", &records).await.unwrap(), 48);

        let rows = store.query_day("s", day).await.unwrap();
        assert_eq!(rows, records);
    }

    #[test]
    fn oversized_batch_is_clamped_to_bind_limit() {
        let mut config = StoreConfig::new("db");
        config.batch_size = 50_000;
        assert_eq!(config.rows_per_statement(), 10_922);
        config.batch_size = 0;
        assert_eq!(config.rows_per_statement(), 1);
    }

    #[tokio::test]
    async fn upsert_with_oversized_batch_size_succeeds() {
        let dir = TempDir::new().unwrap();
        let mut config = StoreConfig::new(dir.path());
        config.batch_size = usize::MAX;
        let store = SiteStore::new(config);
        store.init("s").await.unwrap();

        let start = datetime!(2024-01-01 00:00:00);
        let records: Vec<_> = (0..12_000)
            .map(|i| rec(start + time::Duration::minutes(30 * i), 1.0))
            .collect();
        assert_eq!(store.upsert("s", &records).await.unwrap(), 12_000);

        let rows = store
            .query_range("s", start, start + time::Duration::minutes(30 * 11_999))
            .await
            .unwrap();
        assert_eq!(rows.len(), 12_000);
    }

    #[tokio::test]
    async fn upsert_without_init_fails() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store
            .upsert("never", &[rec(datetime!(2024-06-01 00:00:00), 1.0)])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotInitialized { .. }));
    }

    #[tokio::test]
    async fn query_day_returns_only_that_day_ascending() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init("s").await.unwrap();

        store
            .upsert(
                "s",
                &[
                    rec(datetime!(2024-06-02 00:00:00), 9.0),
                    rec(datetime!(2024-06-01 23:30:00), 3.0),
                    rec(datetime!(2024-05-31 23:30:00), 8.0),
                    rec(datetime!(2024-06-01 00:00:00), 1.0),
                    rec(datetime!(2024-06-01 12:00:00), 2.0),
                ],
            )
            .await
            .unwrap();

        let rows = store.query_day("s", date!(2024-06-01)).await.unwrap();
        let stamps: Vec<_> = rows.iter().map(|r| r.canonical_ts()).collect();
        assert_eq!(
            stamps,
            vec![
                "2024-06-01T00:00:00",
                "2024-06-01T12:00:00",
                "2024-06-01T23:30:00",
            ]
        );
    }

    #[tokio::test]
    async fn query_on_missing_store_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let rows = store
            .query_day("unknown-site", date!(2024-01-01))
            .await
            .unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn query_on_corrupt_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        std::fs::create_dir_all(store.root()).unwrap();
        std::fs::write(store.path_for_site("broken"), b"this is not a sqlite file").unwrap();

        let res = store.query_day("broken", date!(2024-01-01)).await;
        assert!(matches!(res, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn sites_are_isolated() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init("a").await.unwrap();
        store.init("b").await.unwrap();

        let t = datetime!(2024-06-01 10:00:00);
        store.upsert("a", &[rec(t, 1.0)]).await.unwrap();

        assert_eq!(store.query_day("a", date!(2024-06-01)).await.unwrap().len(), 1);
        assert!(store.query_day("b", date!(2024-06-01)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_kwh_is_accepted() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.init("feed-in").await.unwrap();

        let t = datetime!(2024-06-01 10:00:00);
        store.upsert("feed-in", &[rec(t, -0.4)]).await.unwrap();
        let rows = store.query_day("feed-in", date!(2024-06-01)).await.unwrap();
        assert_eq!(rows, vec![rec(t, -0.4)]);
    }
}
