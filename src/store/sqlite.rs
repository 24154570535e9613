use super::StateStore;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

/// SQLite-backed state store using a sqlx async pool.
pub struct SqliteStateStore {
    pool: SqlitePool,
}

const STATE_SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS bootstrap_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const STATE_SCHEMA_VERSION_KEY: &str = "bootstrap_schema_version";
const STATE_SCHEMA_VERSION: u32 = 1;

async fn ensure_state_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(STATE_SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create bootstrap_schema_meta table")?;

    let stored_version: Option<(String,)> =
        sqlx::query_as("SELECT value FROM bootstrap_schema_meta WHERE key = $1")
            .bind(STATE_SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load bootstrap schema version")?;

    if let Some((value,)) = stored_version {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid bootstrap schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == STATE_SCHEMA_VERSION,
            "incompatible bootstrap schema version: stored={parsed}, expected={STATE_SCHEMA_VERSION}. \
compatibility is disabled; remove state DB and restart."
        );
        return Ok(());
    }

    sqlx::query("INSERT INTO bootstrap_schema_meta (key, value) VALUES ($1, $2)")
        .bind(STATE_SCHEMA_VERSION_KEY)
        .bind(STATE_SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist bootstrap schema version")?;

    Ok(())
}

impl SqliteStateStore {
    /// Create a new store with an existing pool and run migrations.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        ensure_state_schema_version(&pool).await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS bootstrap_state (
                 key        TEXT PRIMARY KEY,
                 value      TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Open (creating if missing) a store at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("open state store at {}", path.display()))?;
        Self::new(pool).await
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl StateStore for SqliteStateStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            let row: Option<(String,)> =
                sqlx::query_as("SELECT value FROM bootstrap_state WHERE key = $1")
                    .bind(key)
                    .fetch_optional(&self.pool)
                    .await
                    .with_context(|| format!("read state key {key}"))?;
            Ok(row.map(|(value,)| value))
        })
    }

    fn put<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let timestamp = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO bootstrap_state (key, value, updated_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT(key) DO UPDATE
                 SET value = excluded.value, updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(&timestamp)
            .execute(&self.pool)
            .await
            .with_context(|| format!("write state key {key}"))?;
            Ok(())
        })
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<bool>> + Send + 'a>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM bootstrap_state WHERE key = $1")
                .bind(key)
                .execute(&self.pool)
                .await
                .with_context(|| format!("remove state key {key}"))?;
            Ok(result.rows_affected() > 0)
        })
    }
}
