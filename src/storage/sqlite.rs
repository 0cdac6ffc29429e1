//! SQLite storage backend implementation
//!
//! The relational variant of the metric store, selected when a database DSN
//! is configured. State lives in two tables keyed by metric name:
//!
//! ```sql
//! metrics_gauge   (name TEXT PRIMARY KEY, value DOUBLE PRECISION)
//! metrics_counter (name TEXT PRIMARY KEY, value BIGINT)
//! ```
//!
//! ## Features
//!
//! - **Upserts**: counters accumulate with `value = value + excluded.value`,
//!   gauges overwrite with `value = excluded.value`
//! - **Transactional batches**: a batch commits as a whole or not at all
//! - **WAL mode**: readers are not blocked by the single writer
//! - **Retries**: busy/locked databases and pool timeouts are retried with the
//!   shared [`RetryPolicy`]
//!
//! ## Limitations
//!
//! - **Single writer**: SQLite serializes writes; heavy concurrent ingest queues
//!   behind the busy timeout

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite, SqliteConnection};
use tracing::{debug, info, instrument, warn};

use super::backend::{HealthStatus, StorageBackend};
use super::error::{StorageError, StorageResult};
use crate::merge::MergeError;
use crate::model::{Batch, Metric, MetricKind, MetricValue};
use crate::retry::RetryPolicy;

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS metrics_gauge (
        name TEXT PRIMARY KEY,
        value DOUBLE PRECISION NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS metrics_counter (
        name TEXT PRIMARY KEY,
        value BIGINT NOT NULL
    )",
];

/// SQLite storage backend
pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    dsn: String,
    retry: RetryPolicy,
}

impl SqliteBackend {
    /// Open (and create if missing) the database named by `dsn`
    ///
    /// `dsn` is either a `sqlite:` URL or a plain file path. The schema is
    /// created on first use.
    ///
    /// ## Example
    ///
    /// ```no_run
    /// # use tally::storage::sqlite::SqliteBackend;
    /// # async fn example() -> anyhow::Result<()> {
    /// let backend = SqliteBackend::new("./metrics.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all, fields(dsn = %dsn.as_ref()))]
    pub async fn new(dsn: impl AsRef<str>) -> StorageResult<Self> {
        let dsn = dsn.as_ref().to_string();

        info!("initializing SQLite backend");

        let options = if dsn.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(&dsn)
                .map_err(|e| StorageError::InvalidConfig(e.to_string()))?
        } else {
            SqliteConnectOptions::new().filename(&dsn)
        };

        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        debug!("creating metric tables");
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        info!("SQLite backend ready");

        Ok(Self {
            pool,
            dsn,
            retry: RetryPolicy::default(),
        })
    }

    /// Replace the retry policy used for transient database errors.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Upsert one update inside an open transaction and return the stored state.
    ///
    /// The write comes first so the transaction holds the write lock before it
    /// reads anything back.
    async fn upsert(conn: &mut SqliteConnection, metric: &Metric) -> StorageResult<Metric> {
        let (value, other_table) = match metric.value {
            MetricValue::Gauge(value) => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO metrics_gauge (name, value) VALUES (?, ?)
                    ON CONFLICT (name) DO UPDATE SET value = excluded.value
                    RETURNING value
                    "#,
                )
                .bind(&metric.id)
                .bind(value)
                .fetch_one(&mut *conn)
                .await?;

                (MetricValue::Gauge(row.try_get("value")?), "metrics_counter")
            }
            MetricValue::Counter(delta) => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO metrics_counter (name, value) VALUES (?, ?)
                    ON CONFLICT (name) DO UPDATE SET value = metrics_counter.value + excluded.value
                    RETURNING typeof(value) AS storage, value
                    "#,
                )
                .bind(&metric.id)
                .bind(delta)
                .fetch_one(&mut *conn)
                .await?;

                // SQLite falls back to REAL when integer addition overflows
                let storage: String = row.try_get("storage")?;
                if storage != "integer" {
                    return Err(MergeError::Overflow {
                        id: metric.id.clone(),
                    }
                    .into());
                }

                (MetricValue::Counter(row.try_get("value")?), "metrics_gauge")
            }
        };

        let conflict = sqlx::query(&format!("SELECT 1 FROM {other_table} WHERE name = ?"))
            .bind(&metric.id)
            .fetch_optional(&mut *conn)
            .await?;

        if conflict.is_some() {
            let update = metric.kind();
            let stored = match update {
                MetricKind::Gauge => MetricKind::Counter,
                MetricKind::Counter => MetricKind::Gauge,
            };
            return Err(MergeError::KindMismatch {
                id: metric.id.clone(),
                stored,
                update,
            }
            .into());
        }

        Ok(Metric::named(&metric.id, value))
    }

    async fn apply_once(&self, metric: &Metric) -> StorageResult<Metric> {
        let mut tx = self.pool.begin().await?;
        let stored = Self::upsert(&mut *tx, metric).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn apply_batch_once(&self, batch: &[Metric]) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        for metric in batch {
            Self::upsert(&mut *tx, metric).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    #[instrument(skip(self, metric), fields(id = %metric.id))]
    async fn apply(&self, metric: Metric) -> StorageResult<Metric> {
        self.retry.run(|| self.apply_once(&metric)).await
    }

    #[instrument(skip(self, batch), fields(count = batch.len()))]
    async fn apply_batch(&self, batch: Batch) -> StorageResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        self.retry.run(|| self.apply_batch_once(&batch)).await?;
        debug!("batch committed");
        Ok(())
    }

    async fn get(&self, kind: MetricKind, id: &str) -> StorageResult<Option<Metric>> {
        let value = match kind {
            MetricKind::Gauge => {
                sqlx::query_scalar::<_, f64>("SELECT value FROM metrics_gauge WHERE name = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(MetricValue::Gauge)
            }
            MetricKind::Counter => {
                sqlx::query_scalar::<_, i64>("SELECT value FROM metrics_counter WHERE name = ?")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(MetricValue::Counter)
            }
        };

        Ok(value.map(|value| Metric::named(id, value)))
    }

    async fn all(&self) -> StorageResult<Vec<Metric>> {
        let gauges: Vec<(String, f64)> = sqlx::query_as("SELECT name, value FROM metrics_gauge")
            .fetch_all(&self.pool)
            .await?;
        let counters: Vec<(String, i64)> =
            sqlx::query_as("SELECT name, value FROM metrics_counter")
                .fetch_all(&self.pool)
                .await?;

        let mut metrics: Vec<Metric> = gauges
            .into_iter()
            .map(|(name, value)| Metric::named(&name, MetricValue::Gauge(value)))
            .chain(
                counters
                    .into_iter()
                    .map(|(name, value)| Metric::named(&name, MetricValue::Counter(value))),
            )
            .collect();
        metrics.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(metrics)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<HealthStatus> {
        match sqlx::query("SELECT 1").fetch_one(&self.pool).await {
            Ok(_) => Ok(HealthStatus::healthy(
                "SQLite backend operational",
                HashMap::from([
                    ("backend".to_string(), "sqlite".to_string()),
                    ("dsn".to_string(), self.dsn.clone()),
                ]),
            )),
            Err(e) => {
                warn!("health check failed: {}", e);
                Ok(HealthStatus::unhealthy(format!("health check failed: {}", e)))
            }
        }
    }

    async fn close(&self) -> StorageResult<()> {
        info!("closing SQLite backend");
        self.pool.close().await;
        Ok(())
    }
}
