//! Database persistence.
//!
//! Two tables, one row per metric, replaced wholesale inside a single
//! transaction on every dump so a mid-dump failure leaves the previously
//! persisted state untouched.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::Row;
use tracing::error;
use tracing::info;

use super::PersistenceError;
use crate::store::MetricStore;

const CREATE_COUNTER_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS counter_metrics (name TEXT PRIMARY KEY, value INTEGER NOT NULL)";
const CREATE_GAUGE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS gauge_metrics (name TEXT PRIMARY KEY, value REAL NOT NULL)";

pub struct DatabaseBackend {
    /// `None` when the initial connection failed: the backend is degraded,
    /// every operation reports `NotConnected`, and the server keeps running
    /// memory-only.
    pool: Option<SqlitePool>,
    store: Arc<MetricStore>,
}

impl DatabaseBackend {
    /// Connect and create the schema idempotently. Connection failure
    /// produces a degraded backend instead of aborting startup.
    pub async fn connect(dsn: &str, store: Arc<MetricStore>) -> Self {
        match Self::try_connect(dsn).await {
            Ok(pool) => {
                info!("database backend connected");
                Self { pool: Some(pool), store }
            }
            Err(e) => {
                error!("database connection failed, persistence degraded to memory-only: {e}");
                Self { pool: None, store }
            }
        }
    }

    async fn try_connect(dsn: &str) -> Result<SqlitePool, PersistenceError> {
        let options = SqliteConnectOptions::from_str(dsn)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().max_connections(5).connect_with(options).await?;

        sqlx::query(CREATE_COUNTER_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_GAUGE_TABLE).execute(&pool).await?;
        Ok(pool)
    }

    fn pool(&self) -> Result<&SqlitePool, PersistenceError> {
        self.pool.as_ref().ok_or(PersistenceError::NotConnected)
    }

    /// Atomic full-store replace: clear both tables and re-insert the
    /// current snapshot in one transaction.
    pub async fn dump(&self) -> Result<(), PersistenceError> {
        let pool = self.pool()?;
        let snapshot = self.store.snapshot();

        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM counter_metrics").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM gauge_metrics").execute(&mut *tx).await?;
        for (name, value) in &snapshot.counters {
            sqlx::query("INSERT INTO counter_metrics (name, value) VALUES (?1, ?2)")
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        for (name, value) in &snapshot.gauges {
            sqlx::query("INSERT INTO gauge_metrics (name, value) VALUES (?1, ?2)")
                .bind(name)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Load both tables into the store through the regular update path.
    pub async fn restore(&self) -> Result<(), PersistenceError> {
        let pool = self.pool()?;

        let counters = sqlx::query("SELECT name, value FROM counter_metrics")
            .fetch_all(pool)
            .await?;
        for row in counters {
            let name: String = row.try_get("name")?;
            let value: i64 = row.try_get("value")?;
            self.store.update_counter(&name, value);
        }

        let gauges = sqlx::query("SELECT name, value FROM gauge_metrics").fetch_all(pool).await?;
        for row in gauges {
            let name: String = row.try_get("name")?;
            let value: f64 = row.try_get("value")?;
            self.store.update_gauge(&name, value);
        }
        Ok(())
    }

    /// Connectivity probe for the liveness endpoint.
    pub async fn check(&self) -> Result<(), PersistenceError> {
        let pool = self.pool()?;
        sqlx::query("SELECT 1").execute(pool).await?;
        Ok(())
    }

    /// Release the connection pool.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
