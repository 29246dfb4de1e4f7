//! SQL statement gun over the sqlx `Any` driver

use super::{Gun, GunOptions, Shot};
use crate::channel::ResultSender;
use crate::error::{AppError, Result};
use crate::types::{Fired, GunKind, NET_CODE_TIMED_OUT, PROTO_CODE_ERROR, PROTO_CODE_WARNING};
use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a driver error is reflected in the measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlOutcome {
    /// No connection became available in time
    TimedOut,
    /// Pool already closed; codes stay untouched
    ResourceClosed,
    /// Rows came back but could not be decoded
    Warning,
    /// Anything else the driver reported
    Failed,
}

/// Classify a driver error
pub fn classify_sql_error(err: &sqlx::Error) -> SqlOutcome {
    match err {
        sqlx::Error::PoolTimedOut => SqlOutcome::TimedOut,
        sqlx::Error::PoolClosed => SqlOutcome::ResourceClosed,
        sqlx::Error::Decode(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => SqlOutcome::Warning,
        _ => SqlOutcome::Failed,
    }
}

fn record_sql_error(shot: &mut Shot<'_>, err: &sqlx::Error) {
    match classify_sql_error(err) {
        SqlOutcome::TimedOut => {
            warn!(marker = %shot.tag, error = %err, "Timed out waiting for a database connection");
            shot.net_code = NET_CODE_TIMED_OUT;
        }
        SqlOutcome::ResourceClosed => {
            warn!(marker = %shot.tag, error = %err, "Database pool already closed");
        }
        SqlOutcome::Warning => {
            warn!(marker = %shot.tag, error = %err, "Database returned undecodable data");
            shot.proto_code = PROTO_CODE_WARNING;
        }
        SqlOutcome::Failed => {
            warn!(marker = %shot.tag, error = %err, "Database statement failed");
            shot.proto_code = PROTO_CODE_ERROR;
        }
    }
}

/// Gun that executes each payload as a SQL statement
#[derive(Debug)]
pub struct SqlGun {
    db: String,
    pool_size: u32,
    acquire_timeout: Duration,
    pool: OnceLock<AnyPool>,
    results: ResultSender,
}

impl SqlGun {
    /// Requires `db`; optional `pool_size` and `timeout` (seconds)
    pub fn new(options: &GunOptions, results: ResultSender) -> Result<Self> {
        let db = options.get("db")?.to_string();
        let pool_size: u32 = options.get_parsed_or("pool_size", crate::defaults::SQL_POOL_SIZE)?;
        if pool_size == 0 {
            return Err(AppError::gun_config("pool_size must be greater than 0"));
        }
        let timeout_secs: f64 = options.get_parsed_or(
            "timeout",
            crate::defaults::SQL_ACQUIRE_TIMEOUT_SECS as f64,
        )?;
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(AppError::gun_config("SQL timeout must be greater than 0"));
        }

        sqlx::any::install_default_drivers();

        Ok(Self {
            db,
            pool_size,
            acquire_timeout: Duration::from_secs_f64(timeout_secs),
            pool: OnceLock::new(),
            results,
        })
    }

    /// Connection pool, available once `setup` succeeded
    pub fn pool(&self) -> Option<&AnyPool> {
        self.pool.get()
    }
}

#[async_trait]
impl Gun for SqlGun {
    fn kind(&self) -> GunKind {
        GunKind::Sql
    }

    async fn setup(&self) -> Result<()> {
        if self.pool.get().is_some() {
            return Ok(());
        }

        let pool = AnyPoolOptions::new()
            .max_connections(self.pool_size)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.db)
            .await
            .map_err(|e| AppError::gun_config(format!("Failed to connect to database: {}", e)))?;

        info!(gun = "sql", pool_size = self.pool_size, "Database pool ready");
        // A concurrent setup may have won; its pool is kept and ours dropped
        let _ = self.pool.set(pool);
        Ok(())
    }

    async fn shoot(&self, payload: &str, marker: &str) -> Result<Fired> {
        let pool = self
            .pool
            .get()
            .ok_or_else(|| AppError::gun_config("SQL gun used before setup"))?;

        let mut shot = self.results.measure(marker);
        shot.size_out = payload.len() as u64;

        match sqlx::query(payload).fetch_all(pool).await {
            Ok(rows) => {
                shot.size_in = rows.len() as u64;
                debug!(%marker, rows = rows.len(), "Statement executed");
            }
            Err(err) => record_sql_error(&mut shot, &err),
        }
        Ok(Fired::Measured)
    }

    async fn teardown(&self) -> Result<()> {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
            debug!(gun = "sql", "Database pool closed");
        }
        Ok(())
    }
}
