// SPDX-License-Identifier: Apache-2.0

//! Pooled raw handle
//!
//! [`RawPool`] erases the dialect of the underlying sqlx pool so that the
//! query hook, the lifecycle hooks and callers can work with any dialect.
//! Statements go straight to the driver: no guard, no logging.

use std::collections::BTreeMap;
use std::time::Duration;

use datagate_core::{ConnectionPoolConfig, DIALECT_MYSQL, DIALECT_POSTGRES, DIALECT_SQLITE};
use sqlx::mysql::MySqlPool;
use sqlx::pool::PoolOptions;
use sqlx::postgres::PgPool;
use sqlx::sqlite::SqlitePool;
use sqlx::Connection;

use crate::value::Row;
use crate::{mysql, postgres, sqlite};

/// Low-level connector settings that sit beside the datasource config.
#[derive(Debug, Clone, Default)]
pub struct ConnectorOptions {
    /// How long `acquire` may wait for a free connection.
    pub acquire_timeout: Option<Duration>,
    /// Dialect-specific parameters: PRAGMAs for SQLite, runtime
    /// parameters for PostgreSQL, charset/collation/timezone for MySQL.
    pub params: BTreeMap<String, String>,
}

impl ConnectorOptions {
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }
}

/// Sets the four pool limits on a sqlx pool builder.
///
/// sqlx has no idle ceiling, so the idle limit becomes the number of
/// connections kept warm, capped by the open limit. The builder is consumed
/// when the pool is created, which is what makes the policy apply once.
pub fn apply_pool_config<DB: sqlx::Database>(
    options: PoolOptions<DB>,
    config: &ConnectionPoolConfig,
) -> PoolOptions<DB> {
    options
        .max_connections(config.max_open_conns)
        .min_connections(config.effective_max_idle())
        .idle_timeout(config.conn_max_idle_time)
        .max_lifetime(config.conn_max_lifetime)
}

pub(crate) fn pool_options<DB: sqlx::Database>(
    config: &ConnectionPoolConfig,
    connector: &ConnectorOptions,
) -> PoolOptions<DB> {
    let options = apply_pool_config(PoolOptions::<DB>::new(), config);
    match connector.acquire_timeout {
        Some(timeout) => options.acquire_timeout(timeout),
        None => options,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
}

#[derive(Debug, Clone)]
pub enum RawPool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
    MySql(MySqlPool),
}

impl RawPool {
    pub fn dialect(&self) -> &'static str {
        match self {
            RawPool::Sqlite(_) => DIALECT_SQLITE,
            RawPool::Postgres(_) => DIALECT_POSTGRES,
            RawPool::MySql(_) => DIALECT_MYSQL,
        }
    }

    /// Acquires a connection and pings it.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        match self {
            RawPool::Sqlite(pool) => pool.acquire().await?.ping().await,
            RawPool::Postgres(pool) => pool.acquire().await?.ping().await,
            RawPool::MySql(pool) => pool.acquire().await?.ping().await,
        }
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error> {
        let affected = match self {
            RawPool::Sqlite(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
            RawPool::Postgres(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
            RawPool::MySql(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }

    pub async fn fetch_all(&self, sql: &str) -> Result<Vec<Row>, sqlx::Error> {
        let rows = match self {
            RawPool::Sqlite(pool) => sqlx::query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(sqlite::convert_row)
                .collect(),
            RawPool::Postgres(pool) => sqlx::query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(postgres::convert_row)
                .collect(),
            RawPool::MySql(pool) => sqlx::query(sql)
                .fetch_all(pool)
                .await?
                .iter()
                .map(mysql::convert_row)
                .collect(),
        };
        Ok(rows)
    }

    /// Fails with `sqlx::Error::RowNotFound` when the result is empty.
    pub async fn fetch_one(&self, sql: &str) -> Result<Row, sqlx::Error> {
        let row = match self {
            RawPool::Sqlite(pool) => sqlite::convert_row(&sqlx::query(sql).fetch_one(pool).await?),
            RawPool::Postgres(pool) => {
                postgres::convert_row(&sqlx::query(sql).fetch_one(pool).await?)
            }
            RawPool::MySql(pool) => mysql::convert_row(&sqlx::query(sql).fetch_one(pool).await?),
        };
        Ok(row)
    }

    pub async fn fetch_optional(&self, sql: &str) -> Result<Option<Row>, sqlx::Error> {
        let row = match self {
            RawPool::Sqlite(pool) => sqlx::query(sql)
                .fetch_optional(pool)
                .await?
                .map(|r| sqlite::convert_row(&r)),
            RawPool::Postgres(pool) => sqlx::query(sql)
                .fetch_optional(pool)
                .await?
                .map(|r| postgres::convert_row(&r)),
            RawPool::MySql(pool) => sqlx::query(sql)
                .fetch_optional(pool)
                .await?
                .map(|r| mysql::convert_row(&r)),
        };
        Ok(row)
    }

    /// Single-row, single-column text query, as used for version probes.
    pub async fn fetch_scalar_string(&self, sql: &str) -> Result<String, sqlx::Error> {
        match self {
            RawPool::Sqlite(pool) => sqlx::query_scalar::<_, String>(sql).fetch_one(pool).await,
            RawPool::Postgres(pool) => sqlx::query_scalar::<_, String>(sql).fetch_one(pool).await,
            RawPool::MySql(pool) => sqlx::query_scalar::<_, String>(sql).fetch_one(pool).await,
        }
    }

    /// Closes the pool, waiting for checked-out connections to come back.
    pub async fn close(&self) {
        match self {
            RawPool::Sqlite(pool) => pool.close().await,
            RawPool::Postgres(pool) => pool.close().await,
            RawPool::MySql(pool) => pool.close().await,
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            RawPool::Sqlite(pool) => pool.is_closed(),
            RawPool::Postgres(pool) => pool.is_closed(),
            RawPool::MySql(pool) => pool.is_closed(),
        }
    }

    pub fn stats(&self) -> PoolStats {
        match self {
            RawPool::Sqlite(pool) => PoolStats { size: pool.size(), idle: pool.num_idle() },
            RawPool::Postgres(pool) => PoolStats { size: pool.size(), idle: pool.num_idle() },
            RawPool::MySql(pool) => PoolStats { size: pool.size(), idle: pool.num_idle() },
        }
    }

    pub fn max_connections(&self) -> u32 {
        match self {
            RawPool::Sqlite(pool) => pool.options().get_max_connections(),
            RawPool::Postgres(pool) => pool.options().get_max_connections(),
            RawPool::MySql(pool) => pool.options().get_max_connections(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Sqlite;

    #[test]
    fn test_apply_pool_config_sets_all_limits() {
        let cfg = ConnectionPoolConfig::for_parallelism(2)
            .with_conn_max_idle_time(Duration::from_secs(42))
            .with_conn_max_lifetime(Duration::from_secs(99));
        let options = apply_pool_config(PoolOptions::<Sqlite>::new(), &cfg);

        assert_eq!(options.get_max_connections(), 16);
        assert_eq!(options.get_min_connections(), 4);
        assert_eq!(options.get_idle_timeout(), Some(Duration::from_secs(42)));
        assert_eq!(options.get_max_lifetime(), Some(Duration::from_secs(99)));
    }

    #[test]
    fn test_idle_is_capped_by_open_limit() {
        let cfg = ConnectionPoolConfig::for_parallelism(1).with_max_open_conns(2);
        let options = apply_pool_config(PoolOptions::<Sqlite>::new(), &cfg);
        assert_eq!(options.get_min_connections(), 2);
    }

    #[test]
    fn test_acquire_timeout_from_connector_options() {
        let connector = ConnectorOptions::default().with_acquire_timeout(Duration::from_secs(3));
        let options = pool_options::<Sqlite>(&ConnectionPoolConfig::for_parallelism(1), &connector);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(3));
    }
}
