// SPDX-License-Identifier: Apache-2.0

//! SQLite Provider
//!
//! Embedded dialect. Accepts any configuration: with no path it opens a
//! shared in-memory database, with a path it creates the file if missing.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use datagate_core::{
    ConnectionPoolConfig, DatabaseError, DatasourceConfig, DbResult, Operation, DIALECT_SQLITE,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow};
use sqlx::{Column, Row as _};
use tracing::debug;

use crate::binding::DialectBinding;
use crate::pool::{pool_options, ConnectorOptions, RawPool};
use crate::traits::{query_version_with, Provider};
use crate::value::{Row, Value};

const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteProvider;

impl SqliteProvider {
    pub fn new() -> Self {
        Self
    }

    fn build_connect_options(
        config: &DatasourceConfig,
        connector: &ConnectorOptions,
    ) -> DbResult<SqliteConnectOptions> {
        let mut options = match config.file_path() {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(30)),
            // Shared cache, so every pooled connection sees the same database.
            None => SqliteConnectOptions::from_str(MEMORY_URL).map_err(|e| {
                DatabaseError::new(Operation::Connect, e).with_dialect(DIALECT_SQLITE)
            })?,
        };

        for (key, value) in &connector.params {
            options = options.pragma(key.clone(), value.clone());
        }
        Ok(options)
    }

    fn describe(config: &DatasourceConfig) -> String {
        match config.file_path() {
            Some(path) => format!("sqlite://{}", path.display()),
            None => MEMORY_URL.to_string(),
        }
    }
}

#[async_trait]
impl Provider for SqliteProvider {
    fn dialect(&self) -> &'static str {
        DIALECT_SQLITE
    }

    fn validate_config(&self, config: &DatasourceConfig) -> DbResult<DatasourceConfig> {
        let mut resolved = config.clone();
        resolved.dialect = DIALECT_SQLITE.to_string();
        Ok(resolved)
    }

    async fn connect(
        &self,
        config: &DatasourceConfig,
        pool: &ConnectionPoolConfig,
        connector: &ConnectorOptions,
    ) -> DbResult<(RawPool, DialectBinding)> {
        let connect_options = Self::build_connect_options(config, connector)?;
        let sqlite_pool: SqlitePool =
            pool_options(pool, connector).connect_lazy_with(connect_options);

        debug!(dsn = %Self::describe(config), max_open = pool.max_open_conns, "sqlite pool created");
        Ok((RawPool::Sqlite(sqlite_pool), DialectBinding::sqlite()))
    }

    async fn query_version(&self, pool: &RawPool) -> DbResult<String> {
        query_version_with(self.dialect(), pool, "SELECT sqlite_version()").await
    }

    fn redacted_dsn(&self, config: &DatasourceConfig) -> String {
        Self::describe(config)
    }
}

/// Converts a SQLx row to a dialect-neutral row
pub(crate) fn convert_row(sqlite_row: &SqliteRow) -> Row {
    let columns = sqlite_row
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let values = sqlite_row
        .columns()
        .iter()
        .map(|col| extract_value(sqlite_row, col.ordinal()))
        .collect();
    Row { columns, values }
}

/// SQLite is dynamically typed, so try types in order of likelihood.
fn extract_value(row: &SqliteRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    Value::Null
}
