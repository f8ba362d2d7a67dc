// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Provider
//!
//! Requires a database name; host, port and user fall back to the usual
//! local defaults. A configured schema becomes the session `search_path`.

use async_trait::async_trait;
use datagate_core::{
    ConnectionPoolConfig, DatabaseError, DatasourceConfig, DatasourceError, DbResult, Operation,
    DIALECT_POSTGRES,
};
use sqlx::postgres::{PgConnectOptions, PgPool, PgRow, PgSslMode};
use sqlx::{Column, Row as _};
use tracing::debug;

use crate::binding::DialectBinding;
use crate::dsn::redacted_dsn;
use crate::pool::{pool_options, ConnectorOptions, RawPool};
use crate::traits::{query_version_with, Provider};
use crate::value::{Row, Value};
use crate::DEFAULT_HOST;

pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
const APPLICATION_NAME: &str = "datagate";

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresProvider;

impl PostgresProvider {
    pub fn new() -> Self {
        Self
    }

    fn build_connect_options(
        config: &DatasourceConfig,
        connector: &ConnectorOptions,
    ) -> PgConnectOptions {
        let ssl_mode = if config.ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };

        let mut options = PgConnectOptions::new()
            .host(config.host_name().unwrap_or(DEFAULT_HOST))
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .username(config.user_name().unwrap_or(DEFAULT_USER))
            .ssl_mode(ssl_mode)
            .application_name(APPLICATION_NAME);

        if let Some(database) = config.database_name() {
            options = options.database(database);
        }
        if let Some(password) = config.password_value() {
            options = options.password(password);
        }

        let mut runtime: Vec<(String, String)> = connector
            .params
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(schema) = config.schema_name() {
            runtime.retain(|(k, _)| k != "search_path");
            runtime.push(("search_path".to_string(), schema.to_string()));
        }
        if !runtime.is_empty() {
            options = options.options(runtime);
        }
        options
    }
}

#[async_trait]
impl Provider for PostgresProvider {
    fn dialect(&self) -> &'static str {
        DIALECT_POSTGRES
    }

    fn validate_config(&self, config: &DatasourceConfig) -> DbResult<DatasourceConfig> {
        if config.database_name().is_none() {
            return Err(
                DatabaseError::new(Operation::Validate, DatasourceError::MissingDatabaseName)
                    .with_dialect(DIALECT_POSTGRES),
            );
        }

        let mut resolved = config.clone();
        resolved.dialect = DIALECT_POSTGRES.to_string();
        if resolved.host_name().is_none() {
            resolved.host = Some(DEFAULT_HOST.to_string());
        }
        if resolved.port.is_none() {
            resolved.port = Some(DEFAULT_PORT);
        }
        if resolved.user_name().is_none() {
            resolved.user = Some(DEFAULT_USER.to_string());
        }
        Ok(resolved)
    }

    async fn connect(
        &self,
        config: &DatasourceConfig,
        pool: &ConnectionPoolConfig,
        connector: &ConnectorOptions,
    ) -> DbResult<(RawPool, DialectBinding)> {
        let connect_options = Self::build_connect_options(config, connector);
        let pg_pool: PgPool = pool_options(pool, connector).connect_lazy_with(connect_options);

        debug!(dsn = %self.redacted_dsn(config), max_open = pool.max_open_conns, "postgres pool created");
        Ok((RawPool::Postgres(pg_pool), DialectBinding::postgres()))
    }

    async fn query_version(&self, pool: &RawPool) -> DbResult<String> {
        query_version_with(self.dialect(), pool, "SELECT version()").await
    }

    fn redacted_dsn(&self, config: &DatasourceConfig) -> String {
        redacted_dsn("postgres", config, DEFAULT_PORT)
    }
}

/// Converts a SQLx row to a dialect-neutral row
pub(crate) fn convert_row(pg_row: &PgRow) -> Row {
    let columns = pg_row
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let values = pg_row
        .columns()
        .iter()
        .map(|col| extract_value(pg_row, col.ordinal()))
        .collect();
    Row { columns, values }
}

/// PostgreSQL types are strict, so at most one decoder accepts a column.
fn extract_value(row: &PgRow, idx: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
        return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
        return v.map(|u| Value::Text(u.to_string())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
        return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return v
            .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return v
            .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
        return v.map(Value::Json).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
        return v.map(Value::Bytes).unwrap_or(Value::Null);
    }
    Value::Null
}
