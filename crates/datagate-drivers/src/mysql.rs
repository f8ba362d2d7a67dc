// SPDX-License-Identifier: Apache-2.0

//! MySQL Provider
//!
//! Credentials must be explicit: both the user and the database name are
//! required. Host and port default to the local server.

use async_trait::async_trait;
use datagate_core::{
    ConnectionPoolConfig, DatabaseError, DatasourceConfig, DatasourceError, DbResult, Operation,
    DIALECT_MYSQL,
};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlRow, MySqlSslMode};
use sqlx::{Column, Row as _};
use tracing::{debug, warn};

use crate::binding::DialectBinding;
use crate::dsn::redacted_dsn;
use crate::pool::{pool_options, ConnectorOptions, RawPool};
use crate::traits::{query_version_with, Provider};
use crate::value::{Row, Value};
use crate::DEFAULT_HOST;

pub const DEFAULT_PORT: u16 = 3306;

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlProvider;

impl MySqlProvider {
    pub fn new() -> Self {
        Self
    }

    fn build_connect_options(
        config: &DatasourceConfig,
        connector: &ConnectorOptions,
    ) -> MySqlConnectOptions {
        let ssl_mode = if config.ssl {
            MySqlSslMode::Required
        } else {
            MySqlSslMode::Preferred
        };

        let mut options = MySqlConnectOptions::new()
            .host(config.host_name().unwrap_or(DEFAULT_HOST))
            .port(config.port.unwrap_or(DEFAULT_PORT))
            .ssl_mode(ssl_mode);

        if let Some(user) = config.user_name() {
            options = options.username(user);
        }
        if let Some(password) = config.password_value() {
            options = options.password(password);
        }
        if let Some(database) = config.database_name() {
            options = options.database(database);
        }

        for (key, value) in &connector.params {
            options = match key.as_str() {
                "charset" => options.charset(value),
                "collation" => options.collation(value),
                "timezone" | "time_zone" => options.timezone(Some(value.clone())),
                other => {
                    warn!(param = other, "ignoring unsupported mysql connector parameter");
                    options
                }
            };
        }
        options
    }
}

#[async_trait]
impl Provider for MySqlProvider {
    fn dialect(&self) -> &'static str {
        DIALECT_MYSQL
    }

    fn validate_config(&self, config: &DatasourceConfig) -> DbResult<DatasourceConfig> {
        let missing = if config.user_name().is_none() {
            Some(DatasourceError::MissingUser)
        } else if config.database_name().is_none() {
            Some(DatasourceError::MissingDatabaseName)
        } else {
            None
        };
        if let Some(cause) = missing {
            return Err(DatabaseError::new(Operation::Validate, cause).with_dialect(DIALECT_MYSQL));
        }

        let mut resolved = config.clone();
        resolved.dialect = DIALECT_MYSQL.to_string();
        if resolved.host_name().is_none() {
            resolved.host = Some(DEFAULT_HOST.to_string());
        }
        if resolved.port.is_none() {
            resolved.port = Some(DEFAULT_PORT);
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
        let mysql_pool: MySqlPool = pool_options(pool, connector).connect_lazy_with(connect_options);

        debug!(dsn = %self.redacted_dsn(config), max_open = pool.max_open_conns, "mysql pool created");
        Ok((RawPool::MySql(mysql_pool), DialectBinding::mysql()))
    }

    async fn query_version(&self, pool: &RawPool) -> DbResult<String> {
        query_version_with(self.dialect(), pool, "SELECT VERSION()").await
    }

    fn redacted_dsn(&self, config: &DatasourceConfig) -> String {
        redacted_dsn("mysql", config, DEFAULT_PORT)
    }
}

/// Converts a SQLx row to a dialect-neutral row
pub(crate) fn convert_row(mysql_row: &MySqlRow) -> Row {
    let columns = mysql_row
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let values = mysql_row
        .columns()
        .iter()
        .map(|col| extract_value(mysql_row, col.ordinal()))
        .collect();
    Row { columns, values }
}

/// Values past `i64::MAX` are kept exact as text.
fn unsigned_value(u: u64) -> Value {
    i64::try_from(u)
        .map(Value::Int)
        .unwrap_or_else(|_| Value::Text(u.to_string()))
}

fn extract_value(row: &MySqlRow, idx: usize) -> Value {
    // u64 first for BIGINT UNSIGNED columns
    if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
        return v.map(unsigned_value).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
        return v.map(Value::Int).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
        return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
        return v.map(Value::Bool).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
        return v.map(Value::Float).unwrap_or(Value::Null);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
        return v.map(Value::Text).unwrap_or(Value::Null);
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
