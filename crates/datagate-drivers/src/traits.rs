// SPDX-License-Identifier: Apache-2.0

//! Provider trait definition
//!
//! The extension point for dialects. Each provider (SQLite, PostgreSQL,
//! MySQL, or a caller-supplied one) implements this trait and is registered
//! under its dialect identifier.

use async_trait::async_trait;
use datagate_core::{
    ConnectionPoolConfig, DatabaseError, DatasourceConfig, DatasourceError, DbResult, Operation,
};

use crate::binding::DialectBinding;
use crate::pool::{ConnectorOptions, RawPool};

/// Per-dialect strategy: validate, connect, introspect.
///
/// Providers are stateless and shared between tasks.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the dialect identifier this provider is registered under
    /// (e.g. "sqlite", "postgres", "mysql")
    fn dialect(&self) -> &'static str;

    /// Checks dialect minimums and returns a resolved copy of the config
    /// with conventional defaults filled in.
    fn validate_config(&self, config: &DatasourceConfig) -> DbResult<DatasourceConfig>;

    /// Builds the connector from a validated config and opens the pool
    ///
    /// The pool policy is applied to the pool builder here. No connection is
    /// made and nothing is pinged; the first use or the lifecycle start
    /// hook does that.
    async fn connect(
        &self,
        config: &DatasourceConfig,
        pool: &ConnectionPoolConfig,
        connector: &ConnectorOptions,
    ) -> DbResult<(RawPool, DialectBinding)>;

    /// Runs the dialect's server version query.
    async fn query_version(&self, pool: &RawPool) -> DbResult<String>;

    /// Connection string safe for logs.
    fn redacted_dsn(&self, config: &DatasourceConfig) -> String {
        config.to_string()
    }
}

/// Runs a version query, refusing pools of another dialect.
pub(crate) async fn query_version_with(
    dialect: &'static str,
    pool: &RawPool,
    sql: &str,
) -> DbResult<String> {
    if pool.dialect() != dialect {
        return Err(DatabaseError::new(
            Operation::QueryVersion,
            DatasourceError::InvalidConfig(format!(
                "expected a {} pool, got {}",
                dialect,
                pool.dialect()
            )),
        )
        .with_dialect(dialect));
    }
    pool.fetch_scalar_string(sql)
        .await
        .map(|v| v.trim().to_string())
        .map_err(|e| DatabaseError::new(Operation::QueryVersion, e).with_dialect(dialect))
}

