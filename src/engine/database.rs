// SPDX-License-Identifier: Apache-2.0

//! Database handle
//!
//! [`Database::builder`] is the single construction entry point: it resolves
//! the provider from the registry, validates the configuration, opens the
//! pool with the pool policy applied, and attaches the query hook (carrying
//! the SQL guard when enabled). The resulting handle is cheap to clone and
//! shared between tasks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use datagate_core::{
    BoxError, ConnectionPoolConfig, DatabaseError, DatasourceConfig, DatasourceError, DbResult,
    Logger, OpContext, Operation,
};
use datagate_drivers::{ConnectorOptions, DialectBinding, Provider, RawPool, Row};
use datagate_sql::{Guard, GuardError};
use tracing::{info, instrument};

use crate::engine::registry::ProviderRegistry;
use crate::interceptor::{blocked_by_guard, QueryError, QueryEvent, QueryHook};
use crate::lifecycle::DatabaseLifecycle;

enum GuardSetting {
    /// Follow `enable_sql_guard` from the datasource config.
    FromConfig,
    Disabled,
    Custom(Guard),
}

/// Optional overrides for [`Database::builder`].
pub struct DatabaseBuilder {
    config: DatasourceConfig,
    registry: Option<Arc<ProviderRegistry>>,
    pool: Option<ConnectionPoolConfig>,
    logger: Option<Logger>,
    hook_enabled: bool,
    guard: GuardSetting,
    connector: ConnectorOptions,
    styled_logs: bool,
}

impl DatabaseBuilder {
    fn new(config: DatasourceConfig) -> Self {
        Self {
            config,
            registry: None,
            pool: None,
            logger: None,
            hook_enabled: true,
            guard: GuardSetting::FromConfig,
            connector: ConnectorOptions::default(),
            styled_logs: true,
        }
    }

    /// Resolve providers from this registry instead of the built-in one.
    pub fn registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use these pool limits instead of the CPU-derived defaults.
    pub fn pool_config(mut self, pool: ConnectionPoolConfig) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn logger(mut self, logger: Logger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Detaches the query hook. This also disables the SQL guard.
    pub fn without_query_hook(mut self) -> Self {
        self.hook_enabled = false;
        self
    }

    /// Disables the SQL guard regardless of the datasource config.
    pub fn without_guard(mut self) -> Self {
        self.guard = GuardSetting::Disabled;
        self
    }

    /// Installs a preconfigured guard, enabling it regardless of the
    /// datasource config.
    pub fn guard(mut self, guard: Guard) -> Self {
        self.guard = GuardSetting::Custom(guard);
        self
    }

    pub fn connector_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.connector = self.connector.with_param(key, value);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.connector = self.connector.with_acquire_timeout(timeout);
        self
    }

    /// Plain query log lines, for JSON or file output.
    pub fn styled_logs(mut self, styled: bool) -> Self {
        self.styled_logs = styled;
        self
    }

    #[instrument(skip(self), fields(dialect = %self.config.dialect))]
    pub async fn open(self) -> DbResult<Database> {
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(ProviderRegistry::builtin()));

        let provider = registry.provider(&self.config.dialect).ok_or_else(|| {
            DatabaseError::new(
                Operation::Lookup,
                DatasourceError::UnsupportedDialectType(self.config.dialect.clone()),
            )
            .with_dialect(self.config.dialect.clone())
            .with_context("supported_dialects", registry.dialects().join(", "))
        })?;

        let config = provider.validate_config(&self.config)?;
        let pool_config = self.pool.unwrap_or_else(ConnectionPoolConfig::detect);
        pool_config.validate().map_err(|e| {
            DatabaseError::new(Operation::Validate, e).with_dialect(provider.dialect())
        })?;

        let (pool, binding) = provider
            .connect(&config, &pool_config, &self.connector)
            .await?;

        let logger = self.logger.unwrap_or_default();
        let guard = match self.guard {
            GuardSetting::Custom(guard) => Some(guard),
            GuardSetting::FromConfig if config.enable_sql_guard => Some(
                Guard::new(logger.named("sql_guard"), Vec::new())
                    .with_dialect(binding.parser_dialect()),
            ),
            _ => None,
        };

        let hook = self.hook_enabled.then(|| {
            QueryHook::new(logger.named("query"), guard.map(Arc::new))
                .with_styling(self.styled_logs)
        });

        info!(
            dsn = %provider.redacted_dsn(&config),
            max_open = pool_config.max_open_conns,
            max_idle = pool_config.max_idle_conns,
            query_hook = hook.is_some(),
            sql_guard = hook.as_ref().and_then(QueryHook::guard).is_some(),
            "datasource opened"
        );

        Ok(Database {
            inner: Arc::new(DatabaseInner {
                config,
                provider,
                pool,
                binding,
                pool_config,
                hook,
                logger,
            }),
        })
    }
}

struct DatabaseInner {
    config: DatasourceConfig,
    provider: Arc<dyn Provider>,
    pool: RawPool,
    binding: DialectBinding,
    pool_config: ConnectionPoolConfig,
    hook: Option<QueryHook>,
    logger: Logger,
}

/// Instrumented, pooled connection handle
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn builder(config: DatasourceConfig) -> DatabaseBuilder {
        DatabaseBuilder::new(config)
    }

    pub fn dialect(&self) -> &'static str {
        self.inner.provider.dialect()
    }

    /// The resolved configuration, with dialect defaults filled in.
    pub fn config(&self) -> &DatasourceConfig {
        &self.inner.config
    }

    pub fn binding(&self) -> &DialectBinding {
        &self.inner.binding
    }

    pub fn pool_config(&self) -> &ConnectionPoolConfig {
        &self.inner.pool_config
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.inner.provider
    }

    /// The uninstrumented pool. Statements sent here bypass the hook.
    pub fn raw(&self) -> &RawPool {
        &self.inner.pool
    }

    pub fn query_hook(&self) -> Option<&QueryHook> {
        self.inner.hook.as_ref()
    }

    pub fn guard(&self) -> Option<&Arc<Guard>> {
        self.inner.hook.as_ref().and_then(QueryHook::guard)
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.logger
    }

    /// Start/stop hooks for the hosting process's lifecycle.
    pub fn lifecycle_hook(&self) -> DatabaseLifecycle {
        DatabaseLifecycle::new(self.clone())
    }

    /// Runs a statement and returns the number of affected rows.
    pub async fn execute(&self, ctx: &OpContext, sql: &str) -> DbResult<u64> {
        self.intercept(ctx, sql, |pool, sql| async move { pool.execute(&sql).await })
            .await
    }

    pub async fn fetch_all(&self, ctx: &OpContext, sql: &str) -> DbResult<Vec<Row>> {
        self.intercept(ctx, sql, |pool, sql| async move { pool.fetch_all(&sql).await })
            .await
    }

    /// Fails when the query returns nothing; see [`is_no_rows`].
    pub async fn fetch_one(&self, ctx: &OpContext, sql: &str) -> DbResult<Row> {
        self.intercept(ctx, sql, |pool, sql| async move { pool.fetch_one(&sql).await })
            .await
    }

    pub async fn fetch_optional(&self, ctx: &OpContext, sql: &str) -> DbResult<Option<Row>> {
        self.intercept(ctx, sql, |pool, sql| async move { pool.fetch_optional(&sql).await })
            .await
    }

    pub async fn ping(&self) -> DbResult<()> {
        self.inner
            .pool
            .ping()
            .await
            .map_err(|e| DatabaseError::new(Operation::Ping, e).with_dialect(self.dialect()))
    }

    pub async fn server_version(&self) -> DbResult<String> {
        self.inner.provider.query_version(&self.inner.pool).await
    }

    pub async fn close(&self) {
        self.inner.pool.close().await;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pool.is_closed()
    }

    async fn intercept<T, F, Fut>(&self, ctx: &OpContext, sql: &str, exec: F) -> DbResult<T>
    where
        F: FnOnce(RawPool, String) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let Some(hook) = &self.inner.hook else {
            return self
                .run_bounded(ctx, exec(self.inner.pool.clone(), sql.to_string()))
                .await;
        };

        let mut event = QueryEvent::new(sql);
        let ctx = hook.before(ctx, &mut event);

        // Blocked statements never reach the server.
        if let Some(blocked) = blocked_by_guard(&ctx) {
            hook.after(&event);
            return Err(self.query_error(blocked));
        }

        let result = self
            .run_bounded(&ctx, exec(self.inner.pool.clone(), sql.to_string()))
            .await;
        if let Err(err) = &result {
            event.error = Some(match err.downcast_ref::<sqlx::Error>() {
                Some(sqlx_err) => QueryError::from_sqlx(sqlx_err),
                None => QueryError::Execution(err.to_string()),
            });
        }
        hook.after(&event);
        result
    }

    /// Honors the context's cancellation and deadline.
    async fn run_bounded<T>(
        &self,
        ctx: &OpContext,
        fut: impl Future<Output = Result<T, sqlx::Error>>,
    ) -> DbResult<T> {
        if let Some(err) = ctx.err() {
            return Err(self.query_error(err));
        }

        let work = async {
            match ctx.remaining() {
                Some(left) => match tokio::time::timeout(left, fut).await {
                    Ok(result) => result.map_err(|e| self.query_error(e)),
                    Err(_) => Err(self.query_error(DatasourceError::Timeout(left))),
                },
                None => fut.await.map_err(|e| self.query_error(e)),
            }
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(self.query_error(DatasourceError::Cancelled)),
            result = work => result,
        }
    }

    fn query_error(&self, cause: impl Into<BoxError>) -> DatabaseError {
        DatabaseError::new(Operation::Query, cause).with_dialect(self.dialect())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect())
            .field("config", &self.inner.config)
            .field("pool_config", &self.inner.pool_config)
            .field("query_hook", &self.inner.hook.is_some())
            .field("sql_guard", &self.guard().is_some())
            .finish()
    }
}

/// The guard error behind a blocked query, if that is why it failed.
pub fn guard_error(err: &DatabaseError) -> Option<&GuardError> {
    err.downcast_ref::<GuardError>()
}

/// True when a query failed only because it matched no rows.
pub fn is_no_rows(err: &DatabaseError) -> bool {
    matches!(err.downcast_ref::<sqlx::Error>(), Some(sqlx::Error::RowNotFound))
}
