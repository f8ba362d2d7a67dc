// SPDX-License-Identifier: Apache-2.0

//! Start/stop coordination
//!
//! [`Lifecycle`] runs registered hooks in order on start and in reverse on
//! stop. [`DatabaseLifecycle`] is the hook a [`Database`] contributes: start
//! pings the server within a bounded time and logs its version, stop closes
//! the pool.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use datagate_core::{BoxError, DatabaseError, DatasourceError, DbResult, Logger, OpContext, Operation};
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use crate::engine::Database;

/// Default bound on the start-up ping.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Bound on closing the pool during stop.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Stop,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Start => f.write_str("start"),
            Phase::Stop => f.write_str("stop"),
        }
    }
}

#[derive(Debug, Error)]
#[error("lifecycle hook {hook} failed to {phase}: {source}")]
pub struct LifecycleError {
    pub hook: String,
    pub phase: Phase,
    #[source]
    pub source: BoxError,
}

impl LifecycleError {
    /// The database failure behind this error, when the hook was a database.
    pub fn database_error(&self) -> Option<&DatabaseError> {
        self.source.downcast_ref::<DatabaseError>()
    }
}

#[async_trait]
pub trait LifecycleHook: Send + Sync {
    fn name(&self) -> &str;

    async fn on_start(&self, ctx: &OpContext) -> Result<(), BoxError>;

    async fn on_stop(&self, ctx: &OpContext) -> Result<(), BoxError>;
}

/// Ordered set of start/stop hooks for a hosting process
pub struct Lifecycle {
    hooks: Vec<Arc<dyn LifecycleHook>>,
    logger: Logger,
}

impl Lifecycle {
    pub fn new(logger: Logger) -> Self {
        Self {
            hooks: Vec::new(),
            logger,
        }
    }

    pub fn append(&mut self, hook: Arc<dyn LifecycleHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Starts hooks in registration order. On the first failure the hooks
    /// already started are stopped in reverse and the failure is returned.
    pub async fn start(&self, ctx: &OpContext) -> Result<(), LifecycleError> {
        for (started, hook) in self.hooks.iter().enumerate() {
            if let Err(source) = hook.on_start(ctx).await {
                self.logger.in_scope(|| {
                    error!(hook = hook.name(), error = %source, "lifecycle start failed, rolling back")
                });
                for done in self.hooks[..started].iter().rev() {
                    if let Err(e) = done.on_stop(ctx).await {
                        self.logger
                            .in_scope(|| warn!(hook = done.name(), error = %e, "rollback stop failed"));
                    }
                }
                return Err(LifecycleError {
                    hook: hook.name().to_string(),
                    phase: Phase::Start,
                    source,
                });
            }
        }
        Ok(())
    }

    /// Stops every hook in reverse order, returning the first failure.
    pub async fn stop(&self, ctx: &OpContext) -> Result<(), LifecycleError> {
        let mut first = None;
        for hook in self.hooks.iter().rev() {
            if let Err(source) = hook.on_stop(ctx).await {
                self.logger
                    .in_scope(|| warn!(hook = hook.name(), error = %source, "lifecycle stop failed"));
                first.get_or_insert(LifecycleError {
                    hook: hook.name().to_string(),
                    phase: Phase::Stop,
                    source,
                });
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(Logger::new("lifecycle"))
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.hooks.iter().map(|h| h.name()).collect();
        f.debug_struct("Lifecycle").field("hooks", &names).finish()
    }
}

/// Verifies connectivity on start and releases the pool on stop.
#[derive(Debug, Clone)]
pub struct DatabaseLifecycle {
    db: Database,
    ping_timeout: Duration,
}

impl DatabaseLifecycle {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            ping_timeout: DEFAULT_PING_TIMEOUT,
        }
    }

    pub fn with_ping_timeout(mut self, ping_timeout: Duration) -> Self {
        self.ping_timeout = ping_timeout;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Pings the server, then reads and logs its version. Both steps share
    /// one time budget and either failing is fatal.
    #[instrument(skip(self, ctx), fields(dialect = self.db.dialect()))]
    pub async fn start(&self, ctx: &OpContext) -> DbResult<()> {
        let dialect = self.db.dialect();
        let ctx = ctx.with_timeout(self.ping_timeout);
        let fail = |op: Operation, cause: BoxError| DatabaseError::new(op, cause).with_dialect(dialect);

        if let Some(err) = ctx.err() {
            return Err(fail(Operation::Ping, err.into()));
        }

        let budget = ctx.remaining().unwrap_or(self.ping_timeout);
        match timeout(budget, self.db.ping()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                self.db.logger().in_scope(|| error!(error = %err, "datasource ping failed"));
                return Err(err);
            }
            Err(_) => {
                self.db
                    .logger()
                    .in_scope(|| error!(timeout_ms = budget.as_millis() as u64, "datasource ping timed out"));
                return Err(fail(Operation::Ping, DatasourceError::Timeout(budget).into()));
            }
        }

        let budget = ctx.remaining().unwrap_or(self.ping_timeout);
        let version = match timeout(budget, self.db.server_version()).await {
            Ok(result) => result?,
            Err(_) => return Err(fail(Operation::QueryVersion, DatasourceError::Timeout(budget).into())),
        };

        self.db.logger().in_scope(|| {
            info!(version = %version, dsn = %self.db.provider().redacted_dsn(self.db.config()), "datasource ready")
        });
        Ok(())
    }

    /// Closes the pool. Never fails: a slow close is logged and abandoned.
    pub async fn stop(&self, _ctx: &OpContext) -> DbResult<()> {
        let logger = self.db.logger();
        logger.in_scope(|| info!(dialect = self.db.dialect(), "closing datasource"));

        match timeout(CLOSE_TIMEOUT, self.db.close()).await {
            Ok(()) => logger.in_scope(|| info!(dialect = self.db.dialect(), "datasource closed")),
            Err(_) => logger.in_scope(|| {
                warn!(
                    timeout_ms = CLOSE_TIMEOUT.as_millis() as u64,
                    "datasource close timed out, abandoning"
                )
            }),
        }
        Ok(())
    }
}

#[async_trait]
impl LifecycleHook for DatabaseLifecycle {
    fn name(&self) -> &str {
        self.db.dialect()
    }

    async fn on_start(&self, ctx: &OpContext) -> Result<(), BoxError> {
        DatabaseLifecycle::start(self, ctx).await.map_err(Into::into)
    }

    async fn on_stop(&self, ctx: &OpContext) -> Result<(), BoxError> {
        DatabaseLifecycle::stop(self, ctx).await.map_err(Into::into)
    }
}
