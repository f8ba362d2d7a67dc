// SPDX-License-Identifier: Apache-2.0

// datagate - pooled multi-dialect database connections
// Core library

pub mod config;
pub mod engine;
pub mod interceptor;
pub mod lifecycle;
pub mod observability;

pub use config::{ConfigLoadError, DatagateConfig};
pub use engine::{guard_error, is_no_rows, Database, DatabaseBuilder, ProviderRegistry};
pub use interceptor::{blocked_by_guard, QueryHook};
pub use lifecycle::{DatabaseLifecycle, Lifecycle, LifecycleError, LifecycleHook};
pub use observability::{init_tracing, LogFormat, LoggingConfig};

pub use datagate_core::{
    is_whitelisted, with_whitelist, ConnectionPoolConfig, DatabaseError, DatasourceConfig,
    DatasourceError, DbResult, ErrorCategory, Logger, OpContext, Operation, Sensitive,
};
pub use datagate_drivers::{
    ConnectorOptions, DialectBinding, MySqlProvider, PostgresProvider, Provider, RawPool, Row,
    SqliteProvider, Value,
};
pub use datagate_sql::{default_rules, Guard, GuardError, Rule, Violation};
