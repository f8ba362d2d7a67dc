// SPDX-License-Identifier: Apache-2.0

//! Datagate Drivers
//!
//! One [`Provider`] per dialect. A provider validates a datasource
//! configuration, opens a lazily-connected sqlx pool sized by the pool
//! policy, reports the dialect binding used by SQL tooling, and knows the
//! dialect's server-version query.

pub mod binding;
pub mod dsn;
pub mod mysql;
pub mod pool;
pub mod postgres;
pub mod sqlite;
pub mod traits;
pub mod value;

pub use binding::DialectBinding;
pub use mysql::MySqlProvider;
pub use pool::{apply_pool_config, ConnectorOptions, PoolStats, RawPool};
pub use postgres::PostgresProvider;
pub use sqlite::SqliteProvider;
pub use traits::Provider;
pub use value::{Row, Value};

/// Host used by network dialects when none is configured.
pub const DEFAULT_HOST: &str = "127.0.0.1";
