// SPDX-License-Identifier: Apache-2.0

//! Datagate Core
//!
//! Shared building blocks for the datasource layer: configuration types,
//! connection pool sizing policy, the per-call operation context (which
//! carries the guard whitelist marker) and the error taxonomy.

pub mod config;
pub mod context;
pub mod error;
pub mod logger;
pub mod pool;
pub mod sensitive;

pub use config::{normalize_dialect, DatasourceConfig, DIALECT_MYSQL, DIALECT_POSTGRES, DIALECT_SQLITE};
pub use context::{is_whitelisted, with_whitelist, OpContext};
pub use error::{BoxError, DatabaseError, DatasourceError, DbResult, ErrorCategory, Operation};
pub use logger::Logger;
pub use pool::ConnectionPoolConfig;
pub use sensitive::Sensitive;
