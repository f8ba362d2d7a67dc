// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the datasource layer
//!
//! Construction, startup and query failures are all reported as a
//! [`DatabaseError`]: the dialect and operation that failed, the original
//! cause, and optional context. Well-known causes are [`DatasourceError`]
//! sentinels so callers can test for them with [`DatabaseError::is`].

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Sentinel causes raised by the datasource layer itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasourceError {
    #[error("unsupported dialect type: {0}")]
    UnsupportedDialectType(String),

    #[error("database name is required")]
    MissingDatabaseName,

    #[error("database user is required")]
    MissingUser,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("operation timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,
}

/// The step that was running when a [`DatabaseError`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Validate,
    Lookup,
    Connect,
    Ping,
    QueryVersion,
    Query,
    Close,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Validate => "validate",
            Operation::Lookup => "lookup",
            Operation::Connect => "connect",
            Operation::Ping => "ping",
            Operation::QueryVersion => "version",
            Operation::Query => "query",
            Operation::Close => "close",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification used by callers to decide how to react.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Unsupported dialect or a missing required field. Fatal to construction.
    Configuration,
    /// Connect or ping failure. Fatal at startup.
    Connectivity,
    /// Version query failure. Fatal at startup.
    Introspection,
    /// Query or close failure, including guard blocks.
    Execution,
}

/// A failure at any validation, connect, ping, version or query site.
#[derive(Debug, Error)]
#[error("{}{operation} failed: {source}{}", dialect_prefix(.dialect), context_suffix(.context))]
pub struct DatabaseError {
    dialect: Option<String>,
    operation: Operation,
    #[source]
    source: BoxError,
    context: BTreeMap<String, String>,
}

impl DatabaseError {
    pub fn new(operation: Operation, source: impl Into<BoxError>) -> Self {
        Self {
            dialect: None,
            operation,
            source: source.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.dialect = Some(dialect.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn dialect(&self) -> Option<&str> {
        self.dialect.as_deref()
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn context(&self, key: &str) -> Option<&str> {
        self.context.get(key).map(String::as_str)
    }

    pub fn context_map(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn category(&self) -> ErrorCategory {
        match self.operation {
            Operation::Validate | Operation::Lookup => ErrorCategory::Configuration,
            Operation::Connect | Operation::Ping => ErrorCategory::Connectivity,
            Operation::QueryVersion => ErrorCategory::Introspection,
            Operation::Query | Operation::Close => ErrorCategory::Execution,
        }
    }

    /// Returns true if the wrapped cause is the given sentinel kind.
    /// Payloads are ignored, so any `UnsupportedDialectType(_)` matches.
    pub fn is(&self, sentinel: &DatasourceError) -> bool {
        self.source
            .downcast_ref::<DatasourceError>()
            .is_some_and(|err| std::mem::discriminant(err) == std::mem::discriminant(sentinel))
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }

    pub fn into_source(self) -> BoxError {
        self.source
    }
}

fn dialect_prefix(dialect: &Option<String>) -> String {
    dialect.as_ref().map(|d| format!("{} ", d)).unwrap_or_default()
}

fn context_suffix(context: &BTreeMap<String, String>) -> String {
    if context.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = context.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!(" ({})", pairs.join(", "))
}

/// Result type alias for datasource operations
pub type DbResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_matching_ignores_payload() {
        let err = DatabaseError::new(
            Operation::Lookup,
            DatasourceError::UnsupportedDialectType("oracle".into()),
        );
        assert!(err.is(&DatasourceError::UnsupportedDialectType(String::new())));
        assert!(!err.is(&DatasourceError::MissingDatabaseName));
    }

    #[test]
    fn test_display_includes_dialect_operation_and_context() {
        let err = DatabaseError::new(Operation::Lookup, DatasourceError::UnsupportedDialectType("oracle".into()))
            .with_context("supported_dialects", "mysql, postgres, sqlite");
        assert_eq!(
            err.to_string(),
            "lookup failed: unsupported dialect type: oracle (supported_dialects=mysql, postgres, sqlite)"
        );

        let err = DatabaseError::new(Operation::Ping, DatasourceError::Timeout(Duration::from_millis(250)))
            .with_dialect("postgres");
        assert_eq!(err.to_string(), "postgres ping failed: operation timed out after 250ms");
    }

    #[test]
    fn test_category_follows_operation() {
        let cfg = DatabaseError::new(Operation::Validate, DatasourceError::MissingDatabaseName);
        let ping = DatabaseError::new(Operation::Ping, DatasourceError::Cancelled);
        let version = DatabaseError::new(Operation::QueryVersion, DatasourceError::Cancelled);
        let query = DatabaseError::new(Operation::Query, DatasourceError::Cancelled);

        assert_eq!(cfg.category(), ErrorCategory::Configuration);
        assert_eq!(ping.category(), ErrorCategory::Connectivity);
        assert_eq!(version.category(), ErrorCategory::Introspection);
        assert_eq!(query.category(), ErrorCategory::Execution);
    }

    #[test]
    fn test_source_chain_is_preserved() {
        let err = DatabaseError::new(Operation::Validate, DatasourceError::MissingUser);
        let source = StdError::source(&err).unwrap();
        assert_eq!(source.to_string(), "database user is required");
        assert!(err.downcast_ref::<DatasourceError>().is_some());
    }
}
