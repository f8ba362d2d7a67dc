// SPDX-License-Identifier: Apache-2.0

//! Query interception types

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Query operation kind, used for log styling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Select,
    Insert,
    Update,
    Delete,
    #[default]
    Other,
}

impl OperationKind {
    /// Classifies by leading keyword, skipping comments and opening parens.
    /// A `WITH` prefix is classified by the statement after its CTE list.
    pub fn from_sql(sql: &str) -> Self {
        let mut head = strip_sql_prefix(sql);
        if starts_with_keyword(head, "WITH") {
            head = main_statement_after_ctes(&head[4..]);
        }
        if starts_with_keyword(head, "SELECT") {
            OperationKind::Select
        } else if starts_with_keyword(head, "INSERT") {
            OperationKind::Insert
        } else if starts_with_keyword(head, "UPDATE") {
            OperationKind::Update
        } else if starts_with_keyword(head, "DELETE") {
            OperationKind::Delete
        } else {
            OperationKind::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Select => "SELECT",
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
            OperationKind::Other => "OTHER",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn strip_sql_prefix(sql: &str) -> &str {
    let mut s = sql;
    loop {
        let before = s;
        s = s.trim_start();
        if s.starts_with("--") {
            match s.find('\n') {
                Some(pos) => {
                    s = &s[pos + 1..];
                    continue;
                }
                None => return "",
            }
        }
        if s.starts_with("/*") {
            match s.find("*/") {
                Some(pos) => {
                    s = &s[pos + 2..];
                    continue;
                }
                None => return "",
            }
        }
        if let Some(rest) = s.strip_prefix('(') {
            s = rest;
            continue;
        }
        if s == before {
            return s;
        }
    }
}

const MAIN_KEYWORDS: [&str; 4] = ["SELECT", "INSERT", "UPDATE", "DELETE"];

/// The first top-level DML keyword, skipping parenthesised CTE bodies and
/// string literals. Empty when there is none.
fn main_statement_after_ctes(s: &str) -> &str {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut prev_is_word = false;
    for (idx, ch) in s.char_indices() {
        if in_quote {
            in_quote = ch != '\'';
            continue;
        }
        match ch {
            '\'' => in_quote = true,
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && !prev_is_word => {
                let rest = &s[idx..];
                if MAIN_KEYWORDS.iter().any(|kw| {
                    starts_with_keyword(rest, kw)
                        && !rest[kw.len()..].starts_with(|c: char| c.is_alphanumeric() || c == '_')
                }) {
                    return rest;
                }
            }
            _ => {}
        }
        prev_is_word = ch.is_alphanumeric() || ch == '_';
    }
    ""
}

fn starts_with_keyword(s: &str, keyword: &str) -> bool {
    s.get(..keyword.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(keyword))
}

/// Outcome of the statement as seen by the after-hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// The query matched nothing. Reported to the caller, never logged as an error.
    NoRows,
    Execution(String),
}

impl QueryError {
    pub fn from_sqlx(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => QueryError::NoRows,
            other => QueryError::Execution(other.to_string()),
        }
    }

    pub fn is_no_rows(&self) -> bool {
        matches!(self, QueryError::NoRows)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::NoRows => f.write_str("no rows in result set"),
            QueryError::Execution(msg) => f.write_str(msg),
        }
    }
}

/// Type-keyed side channel between the before and after callbacks.
#[derive(Default)]
pub struct Stash {
    entries: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Stash {
    pub fn insert<T: Any + Send + Sync>(&mut self, value: T) {
        self.entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn remove<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.entries
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for Stash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stash").field("entries", &self.entries.len()).finish()
    }
}

/// One intercepted query. Lives for a single execution.
#[derive(Debug)]
pub struct QueryEvent {
    pub id: Uuid,
    pub query: String,
    pub operation: OperationKind,
    pub started_at: DateTime<Utc>,
    pub error: Option<QueryError>,
    pub stash: Stash,
    started: Instant,
}

impl QueryEvent {
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        Self {
            id: Uuid::new_v4(),
            operation: OperationKind::from_sql(&query),
            query,
            started_at: Utc::now(),
            error: None,
            stash: Stash::default(),
            started: Instant::now(),
        }
    }

    /// Overrides the start instant, for replaying recorded timings.
    pub fn started(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_kind_from_sql() {
        assert_eq!(OperationKind::from_sql("select 1"), OperationKind::Select);
        assert_eq!(OperationKind::from_sql("  WITH x AS (SELECT 1) SELECT * FROM x"), OperationKind::Select);
        assert_eq!(
            OperationKind::from_sql("WITH stale AS (SELECT id FROM sessions) DELETE FROM sessions"),
            OperationKind::Delete
        );
        assert_eq!(
            OperationKind::from_sql("WITH RECURSIVE a(n) AS (SELECT 1), b AS (SELECT ')') UPDATE t SET n = 1"),
            OperationKind::Update
        );
        assert_eq!(
            OperationKind::from_sql("with deleted_rows as (delete from t returning id) insert into log select id from deleted_rows"),
            OperationKind::Insert
        );
        assert_eq!(OperationKind::from_sql("-- note\nINSERT INTO t VALUES (1)"), OperationKind::Insert);
        assert_eq!(OperationKind::from_sql("/* hint */ update t set a = 1"), OperationKind::Update);
        assert_eq!(OperationKind::from_sql("(DELETE FROM t WHERE id = 1)"), OperationKind::Delete);
        assert_eq!(OperationKind::from_sql("DROP TABLE t"), OperationKind::Other);
        assert_eq!(OperationKind::from_sql("-- only a comment"), OperationKind::Other);
        assert_eq!(OperationKind::from_sql(""), OperationKind::Other);
    }

    #[test]
    fn test_no_rows_is_distinguished() {
        assert!(QueryError::from_sqlx(&sqlx::Error::RowNotFound).is_no_rows());
        assert!(!QueryError::from_sqlx(&sqlx::Error::PoolClosed).is_no_rows());
    }

    #[test]
    fn test_stash_is_type_keyed() {
        let mut stash = Stash::default();
        stash.insert(42u32);
        stash.insert("marker".to_string());

        assert_eq!(stash.get::<u32>(), Some(&42));
        assert_eq!(stash.remove::<String>().as_deref(), Some("marker"));
        assert!(stash.get::<String>().is_none());
        assert!(stash.get::<u64>().is_none());
    }

    #[test]
    fn test_event_classifies_on_creation() {
        let event = QueryEvent::new("DELETE FROM users WHERE id = 1");
        assert_eq!(event.operation, OperationKind::Delete);
        assert!(event.error.is_none());
        assert!(event.stash.is_empty());
    }
}
