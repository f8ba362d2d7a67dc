// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use thiserror::Error;

use crate::violation::Violation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardErrorKind {
    /// A rule matched. Always carries a [`Violation`].
    DangerousSql,
    /// The parser rejected the input. [`crate::Guard::check`] never returns
    /// this; it is only produced by [`crate::Guard::parse`].
    ParseFailed,
}

impl fmt::Display for GuardErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GuardErrorKind::DangerousSql => f.write_str("dangerous SQL detected"),
            GuardErrorKind::ParseFailed => f.write_str("failed to parse SQL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}{}", suffix(.violation), suffix(.detail))]
pub struct GuardError {
    kind: GuardErrorKind,
    violation: Option<Violation>,
    sql: String,
    detail: Option<String>,
}

impl GuardError {
    pub fn dangerous(violation: Violation, sql: impl Into<String>) -> Self {
        Self {
            kind: GuardErrorKind::DangerousSql,
            violation: Some(violation),
            sql: sql.into(),
            detail: None,
        }
    }

    pub fn parse_failed(sql: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind: GuardErrorKind::ParseFailed,
            violation: None,
            sql: sql.into(),
            detail: Some(detail.into()),
        }
    }

    pub fn kind(&self) -> GuardErrorKind {
        self.kind
    }

    pub fn violation(&self) -> Option<&Violation> {
        self.violation.as_ref()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn is_dangerous(&self) -> bool {
        self.kind == GuardErrorKind::DangerousSql
    }
}

fn suffix<T: fmt::Display>(part: &Option<T>) -> String {
    part.as_ref().map(|p| format!(": {}", p)).unwrap_or_default()
}
