// SPDX-License-Identifier: Apache-2.0

//! Query timing
//!
//! Classifies elapsed time into a severity and renders the single log line
//! emitted after each query.

use std::sync::OnceLock;
use std::time::Duration;

use colored::{ColoredString, Colorize};
use regex::Regex;

use super::types::OperationKind;

pub const INFO_THRESHOLD: Duration = Duration::from_millis(200);
pub const WARN_THRESHOLD: Duration = Duration::from_millis(500);
pub const HIGH_THRESHOLD: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Under 200ms, logged at debug.
    Low,
    Info,
    Warn,
    /// 1s and above, logged at error.
    High,
}

impl Severity {
    pub fn from_elapsed(elapsed: Duration) -> Self {
        if elapsed >= HIGH_THRESHOLD {
            Severity::High
        } else if elapsed >= WARN_THRESHOLD {
            Severity::Warn
        } else if elapsed >= INFO_THRESHOLD {
            Severity::Info
        } else {
            Severity::Low
        }
    }

    pub fn level(&self) -> tracing::Level {
        match self {
            Severity::Low => tracing::Level::DEBUG,
            Severity::Info => tracing::Level::INFO,
            Severity::Warn => tracing::Level::WARN,
            Severity::High => tracing::Level::ERROR,
        }
    }
}

/// Collapses all whitespace runs, newlines included, into single spaces.
pub fn normalize_sql(sql: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    WHITESPACE
        .get_or_init(|| Regex::new(r"\s+").expect("invalid built-in whitespace regex"))
        .replace_all(sql.trim(), " ")
        .into_owned()
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.3}ms", elapsed.as_secs_f64() * 1000.0)
}

/// Everything that goes into one rendered query line.
#[derive(Debug, Clone, Copy)]
pub struct QueryLine<'a> {
    pub operation: OperationKind,
    pub elapsed: Duration,
    pub severity: Severity,
    pub sql: &'a str,
    /// Already filtered: "no rows" never reaches here.
    pub error: Option<&'a str>,
}

impl QueryLine<'_> {
    pub fn render(&self, styled: bool) -> String {
        let tag = format!("[{}]", self.operation);
        let elapsed = format_elapsed(self.elapsed);
        let sql = normalize_sql(self.sql);

        if !styled {
            return match self.error {
                Some(err) => format!("{} {} {} | error: {}", tag, elapsed, sql, err),
                None => format!("{} {} {}", tag, elapsed, sql),
            };
        }

        let line = format!(
            "{} {} {}",
            style_operation(self.operation, &tag),
            style_elapsed(self.severity, &elapsed),
            sql.white()
        );
        match self.error {
            Some(err) => format!("{} {} {}", line, "| error:".red(), err.red().bold()),
            None => line,
        }
    }
}

fn style_operation(operation: OperationKind, text: &str) -> ColoredString {
    match operation {
        OperationKind::Select => text.blue().bold(),
        OperationKind::Insert => text.green().bold(),
        OperationKind::Update => text.yellow().bold(),
        OperationKind::Delete => text.red().bold(),
        OperationKind::Other => text.magenta().bold(),
    }
}

fn style_elapsed(severity: Severity, text: &str) -> ColoredString {
    match severity {
        Severity::Low => text.dimmed(),
        Severity::Info => text.cyan(),
        Severity::Warn => text.yellow().bold(),
        Severity::High => text.on_red().white().bold(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_boundaries() {
        assert_eq!(Severity::from_elapsed(Duration::from_millis(0)), Severity::Low);
        assert_eq!(Severity::from_elapsed(Duration::from_millis(199)), Severity::Low);
        assert_eq!(Severity::from_elapsed(Duration::from_millis(200)), Severity::Info);
        assert_eq!(Severity::from_elapsed(Duration::from_millis(499)), Severity::Info);
        assert_eq!(Severity::from_elapsed(Duration::from_millis(500)), Severity::Warn);
        assert_eq!(Severity::from_elapsed(Duration::from_millis(999)), Severity::Warn);
        assert_eq!(Severity::from_elapsed(Duration::from_millis(1000)), Severity::High);
        assert_eq!(Severity::from_elapsed(Duration::from_secs(30)), Severity::High);
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(Severity::Low.level(), tracing::Level::DEBUG);
        assert_eq!(Severity::Info.level(), tracing::Level::INFO);
        assert_eq!(Severity::Warn.level(), tracing::Level::WARN);
        assert_eq!(Severity::High.level(), tracing::Level::ERROR);
        assert!(Severity::Warn > Severity::Info);
    }

    #[test]
    fn test_normalize_sql() {
        assert_eq!(
            normalize_sql("  SELECT *\n\tFROM   users\r\n WHERE id = 1  "),
            "SELECT * FROM users WHERE id = 1"
        );
        assert_eq!(normalize_sql(" \n "), "");
    }

    #[test]
    fn test_plain_render() {
        let line = QueryLine {
            operation: OperationKind::Select,
            elapsed: Duration::from_micros(1500),
            severity: Severity::Low,
            sql: "SELECT *\n  FROM users",
            error: None,
        };
        assert_eq!(line.render(false), "[SELECT] 1.500ms SELECT * FROM users");

        let failed = QueryLine { error: Some("no such table: users"), ..line };
        assert_eq!(
            failed.render(false),
            "[SELECT] 1.500ms SELECT * FROM users | error: no such table: users"
        );
    }

    #[test]
    fn test_styled_render_keeps_content() {
        let line = QueryLine {
            operation: OperationKind::Delete,
            elapsed: Duration::from_millis(750),
            severity: Severity::Warn,
            sql: "DELETE FROM users",
            error: Some("blocked"),
        };
        let rendered = line.render(true);
        assert!(rendered.contains("[DELETE]"));
        assert!(rendered.contains("750.000ms"));
        assert!(rendered.contains("DELETE FROM users"));
        assert!(rendered.contains("blocked"));
    }
}
