// SPDX-License-Identifier: Apache-2.0

//! SQL Guard
//!
//! Evaluates the configured rules, in order, against the parsed statements.
//! The first violation wins and later rules are not consulted. Input that
//! fails to parse is allowed: the guard only blocks what it understands.

use std::fmt;
use std::sync::Arc;

use datagate_core::Logger;
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect, GenericDialect};
use sqlparser::parser::Parser;
use tracing::{debug, trace};

use crate::error::GuardError;
use crate::rules::{default_rules, Rule};

#[derive(Clone)]
pub struct Guard {
    logger: Logger,
    rules: Vec<Arc<dyn Rule>>,
    dialect: Arc<dyn Dialect + Send + Sync>,
}

impl Guard {
    /// Builds a guard. An empty rule list installs [`default_rules`].
    pub fn new(logger: Logger, rules: Vec<Arc<dyn Rule>>) -> Self {
        let rules = if rules.is_empty() { default_rules() } else { rules };
        Self {
            logger,
            rules,
            dialect: Arc::new(GenericDialect {}),
        }
    }

    /// Parses with the given dialect instead of the generic one.
    pub fn with_dialect(mut self, dialect: Arc<dyn Dialect + Send + Sync>) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn parse(&self, sql: &str) -> Result<Vec<Statement>, GuardError> {
        Parser::parse_sql(&*self.dialect, sql)
            .map_err(|err| GuardError::parse_failed(sql, err.to_string()))
    }

    /// Returns an error only when a rule matched.
    pub fn check(&self, sql: &str) -> Result<(), GuardError> {
        let statements = match self.parse(sql) {
            Ok(statements) => statements,
            Err(err) => {
                self.logger.in_scope(|| {
                    debug!(error = %err, sql = sql, "SQL guard could not parse statement, allowing it");
                });
                return Ok(());
            }
        };

        for rule in &self.rules {
            if let Some(violation) = rule.check(&statements) {
                self.logger.in_scope(|| {
                    debug!(rule = %violation.rule, statement = %violation.statement, "SQL guard rule matched");
                });
                return Err(GuardError::dangerous(violation, sql));
            }
        }

        self.logger
            .in_scope(|| trace!(statements = statements.len(), "SQL guard passed"));
        Ok(())
    }
}

impl Default for Guard {
    fn default() -> Self {
        Self::new(Logger::new("sql_guard"), Vec::new())
    }
}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("rules", &self.rule_names())
            .field("dialect", &self.dialect)
            .finish()
    }
}
