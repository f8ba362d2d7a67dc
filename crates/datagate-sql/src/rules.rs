// SPDX-License-Identifier: Apache-2.0

//! Guard rules
//!
//! A rule inspects the parsed statements of one SQL text and reports at most
//! one [`Violation`]. Rules hold no state and can be shared between guards.

use std::sync::Arc;

use sqlparser::ast::{Query, SetExpr, Statement};

use crate::violation::Violation;

pub trait Rule: Send + Sync {
    fn name(&self) -> &str;

    fn check(&self, statements: &[Statement]) -> Option<Violation>;
}

/// The built-in rule set, in evaluation order.
pub fn default_rules() -> Vec<Arc<dyn Rule>> {
    vec![
        Arc::new(NoDrop),
        Arc::new(NoTruncate),
        Arc::new(DeleteRequiresWhere),
    ]
}

/// Blocks DROP of any object, with or without IF EXISTS.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDrop;

impl Rule for NoDrop {
    fn name(&self) -> &str {
        "no_drop"
    }

    fn check(&self, statements: &[Statement]) -> Option<Violation> {
        statements.iter().find(|stmt| is_drop(stmt)).map(|_| {
            Violation::new(self.name(), "DROP", "DROP statements are not allowed")
        })
    }
}

// DROP FUNCTION, DROP TRIGGER and friends have their own variants.
fn is_drop(stmt: &Statement) -> bool {
    matches!(
        stmt,
        Statement::Drop { .. }
            | Statement::DropFunction { .. }
            | Statement::DropDomain { .. }
            | Statement::DropProcedure { .. }
            | Statement::DropSecret { .. }
            | Statement::DropPolicy { .. }
            | Statement::DropConnector { .. }
            | Statement::DropExtension { .. }
            | Statement::DropOperator { .. }
            | Statement::DropOperatorFamily { .. }
            | Statement::DropOperatorClass { .. }
            | Statement::DropTrigger { .. }
    )
}

/// Blocks TRUNCATE.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTruncate;

impl Rule for NoTruncate {
    fn name(&self) -> &str {
        "no_truncate"
    }

    fn check(&self, statements: &[Statement]) -> Option<Violation> {
        statements
            .iter()
            .find(|stmt| matches!(stmt, Statement::Truncate { .. }))
            .map(|_| Violation::new(self.name(), "TRUNCATE", "TRUNCATE statements are not allowed"))
    }
}

/// Blocks DELETE without a WHERE clause.
///
/// The parser yields DELETE in two shapes: a top-level `Statement::Delete`,
/// and a DELETE nested as the body of a query (`WITH ... DELETE ...`, or a
/// data-modifying CTE). Both are inspected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteRequiresWhere;

impl Rule for DeleteRequiresWhere {
    fn name(&self) -> &str {
        "delete_requires_where"
    }

    fn check(&self, statements: &[Statement]) -> Option<Violation> {
        statements
            .iter()
            .find(|stmt| statement_has_unbounded_delete(stmt))
            .map(|_| {
                Violation::new(
                    self.name(),
                    "DELETE",
                    "DELETE without a WHERE clause is not allowed",
                )
            })
    }
}

fn statement_has_unbounded_delete(stmt: &Statement) -> bool {
    match stmt {
        Statement::Delete(delete) => delete.selection.is_none(),
        Statement::Query(query) => query_has_unbounded_delete(query),
        _ => false,
    }
}

fn query_has_unbounded_delete(query: &Query) -> bool {
    let in_ctes = query.with.as_ref().is_some_and(|with| {
        with.cte_tables
            .iter()
            .any(|cte| query_has_unbounded_delete(&cte.query))
    });
    in_ctes || set_expr_has_unbounded_delete(&query.body)
}

fn set_expr_has_unbounded_delete(body: &SetExpr) -> bool {
    match body {
        SetExpr::Delete(inner) => statement_has_unbounded_delete(inner),
        SetExpr::Query(query) => query_has_unbounded_delete(query),
        _ => false,
    }
}
