// SPDX-License-Identifier: Apache-2.0

//! Dialect binding
//!
//! What the layers above a pool need to know about the connected dialect:
//! its identifier and the parser grammar the SQL guard checks with.

use std::fmt;
use std::sync::Arc;

use datagate_core::{DIALECT_MYSQL, DIALECT_POSTGRES, DIALECT_SQLITE};
use sqlparser::dialect::{Dialect, MySqlDialect, PostgreSqlDialect, SQLiteDialect};

#[derive(Clone)]
pub struct DialectBinding {
    name: &'static str,
    parser: Arc<dyn Dialect + Send + Sync>,
}

impl DialectBinding {
    pub fn new(name: &'static str, parser: Arc<dyn Dialect + Send + Sync>) -> Self {
        Self { name, parser }
    }

    pub fn sqlite() -> Self {
        Self::new(DIALECT_SQLITE, Arc::new(SQLiteDialect {}))
    }

    pub fn postgres() -> Self {
        Self::new(DIALECT_POSTGRES, Arc::new(PostgreSqlDialect {}))
    }

    pub fn mysql() -> Self {
        Self::new(DIALECT_MYSQL, Arc::new(MySqlDialect {}))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parser_dialect(&self) -> Arc<dyn Dialect + Send + Sync> {
        self.parser.clone()
    }
}

impl fmt::Debug for DialectBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialectBinding")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::parser::Parser;

    fn parses(binding: &DialectBinding, sql: &str) -> bool {
        let dialect = binding.parser_dialect();
        Parser::parse_sql(dialect.as_ref(), sql).is_ok()
    }

    #[test]
    fn test_names() {
        assert_eq!(DialectBinding::sqlite().name(), "sqlite");
        assert_eq!(DialectBinding::postgres().name(), "postgres");
        assert_eq!(DialectBinding::mysql().name(), "mysql");
    }

    #[test]
    fn test_parser_follows_dialect() {
        assert!(parses(&DialectBinding::mysql(), "SELECT `id` FROM `orders`"));
        assert!(parses(&DialectBinding::postgres(), "SELECT id FROM orders WHERE id = $1"));
        assert!(parses(&DialectBinding::sqlite(), "SELECT \"id\" FROM \"orders\""));
    }
}
