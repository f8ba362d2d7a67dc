// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use serde::Serialize;

/// Which rule blocked a statement and why. Created fresh for every check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule: String,
    pub statement: String,
    pub description: String,
}

impl Violation {
    pub fn new(
        rule: impl Into<String>,
        statement: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            rule: rule.into(),
            statement: statement.into(),
            description: description.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.statement, self.description)
    }
}
