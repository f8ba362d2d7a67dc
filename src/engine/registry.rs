// SPDX-License-Identifier: Apache-2.0

//! Provider Registry
//!
//! Maps dialect identifiers to their providers. Built once at startup and
//! handed to [`crate::Database::builder`]; it is never mutated after being
//! shared.

use std::collections::HashMap;
use std::sync::Arc;

use datagate_core::normalize_dialect;
use datagate_drivers::{MySqlProvider, PostgresProvider, Provider, SqliteProvider};

/// Registry that holds the available dialect providers
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Creates a new empty registry
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Creates a registry with the built-in dialects: sqlite, postgres, mysql
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqliteProvider::new()));
        registry.register(Arc::new(PostgresProvider::new()));
        registry.register(Arc::new(MySqlProvider::new()));
        registry
    }

    /// Registers a provider under its `dialect()`
    ///
    /// A later registration for the same dialect replaces the earlier one.
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let id = normalize_dialect(provider.dialect());
        self.providers.insert(id, provider);
    }

    /// Looks up a provider; aliases such as `postgresql` or `mariadb` resolve
    /// to their canonical dialect.
    pub fn provider(&self, dialect: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(&normalize_dialect(dialect)).cloned()
    }

    /// Registered dialect identifiers, sorted
    pub fn dialects(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns true if no providers are registered
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("dialects", &self.dialects())
            .finish()
    }
}
