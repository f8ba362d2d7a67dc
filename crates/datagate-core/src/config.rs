// SPDX-License-Identifier: Apache-2.0

//! Datasource configuration
//!
//! Supplied by the caller (directly or through a configuration file) and
//! treated as immutable once handed to construction. Providers never mutate
//! it; validation returns a resolved copy with dialect defaults filled in.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::sensitive::Sensitive;

pub const DIALECT_SQLITE: &str = "sqlite";
pub const DIALECT_POSTGRES: &str = "postgres";
pub const DIALECT_MYSQL: &str = "mysql";

/// Maps common spellings onto the canonical dialect identifiers.
/// Unknown identifiers are lowercased and returned as-is.
pub fn normalize_dialect(id: &str) -> String {
    let id = id.trim().to_ascii_lowercase();
    match id.as_str() {
        "sqlite3" => DIALECT_SQLITE.to_string(),
        "postgresql" | "pg" | "pgsql" => DIALECT_POSTGRES.to_string(),
        "mariadb" => DIALECT_MYSQL.to_string(),
        _ => id,
    }
}

#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasourceConfig {
    /// Dialect identifier, e.g. `sqlite`, `postgres`, `mysql`.
    #[serde(alias = "type")]
    pub dialect: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<Sensitive<String>>,
    pub database: Option<String>,
    pub schema: Option<String>,
    /// File path for embedded dialects. Empty means in-memory.
    pub path: Option<PathBuf>,
    pub enable_sql_guard: bool,
    pub ssl: bool,
}

impl DatasourceConfig {
    pub fn new(dialect: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            ..Default::default()
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Sensitive::new(password.into()));
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_sql_guard(mut self, enabled: bool) -> Self {
        self.enable_sql_guard = enabled;
        self
    }

    pub fn with_ssl(mut self, ssl: bool) -> Self {
        self.ssl = ssl;
        self
    }

    pub fn normalized_dialect(&self) -> String {
        normalize_dialect(&self.dialect)
    }

    /// Blank strings count as unset.
    pub fn database_name(&self) -> Option<&str> {
        non_blank(self.database.as_deref())
    }

    pub fn user_name(&self) -> Option<&str> {
        non_blank(self.user.as_deref())
    }

    pub fn host_name(&self) -> Option<&str> {
        non_blank(self.host.as_deref())
    }

    pub fn schema_name(&self) -> Option<&str> {
        non_blank(self.schema.as_deref())
    }

    pub fn password_value(&self) -> Option<&str> {
        self.password.as_ref().map(|p| p.expose().as_str())
    }

    /// Path for embedded dialects, `None` when empty.
    pub fn file_path(&self) -> Option<&PathBuf> {
        self.path.as_ref().filter(|p| !p.as_os_str().is_empty())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl fmt::Debug for DatasourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasourceConfig")
            .field("dialect", &self.dialect)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("path", &self.path)
            .field("enable_sql_guard", &self.enable_sql_guard)
            .field("ssl", &self.ssl)
            .finish()
    }
}

/// Credentials are never part of the rendering.
impl fmt::Display for DatasourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = self.file_path() {
            return write!(f, "{}://{}", self.dialect, path.display());
        }
        write!(f, "{}://", self.dialect)?;
        if let Some(user) = self.user_name() {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host_name().unwrap_or("localhost"))?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        if let Some(db) = self.database_name() {
            write!(f, "/{}", db)?;
        }
        Ok(())
    }
}
