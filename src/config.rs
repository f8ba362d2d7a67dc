// SPDX-License-Identifier: Apache-2.0

//! File configuration
//!
//! One JSON document describes a datasource, its pool limits, connector
//! parameters and logging:
//!
//! ```json
//! {
//!   "datasource": { "type": "postgres", "host": "db", "database": "orders", "enable_sql_guard": true },
//!   "pool": { "max_idle_conns": 8, "max_open_conns": 32 },
//!   "connector": { "sslrootcert": "/etc/ssl/db.pem" },
//!   "acquire_timeout_secs": 10,
//!   "logging": { "level": "debug", "format": "json" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use datagate_core::{ConnectionPoolConfig, DatasourceConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::{Database, DatabaseBuilder};
use crate::observability::LoggingConfig;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatagateConfig {
    pub datasource: DatasourceConfig,
    /// Absent means sized from CPU parallelism at open time.
    pub pool: Option<ConnectionPoolConfig>,
    pub connector: BTreeMap<String, String>,
    pub acquire_timeout_secs: Option<u64>,
    pub logging: LoggingConfig,
}

impl DatagateConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigLoadError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// A builder carrying everything in this file. Further overrides can be
    /// chained before `open`.
    pub fn into_builder(self) -> DatabaseBuilder {
        let styled = self.logging.styled_output();
        let mut builder = Database::builder(self.datasource).styled_logs(styled);
        if let Some(pool) = self.pool {
            builder = builder.pool_config(pool);
        }
        if let Some(secs) = self.acquire_timeout_secs {
            builder = builder.acquire_timeout(Duration::from_secs(secs));
        }
        for (key, value) in self.connector {
            builder = builder.connector_param(key, value);
        }
        builder
    }
}
