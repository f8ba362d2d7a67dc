// SPDX-License-Identifier: Apache-2.0

//! Connection pool sizing policy
//!
//! Limits scale with available CPU parallelism and never drop below a
//! usable floor on small machines. The computed values are applied once,
//! when the pool is built.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DatasourceError;

pub const IDLE_MULTIPLIER: u32 = 2;
pub const MIN_IDLE_FLOOR: u32 = 4;
pub const OPEN_MULTIPLIER: u32 = 4;
pub const MIN_OPEN_FLOOR: u32 = 16;
pub const DEFAULT_CONN_MAX_IDLE_TIME: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolConfig {
    pub max_idle_conns: u32,
    pub max_open_conns: u32,
    #[serde(with = "duration_secs")]
    pub conn_max_idle_time: Duration,
    #[serde(with = "duration_secs")]
    pub conn_max_lifetime: Duration,
}

impl ConnectionPoolConfig {
    /// Computes limits for the given CPU parallelism.
    pub fn for_parallelism(cpus: usize) -> Self {
        let cpus = u32::try_from(cpus.max(1)).unwrap_or(u32::MAX);
        Self {
            max_idle_conns: cpus.saturating_mul(IDLE_MULTIPLIER).max(MIN_IDLE_FLOOR),
            max_open_conns: cpus.saturating_mul(OPEN_MULTIPLIER).max(MIN_OPEN_FLOOR),
            conn_max_idle_time: DEFAULT_CONN_MAX_IDLE_TIME,
            conn_max_lifetime: DEFAULT_CONN_MAX_LIFETIME,
        }
    }

    /// Computes limits from the host's available parallelism.
    pub fn detect() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::for_parallelism(cpus)
    }

    pub fn with_max_idle_conns(mut self, max_idle: u32) -> Self {
        self.max_idle_conns = max_idle;
        self
    }

    pub fn with_max_open_conns(mut self, max_open: u32) -> Self {
        self.max_open_conns = max_open;
        self
    }

    pub fn with_conn_max_idle_time(mut self, idle: Duration) -> Self {
        self.conn_max_idle_time = idle;
        self
    }

    pub fn with_conn_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.conn_max_lifetime = lifetime;
        self
    }

    /// Idle connections kept warm, never more than the open limit.
    pub fn effective_max_idle(&self) -> u32 {
        self.max_idle_conns.min(self.max_open_conns)
    }

    pub fn validate(&self) -> Result<(), DatasourceError> {
        if self.max_open_conns == 0 {
            return Err(DatasourceError::InvalidConfig(
                "max_open_conns must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self::detect()
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_cpu_uses_floors() {
        let cfg = ConnectionPoolConfig::for_parallelism(1);
        assert_eq!(cfg.max_idle_conns, MIN_IDLE_FLOOR);
        assert_eq!(cfg.max_open_conns, MIN_OPEN_FLOOR);
        assert_eq!(cfg.conn_max_idle_time, Duration::from_secs(300));
        assert_eq!(cfg.conn_max_lifetime, Duration::from_secs(1800));
    }

    #[test]
    fn test_zero_parallelism_is_treated_as_one() {
        assert_eq!(
            ConnectionPoolConfig::for_parallelism(0),
            ConnectionPoolConfig::for_parallelism(1)
        );
    }

    #[test]
    fn test_limits_scale_with_cpus() {
        let cfg = ConnectionPoolConfig::for_parallelism(8);
        assert_eq!(cfg.max_idle_conns, 16);
        assert_eq!(cfg.max_open_conns, 32);
    }

    #[test]
    fn test_detect_never_below_floors() {
        let cfg = ConnectionPoolConfig::detect();
        assert!(cfg.max_idle_conns >= MIN_IDLE_FLOOR);
        assert!(cfg.max_open_conns >= MIN_OPEN_FLOOR);
    }

    #[test]
    fn test_overrides_and_validation() {
        let cfg = ConnectionPoolConfig::for_parallelism(1)
            .with_max_open_conns(2)
            .with_conn_max_lifetime(Duration::from_secs(60));
        assert_eq!(cfg.effective_max_idle(), 2);
        assert_eq!(cfg.conn_max_lifetime, Duration::from_secs(60));
        assert!(cfg.validate().is_ok());

        let broken = cfg.with_max_open_conns(0);
        assert!(matches!(broken.validate(), Err(DatasourceError::InvalidConfig(_))));
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let cfg = ConnectionPoolConfig::for_parallelism(1);
        let json = serde_json::to_value(cfg).unwrap();
        assert_eq!(json["conn_max_idle_time"], 300);
        assert_eq!(json["conn_max_lifetime"], 1800);
    }
}
