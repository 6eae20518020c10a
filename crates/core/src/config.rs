// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexPool.
//
// PlexPool is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexPool is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexPool. If not, see <https://www.gnu.org/licenses/>.

//! Agent-wide pool configuration.
//!
//! The agent hands the pool a flat key-value option map at construction;
//! [`PoolConfig::from_agent_options`] parses the keys the pool consumes and
//! leaves everything else to other subsystems.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised while parsing agent options.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A recognized key carried an unparseable value.
    #[error("invalid value for pool option `{key}`: `{value}`")]
    InvalidValue {
        /// The offending option key.
        key: String,
        /// The raw value as received.
        value: String,
    },

    /// `max` must allow at least one worker.
    #[error("pool option `max` must be at least 1")]
    MaxOutOfRange,
}

/// Configuration for the pool orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Global capacity ceiling shared across all application groups.
    pub max: u32,
    /// How long a worker may sit idle before the garbage collector
    /// detaches it.
    pub max_idle_time: Duration,
    /// Whether pool invariants are re-verified after every mutation.
    pub self_checking: bool,
    /// How often the analytics sweeper reports the pool shape.
    pub analytics_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max: 6,
            max_idle_time: Duration::from_secs(60),
            self_checking: true,
            analytics_interval: Duration::from_secs(15),
        }
    }
}

impl PoolConfig {
    /// Parse the pool's keys out of an agent-wide option map.
    ///
    /// ## Recognized keys
    /// * `max` - capacity ceiling (integer ≥ 1)
    /// * `max_idle_time` - idle reaping threshold in seconds
    /// * `self_checking` - `true` / `false`
    /// * `analytics_interval` - reporting period in seconds
    ///
    /// Unrecognized keys are ignored; they belong to other subsystems.
    pub fn from_agent_options(options: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = options.get("max") {
            config.max = parse(value, "max")?;
        }
        if let Some(value) = options.get("max_idle_time") {
            config.max_idle_time = Duration::from_secs(parse(value, "max_idle_time")?);
        }
        if let Some(value) = options.get("self_checking") {
            config.self_checking = parse(value, "self_checking")?;
        }
        if let Some(value) = options.get("analytics_interval") {
            config.analytics_interval = Duration::from_secs(parse(value, "analytics_interval")?);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pool cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max < 1 {
            return Err(ConfigError::MaxOutOfRange);
        }
        Ok(())
    }
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = PoolConfig::default();
        assert_eq!(config.max, 6);
        assert_eq!(config.max_idle_time, Duration::from_secs(60));
        assert!(config.self_checking);
    }

    #[test]
    fn parses_agent_options() {
        let mut map = HashMap::new();
        map.insert("max".to_string(), "12".to_string());
        map.insert("max_idle_time".to_string(), "300".to_string());
        map.insert("self_checking".to_string(), "false".to_string());
        map.insert("unrelated_agent_key".to_string(), "whatever".to_string());

        let config = PoolConfig::from_agent_options(&map).unwrap();
        assert_eq!(config.max, 12);
        assert_eq!(config.max_idle_time, Duration::from_secs(300));
        assert!(!config.self_checking);
    }

    #[test]
    fn rejects_zero_max() {
        let mut map = HashMap::new();
        map.insert("max".to_string(), "0".to_string());
        assert!(matches!(
            PoolConfig::from_agent_options(&map),
            Err(ConfigError::MaxOutOfRange)
        ));
    }

    #[test]
    fn rejects_garbage_values() {
        let mut map = HashMap::new();
        map.insert("max".to_string(), "lots".to_string());
        assert!(matches!(
            PoolConfig::from_agent_options(&map),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
