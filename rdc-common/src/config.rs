// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Configuration management for a catalog replica

use crate::constants;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Local metadata directory
    pub meta_dir: PathBuf,

    /// Database name
    pub database: String,

    /// Coordination-store path of the database subtree
    pub store_path: String,

    /// Shard name
    pub shard: String,

    /// Replica name
    pub replica: String,

    /// Host name announced in the replica host id
    pub host: String,

    /// TCP port announced in the replica host id
    pub tcp_port: u16,

    /// How long the proposer waits for remote replicas (ms); 0 = fire and forget
    pub ddl_task_timeout_ms: u64,

    /// Poll interval of the log apply worker (ms)
    pub apply_poll_interval_ms: u64,

    /// Log level
    pub log_level: String,

    /// Log directory
    pub log_dir: PathBuf,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            meta_dir: PathBuf::from("./rdc-meta"),
            database: "default".to_string(),
            store_path: "/rdc/default".to_string(),
            shard: "shard1".to_string(),
            replica: "replica1".to_string(),
            host: "localhost".to_string(),
            tcp_port: constants::DEFAULT_TCP_PORT,
            ddl_task_timeout_ms: constants::DEFAULT_DDL_TASK_TIMEOUT_MS,
            apply_poll_interval_ms: constants::DEFAULT_APPLY_POLL_INTERVAL_MS,
            log_level: "info".to_string(),
            log_dir: PathBuf::from("./log"),
        }
    }
}

impl ReplicaConfig {
    pub fn from_file(path: &PathBuf) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReplicaConfig = toml::from_str(&content)
            .map_err(|e| crate::error::RdcError::BadArguments(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.tcp_port == 0 {
            return Err(crate::error::RdcError::BadArguments(
                "tcp_port cannot be 0".to_string(),
            ));
        }
        if self.database.is_empty() {
            return Err(crate::error::RdcError::BadArguments(
                "database name cannot be empty".to_string(),
            ));
        }
        if self.store_path.is_empty() || self.shard.is_empty() || self.replica.is_empty() {
            return Err(crate::error::RdcError::BadArguments(
                "store path, shard and replica names must be non-empty".to_string(),
            ));
        }
        if self.host.is_empty() {
            return Err(crate::error::RdcError::BadArguments(
                "host cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ReplicaConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_names() {
        let mut config = ReplicaConfig::default();
        config.replica = String::new();
        assert!(config.validate().is_err());

        let mut config = ReplicaConfig::default();
        config.tcp_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = ReplicaConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: ReplicaConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.store_path, config.store_path);
        assert_eq!(parsed.tcp_port, config.tcp_port);
    }
}
