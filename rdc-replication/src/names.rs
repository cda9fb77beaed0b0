// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Replica naming and identity

use rdc_common::constants::MAX_NAME_LENGTH;
use rdc_common::{RdcError, Result};
use std::fmt;
use uuid::Uuid;

/// A replica slot: `(shard, replica)`, rendered `shard|replica` in the
/// replica registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaName {
    shard: String,
    replica: String,
}

impl ReplicaName {
    pub fn new(shard: &str, replica: &str) -> Result<Self> {
        for (what, name) in [("shard", shard), ("replica", replica)] {
            if name.is_empty() {
                return Err(RdcError::BadArguments(format!(
                    "{} name must be non-empty",
                    what
                )));
            }
            if name.len() > MAX_NAME_LENGTH {
                return Err(RdcError::BadArguments(format!("{} name is too long", what)));
            }
            if name.contains('/') || name.contains('|') {
                return Err(RdcError::BadArguments(format!(
                    "{} name should not contain '/' or '|': {}",
                    what, name
                )));
            }
        }
        Ok(Self {
            shard: shard.to_string(),
            replica: replica.to_string(),
        })
    }

    /// Parse a `shard|replica` registry entry
    pub fn parse_full(name: &str) -> Result<Self> {
        let mut parts = name.split('|');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(shard), Some(replica), None) if !shard.is_empty() && !replica.is_empty() => {
                Self::new(shard, replica)
            }
            _ => Err(RdcError::LogicalError(format!(
                "incorrect replica identifier: {}",
                name
            ))),
        }
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    pub fn replica(&self) -> &str {
        &self.replica
    }

    pub fn full_name(&self) -> String {
        format!("{}|{}", self.shard, self.replica)
    }
}

impl fmt::Display for ReplicaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.shard, self.replica)
    }
}

/// Identity of the process bound to a replica slot: `host:port:db_uuid`.
/// Guards replica names against reuse by a different process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostId {
    pub host: String,
    pub tcp_port: u16,
    pub database_uuid: Uuid,
}

impl HostId {
    pub fn new(host: &str, tcp_port: u16, database_uuid: Uuid) -> Self {
        Self {
            host: host.to_string(),
            tcp_port,
            database_uuid,
        }
    }

    /// Host part of a rendered host id
    pub fn host_of(host_id: &str) -> &str {
        host_id.split(':').next().unwrap_or(host_id)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.tcp_port, self.database_uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_names() {
        let name = ReplicaName::new("s1", "r1").unwrap();
        assert_eq!(name.full_name(), "s1|r1");
        assert_eq!(ReplicaName::parse_full("s1|r1").unwrap(), name);
    }

    #[test]
    fn test_rejected_names() {
        assert!(ReplicaName::new("", "r1").is_err());
        assert!(ReplicaName::new("s1", "").is_err());
        assert!(ReplicaName::new("s/1", "r1").is_err());
        assert!(ReplicaName::new("s1", "r|1").is_err());
    }

    #[test]
    fn test_parse_full_rejects_malformed() {
        assert!(matches!(
            ReplicaName::parse_full("no_separator"),
            Err(RdcError::LogicalError(_))
        ));
        assert!(ReplicaName::parse_full("a|b|c").is_err());
        assert!(ReplicaName::parse_full("|r1").is_err());
    }

    #[test]
    fn test_host_id_rendering() {
        let uuid = Uuid::new_v4();
        let id = HostId::new("node1", 9000, uuid);
        assert_eq!(id.to_string(), format!("node1:9000:{}", uuid));
        assert_eq!(HostId::host_of(&id.to_string()), "node1");
    }
}
