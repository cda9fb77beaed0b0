// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! DDL log entries

use rdc_common::{RdcError, Result};
use serde::{Deserialize, Serialize};

/// One record in the shared DDL log. An entry with an empty query is a
/// join marker: replicas bump their log pointer past it without executing
/// anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DdlLogEntry {
    /// Serialized DDL text; empty for markers
    pub query: String,

    /// Host id of the proposing replica
    pub initiator: Option<String>,

    /// Explicit target hosts; empty means every replica
    pub hosts: Vec<String>,
}

impl DdlLogEntry {
    pub fn new(query: String, initiator: String) -> Self {
        Self {
            query,
            initiator: Some(initiator),
            hosts: Vec::new(),
        }
    }

    /// Marker written when a replica joins
    pub fn join_marker() -> Self {
        Self::default()
    }

    pub fn is_marker(&self) -> bool {
        self.query.is_empty()
    }

    pub fn to_wire(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RdcError::LogicalError(format!("cannot serialize log entry: {}", e)))
    }

    pub fn from_wire(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| RdcError::LogicalError(format!("malformed log entry '{}': {}", text, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let entry = DdlLogEntry::new(
            "CREATE TABLE t (x Int32) ENGINE = Log".to_string(),
            "node1:9000:uuid".to_string(),
        );
        let wire = entry.to_wire().unwrap();
        assert_eq!(DdlLogEntry::from_wire(&wire).unwrap(), entry);
    }

    #[test]
    fn test_join_marker() {
        let marker = DdlLogEntry::join_marker();
        assert!(marker.is_marker());
        let wire = marker.to_wire().unwrap();
        assert!(DdlLogEntry::from_wire(&wire).unwrap().is_marker());
    }

    #[test]
    fn test_malformed_wire() {
        assert!(matches!(
            DdlLogEntry::from_wire("not json"),
            Err(RdcError::LogicalError(_))
        ));
    }
}
