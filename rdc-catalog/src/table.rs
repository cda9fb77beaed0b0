// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Table entry definition

use rdc_common::{ObjectKind, RdcError, Result};
use rdc_ddl::{parse_normalized_text, EngineClause};
use uuid::Uuid;

/// One table or dictionary registered in a local catalog
#[derive(Debug, Clone)]
pub struct TableEntry {
    /// Table name inside its database
    pub name: String,

    /// Stable table identity
    pub uuid: Uuid,

    /// Table or dictionary
    pub kind: ObjectKind,

    /// Storage engine clause, when the definition has one
    pub engine: Option<EngineClause>,

    /// Normalized CREATE text, byte-identical to the metadata file
    pub definition: String,
}

impl TableEntry {
    /// Build an entry from a normalized CREATE text
    pub fn from_definition(name: &str, definition: &str) -> Result<Self> {
        let create = parse_normalized_text(name, definition)?;
        let uuid = create
            .uuid
            .ok_or_else(|| RdcError::LogicalError(format!("definition of {} lacks a UUID", name)))?;
        Ok(Self {
            name: name.to_string(),
            uuid,
            kind: create.kind,
            engine: create.engine,
            definition: definition.to_string(),
        })
    }

    pub fn is_dictionary(&self) -> bool {
        self.kind == ObjectKind::Dictionary
    }

    /// Whether dropping this table locally loses data
    pub fn stores_data_on_disk(&self) -> bool {
        match &self.engine {
            Some(engine) => engine.stores_data_on_disk(),
            None => false,
        }
    }

    /// Whether the engine replicates its own data, making the UUID the
    /// sole identity during recovery
    pub fn has_replicated_engine(&self) -> bool {
        self.engine.as_ref().is_some_and(|e| e.is_replicated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(engine: &str) -> String {
        format!(
            "CREATE TABLE _ UUID '{}' (x Int32) ENGINE = {}",
            Uuid::new_v4(),
            engine
        )
    }

    #[test]
    fn test_entry_from_definition() {
        let text = definition("Log");
        let entry = TableEntry::from_definition("t", &text).unwrap();
        assert_eq!(entry.name, "t");
        assert_eq!(entry.definition, text);
        assert!(entry.stores_data_on_disk());
        assert!(!entry.has_replicated_engine());
    }

    #[test]
    fn test_memory_engine_has_no_disk_data() {
        let entry = TableEntry::from_definition("t", &definition("Memory")).unwrap();
        assert!(!entry.stores_data_on_disk());
    }

    #[test]
    fn test_replicated_engine_detection() {
        let entry = TableEntry::from_definition("t", &definition("ReplicatedMergeTree")).unwrap();
        assert!(entry.has_replicated_engine());
        assert!(entry.stores_data_on_disk());
    }

    #[test]
    fn test_rejects_non_normalized_definition() {
        assert!(TableEntry::from_definition("t", "CREATE TABLE t (x Int32) ENGINE = Log").is_err());
    }
}
