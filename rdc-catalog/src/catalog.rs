// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Per-database local catalog
//!
//! Tables live as `<escaped name>.sql` metadata files holding the
//! normalized CREATE text verbatim. Every mutating operation first flushes
//! the session's metadata transaction, so the coordination-store change
//! and the metadata-file change land together or not at all.

use crate::registry::DropQueue;
use crate::session::DdlSession;
use crate::table::TableEntry;
use dashmap::DashMap;
use rdc_common::constants::METADATA_FILE_EXTENSION;
use rdc_common::utils::{escape_for_file_name, unescape_for_file_name};
use rdc_common::{RdcError, Result};
use rdc_ddl::{normalized_create_text, CreateStatement};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a catalog treats table identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogPolicy {
    /// Table UUIDs are durable; this is the policy of replicated databases
    Atomic,
    /// UUIDs are not persisted and may be reused; the policy of the
    /// recovery shadow database
    Transient,
}

/// One database's local metadata
pub struct LocalCatalog {
    name: String,
    uuid: Uuid,
    policy: CatalogPolicy,
    metadata_dir: PathBuf,
    data_dir: PathBuf,
    tables: DashMap<String, TableEntry>,
    drops: Arc<DropQueue>,
}

impl LocalCatalog {
    pub(crate) fn open(
        name: &str,
        root: &Path,
        policy: CatalogPolicy,
        drops: Arc<DropQueue>,
    ) -> Result<Self> {
        let base = root.join(escape_for_file_name(name));
        let metadata_dir = base.join("metadata");
        let data_dir = base.join("data");
        std::fs::create_dir_all(&metadata_dir)?;
        std::fs::create_dir_all(&data_dir)?;

        let uuid = match policy {
            CatalogPolicy::Atomic => Self::load_or_create_uuid(&base)?,
            CatalogPolicy::Transient => Uuid::new_v4(),
        };

        let catalog = Self {
            name: name.to_string(),
            uuid,
            policy,
            metadata_dir,
            data_dir,
            tables: DashMap::new(),
            drops,
        };
        catalog.load_stored_objects()?;
        Ok(catalog)
    }

    fn load_or_create_uuid(base: &Path) -> Result<Uuid> {
        let path = base.join("database.uuid");
        match std::fs::read_to_string(&path) {
            Ok(text) => Uuid::parse_str(text.trim())
                .map_err(|e| RdcError::LogicalError(format!("corrupted database uuid file: {}", e))),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let uuid = Uuid::new_v4();
                std::fs::write(&path, uuid.to_string())?;
                Ok(uuid)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn load_stored_objects(&self) -> Result<()> {
        for entry in std::fs::read_dir(&self.metadata_dir)? {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(stem) = file_name.strip_suffix(METADATA_FILE_EXTENSION) else {
                continue;
            };
            let table_name = unescape_for_file_name(stem);
            let definition = std::fs::read_to_string(entry.path())?;
            match TableEntry::from_definition(&table_name, &definition) {
                Ok(table) => {
                    self.tables.insert(table_name, table);
                }
                Err(err) => {
                    warn!(
                        database = %self.name,
                        table = %table_name,
                        error = %err,
                        "skipping unreadable metadata file"
                    );
                }
            }
        }
        debug!(database = %self.name, tables = self.tables.len(), "loaded stored objects");
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn policy(&self) -> CatalogPolicy {
        self.policy
    }

    pub fn is_table_exist(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn table(&self, name: &str) -> Option<TableEntry> {
        self.tables.get(name).map(|entry| entry.value().clone())
    }

    pub fn uuid_of(&self, name: &str) -> Option<Uuid> {
        self.tables.get(name).map(|entry| entry.uuid)
    }

    /// Snapshot of all registered objects
    pub fn tables(&self) -> Vec<TableEntry> {
        self.tables.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn metadata_file_path(&self, name: &str) -> PathBuf {
        self.metadata_dir
            .join(format!("{}{}", escape_for_file_name(name), METADATA_FILE_EXTENSION))
    }

    fn detached_file_path(&self, name: &str) -> PathBuf {
        self.metadata_dir.join(format!(
            "{}{}.detached",
            escape_for_file_name(name),
            METADATA_FILE_EXTENSION
        ))
    }

    fn table_data_dir(&self, uuid: Uuid) -> PathBuf {
        self.data_dir.join(uuid.to_string())
    }

    /// On-disk metadata text of a table
    pub fn read_metadata_file(&self, name: &str) -> Result<String> {
        std::fs::read_to_string(self.metadata_file_path(name)).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                RdcError::UnknownTable(format!("{}.{}", self.name, name))
            } else {
                err.into()
            }
        })
    }

    /// Flush the session's metadata transaction; a failure aborts the local
    /// change before any file moves.
    fn commit_session(&self, session: &DdlSession) -> Result<()> {
        if let Some(txn) = session.metadata_transaction() {
            txn.commit()?;
        }
        Ok(())
    }

    /// Create a table or dictionary. The statement must already carry its
    /// UUID; the committed metadata file holds the normalized text.
    pub fn create_table(&self, session: &DdlSession, create: &CreateStatement) -> Result<TableEntry> {
        let name = create.name.clone();
        if self.is_table_exist(&name) {
            return Err(RdcError::TableAlreadyExists(format!("{}.{}", self.name, name)));
        }
        let definition = normalized_create_text(create)?;
        let entry = TableEntry::from_definition(&name, &definition)?;

        let final_path = self.metadata_file_path(&name);
        let tmp_path = final_path.with_extension("sql.tmp");
        std::fs::write(&tmp_path, &definition)?;

        if let Err(err) = self.commit_session(session) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }
        std::fs::rename(&tmp_path, &final_path)?;

        if entry.stores_data_on_disk() {
            std::fs::create_dir_all(self.table_data_dir(entry.uuid))?;
        }
        debug!(database = %self.name, table = %name, uuid = %entry.uuid, "created table");
        self.tables.insert(name, entry.clone());
        Ok(entry)
    }

    /// Replace a table's definition with the post-ALTER text
    pub fn commit_alter(&self, session: &DdlSession, name: &str, definition: &str) -> Result<()> {
        if !self.is_table_exist(name) {
            return Err(RdcError::UnknownTable(format!("{}.{}", self.name, name)));
        }
        let entry = TableEntry::from_definition(name, definition)?;

        let final_path = self.metadata_file_path(name);
        let tmp_path = final_path.with_extension("sql.tmp");
        std::fs::write(&tmp_path, definition)?;

        if let Err(err) = self.commit_session(session) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(err);
        }
        std::fs::rename(&tmp_path, &final_path)?;
        debug!(database = %self.name, table = %name, "committed alter");
        self.tables.insert(name.to_string(), entry);
        Ok(())
    }

    /// Drop a table. `sync` removes its data inline instead of deferring to
    /// the background queue.
    pub fn drop_table(&self, session: &DdlSession, name: &str, sync: bool) -> Result<Uuid> {
        let entry = self
            .table(name)
            .ok_or_else(|| RdcError::UnknownTable(format!("{}.{}", self.name, name)))?;
        self.commit_session(session)?;
        std::fs::remove_file(self.metadata_file_path(name))?;
        self.tables.remove(name);
        self.drops.enqueue(entry.uuid, Some(self.table_data_dir(entry.uuid)), sync);
        debug!(database = %self.name, table = %name, uuid = %entry.uuid, "dropped table");
        Ok(entry.uuid)
    }

    /// Detach a table permanently: it disappears from the catalog but its
    /// metadata file survives under a `.detached` suffix.
    pub fn detach_table_permanently(&self, session: &DdlSession, name: &str) -> Result<()> {
        if !self.is_table_exist(name) {
            return Err(RdcError::UnknownTable(format!("{}.{}", self.name, name)));
        }
        self.commit_session(session)?;
        std::fs::rename(self.metadata_file_path(name), self.detached_file_path(name))?;
        self.tables.remove(name);
        debug!(database = %self.name, table = %name, "detached table permanently");
        Ok(())
    }

    /// Move or exchange a table with `to_catalog`. Validation against the
    /// replication rules happens above; this only checks local feasibility.
    pub fn rename_table(
        &self,
        session: &DdlSession,
        name: &str,
        to_catalog: &LocalCatalog,
        to_name: &str,
        exchange: bool,
    ) -> Result<()> {
        let source = self
            .table(name)
            .ok_or_else(|| RdcError::UnknownTable(format!("{}.{}", self.name, name)))?;
        let target = to_catalog.table(to_name);
        if exchange {
            if target.is_none() {
                return Err(RdcError::UnknownTable(format!("{}.{}", to_catalog.name, to_name)));
            }
        } else if target.is_some() {
            return Err(RdcError::TableAlreadyExists(format!(
                "{}.{}",
                to_catalog.name, to_name
            )));
        }

        self.commit_session(session)?;

        let source_path = self.metadata_file_path(name);
        let target_path = to_catalog.metadata_file_path(to_name);
        if exchange {
            let swap_path = source_path.with_extension("sql.swap");
            std::fs::rename(&source_path, &swap_path)?;
            std::fs::rename(&target_path, &source_path)?;
            std::fs::rename(&swap_path, &target_path)?;
        } else {
            std::fs::rename(&source_path, &target_path)?;
        }

        self.tables.remove(name);
        if let Some(mut target) = target {
            if exchange {
                to_catalog.tables.remove(to_name);
                target.name = name.to_string();
                self.tables.insert(name.to_string(), target);
            }
        }
        let mut moved = source;
        moved.name = to_name.to_string();
        to_catalog.tables.insert(to_name.to_string(), moved);
        debug!(
            from = %format!("{}.{}", self.name, name),
            to = %format!("{}.{}", to_catalog.name, to_name),
            exchange,
            "renamed table"
        );
        Ok(())
    }

    /// Drop every object locally; used when the whole database goes away
    pub fn clear_all(&self) -> Result<()> {
        let names = self.table_names();
        for name in names {
            if let Some(entry) = self.table(&name) {
                let _ = std::fs::remove_file(self.metadata_file_path(&name));
                self.tables.remove(&name);
                self.drops
                    .enqueue(entry.uuid, Some(self.table_data_dir(entry.uuid)), true);
            }
        }
        Ok(())
    }
}
