// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Process-wide catalog registry
//!
//! Owns every attached database, the DDL-guard table and the deferred
//! table-drop queue. Injected by reference wherever catalogs are needed;
//! nothing here is a global.

use crate::catalog::{CatalogPolicy, LocalCatalog};
use crate::guard::DdlGuards;
use parking_lot::{Condvar, Mutex};
use rdc_common::{RdcError, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

struct DropJob {
    uuid: Uuid,
    data_dir: Option<PathBuf>,
}

struct DropState {
    pending: Mutex<HashSet<Uuid>>,
    finished: Condvar,
}

/// Background queue finalizing dropped tables. A table's UUID stays
/// pending until its data directory is gone; `wait_finally_dropped` blocks
/// on that.
pub(crate) struct DropQueue {
    state: Arc<DropState>,
    tx: mpsc::Sender<DropJob>,
}

impl DropQueue {
    fn new() -> Arc<Self> {
        let state = Arc::new(DropState {
            pending: Mutex::new(HashSet::new()),
            finished: Condvar::new(),
        });
        let (tx, rx) = mpsc::channel::<DropJob>();
        let worker_state = state.clone();
        std::thread::Builder::new()
            .name("catalog-drop".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    finalize_drop(&job);
                    let mut pending = worker_state.pending.lock();
                    pending.remove(&job.uuid);
                    worker_state.finished.notify_all();
                }
            })
            .expect("failed to spawn catalog-drop thread");
        Arc::new(Self { state, tx })
    }

    pub(crate) fn enqueue(&self, uuid: Uuid, data_dir: Option<PathBuf>, sync: bool) {
        let job = DropJob { uuid, data_dir };
        if sync {
            finalize_drop(&job);
            return;
        }
        self.state.pending.lock().insert(uuid);
        if self.tx.send(job).is_err() {
            // Queue thread is gone; finalize inline so nobody waits forever.
            self.state.pending.lock().remove(&uuid);
            self.state.finished.notify_all();
        }
    }

    pub(crate) fn wait_finally_dropped(&self, uuid: Uuid) {
        let mut pending = self.state.pending.lock();
        while pending.contains(&uuid) {
            self.state.finished.wait(&mut pending);
        }
    }
}

fn finalize_drop(job: &DropJob) {
    if let Some(dir) = &job.data_dir {
        if dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(dir) {
                warn!(uuid = %job.uuid, error = %err, "failed to remove table data directory");
            }
        }
    }
}

/// Process-wide registry of attached databases
pub struct CatalogRegistry {
    root: PathBuf,
    databases: dashmap::DashMap<String, Arc<LocalCatalog>>,
    guards: DdlGuards,
    drops: Arc<DropQueue>,
}

impl CatalogRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            root: root.into(),
            databases: dashmap::DashMap::new(),
            guards: DdlGuards::new(),
            drops: DropQueue::new(),
        })
    }

    /// Open the named database, creating its directories on first use.
    /// Already-attached databases are returned as-is.
    pub fn ensure_database(&self, name: &str, policy: CatalogPolicy) -> Result<Arc<LocalCatalog>> {
        if let Some(existing) = self.databases.get(name) {
            return Ok(existing.value().clone());
        }
        let catalog = Arc::new(LocalCatalog::open(name, &self.root, policy, self.drops.clone())?);
        self.databases.insert(name.to_string(), catalog.clone());
        Ok(catalog)
    }

    pub fn database(&self, name: &str) -> Result<Arc<LocalCatalog>> {
        self.databases
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RdcError::UnknownDatabase(name.to_string()))
    }

    pub fn is_database_attached(&self, name: &str) -> bool {
        self.databases.contains_key(name)
    }

    /// Forget a database; its files stay on disk unless the caller removed
    /// them first.
    pub fn detach_database(&self, name: &str) {
        self.databases.remove(name);
    }

    pub fn guards(&self) -> &DdlGuards {
        &self.guards
    }

    /// Block until the catalog has fully released a dropped table's UUID
    pub fn wait_table_finally_dropped(&self, uuid: Uuid) {
        self.drops.wait_finally_dropped(uuid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_database_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let registry = CatalogRegistry::new(dir.path());
        let first = registry.ensure_database("db1", CatalogPolicy::Atomic).unwrap();
        let second = registry.ensure_database("db1", CatalogPolicy::Atomic).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_database_attached("db1"));
    }

    #[test]
    fn test_unknown_database() {
        let dir = TempDir::new().unwrap();
        let registry = CatalogRegistry::new(dir.path());
        assert!(matches!(
            registry.database("nope"),
            Err(RdcError::UnknownDatabase(_))
        ));
    }

    #[test]
    fn test_atomic_database_uuid_is_durable() {
        let dir = TempDir::new().unwrap();
        let registry = CatalogRegistry::new(dir.path());
        let db = registry.ensure_database("db1", CatalogPolicy::Atomic).unwrap();
        let uuid = db.uuid();
        registry.detach_database("db1");
        let reopened = registry.ensure_database("db1", CatalogPolicy::Atomic).unwrap();
        assert_eq!(reopened.uuid(), uuid);
    }

    #[test]
    fn test_transient_database_uuid_is_not() {
        let dir = TempDir::new().unwrap();
        let registry = CatalogRegistry::new(dir.path());
        let db = registry
            .ensure_database("shadow", CatalogPolicy::Transient)
            .unwrap();
        let uuid = db.uuid();
        registry.detach_database("shadow");
        let reopened = registry
            .ensure_database("shadow", CatalogPolicy::Transient)
            .unwrap();
        assert_ne!(reopened.uuid(), uuid);
    }

    #[test]
    fn test_wait_for_dropped_uuid() {
        let dir = TempDir::new().unwrap();
        let registry = CatalogRegistry::new(dir.path());
        let uuid = Uuid::new_v4();
        let data_dir = dir.path().join("data").join(uuid.to_string());
        std::fs::create_dir_all(&data_dir).unwrap();
        registry.drops.enqueue(uuid, Some(data_dir.clone()), false);
        registry.wait_table_finally_dropped(uuid);
        assert!(!data_dir.exists());
    }
}
