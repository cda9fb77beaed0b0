// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! The replicated database
//!
//! Couples one local catalog to the shared coordination-store subtree.
//! Every schema change funnels through the DDL log; the hooks here bind
//! each local catalog mutation to its `/metadata` counterpart through the
//! session's metadata transaction.

use crate::cluster::{self, Cluster};
use crate::layout::StoreLayout;
use crate::log_entry::DdlLogEntry;
use crate::names::{HostId, ReplicaName};
use crate::recovery::RecoveryEngine;
use crate::worker::LogApplyWorker;
use parking_lot::Mutex;
use rdc_catalog::{CatalogPolicy, CatalogRegistry, DdlSession, LocalCatalog, MetadataTransaction, TableEntry};
use rdc_common::constants::DROPPED_MARK;
use rdc_common::{LogPtr, ObjectKind, RdcError, ReplicaConfig, Result};
use rdc_coordination::{CoordinationStore, StoreOp};
use rdc_ddl::{
    apply_alter, normalized_create_text, parse_normalized_text, AlterStatement, CreateStatement,
    DdlParser, DdlStatement,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-replica completion of one proposed entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaStatus {
    pub replica: String,
    pub applied: bool,
}

/// Outcome of a proposed DDL statement
#[derive(Debug, Clone)]
pub struct DdlReport {
    pub entry_id: LogPtr,
    pub entry_path: String,
    pub replicas: Vec<ReplicaStatus>,
}

pub struct ReplicatedDatabase {
    config: ReplicaConfig,
    store: Arc<dyn CoordinationStore>,
    registry: Arc<CatalogRegistry>,
    catalog: Arc<LocalCatalog>,
    layout: StoreLayout,
    replica: ReplicaName,
    host_id: String,
    worker: Mutex<Option<Arc<LogApplyWorker>>>,
}

impl std::fmt::Debug for ReplicatedDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicatedDatabase")
            .field("config", &self.config)
            .field("replica", &self.replica)
            .field("host_id", &self.host_id)
            .finish_non_exhaustive()
    }
}

impl ReplicatedDatabase {
    /// Validate the configuration, lazily bootstrap the store subtree and
    /// register (or resume) this replica. The apply worker is created but
    /// not started; call [`startup`](Self::startup) next.
    pub fn open(
        config: ReplicaConfig,
        store: Arc<dyn CoordinationStore>,
        registry: Arc<CatalogRegistry>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let replica = ReplicaName::new(&config.shard, &config.replica)?;
        let layout = StoreLayout::new(&config.store_path)?;

        let root_exists = store
            .exists(layout.root())
            .map_err(|e| RdcError::NoCoordination(e.to_string()))?;
        if !root_exists {
            // Multiple replicas may bootstrap concurrently; losing the race
            // is success.
            layout.create_database_nodes(store.as_ref())?;
        }

        let catalog = registry.ensure_database(&config.database, CatalogPolicy::Atomic)?;
        let host_id = HostId::new(&config.host, config.tcp_port, catalog.uuid()).to_string();

        let full_name = replica.full_name();
        match store.try_get(&layout.replica_path(&full_name))? {
            Some(existing) if existing == host_id => {
                debug!(replica = %full_name, "resuming existing replica");
            }
            Some(existing) => {
                return Err(RdcError::ReplicaExists(format!(
                    "replica {} of {} already exists, replica host id: '{}', current host id: '{}'",
                    full_name,
                    layout.root(),
                    existing,
                    host_id
                )));
            }
            None => {
                layout.create_replica_nodes(store.as_ref(), &replica, &host_id)?;
                info!(replica = %full_name, path = %layout.root(), "registered replica");
            }
        }

        let database = Arc::new(Self {
            config,
            store,
            registry,
            catalog,
            layout,
            replica,
            host_id,
            worker: Mutex::new(None),
        });
        let worker = LogApplyWorker::new(&database);
        *database.worker.lock() = Some(worker);
        Ok(database)
    }

    /// Reconcile with the authoritative snapshot if this replica is behind,
    /// then start the apply worker.
    pub fn startup(&self) -> Result<()> {
        let full_name = self.replica.full_name();
        let our_ptr = self.layout.read_replica_log_ptr(self.store.as_ref(), &full_name)?;
        let max_ptr = self.layout.read_max_log_ptr(self.store.as_ref())?;

        if our_ptr < max_ptr || (our_ptr == 0 && !self.catalog.is_empty()) {
            RecoveryEngine::new(self).run(our_ptr, max_ptr)?;
        }

        if let Some(worker) = self.worker.lock().as_ref() {
            worker.startup();
        }
        Ok(())
    }

    pub fn config(&self) -> &ReplicaConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<CatalogRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Arc<LocalCatalog> {
        &self.catalog
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn replica_name(&self) -> &ReplicaName {
        &self.replica
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    fn worker_handle(&self) -> Result<Arc<LogApplyWorker>> {
        self.worker
            .lock()
            .clone()
            .ok_or_else(|| RdcError::LogicalError("apply worker is gone".to_string()))
    }

    fn worker_is_active(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|w| w.is_currently_active())
    }

    /// Accept a DDL statement from a client session: normalize it, enqueue
    /// a log entry (which also applies it locally) and, unless the task
    /// timeout is zero, wait for the other replicas to report completion.
    pub fn propose(&self, query: &str, session: &DdlSession) -> Result<DdlReport> {
        if !session.is_initial_query() {
            return Err(RdcError::IncorrectQuery(
                "it's not an initial query; ON CLUSTER is not allowed for a replicated database"
                    .to_string(),
            ));
        }

        let mut stmt = DdlParser::parse(query)?;
        if stmt.on_cluster().is_some() {
            return Err(RdcError::IncorrectQuery(
                "ON CLUSTER is not allowed for a replicated database".to_string(),
            ));
        }
        self.validate_proposal(&stmt)?;
        stmt.strip_database();

        // The initiator fixes the table UUID; every replica then creates
        // the same table identity from the logged text.
        if let DdlStatement::Create(create) = &mut stmt {
            if create.uuid.is_none() {
                create.uuid = Some(Uuid::new_v4());
            }
        }

        let serialized = stmt.to_sql();
        debug!(query = %serialized, "proposing query");
        let entry = DdlLogEntry::new(serialized, self.host_id.clone());
        let worker = self.worker_handle()?;
        let (entry_id, entry_path) = worker.try_enqueue_and_execute_entry(entry, session)?;

        let replicas = if session.ddl_task_timeout().is_zero() {
            Vec::new()
        } else {
            self.wait_for_replicas(session, entry_id)?
        };

        Ok(DdlReport {
            entry_id,
            entry_path,
            replicas,
        })
    }

    /// Checks that must hold before an entry is enqueued: once in the log,
    /// a statement executes (or fails) on every replica.
    fn validate_proposal(&self, stmt: &DdlStatement) -> Result<()> {
        match stmt {
            DdlStatement::Create(create) => {
                if create.attach {
                    return Err(RdcError::NotImplemented(
                        "ATTACH is not replicated; attach tables locally".to_string(),
                    ));
                }
                if !create.if_not_exists && self.catalog.is_table_exist(&create.name) {
                    return Err(RdcError::TableAlreadyExists(format!(
                        "{}.{}",
                        self.config.database, create.name
                    )));
                }
                Ok(())
            }
            DdlStatement::Alter(alter) => {
                for command in &alter.commands {
                    if !command.is_supported() {
                        return Err(RdcError::NotImplemented(format!(
                            "unsupported type of ALTER query: {}",
                            command.to_sql()
                        )));
                    }
                }
                self.check_table_exists(&alter.name)
            }
            DdlStatement::Drop(drop) => {
                if drop.if_exists {
                    Ok(())
                } else {
                    self.check_table_exists(&drop.name)
                }
            }
            DdlStatement::Detach(detach) => {
                if !detach.permanently {
                    return Err(RdcError::NotImplemented(
                        "only DETACH TABLE PERMANENTLY is replicated".to_string(),
                    ));
                }
                self.check_table_exists(&detach.name)
            }
            DdlStatement::Rename(rename) => {
                let ours = self.config.database.as_str();
                let from_db = rename.from_database.as_deref().unwrap_or(ours);
                let to_db = rename.to_database.as_deref().unwrap_or(ours);
                if from_db != to_db || from_db != ours {
                    return Err(RdcError::NotImplemented(
                        "moving tables between databases is not supported for a replicated database"
                            .to_string(),
                    ));
                }
                if rename.from == rename.to {
                    return Err(RdcError::IncorrectQuery(
                        "cannot rename table to itself".to_string(),
                    ));
                }
                self.check_table_exists(&rename.from)?;
                if rename.exchange {
                    self.check_table_exists(&rename.to)?;
                }
                Ok(())
            }
        }
    }

    fn check_table_exists(&self, name: &str) -> Result<()> {
        if self.catalog.is_table_exist(name) {
            Ok(())
        } else {
            Err(RdcError::UnknownTable(format!(
                "{}.{}",
                self.config.database, name
            )))
        }
    }

    /// Poll the registry snapshot until every live replica has applied the
    /// entry, the timeout lapses, or the session is cancelled.
    fn wait_for_replicas(&self, session: &DdlSession, entry_id: LogPtr) -> Result<Vec<ReplicaStatus>> {
        let (mut names, _) = self.store.get_children(&self.layout.replicas_path())?;
        names.sort();

        let deadline = Instant::now() + session.ddl_task_timeout();
        let mut applied: Vec<bool> = vec![false; names.len()];
        let mut dropped: Vec<bool> = vec![false; names.len()];
        loop {
            for (index, name) in names.iter().enumerate() {
                if applied[index] || dropped[index] {
                    continue;
                }
                match self.store.try_get(&self.layout.replica_path(name))? {
                    None => dropped[index] = true,
                    Some(value) if value == DROPPED_MARK => dropped[index] = true,
                    Some(_) => {
                        let ptr = self
                            .store
                            .try_get(&self.layout.replica_log_ptr_path(name))?
                            .and_then(|text| text.parse::<LogPtr>().ok())
                            .unwrap_or(0);
                        if ptr >= entry_id {
                            applied[index] = true;
                        }
                    }
                }
            }
            let all_done = names
                .iter()
                .enumerate()
                .all(|(i, _)| applied[i] || dropped[i]);
            if all_done || session.is_cancelled() || Instant::now() >= deadline {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        Ok(names
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !dropped[*i])
            .map(|(i, replica)| ReplicaStatus {
                replica,
                applied: applied[i],
            })
            .collect())
    }

    /// Execute one log entry against this replica. Initial sessions flush
    /// their metadata transaction into the store; secondary sessions only
    /// replay the local side.
    pub(crate) fn execute_entry(&self, entry: &DdlLogEntry, session: &DdlSession) -> Result<()> {
        if entry.is_marker() {
            return Ok(());
        }
        let mut stmt = DdlParser::parse(&entry.query)?;
        stmt.strip_database();

        let txn = Arc::new(MetadataTransaction::new(
            self.store.clone(),
            session.is_initial_query(),
        ));
        session.set_metadata_transaction(txn);

        let db_name = self.config.database.as_str();
        match stmt {
            DdlStatement::Create(create) => {
                let _guard = self.registry.guards().acquire(db_name, &create.name);
                match create.kind {
                    ObjectKind::Table => self.create_table(session, &create).map(|_| ()),
                    ObjectKind::Dictionary => self.create_dictionary(session, &create).map(|_| ()),
                }
            }
            DdlStatement::Alter(alter) => {
                let _guard = self.registry.guards().acquire(db_name, &alter.name);
                self.alter_table(session, &alter)
            }
            DdlStatement::Drop(drop) => {
                if drop.if_exists && !self.catalog.is_table_exist(&drop.name) {
                    return Ok(());
                }
                let _guard = self.registry.guards().acquire(db_name, &drop.name);
                match drop.kind {
                    ObjectKind::Table => self.drop_table(session, &drop.name, drop.sync),
                    ObjectKind::Dictionary => self.remove_dictionary(session, &drop.name),
                }
            }
            DdlStatement::Detach(detach) => {
                if !detach.permanently {
                    return Err(RdcError::NotImplemented(
                        "only DETACH TABLE PERMANENTLY is replicated".to_string(),
                    ));
                }
                let _guard = self.registry.guards().acquire(db_name, &detach.name);
                self.detach_table_permanently(session, &detach.name)
            }
            DdlStatement::Rename(rename) => {
                let _guards = self
                    .registry
                    .guards()
                    .acquire_pair((db_name, &rename.from), (db_name, &rename.to));
                self.rename_table(session, &rename.from, &rename.to, rename.exchange)
            }
        }
    }

    /// Create a table, binding the normalized text to `/metadata` when the
    /// statement is an initial query.
    pub fn create_table(&self, session: &DdlSession, create: &CreateStatement) -> Result<TableEntry> {
        if create.if_not_exists {
            if let Some(existing) = self.catalog.table(&create.name) {
                return Ok(existing);
            }
        }
        let mut create = create.clone();
        if create.uuid.is_none() {
            create.uuid = Some(Uuid::new_v4());
        }

        let txn = session.metadata_transaction();
        debug_assert!(!self.worker_is_active() || txn.is_some());
        if let Some(txn) = &txn {
            if txn.is_initial_query() {
                let text = normalized_create_text(&create)?;
                // multi() rejects the whole statement if the node exists.
                txn.push_op(StoreOp::create(
                    self.layout.metadata_node_path(&create.name),
                    text,
                ));
            }
        }
        self.catalog.create_table(session, &create)
    }

    /// Dictionaries share the `/metadata` namespace with tables
    pub fn create_dictionary(
        &self,
        session: &DdlSession,
        create: &CreateStatement,
    ) -> Result<TableEntry> {
        self.create_table(session, create)
    }

    /// Compute the post-ALTER definition and commit it
    pub fn alter_table(&self, session: &DdlSession, alter: &AlterStatement) -> Result<()> {
        let entry = self.catalog.table(&alter.name).ok_or_else(|| {
            RdcError::UnknownTable(format!("{}.{}", self.config.database, alter.name))
        })?;
        let current = parse_normalized_text(&alter.name, &entry.definition)?;
        let updated = apply_alter(&current, alter)?;
        let definition = normalized_create_text(&updated)?;
        self.commit_alter(session, &alter.name, &definition)
    }

    /// Write a table's new definition, updating `/metadata` in the same
    /// statement when initial.
    pub fn commit_alter(&self, session: &DdlSession, name: &str, definition: &str) -> Result<()> {
        let txn = session.metadata_transaction();
        if let Some(txn) = &txn {
            if txn.is_initial_query() {
                txn.push_op(StoreOp::set(self.layout.metadata_node_path(name), definition));
            }
        }
        self.catalog.commit_alter(session, name, definition)
    }

    pub fn drop_table(&self, session: &DdlSession, name: &str, sync: bool) -> Result<()> {
        let txn = session.metadata_transaction();
        debug_assert!(!self.worker_is_active() || txn.is_some());
        if let Some(txn) = &txn {
            if txn.is_initial_query() {
                txn.push_op(StoreOp::remove(self.layout.metadata_node_path(name)));
            }
        }
        self.catalog.drop_table(session, name, sync)?;
        Ok(())
    }

    pub fn remove_dictionary(&self, session: &DdlSession, name: &str) -> Result<()> {
        let txn = session.metadata_transaction();
        debug_assert!(!self.worker_is_active() || txn.is_some());
        if let Some(txn) = &txn {
            if txn.is_initial_query() {
                txn.push_op(StoreOp::remove(self.layout.metadata_node_path(name)));
            }
        }
        self.catalog.drop_table(session, name, true)?;
        Ok(())
    }

    pub fn detach_table_permanently(&self, session: &DdlSession, name: &str) -> Result<()> {
        let txn = session.metadata_transaction();
        debug_assert!(!self.worker_is_active() || txn.is_some());
        if let Some(txn) = &txn {
            if txn.is_initial_query() {
                txn.push_op(StoreOp::remove(self.layout.metadata_node_path(name)));
            }
        }
        self.catalog.detach_table_permanently(session, name)
    }

    /// Rename or exchange two tables of this database
    pub fn rename_table(
        &self,
        session: &DdlSession,
        name: &str,
        to_name: &str,
        exchange: bool,
    ) -> Result<()> {
        let txn = session.metadata_transaction();
        debug_assert!(txn.is_some());
        if let Some(txn) = &txn {
            if txn.is_initial_query() {
                if name == to_name {
                    return Err(RdcError::IncorrectQuery(
                        "cannot rename table to itself".to_string(),
                    ));
                }
                if !self.catalog.is_table_exist(name) {
                    return Err(RdcError::UnknownTable(format!(
                        "{}.{}",
                        self.config.database, name
                    )));
                }
                if exchange && !self.catalog.is_table_exist(to_name) {
                    return Err(RdcError::UnknownTable(format!(
                        "{}.{}",
                        self.config.database, to_name
                    )));
                }

                let statement = self.catalog.read_metadata_file(name)?;
                let node = self.layout.metadata_node_path(name);
                let node_to = self.layout.metadata_node_path(to_name);
                txn.push_op(StoreOp::remove(node.clone()));
                if exchange {
                    let statement_to = self.catalog.read_metadata_file(to_name)?;
                    txn.push_op(StoreOp::remove(node_to.clone()));
                    txn.push_op(StoreOp::create(node, statement_to));
                }
                txn.push_op(StoreOp::create(node_to, statement));
            }
        }
        self.catalog
            .rename_table(session, name, &self.catalog, to_name, exchange)
    }

    /// Consistent snapshot of the replica registry as a logical cluster
    pub fn get_cluster(&self) -> Result<Cluster> {
        cluster::get_cluster(self.store.as_ref(), &self.layout, self.config.tcp_port)
    }

    /// Stop draining the log; already-applied entries stay applied
    pub fn stop_replication(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.shutdown();
        }
    }

    /// Stop the worker first so no secondary query races the teardown
    pub fn shutdown(&self) {
        self.stop_replication();
        *self.worker.lock() = None;
    }

    /// Tombstone this replica, free all local objects and remove its store
    /// subtree. The last replica takes the whole database subtree with it
    /// (best effort).
    pub fn drop_database(&self) -> Result<()> {
        self.shutdown();
        let full_name = self.replica.full_name();
        let replica_path = self.layout.replica_path(&full_name);
        // Pre-tombstone: invisible to cluster views even before removal.
        self.store
            .set(&replica_path, DROPPED_MARK, rdc_coordination::ANY_VERSION)?;

        self.catalog.clear_all()?;
        self.registry.detach_database(&self.config.database);

        if let Err(err) = self.store.try_remove_recursive(&replica_path) {
            warn!(replica = %full_name, error = %err, "failed to remove replica subtree");
        }
        match self.store.try_remove(&self.layout.replicas_path()) {
            Ok(true) => {
                // We were the last replica.
                if let Err(err) = self.store.try_remove_recursive(self.layout.root()) {
                    warn!(path = %self.layout.root(), error = %err, "failed to remove database subtree");
                }
                info!(path = %self.layout.root(), "removed replicated database");
            }
            Ok(false) | Err(_) => {}
        }
        Ok(())
    }

    /// This replica's last applied entry id, as recorded in the store
    pub fn log_ptr(&self) -> Result<LogPtr> {
        self.layout
            .read_replica_log_ptr(self.store.as_ref(), &self.replica.full_name())
    }

    pub fn max_log_ptr(&self) -> Result<LogPtr> {
        self.layout.read_max_log_ptr(self.store.as_ref())
    }
}
