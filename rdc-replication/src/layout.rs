// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Coordination-store layout of one replicated database
//!
//! ```text
//! /<path>/log                     query-0000000001, ... (the DDL log)
//! /<path>/counter                 cnt-* allocation nodes, removed at once
//! /<path>/replicas/<shard>|<r>    host id, or the DROPPED tombstone
//! /<path>/replicas/<full>/log_ptr last applied entry id
//! /<path>/metadata/<escaped>      normalized CREATE text per table
//! /<path>/max_log_ptr             highest entry id ever enqueued
//! /<path>/logs_to_keep            retention policy
//! ```

use crate::log_entry::DdlLogEntry;
use crate::names::ReplicaName;
use rdc_common::constants::DEFAULT_LOGS_TO_KEEP;
use rdc_common::utils::escape_for_file_name;
use rdc_common::{LogPtr, RdcError, Result, StoreError};
use rdc_coordination::{CoordinationStore, CreateMode, StoreOp};
use tracing::debug;

const ENTRY_PREFIX: &str = "query-";
const COUNTER_PREFIX: &str = "cnt-";

/// Node-path helpers plus the bootstrap multi-ops
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: String,
}

impl StoreLayout {
    /// Normalize and validate the database path: a leading `/` is added if
    /// missing (the store may sit under a chroot prefix), a trailing `/`
    /// is stripped.
    pub fn new(path: &str) -> Result<Self> {
        if path.is_empty() || path == "/" {
            return Err(RdcError::BadArguments(
                "store path must be non-empty".to_string(),
            ));
        }
        let mut root = path.to_string();
        if !root.starts_with('/') {
            root.insert(0, '/');
        }
        while root.len() > 1 && root.ends_with('/') {
            root.pop();
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn log_path(&self) -> String {
        format!("{}/log", self.root)
    }

    pub fn counter_path(&self) -> String {
        format!("{}/counter", self.root)
    }

    fn counter_node_prefix(&self) -> String {
        format!("{}/counter/{}", self.root, COUNTER_PREFIX)
    }

    pub fn replicas_path(&self) -> String {
        format!("{}/replicas", self.root)
    }

    pub fn replica_path(&self, full_name: &str) -> String {
        format!("{}/replicas/{}", self.root, full_name)
    }

    pub fn replica_log_ptr_path(&self, full_name: &str) -> String {
        format!("{}/replicas/{}/log_ptr", self.root, full_name)
    }

    pub fn metadata_path(&self) -> String {
        format!("{}/metadata", self.root)
    }

    pub fn metadata_node_path(&self, table_name: &str) -> String {
        format!("{}/metadata/{}", self.root, escape_for_file_name(table_name))
    }

    pub fn max_log_ptr_path(&self) -> String {
        format!("{}/max_log_ptr", self.root)
    }

    pub fn logs_to_keep_path(&self) -> String {
        format!("{}/logs_to_keep", self.root)
    }

    pub fn entry_name(id: LogPtr) -> String {
        format!("{}{:010}", ENTRY_PREFIX, id)
    }

    pub fn entry_path(&self, id: LogPtr) -> String {
        format!("{}/log/{}", self.root, Self::entry_name(id))
    }

    /// Entry id of a `/log` child name
    pub fn parse_entry_id(name: &str) -> Option<LogPtr> {
        name.strip_prefix(ENTRY_PREFIX)?.parse().ok()
    }

    /// Create the whole database subtree in one multi-op. Concurrent
    /// bootstrap is expected: `Ok(false)` means another replica won the
    /// race, which is just as good.
    pub fn create_database_nodes(&self, store: &dyn CoordinationStore) -> Result<bool> {
        store.create_ancestors(&self.root)?;

        let counter_base = format!("{}/counter/{}", self.root, COUNTER_PREFIX);
        let ops = vec![
            StoreOp::create(self.root.clone(), ""),
            StoreOp::create(self.log_path(), ""),
            StoreOp::create(self.replicas_path(), ""),
            StoreOp::create(self.counter_path(), ""),
            // Creating and deleting one counter child fixes the base of the
            // sequential numbering.
            StoreOp::create(counter_base.clone(), ""),
            StoreOp::remove(counter_base),
            StoreOp::create(self.metadata_path(), ""),
            StoreOp::create(self.max_log_ptr_path(), "1"),
            StoreOp::create(self.logs_to_keep_path(), DEFAULT_LOGS_TO_KEEP.to_string()),
        ];

        match store.multi(&ops) {
            Ok(()) => {
                debug!(path = %self.root, "created database nodes");
                Ok(true)
            }
            Err(err) if err.error == StoreError::NodeExists => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Allocate a fresh log entry id through the counter. Returns the id
    /// and the counter node the caller must remove in its multi-op.
    pub fn allocate_entry_id(&self, store: &dyn CoordinationStore) -> Result<(LogPtr, String)> {
        let counter_path =
            store.create(&self.counter_node_prefix(), "", CreateMode::EphemeralSequential)?;
        let suffix = counter_path
            .rsplit(COUNTER_PREFIX)
            .next()
            .unwrap_or_default();
        let id: LogPtr = suffix.parse().map_err(|_| {
            RdcError::LogicalError(format!("unexpected counter node name: {}", counter_path))
        })?;
        Ok((id, counter_path))
    }

    /// Register this replica: its node with the host id, a zeroed log
    /// pointer and a join marker in the log, all in one multi-op.
    pub fn create_replica_nodes(
        &self,
        store: &dyn CoordinationStore,
        replica: &ReplicaName,
        host_id: &str,
    ) -> Result<()> {
        let (entry_id, counter_path) = self.allocate_entry_id(store)?;
        let full_name = replica.full_name();
        let marker = DdlLogEntry::join_marker().to_wire()?;

        let ops = vec![
            StoreOp::create(self.replica_path(&full_name), host_id),
            StoreOp::create(self.replica_log_ptr_path(&full_name), "0"),
            StoreOp::create(self.entry_path(entry_id), marker),
            StoreOp::remove(counter_path),
        ];
        match store.multi(&ops) {
            Ok(()) => {}
            Err(err) if err.failed_op == 0 && err.error == StoreError::NodeExists => {
                return Err(RdcError::ReplicaExists(format!(
                    "replica {} was created concurrently",
                    full_name
                )));
            }
            Err(err) => return Err(err.into()),
        }
        self.advance_max_log_ptr(store, entry_id)?;
        debug!(replica = %full_name, entry_id, "created replica nodes");
        Ok(())
    }

    pub fn read_max_log_ptr(&self, store: &dyn CoordinationStore) -> Result<LogPtr> {
        let text = store.get(&self.max_log_ptr_path())?;
        text.parse().map_err(|_| {
            RdcError::LogicalError(format!("malformed max_log_ptr value: {}", text))
        })
    }

    /// Raise `max_log_ptr` to at least `id`. Version-checked so concurrent
    /// enqueues can never move it backwards.
    pub fn advance_max_log_ptr(&self, store: &dyn CoordinationStore, id: LogPtr) -> Result<()> {
        let path = self.max_log_ptr_path();
        loop {
            let (text, stat) = store.get_with_stat(&path)?;
            let current: LogPtr = text.parse().map_err(|_| {
                RdcError::LogicalError(format!("malformed max_log_ptr value: {}", text))
            })?;
            if current >= id {
                return Ok(());
            }
            match store.set(&path, &id.to_string(), stat.version) {
                Ok(()) => return Ok(()),
                Err(StoreError::BadVersion) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn read_logs_to_keep(&self, store: &dyn CoordinationStore) -> Result<u32> {
        match store.try_get(&self.logs_to_keep_path())? {
            Some(text) => Ok(text.parse().unwrap_or(DEFAULT_LOGS_TO_KEEP)),
            None => Ok(DEFAULT_LOGS_TO_KEEP),
        }
    }

    pub fn read_replica_log_ptr(
        &self,
        store: &dyn CoordinationStore,
        full_name: &str,
    ) -> Result<LogPtr> {
        let text = store.get(&self.replica_log_ptr_path(full_name))?;
        text.parse()
            .map_err(|_| RdcError::LogicalError(format!("malformed log_ptr value: {}", text)))
    }

    pub fn write_replica_log_ptr(
        &self,
        store: &dyn CoordinationStore,
        full_name: &str,
        id: LogPtr,
    ) -> Result<()> {
        store.set(
            &self.replica_log_ptr_path(full_name),
            &id.to_string(),
            rdc_coordination::ANY_VERSION,
        )?;
        Ok(())
    }
}
