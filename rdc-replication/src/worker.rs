// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Log apply worker
//!
//! A single background thread drains `/log` strictly in entry-id order.
//! The proposer enters through `try_enqueue_and_execute_entry`, which
//! holds the same apply lock, so local application is never concurrent
//! with the drain loop and never out of order.
//!
//! The worker holds only a weak handle to its owning database: the
//! database owns the worker and shuts it down before teardown.

use crate::database::ReplicatedDatabase;
use crate::layout::StoreLayout;
use crate::log_entry::DdlLogEntry;
use parking_lot::{Condvar, Mutex};
use rdc_catalog::DdlSession;
use rdc_common::constants::DROPPED_MARK;
use rdc_common::{LogPtr, RdcError, Result};
use rdc_coordination::{CoordinationStore, StoreOp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct LogApplyWorker {
    database: Weak<ReplicatedDatabase>,
    store: Arc<dyn CoordinationStore>,
    layout: StoreLayout,
    full_replica_name: String,
    host_id: String,
    poll_interval: Duration,
    active: AtomicBool,
    stop_flag: AtomicBool,
    wake_lock: Mutex<()>,
    wake: Condvar,
    apply_lock: Mutex<()>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl LogApplyWorker {
    pub fn new(database: &Arc<ReplicatedDatabase>) -> Arc<Self> {
        Arc::new(Self {
            database: Arc::downgrade(database),
            store: database.store().clone(),
            layout: database.layout().clone(),
            full_replica_name: database.replica_name().full_name(),
            host_id: database.host_id().to_string(),
            poll_interval: Duration::from_millis(database.config().apply_poll_interval_ms.max(1)),
            active: AtomicBool::new(false),
            stop_flag: AtomicBool::new(false),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            apply_lock: Mutex::new(()),
            thread: Mutex::new(None),
        })
    }

    /// Start the drain thread
    pub fn startup(self: &Arc<Self>) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop_flag.store(false, Ordering::SeqCst);
        let worker = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("ddl-worker-{}", self.full_replica_name))
            .spawn(move || worker.run_loop())
            .expect("failed to spawn apply worker thread");
        *self.thread.lock() = Some(handle);
        info!(replica = %self.full_replica_name, "log apply worker started");
    }

    /// Stop the drain thread and wait for it
    pub fn shutdown(&self) {
        if !self.active.load(Ordering::SeqCst) {
            return;
        }
        self.stop_flag.store(true, Ordering::SeqCst);
        {
            let _lock = self.wake_lock.lock();
            self.wake.notify_all();
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        self.active.store(false, Ordering::SeqCst);
        info!(replica = %self.full_replica_name, "log apply worker stopped");
    }

    pub fn is_currently_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Host id this worker stamps into proposed entries
    pub fn common_host_id(&self) -> &str {
        &self.host_id
    }

    /// Durably enqueue an entry and apply it on this replica in the same
    /// call. Returns the assigned entry id and its `/log` path.
    pub fn try_enqueue_and_execute_entry(
        &self,
        entry: DdlLogEntry,
        session: &DdlSession,
    ) -> Result<(LogPtr, String)> {
        let database = self
            .database
            .upgrade()
            .ok_or_else(|| RdcError::LogicalError("database is shutting down".to_string()))?;

        let _apply = self.apply_lock.lock();
        // Everything already in the log must land first so our entry
        // applies against the latest local state.
        self.catch_up_locked(&database)?;

        let (entry_id, counter_path) = self.layout.allocate_entry_id(self.store.as_ref())?;
        let entry_path = self.layout.entry_path(entry_id);
        let ops = vec![
            StoreOp::create(entry_path.clone(), entry.to_wire()?),
            StoreOp::remove(counter_path),
        ];
        self.store.multi(&ops).map_err(RdcError::from)?;
        self.layout.advance_max_log_ptr(self.store.as_ref(), entry_id)?;
        debug!(entry_id, path = %entry_path, "enqueued log entry");

        let result = database.execute_entry(&entry, session);
        // The entry is durable either way; this replica has consumed it.
        self.layout
            .write_replica_log_ptr(self.store.as_ref(), &self.full_replica_name, entry_id)?;
        result?;
        Ok((entry_id, entry_path))
    }

    fn run_loop(self: Arc<Self>) {
        loop {
            {
                let mut lock = self.wake_lock.lock();
                let _ = self.wake.wait_for(&mut lock, self.poll_interval);
            }
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }
            let Some(database) = self.database.upgrade() else {
                break;
            };
            {
                let _apply = self.apply_lock.lock();
                if let Err(err) = self.catch_up_locked(&database) {
                    warn!(error = %err, "failed to drain the DDL log");
                }
            }
            if let Err(err) = self.prune_old_entries() {
                debug!(error = %err, "log retention pass failed");
            }
        }
    }

    /// Apply every entry beyond this replica's pointer, in id order.
    /// Callers must hold the apply lock.
    fn catch_up_locked(&self, database: &Arc<ReplicatedDatabase>) -> Result<()> {
        let our_ptr = self
            .layout
            .read_replica_log_ptr(self.store.as_ref(), &self.full_replica_name)?;
        let (children, _) = self.store.get_children(&self.layout.log_path())?;
        let mut pending: Vec<LogPtr> = children
            .iter()
            .filter_map(|name| StoreLayout::parse_entry_id(name))
            .filter(|id| *id > our_ptr)
            .collect();
        pending.sort_unstable();

        for entry_id in pending {
            if self.stop_flag.load(Ordering::SeqCst) {
                break;
            }
            let Some(wire) = self.store.try_get(&self.layout.entry_path(entry_id))? else {
                // Pruned while we were reading; the pointer still advances.
                continue;
            };
            let entry = DdlLogEntry::from_wire(&wire)?;
            if !entry.is_marker() {
                let session = DdlSession::secondary();
                match database.execute_entry(&entry, &session) {
                    Ok(()) => debug!(entry_id, query = %entry.query, "applied log entry"),
                    Err(err) => {
                        // The entry cannot be cancelled; record the failure
                        // and keep the log moving. Recovery reconciles any
                        // divergence this leaves behind.
                        error!(entry_id, query = %entry.query, error = %err, "failed to apply log entry");
                    }
                }
            }
            self.layout
                .write_replica_log_ptr(self.store.as_ref(), &self.full_replica_name, entry_id)?;
        }
        Ok(())
    }

    /// Remove entries every live replica has applied, once they fall out of
    /// the retention window.
    fn prune_old_entries(&self) -> Result<()> {
        let logs_to_keep = self.layout.read_logs_to_keep(self.store.as_ref())?;
        let max_ptr = self.layout.read_max_log_ptr(self.store.as_ref())?;
        if max_ptr <= logs_to_keep {
            return Ok(());
        }
        let keep_from = max_ptr - logs_to_keep + 1;

        let (replicas, _) = self.store.get_children(&self.layout.replicas_path())?;
        let mut min_applied = LogPtr::MAX;
        for replica in &replicas {
            match self.store.try_get(&self.layout.replica_path(replica))? {
                None => continue,
                Some(value) if value == DROPPED_MARK => continue,
                Some(_) => {
                    let ptr = self
                        .store
                        .try_get(&self.layout.replica_log_ptr_path(replica))?
                        .and_then(|text| text.parse::<LogPtr>().ok())
                        .unwrap_or(0);
                    min_applied = min_applied.min(ptr);
                }
            }
        }
        if min_applied == LogPtr::MAX {
            return Ok(());
        }
        let bound = keep_from.min(min_applied.saturating_add(1));

        let (children, _) = self.store.get_children(&self.layout.log_path())?;
        for name in children {
            let Some(entry_id) = StoreLayout::parse_entry_id(&name) else {
                continue;
            };
            if entry_id < bound {
                self.store
                    .try_remove_recursive(&self.layout.entry_path(entry_id))?;
                debug!(entry_id, "pruned old log entry");
            }
        }
        Ok(())
    }
}
