// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Query sessions and metadata transactions
//!
//! Every DDL statement executes under a session that says whether the
//! statement came straight from a client (*initial*) or was produced by
//! the apply worker or recovery (*secondary*). Initial statements carry a
//! metadata transaction: the coordination-store ops the catalog flushes
//! atomically with the local commit.

use parking_lot::Mutex;
use rdc_common::{QueryKind, Result};
use rdc_coordination::{CoordinationStore, StoreOp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Pending coordination-store operations of one DDL statement
pub struct MetadataTransaction {
    store: Arc<dyn CoordinationStore>,
    is_initial: bool,
    ops: Mutex<Vec<StoreOp>>,
}

impl MetadataTransaction {
    pub fn new(store: Arc<dyn CoordinationStore>, is_initial: bool) -> Self {
        Self {
            store,
            is_initial,
            ops: Mutex::new(Vec::new()),
        }
    }

    /// Whether the owning statement is an initial query. Only initial
    /// queries push coordination-store ops.
    pub fn is_initial_query(&self) -> bool {
        self.is_initial
    }

    pub fn push_op(&self, op: StoreOp) {
        self.ops.lock().push(op);
    }

    pub fn has_ops(&self) -> bool {
        !self.ops.lock().is_empty()
    }

    /// Flush all pending ops in one atomic multi. Draining the queue makes
    /// a second commit a no-op.
    pub fn commit(&self) -> Result<()> {
        let ops: Vec<StoreOp> = std::mem::take(&mut *self.ops.lock());
        if ops.is_empty() {
            return Ok(());
        }
        self.store.multi(&ops)?;
        Ok(())
    }
}

/// Execution context of one DDL statement
pub struct DdlSession {
    kind: QueryKind,
    txn: Mutex<Option<Arc<MetadataTransaction>>>,
    ddl_task_timeout: Duration,
    cancelled: AtomicBool,
}

impl DdlSession {
    pub fn initial(ddl_task_timeout: Duration) -> Self {
        Self {
            kind: QueryKind::Initial,
            txn: Mutex::new(None),
            ddl_task_timeout,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn secondary() -> Self {
        Self {
            kind: QueryKind::Secondary,
            txn: Mutex::new(None),
            ddl_task_timeout: Duration::ZERO,
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn query_kind(&self) -> QueryKind {
        self.kind
    }

    pub fn is_initial_query(&self) -> bool {
        self.kind.is_initial()
    }

    pub fn ddl_task_timeout(&self) -> Duration {
        self.ddl_task_timeout
    }

    pub fn set_metadata_transaction(&self, txn: Arc<MetadataTransaction>) {
        *self.txn.lock() = Some(txn);
    }

    pub fn metadata_transaction(&self) -> Option<Arc<MetadataTransaction>> {
        self.txn.lock().clone()
    }

    /// Request cancellation. Observed while waiting for remote replicas;
    /// an already-enqueued entry still executes everywhere.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdc_coordination::{CreateMode, MemoryStore};

    #[test]
    fn test_commit_flushes_once() {
        let store = Arc::new(MemoryStore::new());
        store.create("/db", "", CreateMode::Persistent).unwrap();
        let txn = MetadataTransaction::new(store.clone(), true);
        txn.push_op(StoreOp::create("/db/a", "1"));
        assert!(txn.has_ops());
        txn.commit().unwrap();
        assert_eq!(store.get("/db/a").unwrap(), "1");
        assert!(!txn.has_ops());
        // Second commit is empty and must not fail on the existing node.
        txn.commit().unwrap();
    }

    #[test]
    fn test_failed_commit_applies_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.create("/db", "", CreateMode::Persistent).unwrap();
        store.create("/db/a", "old", CreateMode::Persistent).unwrap();
        let txn = MetadataTransaction::new(store.clone(), true);
        txn.push_op(StoreOp::create("/db/b", "1"));
        txn.push_op(StoreOp::create("/db/a", "dup"));
        assert!(txn.commit().is_err());
        assert!(!store.exists("/db/b").unwrap());
    }

    #[test]
    fn test_session_kinds() {
        let session = DdlSession::secondary();
        assert!(!session.is_initial_query());
        assert!(session.metadata_transaction().is_none());

        let session = DdlSession::initial(Duration::from_secs(1));
        assert!(session.is_initial_query());
        assert!(!session.is_cancelled());
        session.cancel();
        assert!(session.is_cancelled());
    }
}
