// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Capability interface over a hierarchical coordination store
//!
//! The replicated catalog consumes exactly this surface. Any service with
//! linearizable reads, atomic multi-op transactions and sequential nodes
//! can sit behind it.

use crate::ops::{CreateMode, MultiError, Stat, StoreOp};
use rdc_common::{NodeVersion, StoreError};

pub trait CoordinationStore: Send + Sync {
    /// Create a node. Returns the created path (differs from the requested
    /// path for sequential nodes).
    fn create(&self, path: &str, value: &str, mode: CreateMode) -> Result<String, StoreError>;

    /// Set a node's value, checking its version unless `ANY_VERSION`.
    fn set(&self, path: &str, value: &str, version: NodeVersion) -> Result<(), StoreError>;

    /// Read a node's value; `NoNode` if absent.
    fn get(&self, path: &str) -> Result<String, StoreError>;

    /// Read a node's value; `Ok(None)` if absent.
    fn try_get(&self, path: &str) -> Result<Option<String>, StoreError>;

    /// Read a node's value together with its stat, for version-checked
    /// read-modify-write cycles.
    fn get_with_stat(&self, path: &str) -> Result<(String, Stat), StoreError>;

    /// Fetch several nodes at once. A slot is `None` when that node could
    /// not be read, for whatever reason; callers decide whether to retry.
    fn try_get_many(&self, paths: &[String]) -> Vec<Option<String>>;

    /// List direct children together with the parent's stat.
    fn get_children(&self, path: &str) -> Result<(Vec<String>, Stat), StoreError>;

    fn exists(&self, path: &str) -> Result<bool, StoreError>;

    /// Remove a childless node. `Ok(false)` if it was already absent.
    fn try_remove(&self, path: &str) -> Result<bool, StoreError>;

    /// Remove a node and everything below it. Absence is not an error.
    fn try_remove_recursive(&self, path: &str) -> Result<(), StoreError>;

    /// Apply all operations atomically, or none of them.
    fn multi(&self, ops: &[StoreOp]) -> Result<(), MultiError>;

    /// Create every missing ancestor of `path` (but not `path` itself).
    fn create_ancestors(&self, path: &str) -> Result<(), StoreError>;
}
