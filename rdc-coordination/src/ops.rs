// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Coordination-store operation types

use rdc_common::{NodeVersion, StoreError};

/// Version argument accepting any current node version
pub const ANY_VERSION: NodeVersion = -1;

/// Creation mode of a store node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives until explicitly removed
    Persistent,
    /// Name gets a monotonically increasing per-parent suffix; the node
    /// belongs to the creating session
    EphemeralSequential,
}

/// Metadata of a store node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Bumped on every value change
    pub version: NodeVersion,
    /// Bumped on every child creation or removal
    pub cversion: NodeVersion,
    /// Number of direct children
    pub num_children: usize,
}

/// One operation inside an atomic multi-op transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Create {
        path: String,
        value: String,
        mode: CreateMode,
    },
    Remove {
        path: String,
        version: NodeVersion,
    },
    Set {
        path: String,
        value: String,
        version: NodeVersion,
    },
}

impl StoreOp {
    pub fn create(path: impl Into<String>, value: impl Into<String>) -> Self {
        StoreOp::Create {
            path: path.into(),
            value: value.into(),
            mode: CreateMode::Persistent,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        StoreOp::Remove {
            path: path.into(),
            version: ANY_VERSION,
        }
    }

    pub fn set(path: impl Into<String>, value: impl Into<String>) -> Self {
        StoreOp::Set {
            path: path.into(),
            value: value.into(),
            version: ANY_VERSION,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            StoreOp::Create { path, .. } | StoreOp::Remove { path, .. } | StoreOp::Set { path, .. } => path,
        }
    }
}

/// Failure of an atomic multi-op: the index of the first failed operation
/// and its result code. No operation took effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiError {
    pub failed_op: usize,
    pub error: StoreError,
}

impl std::fmt::Display for MultiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "multi-op failed at op {}: {}", self.failed_op, self.error)
    }
}

impl std::error::Error for MultiError {}

impl From<MultiError> for StoreError {
    fn from(err: MultiError) -> Self {
        err.error
    }
}

impl From<MultiError> for rdc_common::RdcError {
    fn from(err: MultiError) -> Self {
        rdc_common::RdcError::Store(err.error)
    }
}
