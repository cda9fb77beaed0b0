// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Error types for the replicated catalog

use thiserror::Error;

/// Result code of a single coordination-store operation.
///
/// Mirrors the subset of store error codes the catalog reacts to. Anything
/// the store reports that has no entry here surfaces as `ConnectionLoss`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("node does not exist")]
    NoNode,

    #[error("node already exists")]
    NodeExists,

    #[error("version check failed")]
    BadVersion,

    #[error("node has children")]
    NotEmpty,

    #[error("connection to the coordination store lost")]
    ConnectionLoss,
}

#[derive(Error, Debug)]
pub enum RdcError {
    #[error("No coordination store: {0}")]
    NoCoordination(String),

    #[error("Bad arguments: {0}")]
    BadArguments(String),

    #[error("Replica already exists: {0}")]
    ReplicaExists(String),

    #[error("Database replication failed: {0}")]
    ReplicationFailed(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Incorrect query: {0}")]
    IncorrectQuery(String),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown database: {0}")]
    UnknownDatabase(String),

    #[error("All connection tries failed: {0}")]
    AllConnectionTriesFailed(String),

    #[error("Logical error: {0}")]
    LogicalError(String),

    #[error("Table already exists: {0}")]
    TableAlreadyExists(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Coordination store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RdcError>;
