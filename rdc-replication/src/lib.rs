// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Replicated database catalog
//!
//! Keeps the schema catalog of a database in lock-step across replicas.
//! All schema-mutating statements funnel through an ordered log in a
//! shared coordination store and are applied asynchronously, in the same
//! total order, on every replica.
//!
//! This module handles:
//! - The store layout, bootstrap and replica registration
//! - The proposer and the log apply worker
//! - Metadata-transaction hooks binding local commits to the store
//! - Replica recovery against the authoritative snapshot
//! - The derived cluster view

pub mod cluster;
pub mod database;
pub mod layout;
pub mod log_entry;
pub mod names;
pub mod recovery;
pub mod worker;

pub use cluster::{Cluster, ClusterHost};
pub use database::{DdlReport, ReplicaStatus, ReplicatedDatabase};
pub use layout::StoreLayout;
pub use log_entry::DdlLogEntry;
pub use names::{HostId, ReplicaName};
pub use recovery::RecoveryEngine;
pub use worker::LogApplyWorker;
