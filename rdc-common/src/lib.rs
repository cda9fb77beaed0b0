// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Common utilities and foundational types for the replicated catalog
//!
//! This module provides:
//! - Error types and result handling
//! - Configuration management
//! - Common data types
//! - Utility functions
//! - Constants

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
pub mod utils;
pub mod version;

pub use config::ReplicaConfig;
pub use error::{RdcError, Result, StoreError};
pub use types::{LogPtr, NodeVersion, ObjectKind, QueryKind};
