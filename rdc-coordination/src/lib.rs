// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Coordination-store layer
//!
//! This module handles:
//! - The capability trait the replicated catalog consumes
//! - Operation and stat types for atomic multi-op transactions
//! - An in-process store used for tests and standalone mode

pub mod client;
pub mod memory;
pub mod ops;

pub use client::CoordinationStore;
pub use memory::MemoryStore;
pub use ops::{CreateMode, MultiError, Stat, StoreOp, ANY_VERSION};
