// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Local catalog for the replicated database
//!
//! This module handles:
//! - Per-database metadata files and table registration
//! - The process-wide catalog registry and DDL guards
//! - Metadata transactions bound to DDL sessions
//! - Deferred table drops and UUID release tracking

pub mod catalog;
pub mod guard;
pub mod registry;
pub mod session;
pub mod table;

pub use catalog::{CatalogPolicy, LocalCatalog};
pub use guard::{DdlGuard, DdlGuards};
pub use registry::CatalogRegistry;
pub use session::{DdlSession, MetadataTransaction};
pub use table::TableEntry;
