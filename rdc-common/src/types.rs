// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Common type definitions

use serde::{Deserialize, Serialize};

/// Log pointer type: id of the last applied entry in the shared DDL log
pub type LogPtr = u32;

/// Version of a coordination-store node
pub type NodeVersion = i32;

/// How a DDL statement entered this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    /// Received directly from a client session; may enqueue log entries
    Initial,
    /// Produced by the apply worker or recovery; must never re-enqueue
    Secondary,
}

impl QueryKind {
    pub fn is_initial(self) -> bool {
        matches!(self, QueryKind::Initial)
    }
}

/// Kind of catalog object a DDL statement targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectKind {
    Table,
    Dictionary,
}

impl ObjectKind {
    pub fn keyword(self) -> &'static str {
        match self {
            ObjectKind::Table => "TABLE",
            ObjectKind::Dictionary => "DICTIONARY",
        }
    }
}
