// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! DDL guards
//!
//! One process-wide mutex per `(database, table)` pair serializes DDL on
//! the same object. Pair acquisition always locks in lexicographic key
//! order so that no two statements can deadlock on each other.

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use std::sync::Arc;

type GuardKey = (String, String);

/// Held lock on one `(database, table)` pair
pub struct DdlGuard {
    _guard: ArcMutexGuard<RawMutex, ()>,
}

#[derive(Default)]
pub struct DdlGuards {
    locks: DashMap<GuardKey, Arc<Mutex<()>>>,
}

impl DdlGuards {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, database: &str, table: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry((database.to_string(), table.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Lock one object
    pub fn acquire(&self, database: &str, table: &str) -> DdlGuard {
        DdlGuard {
            _guard: self.slot(database, table).lock_arc(),
        }
    }

    /// Lock two objects in lexicographic key order
    pub fn acquire_pair(
        &self,
        first: (&str, &str),
        second: (&str, &str),
    ) -> (DdlGuard, DdlGuard) {
        if first <= second {
            let a = self.acquire(first.0, first.1);
            let b = self.acquire(second.0, second.1);
            (a, b)
        } else {
            let b = self.acquire(second.0, second.1);
            let a = self.acquire(first.0, first.1);
            (a, b)
        }
    }
}
