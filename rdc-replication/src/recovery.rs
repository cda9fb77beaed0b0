// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Replica recovery
//!
//! Brings a fresh or lagging replica to the authoritative snapshot. Local
//! tables the snapshot does not confirm are never deleted outright: they
//! are dropped only when data-free, and otherwise moved into the
//! `<db>_broken_tables` shadow database.

use crate::database::ReplicatedDatabase;
use crate::layout::StoreLayout;
use rdc_catalog::{CatalogPolicy, DdlSession};
use rdc_common::constants::{BROKEN_TABLES_SUFFIX, MAX_SNAPSHOT_RETRIES};
use rdc_common::utils::{escape_for_file_name, unescape_for_file_name};
use rdc_common::{LogPtr, RdcError, Result};
use rdc_coordination::CoordinationStore;
use rdc_ddl::{create_from_store, parsed_table_uuid};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct RecoveryEngine<'a> {
    database: &'a ReplicatedDatabase,
}

impl<'a> RecoveryEngine<'a> {
    pub fn new(database: &'a ReplicatedDatabase) -> Self {
        Self { database }
    }

    /// Reconcile local state with the snapshot at `max_log_ptr`, then seal
    /// this replica's log pointer there.
    pub fn run(&self, our_log_ptr: LogPtr, mut max_log_ptr: LogPtr) -> Result<()> {
        if our_log_ptr == 0 {
            info!(max_log_ptr, "creating replica state from snapshot");
        } else {
            warn!(
                our_log_ptr,
                max_log_ptr, "recovering replica with stale log pointer"
            );
        }

        let store = self.database.store().as_ref();
        let layout = self.database.layout();
        let snapshot = self.consistent_metadata_snapshot(store, layout, &mut max_log_ptr)?;

        let to_detach = self.plan_detach(&snapshot)?;
        self.detach_diverged(&to_detach, max_log_ptr)?;
        self.apply_missing(&snapshot)?;

        layout.write_replica_log_ptr(
            store,
            &self.database.replica_name().full_name(),
            max_log_ptr,
        )?;
        info!(log_ptr = max_log_ptr, "replica recovered");
        Ok(())
    }

    /// Phase 1: read `/metadata` until the result is provably a snapshot at
    /// a stable `max_log_ptr`.
    fn consistent_metadata_snapshot(
        &self,
        store: &dyn CoordinationStore,
        layout: &StoreLayout,
        max_log_ptr: &mut LogPtr,
    ) -> Result<BTreeMap<String, String>> {
        for _ in 0..MAX_SNAPSHOT_RETRIES {
            debug!(max_log_ptr = *max_log_ptr, "fetching metadata snapshot");
            let (names, _) = store.get_children(&layout.metadata_path())?;
            let paths: Vec<String> = names
                .iter()
                .map(|name| format!("{}/{}", layout.metadata_path(), name))
                .collect();
            let values = store.try_get_many(&paths);

            let mut snapshot = BTreeMap::new();
            for (name, value) in names.iter().zip(values) {
                if let Some(text) = value {
                    snapshot.insert(unescape_for_file_name(name), text);
                }
            }

            let new_max = layout.read_max_log_ptr(store)?;
            if new_max == *max_log_ptr && snapshot.len() == names.len() {
                debug!(max_log_ptr = *max_log_ptr, tables = snapshot.len(), "snapshot is consistent");
                return Ok(snapshot);
            }
            if *max_log_ptr < new_max {
                debug!(from = *max_log_ptr, to = new_max, "log pointer moved, retrying");
                *max_log_ptr = new_max;
            } else {
                debug!("some metadata nodes could not be read, retrying");
            }
        }
        Err(RdcError::ReplicationFailed(
            "cannot get consistent metadata snapshot".to_string(),
        ))
    }

    /// Phase 2 + 3: decide which local tables the snapshot does not
    /// confirm, refusing to continue if that is most of them.
    fn plan_detach(&self, snapshot: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let catalog = self.database.catalog();
        let mut to_detach = Vec::new();
        let mut total_tables = 0usize;

        for table in catalog.tables() {
            total_tables += 1;
            let local_text = catalog.read_metadata_file(&table.name)?;
            let keep = match snapshot.get(&table.name) {
                None => false,
                Some(store_text) if *store_text == local_text => true,
                Some(store_text) => {
                    // Replicated engines reconcile their own data; equal
                    // UUIDs mean it is the same table even if the texts
                    // have drifted.
                    table.has_replicated_engine()
                        && parsed_table_uuid(store_text) == Some(table.uuid)
                }
            };
            if !keep {
                to_detach.push(table.name);
            }
        }

        if total_tables < to_detach.len() * 2 {
            return Err(RdcError::ReplicationFailed(format!(
                "too many tables to recreate: {} of {}",
                to_detach.len(),
                total_tables
            )));
        }
        Ok(to_detach)
    }

    /// Phase 4 + 5: move diverged tables out of the way and wait until
    /// dropped UUIDs are fully released.
    fn detach_diverged(&self, to_detach: &[String], max_log_ptr: LogPtr) -> Result<()> {
        if to_detach.is_empty() {
            return Ok(());
        }
        let registry = self.database.registry();
        let catalog = self.database.catalog();
        let db_name = catalog.name().to_string();
        let broken_db_name = format!("{}{}", db_name, BROKEN_TABLES_SUFFIX);

        warn!(
            count = to_detach.len(),
            shadow = %broken_db_name,
            "moving diverged tables out of the replicated database"
        );
        // The shadow database does not persist UUIDs, so a recovered table
        // can later be recreated under its original identity.
        let shadow = registry.ensure_database(&broken_db_name, CatalogPolicy::Transient)?;

        let session = DdlSession::secondary();
        let mut dropped_dicts = 0usize;
        let mut dropped_tables: Vec<Uuid> = Vec::new();
        let mut moved_tables = 0usize;

        for name in to_detach {
            let suffix = rand::thread_rng().gen_range(0..1000);
            let to_name = format!("{}_{}_{}", name, max_log_ptr, suffix);
            // db < db_broken_tables, so the pair is always locked in the
            // same order as any other statement touching both.
            let _guards = registry.guards().acquire_pair(
                (db_name.as_str(), name.as_str()),
                (broken_db_name.as_str(), to_name.as_str()),
            );
            if !registry.is_database_attached(&db_name) {
                return Err(RdcError::UnknownDatabase(format!(
                    "{} was renamed or detached during recovery",
                    db_name
                )));
            }
            let Some(table) = catalog.table(name) else {
                continue;
            };

            if table.is_dictionary() {
                debug!(dictionary = %name, "dropping diverged dictionary");
                catalog.drop_table(&session, name, true)?;
                dropped_dicts += 1;
            } else if !table.stores_data_on_disk() {
                debug!(table = %name, "dropping diverged table without on-disk data");
                dropped_tables.push(table.uuid);
                catalog.drop_table(&session, name, false)?;
            } else {
                debug!(table = %name, to = %to_name, "moving diverged table to the shadow database");
                catalog.rename_table(&session, name, &shadow, &to_name, false)?;
                moved_tables += 1;
            }
        }

        warn!(
            total = to_detach.len(),
            dropped_dicts,
            dropped_tables = dropped_tables.len(),
            moved_tables,
            "cleaned outdated objects"
        );

        for uuid in dropped_tables {
            self.database.registry().wait_table_finally_dropped(uuid);
        }
        Ok(())
    }

    /// Phase 6: create everything the snapshot has and we do not, as
    /// secondary queries so nothing is re-enqueued.
    fn apply_missing(&self, snapshot: &BTreeMap<String, String>) -> Result<()> {
        let catalog = self.database.catalog();
        let database_name = catalog.name().to_string();
        for (name, text) in snapshot {
            if catalog.is_table_exist(name) {
                continue;
            }
            let create = create_from_store(&escape_for_file_name(name), text, &database_name)?;
            info!(table = %name, "executing stored CREATE");
            let session = DdlSession::secondary();
            let _guard = self
                .database
                .registry()
                .guards()
                .acquire(&database_name, name);
            self.database.create_table(&session, &create)?;
        }
        Ok(())
    }
}
