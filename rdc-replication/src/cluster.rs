// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Cluster view
//!
//! Derives a read-only shards-by-replicas topology from the replica
//! registry, under a child-version stability check so the snapshot is
//! consistent.

use crate::layout::StoreLayout;
use crate::names::{HostId, ReplicaName};
use rdc_common::constants::{DEFAULT_CLUSTER_USER, DROPPED_MARK, MAX_CLUSTER_RETRIES};
use rdc_common::utils::unescape_for_file_name;
use rdc_common::{RdcError, Result};
use rdc_coordination::CoordinationStore;

/// One reachable replica process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterHost {
    pub host: String,
    pub port: u16,
}

/// Logical cluster: shards × replicas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub shards: Vec<Vec<ClusterHost>>,
    pub user: String,
    pub password: String,
}

impl Cluster {
    pub fn host_count(&self) -> usize {
        self.shards.iter().map(|shard| shard.len()).sum()
    }
}

/// Snapshot the replica registry into a logical cluster
pub fn get_cluster(
    store: &dyn CoordinationStore,
    layout: &StoreLayout,
    tcp_port: u16,
) -> Result<Cluster> {
    for _ in 0..MAX_CLUSTER_RETRIES {
        let (mut hosts, stat) = store.get_children(&layout.replicas_path())?;
        if hosts.is_empty() {
            return Err(RdcError::LogicalError("no hosts found".to_string()));
        }
        let cversion = stat.cversion;
        hosts.sort();

        let paths: Vec<String> = hosts
            .iter()
            .map(|name| layout.replica_path(name))
            .collect();
        let host_ids = store.try_get_many(&paths);
        let complete = host_ids.iter().all(|id| id.is_some());

        let (_, stat) = store.get_children(&layout.replicas_path())?;
        if !complete || cversion != stat.cversion {
            continue;
        }

        return build_cluster(&hosts, &host_ids, tcp_port);
    }
    Err(RdcError::AllConnectionTriesFailed(
        "cannot get consistent cluster snapshot".to_string(),
    ))
}

/// Group the sorted replica names into shards. Sorting clusters replicas
/// of the same shard together, so one pass over the runs is enough.
fn build_cluster(
    hosts: &[String],
    host_ids: &[Option<String>],
    tcp_port: u16,
) -> Result<Cluster> {
    let mut shards: Vec<Vec<ClusterHost>> = Vec::new();
    let mut current_shard: Option<String> = None;

    for (name, host_id) in hosts.iter().zip(host_ids) {
        let Some(host_id) = host_id else {
            continue;
        };
        if host_id == DROPPED_MARK {
            continue;
        }
        let replica = ReplicaName::parse_full(name)?;
        if current_shard.as_deref() != Some(replica.shard()) {
            current_shard = Some(replica.shard().to_string());
            shards.push(Vec::new());
        }
        let host = unescape_for_file_name(HostId::host_of(host_id));
        if let Some(shard) = shards.last_mut() {
            shard.push(ClusterHost {
                host,
                port: tcp_port,
            });
        }
    }

    shards.retain(|shard| !shard.is_empty());
    Ok(Cluster {
        shards,
        user: DEFAULT_CLUSTER_USER.to_string(),
        password: String::new(),
    })
}
