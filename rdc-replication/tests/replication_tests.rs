// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! End-to-end tests: several replicas over one shared in-process store

use rdc_catalog::{CatalogRegistry, DdlSession};
use rdc_common::{RdcError, ReplicaConfig};
use rdc_coordination::{CoordinationStore, MemoryStore};
use rdc_replication::ReplicatedDatabase;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const STORE_PATH: &str = "/db1";

fn config(dir: &Path, shard: &str, replica: &str) -> ReplicaConfig {
    ReplicaConfig {
        meta_dir: dir.to_path_buf(),
        database: "db1".to_string(),
        store_path: STORE_PATH.to_string(),
        shard: shard.to_string(),
        replica: replica.to_string(),
        host: format!("host_{}_{}", shard, replica),
        tcp_port: 9000,
        ddl_task_timeout_ms: 5_000,
        apply_poll_interval_ms: 10,
        ..ReplicaConfig::default()
    }
}

struct Replica {
    database: Arc<ReplicatedDatabase>,
    #[allow(dead_code)]
    registry: Arc<CatalogRegistry>,
    dir: TempDir,
}

fn open_replica(store: &MemoryStore, shard: &str, replica: &str) -> Replica {
    let dir = TempDir::new().unwrap();
    let registry = CatalogRegistry::new(dir.path());
    let database = ReplicatedDatabase::open(
        config(dir.path(), shard, replica),
        Arc::new(store.clone()),
        registry.clone(),
    )
    .unwrap();
    database.startup().unwrap();
    Replica {
        database,
        registry,
        dir,
    }
}

fn reopen_replica(store: &MemoryStore, replica: Replica) -> Replica {
    let Replica { database, dir, .. } = replica;
    let (shard, replica_name) = (
        database.replica_name().shard().to_string(),
        database.replica_name().replica().to_string(),
    );
    database.shutdown();
    drop(database);

    let registry = CatalogRegistry::new(dir.path());
    let database = ReplicatedDatabase::open(
        config(dir.path(), &shard, &replica_name),
        Arc::new(store.clone()),
        registry.clone(),
    )
    .unwrap();
    database.startup().unwrap();
    Replica {
        database,
        registry,
        dir,
    }
}

fn initial_session() -> DdlSession {
    DdlSession::initial(Duration::from_secs(5))
}

fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        if Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_create_table_replicates() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s1", "r2");

    let max_before = r1.database.max_log_ptr().unwrap();
    let report = r1
        .database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();

    // The entry is durable and the initiator applied it synchronously.
    assert!(r1.database.catalog().is_table_exist("t"));
    assert!(store.exists(&format!("{}/metadata/t", STORE_PATH)).unwrap());
    let max_after = r1.database.max_log_ptr().unwrap();
    assert!(max_after > max_before);
    assert_eq!(max_after, report.entry_id);

    // The proposer waited for both replicas.
    assert_eq!(report.replicas.len(), 2);
    assert!(report.replicas.iter().all(|status| status.applied));
    assert!(r2.database.catalog().is_table_exist("t"));

    // Identical definitions on both converged replicas.
    assert_eq!(
        r1.database.catalog().read_metadata_file("t").unwrap(),
        r2.database.catalog().read_metadata_file("t").unwrap()
    );
    assert_eq!(
        r1.database.catalog().uuid_of("t"),
        r2.database.catalog().uuid_of("t")
    );
}

#[test]
fn test_metadata_node_matches_local_file() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    r1.database
        .propose(
            "CREATE TABLE events (id Int64, payload String) ENGINE = Log",
            &initial_session(),
        )
        .unwrap();

    let stored = store.get(&format!("{}/metadata/events", STORE_PATH)).unwrap();
    assert_eq!(
        stored,
        r1.database.catalog().read_metadata_file("events").unwrap()
    );
    // The stored text is normalized: placeholder name, explicit UUID, no
    // database, never ATTACH. parse_normalized_text enforces all of it.
    let create = rdc_ddl::parse_normalized_text("events", &stored).unwrap();
    assert!(create.uuid.is_some());
    assert_eq!(create.columns.len(), 2);
}

#[test]
fn test_second_join_with_other_host_id_fails() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");

    // Same slot, different host.
    let dir = TempDir::new().unwrap();
    let registry = CatalogRegistry::new(dir.path());
    let mut cfg = config(dir.path(), "s1", "r1");
    cfg.host = "other_host".to_string();
    let err = ReplicatedDatabase::open(cfg, Arc::new(store.clone()), registry).unwrap_err();
    assert!(matches!(err, RdcError::ReplicaExists(_)));
    drop(r1);
}

#[test]
fn test_concurrent_joins_have_one_winner() {
    let store = MemoryStore::new();
    let mut handles = Vec::new();
    for i in 0..4 {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            let dir = TempDir::new().unwrap();
            let registry = CatalogRegistry::new(dir.path());
            let mut cfg = config(dir.path(), "s1", "r1");
            cfg.host = format!("host_{}", i);
            let result = ReplicatedDatabase::open(cfg, Arc::new(store), registry);
            // Keep the temp dir alive until the attempt resolved.
            drop(dir);
            result.is_ok()
        }));
    }
    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(winners, 1);
}

#[test]
fn test_alter_and_drop_replicate() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s1", "r2");

    r1.database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();
    r2.database
        .propose("ALTER TABLE t ADD COLUMN y Int64", &initial_session())
        .unwrap();

    wait_until("alter to reach r1", || {
        r1.database
            .catalog()
            .read_metadata_file("t")
            .map(|text| text.contains("y Int64"))
            .unwrap_or(false)
    });
    assert_eq!(
        r1.database.catalog().read_metadata_file("t").unwrap(),
        r2.database.catalog().read_metadata_file("t").unwrap()
    );

    r1.database
        .propose("DROP TABLE t", &initial_session())
        .unwrap();
    assert!(!r1.database.catalog().is_table_exist("t"));
    wait_until("drop to reach r2", || {
        !r2.database.catalog().is_table_exist("t")
    });
    assert!(!store.exists(&format!("{}/metadata/t", STORE_PATH)).unwrap());
}

#[test]
fn test_unsupported_alter_is_rejected_before_enqueue() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    r1.database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();

    let max_before = r1.database.max_log_ptr().unwrap();
    let err = r1
        .database
        .propose("ALTER TABLE t DROP PARTITION p1", &initial_session())
        .unwrap_err();
    assert!(matches!(err, RdcError::NotImplemented(_)));
    assert_eq!(r1.database.max_log_ptr().unwrap(), max_before);
}

#[test]
fn test_secondary_sessions_cannot_propose() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let err = r1
        .database
        .propose(
            "CREATE TABLE t (x Int32) ENGINE = Log",
            &DdlSession::secondary(),
        )
        .unwrap_err();
    assert!(matches!(err, RdcError::IncorrectQuery(_)));
}

#[test]
fn test_on_cluster_is_rejected() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let err = r1
        .database
        .propose(
            "CREATE TABLE t ON CLUSTER prod (x Int32) ENGINE = Log",
            &initial_session(),
        )
        .unwrap_err();
    assert!(matches!(err, RdcError::IncorrectQuery(_)));
}

#[test]
fn test_rename_and_exchange_replicate() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s1", "r2");

    r1.database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();
    r1.database
        .propose("RENAME TABLE t TO u", &initial_session())
        .unwrap();
    wait_until("rename to reach r2", || {
        r2.database.catalog().is_table_exist("u")
    });
    assert!(!r2.database.catalog().is_table_exist("t"));
    assert!(store.exists(&format!("{}/metadata/u", STORE_PATH)).unwrap());
    assert!(!store.exists(&format!("{}/metadata/t", STORE_PATH)).unwrap());

    r1.database
        .propose("CREATE TABLE v (y String) ENGINE = Log", &initial_session())
        .unwrap();
    let u_uuid = r1.database.catalog().uuid_of("u");
    let v_uuid = r1.database.catalog().uuid_of("v");
    r1.database
        .propose("EXCHANGE TABLES u AND v", &initial_session())
        .unwrap();
    assert_eq!(r1.database.catalog().uuid_of("u"), v_uuid);
    assert_eq!(r1.database.catalog().uuid_of("v"), u_uuid);
    wait_until("exchange to reach r2", || {
        r2.database.catalog().uuid_of("u") == v_uuid
    });
    assert_eq!(r2.database.catalog().uuid_of("v"), u_uuid);
}

#[test]
fn test_rename_validations() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    r1.database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();

    let err = r1
        .database
        .propose("RENAME TABLE t TO t", &initial_session())
        .unwrap_err();
    assert!(matches!(err, RdcError::IncorrectQuery(_)));

    let err = r1
        .database
        .propose("RENAME TABLE missing TO u", &initial_session())
        .unwrap_err();
    assert!(matches!(err, RdcError::UnknownTable(_)));

    let err = r1
        .database
        .propose("EXCHANGE TABLES t AND missing", &initial_session())
        .unwrap_err();
    assert!(matches!(err, RdcError::UnknownTable(_)));

    let err = r1
        .database
        .propose("RENAME TABLE db1.t TO db2.u", &initial_session())
        .unwrap_err();
    assert!(matches!(err, RdcError::NotImplemented(_)));
}

#[test]
fn test_dictionary_lifecycle_replicates() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s1", "r2");

    r1.database
        .propose(
            "CREATE DICTIONARY dict (id Int64, value String) PRIMARY KEY id LAYOUT(FLAT())",
            &initial_session(),
        )
        .unwrap();
    wait_until("dictionary to reach r2", || {
        r2.database.catalog().is_table_exist("dict")
    });
    assert!(store.exists(&format!("{}/metadata/dict", STORE_PATH)).unwrap());

    r1.database
        .propose("DROP DICTIONARY dict", &initial_session())
        .unwrap();
    wait_until("dictionary drop to reach r2", || {
        !r2.database.catalog().is_table_exist("dict")
    });
    assert!(!store.exists(&format!("{}/metadata/dict", STORE_PATH)).unwrap());
}

#[test]
fn test_detach_permanently_replicates() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s1", "r2");

    r1.database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();
    r1.database
        .propose("DETACH TABLE t PERMANENTLY", &initial_session())
        .unwrap();
    assert!(!r1.database.catalog().is_table_exist("t"));
    wait_until("detach to reach r2", || {
        !r2.database.catalog().is_table_exist("t")
    });
    assert!(!store.exists(&format!("{}/metadata/t", STORE_PATH)).unwrap());

    let err = r1
        .database
        .propose("DETACH TABLE u", &initial_session())
        .unwrap_err();
    assert!(matches!(err, RdcError::NotImplemented(_)));
}

#[test]
fn test_lagging_replica_catches_up_through_recovery() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r3 = open_replica(&store, "s1", "r3");

    // Take r3 offline, then move the catalog forward by five entries.
    r3.database.stop_replication();
    let fire_and_forget = DdlSession::initial(Duration::ZERO);
    for i in 0..4 {
        r1.database
            .propose(
                &format!("CREATE TABLE t{} (x Int32) ENGINE = Log", i),
                &fire_and_forget,
            )
            .unwrap();
    }
    r1.database
        .propose("ALTER TABLE t0 ADD COLUMN y Int64", &fire_and_forget)
        .unwrap();

    let r3 = reopen_replica(&store, r3);
    for i in 0..4 {
        assert!(r3.database.catalog().is_table_exist(&format!("t{}", i)));
    }
    assert!(r3
        .database
        .catalog()
        .read_metadata_file("t0")
        .unwrap()
        .contains("y Int64"));
    assert_eq!(
        r3.database.log_ptr().unwrap(),
        r3.database.max_log_ptr().unwrap()
    );
    // Nothing was diverged, so no shadow database appeared.
    assert!(!r3.registry.is_database_attached("db1_broken_tables"));
    drop(r1);
}

#[test]
fn test_recovery_refuses_massive_divergence() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    r1.database
        .propose("CREATE TABLE good (x Int32) ENGINE = Log", &initial_session())
        .unwrap();

    // Nine tables the snapshot knows nothing about.
    let session = DdlSession::secondary();
    for i in 0..9 {
        let create = match rdc_ddl::DdlParser::parse(&format!(
            "CREATE TABLE local{} (x Int32) ENGINE = Log",
            i
        ))
        .unwrap()
        {
            rdc_ddl::DdlStatement::Create(mut c) => {
                c.uuid = Some(uuid::Uuid::new_v4());
                c
            }
            _ => unreachable!(),
        };
        r1.database.catalog().create_table(&session, &create).unwrap();
    }

    r1.database.shutdown();
    // Force recovery on next startup.
    store
        .set(
            &format!("{}/replicas/s1|r1/log_ptr", STORE_PATH),
            "0",
            rdc_coordination::ANY_VERSION,
        )
        .unwrap();

    let registry = CatalogRegistry::new(r1.dir.path());
    let database = ReplicatedDatabase::open(
        config(r1.dir.path(), "s1", "r1"),
        Arc::new(store.clone()),
        registry,
    )
    .unwrap();
    let err = database.startup().unwrap_err();
    assert!(matches!(err, RdcError::ReplicationFailed(_)));
    // No local change: all ten tables are still there.
    assert_eq!(database.catalog().table_count(), 10);
}

#[test]
fn test_recovery_moves_diverged_table_to_shadow_database() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s1", "r2");

    for sql in [
        "CREATE TABLE a (x Int32) ENGINE = Log",
        "CREATE TABLE b (x Int32) ENGINE = Log",
        "CREATE TABLE t (x Int32) ENGINE = Log",
    ] {
        r1.database.propose(sql, &initial_session()).unwrap();
    }
    wait_until("tables to reach r2", || {
        r2.database.catalog().table_count() == 3
    });

    // While r2 is offline, t is dropped and recreated with a new identity.
    r2.database.stop_replication();
    r1.database
        .propose("DROP TABLE t", &DdlSession::initial(Duration::ZERO))
        .unwrap();
    r1.database
        .propose(
            "CREATE TABLE t (x Int32, z Int8) ENGINE = Log",
            &DdlSession::initial(Duration::ZERO),
        )
        .unwrap();

    let r2 = reopen_replica(&store, r2);
    // r2 converged on the new table.
    assert_eq!(
        r2.database.catalog().uuid_of("t"),
        r1.database.catalog().uuid_of("t")
    );
    // The stale version survived in the shadow database.
    let shadow = r2.registry.database("db1_broken_tables").unwrap();
    assert_eq!(shadow.table_count(), 1);
    let shadow_names = shadow.table_names();
    assert!(shadow_names[0].starts_with("t_"));
}

#[test]
fn test_recovery_keeps_replicated_engine_tables_by_uuid() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    r1.database
        .propose(
            "CREATE TABLE t (x Int32) ENGINE = ReplicatedMergeTree('/t', 'r') ORDER BY x",
            &initial_session(),
        )
        .unwrap();
    let uuid = r1.database.catalog().uuid_of("t").unwrap();

    // Same UUID, drifted definition in the snapshot.
    let drifted = format!(
        "CREATE TABLE _ UUID '{}' (x Int32, extra Int64) ENGINE = ReplicatedMergeTree('/t', 'r') ORDER BY x",
        uuid
    );
    store
        .set(
            &format!("{}/metadata/t", STORE_PATH),
            &drifted,
            rdc_coordination::ANY_VERSION,
        )
        .unwrap();

    r1.database.shutdown();
    store
        .set(
            &format!("{}/replicas/s1|r1/log_ptr", STORE_PATH),
            "0",
            rdc_coordination::ANY_VERSION,
        )
        .unwrap();

    let registry = CatalogRegistry::new(r1.dir.path());
    let database = ReplicatedDatabase::open(
        config(r1.dir.path(), "s1", "r1"),
        Arc::new(store.clone()),
        registry.clone(),
    )
    .unwrap();
    database.startup().unwrap();

    // Kept under its identity: no shadow database, original local text.
    assert_eq!(database.catalog().uuid_of("t"), Some(uuid));
    assert!(!registry.is_database_attached("db1_broken_tables"));
}

#[test]
fn test_concurrent_rename_and_alter_converge() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s1", "r2");

    r1.database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();
    wait_until("table to reach r2", || {
        r2.database.catalog().is_table_exist("t")
    });

    let d1 = r1.database.clone();
    let d2 = r2.database.clone();
    let rename = std::thread::spawn(move || {
        d1.propose("RENAME TABLE t TO u", &DdlSession::initial(Duration::ZERO))
    });
    let alter = std::thread::spawn(move || {
        d2.propose(
            "ALTER TABLE t ADD COLUMN y Int64",
            &DdlSession::initial(Duration::ZERO),
        )
    });
    // The store totally orders the two entries; the later one may fail.
    let _ = rename.join().unwrap();
    let _ = alter.join().unwrap();

    wait_until("both replicas to drain", || {
        let p1 = r1.database.log_ptr().unwrap();
        let p2 = r2.database.log_ptr().unwrap();
        let max = r1.database.max_log_ptr().unwrap();
        p1 == max && p2 == max
    });

    // Same final state everywhere, whatever the order was.
    assert_eq!(
        r1.database.catalog().table_names(),
        r2.database.catalog().table_names()
    );
    for name in r1.database.catalog().table_names() {
        assert_eq!(
            r1.database.catalog().read_metadata_file(&name).unwrap(),
            r2.database.catalog().read_metadata_file(&name).unwrap()
        );
    }
}

#[test]
fn test_dropped_replica_is_invisible_and_last_drop_cleans_up() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    let r2 = open_replica(&store, "s2", "r1");

    let cluster = r1.database.get_cluster().unwrap();
    assert_eq!(cluster.shards.len(), 2);

    r2.database.drop_database().unwrap();
    let cluster = r1.database.get_cluster().unwrap();
    assert_eq!(cluster.shards.len(), 1);
    assert_eq!(cluster.host_count(), 1);

    // Dropping the last replica removes the whole subtree.
    r1.database.drop_database().unwrap();
    assert!(!store.exists(STORE_PATH).unwrap());
}

#[test]
fn test_log_retention_prunes_applied_entries() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    store
        .set(
            &format!("{}/logs_to_keep", STORE_PATH),
            "2",
            rdc_coordination::ANY_VERSION,
        )
        .unwrap();

    for i in 0..6 {
        r1.database
            .propose(
                &format!("CREATE TABLE t{} (x Int32) ENGINE = Log", i),
                &initial_session(),
            )
            .unwrap();
    }

    wait_until("old entries to be pruned", || {
        let (children, _) = store.get_children(&format!("{}/log", STORE_PATH)).unwrap();
        children.len() <= 3
    });
    // Everything still applied and consistent.
    assert_eq!(r1.database.catalog().table_count(), 6);
}

#[test]
fn test_if_not_exists_is_idempotent() {
    let store = MemoryStore::new();
    let r1 = open_replica(&store, "s1", "r1");
    r1.database
        .propose("CREATE TABLE t (x Int32) ENGINE = Log", &initial_session())
        .unwrap();
    let uuid = r1.database.catalog().uuid_of("t");
    r1.database
        .propose(
            "CREATE TABLE IF NOT EXISTS t (x Int32) ENGINE = Log",
            &initial_session(),
        )
        .unwrap();
    assert_eq!(r1.database.catalog().uuid_of("t"), uuid);
}
