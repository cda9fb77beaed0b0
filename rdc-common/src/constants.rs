// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Constants used throughout the replicated catalog

/// Value stored in a replica node to tombstone it
pub const DROPPED_MARK: &str = "DROPPED";

/// Suffix of the shadow database that receives diverged tables on recovery
pub const BROKEN_TABLES_SUFFIX: &str = "_broken_tables";

/// Table name placeholder inside normalized CREATE statements
pub const TABLE_NAME_PLACEHOLDER: &str = "_";

/// Default number of log entries kept before pruning
pub const DEFAULT_LOGS_TO_KEEP: u32 = 1000;

/// Retry cap for the consistent metadata snapshot
pub const MAX_SNAPSHOT_RETRIES: usize = 10;

/// Retry cap for the consistent cluster snapshot
pub const MAX_CLUSTER_RETRIES: usize = 10;

/// Default TCP port replicas announce in their host id
pub const DEFAULT_TCP_PORT: u16 = 9000;

/// User name placed into logical cluster definitions
pub const DEFAULT_CLUSTER_USER: &str = "default";

/// Extension of on-disk table metadata files
pub const METADATA_FILE_EXTENSION: &str = ".sql";

/// Maximum shard / replica / table name length
pub const MAX_NAME_LENGTH: usize = 256;

/// Default time the proposer waits for remote replicas (milliseconds)
pub const DEFAULT_DDL_TASK_TIMEOUT_MS: u64 = 180_000;

/// Default poll interval of the log apply worker (milliseconds)
pub const DEFAULT_APPLY_POLL_INTERVAL_MS: u64 = 500;
