// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Abstract syntax tree for the replicated DDL subset

use rdc_common::ObjectKind;
use uuid::Uuid;

/// Top-level DDL statement
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    Create(CreateStatement),
    Alter(AlterStatement),
    Drop(DropStatement),
    Detach(DetachStatement),
    Rename(RenameStatement),
}

impl DdlStatement {
    /// Cluster name of an explicit `ON CLUSTER` clause, if any
    pub fn on_cluster(&self) -> Option<&str> {
        match self {
            DdlStatement::Create(s) => s.on_cluster.as_deref(),
            DdlStatement::Alter(s) => s.on_cluster.as_deref(),
            DdlStatement::Drop(s) => s.on_cluster.as_deref(),
            DdlStatement::Detach(s) => s.on_cluster.as_deref(),
            DdlStatement::Rename(s) => s.on_cluster.as_deref(),
        }
    }

    /// Remove embedded database names from all DDL targets.
    /// Replication is per-database, so entries in the shared log never
    /// carry one.
    pub fn strip_database(&mut self) {
        match self {
            DdlStatement::Create(s) => s.database = None,
            DdlStatement::Alter(s) => s.database = None,
            DdlStatement::Drop(s) => s.database = None,
            DdlStatement::Detach(s) => s.database = None,
            DdlStatement::Rename(s) => {
                s.from_database = None;
                s.to_database = None;
            }
        }
    }

    /// Render back to canonical SQL text
    pub fn to_sql(&self) -> String {
        match self {
            DdlStatement::Create(s) => s.to_sql(),
            DdlStatement::Alter(s) => s.to_sql(),
            DdlStatement::Drop(s) => s.to_sql(),
            DdlStatement::Detach(s) => s.to_sql(),
            DdlStatement::Rename(s) => s.to_sql(),
        }
    }
}

/// Column definition: name plus the canonical text of everything after it
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Type and constraints, canonically spaced
    pub definition: String,
    pub comment: Option<String>,
}

impl ColumnDef {
    pub fn to_sql(&self) -> String {
        let mut out = self.name.clone();
        if !self.definition.is_empty() {
            out.push(' ');
            out.push_str(&self.definition);
        }
        if let Some(comment) = &self.comment {
            out.push_str(&format!(" COMMENT '{}'", comment));
        }
        out
    }
}

/// Storage engine clause of a CREATE statement
#[derive(Debug, Clone, PartialEq)]
pub struct EngineClause {
    pub name: String,
    pub args: Vec<String>,
}

impl EngineClause {
    /// Whether the engine replicates its own data across replicas.
    /// Such tables are identified by UUID alone during recovery.
    pub fn is_replicated(&self) -> bool {
        self.name.starts_with("Replicated")
    }

    /// Whether tables of this engine keep data on disk. Tables that do not
    /// can be dropped locally without losing anything.
    pub fn stores_data_on_disk(&self) -> bool {
        !matches!(self.name.as_str(), "Memory" | "Null" | "View")
    }

    pub fn to_sql(&self) -> String {
        if self.args.is_empty() {
            format!("ENGINE = {}", self.name)
        } else {
            format!("ENGINE = {}({})", self.name, self.args.join(", "))
        }
    }
}

/// CREATE / ATTACH of a table or dictionary
#[derive(Debug, Clone, PartialEq)]
pub struct CreateStatement {
    pub kind: ObjectKind,
    pub database: Option<String>,
    pub name: String,
    pub uuid: Option<Uuid>,
    pub attach: bool,
    pub if_not_exists: bool,
    pub on_cluster: Option<String>,
    pub columns: Vec<ColumnDef>,
    pub engine: Option<EngineClause>,
    /// Trailing clauses (ORDER BY, SETTINGS, dictionary layout, ...) kept
    /// as canonical text; the catalog never interprets them
    pub suffix: Option<String>,
}

impl CreateStatement {
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        out.push_str(if self.attach { "ATTACH " } else { "CREATE " });
        out.push_str(self.kind.keyword());
        out.push(' ');
        if self.if_not_exists {
            out.push_str("IF NOT EXISTS ");
        }
        out.push_str(&qualified(&self.database, &self.name));
        if let Some(uuid) = &self.uuid {
            out.push_str(&format!(" UUID '{}'", uuid));
        }
        if let Some(cluster) = &self.on_cluster {
            out.push_str(&format!(" ON CLUSTER {}", cluster));
        }
        if !self.columns.is_empty() {
            let cols: Vec<String> = self.columns.iter().map(|c| c.to_sql()).collect();
            out.push_str(&format!(" ({})", cols.join(", ")));
        }
        if let Some(engine) = &self.engine {
            out.push(' ');
            out.push_str(&engine.to_sql());
        }
        if let Some(suffix) = &self.suffix {
            out.push(' ');
            out.push_str(suffix);
        }
        out
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One sub-command of an ALTER statement
#[derive(Debug, Clone, PartialEq)]
pub enum AlterCommand {
    AddColumn { column: ColumnDef, if_not_exists: bool },
    DropColumn { name: String, if_exists: bool },
    ModifyColumn { column: ColumnDef },
    RenameColumn { from: String, to: String },
    CommentColumn { name: String, comment: String },
    /// Anything outside the replicated allow-list, kept as raw text
    Other { text: String },
}

impl AlterCommand {
    /// Whether the apply path can execute this command safely on every
    /// replica
    pub fn is_supported(&self) -> bool {
        !matches!(self, AlterCommand::Other { .. })
    }

    pub fn to_sql(&self) -> String {
        match self {
            AlterCommand::AddColumn { column, if_not_exists } => {
                if *if_not_exists {
                    format!("ADD COLUMN IF NOT EXISTS {}", column.to_sql())
                } else {
                    format!("ADD COLUMN {}", column.to_sql())
                }
            }
            AlterCommand::DropColumn { name, if_exists } => {
                if *if_exists {
                    format!("DROP COLUMN IF EXISTS {}", name)
                } else {
                    format!("DROP COLUMN {}", name)
                }
            }
            AlterCommand::ModifyColumn { column } => format!("MODIFY COLUMN {}", column.to_sql()),
            AlterCommand::RenameColumn { from, to } => format!("RENAME COLUMN {} TO {}", from, to),
            AlterCommand::CommentColumn { name, comment } => {
                format!("COMMENT COLUMN {} '{}'", name, comment)
            }
            AlterCommand::Other { text } => text.clone(),
        }
    }
}

/// ALTER TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct AlterStatement {
    pub database: Option<String>,
    pub name: String,
    pub on_cluster: Option<String>,
    pub commands: Vec<AlterCommand>,
}

impl AlterStatement {
    pub fn to_sql(&self) -> String {
        let commands: Vec<String> = self.commands.iter().map(|c| c.to_sql()).collect();
        format!(
            "ALTER TABLE {} {}",
            qualified(&self.database, &self.name),
            commands.join(", ")
        )
    }
}

/// DROP of a table or dictionary
#[derive(Debug, Clone, PartialEq)]
pub struct DropStatement {
    pub kind: ObjectKind,
    pub database: Option<String>,
    pub name: String,
    pub if_exists: bool,
    pub on_cluster: Option<String>,
    /// SYNC: drop without deferring to the background queue
    pub sync: bool,
}

impl DropStatement {
    pub fn to_sql(&self) -> String {
        let mut out = format!("DROP {} ", self.kind.keyword());
        if self.if_exists {
            out.push_str("IF EXISTS ");
        }
        out.push_str(&qualified(&self.database, &self.name));
        if self.sync {
            out.push_str(" SYNC");
        }
        out
    }
}

/// DETACH TABLE statement
#[derive(Debug, Clone, PartialEq)]
pub struct DetachStatement {
    pub database: Option<String>,
    pub name: String,
    pub on_cluster: Option<String>,
    pub permanently: bool,
}

impl DetachStatement {
    pub fn to_sql(&self) -> String {
        let mut out = format!("DETACH TABLE {}", qualified(&self.database, &self.name));
        if self.permanently {
            out.push_str(" PERMANENTLY");
        }
        out
    }
}

/// RENAME TABLE / EXCHANGE TABLES statement
#[derive(Debug, Clone, PartialEq)]
pub struct RenameStatement {
    pub from_database: Option<String>,
    pub from: String,
    pub to_database: Option<String>,
    pub to: String,
    pub on_cluster: Option<String>,
    pub exchange: bool,
}

impl RenameStatement {
    pub fn to_sql(&self) -> String {
        if self.exchange {
            format!(
                "EXCHANGE TABLES {} AND {}",
                qualified(&self.from_database, &self.from),
                qualified(&self.to_database, &self.to)
            )
        } else {
            format!(
                "RENAME TABLE {} TO {}",
                qualified(&self.from_database, &self.from),
                qualified(&self.to_database, &self.to)
            )
        }
    }
}

fn qualified(database: &Option<String>, name: &str) -> String {
    match database {
        Some(db) => format!("{}.{}", db, name),
        None => name.to_string(),
    }
}
