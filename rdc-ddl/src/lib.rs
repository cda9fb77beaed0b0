// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! DDL statement model for the replicated catalog
//!
//! This module handles:
//! - The DDL AST (CREATE / ALTER / DROP / RENAME / DETACH)
//! - Parsing on top of the sqlparser tokenizer
//! - Normalized CREATE text for the metadata snapshot
//! - Applying supported ALTER commands to a definition

pub mod alter;
pub mod ast;
pub mod normalize;
pub mod parser;

pub use alter::apply_alter;
pub use ast::{
    AlterCommand, AlterStatement, ColumnDef, CreateStatement, DdlStatement, DetachStatement,
    DropStatement, EngineClause, RenameStatement,
};
pub use normalize::{
    create_from_store, normalized_create_text, parse_normalized_text, parsed_table_uuid,
};
pub use parser::DdlParser;
