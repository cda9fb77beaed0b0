// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Normalized CREATE text
//!
//! The authoritative metadata snapshot stores one normalized CREATE
//! statement per table: database name elided, table name replaced by a
//! placeholder, UUID explicit, never ATTACH. Local metadata files hold the
//! same text, so convergence checks are plain string comparisons.

use crate::ast::{CreateStatement, DdlStatement};
use crate::parser::DdlParser;
use rdc_common::constants::TABLE_NAME_PLACEHOLDER;
use rdc_common::utils::unescape_for_file_name;
use rdc_common::{RdcError, Result};

/// Produce the normalized text of a CREATE statement. The statement must
/// already carry its table UUID.
pub fn normalized_create_text(create: &CreateStatement) -> Result<String> {
    let uuid = create.uuid.ok_or_else(|| {
        RdcError::LogicalError(format!(
            "cannot normalize CREATE of '{}' without a table UUID",
            create.name
        ))
    })?;
    let normalized = CreateStatement {
        kind: create.kind,
        database: None,
        name: TABLE_NAME_PLACEHOLDER.to_string(),
        uuid: Some(uuid),
        attach: false,
        if_not_exists: false,
        on_cluster: None,
        columns: create.columns.clone(),
        engine: create.engine.clone(),
        suffix: create.suffix.clone(),
    };
    Ok(normalized.to_sql())
}

/// Parse a normalized CREATE text and check its shape.
pub fn parse_normalized_text(source: &str, text: &str) -> Result<CreateStatement> {
    let stmt = DdlParser::parse(text)?;
    let create = match stmt {
        DdlStatement::Create(create) => create,
        other => {
            return Err(RdcError::LogicalError(format!(
                "got unexpected statement from {}: {}",
                source,
                other.to_sql()
            )))
        }
    };
    if create.uuid.is_none()
        || create.name != TABLE_NAME_PLACEHOLDER
        || create.database.is_some()
        || create.attach
    {
        return Err(RdcError::LogicalError(format!(
            "got unexpected CREATE from {}: {}",
            source, text
        )));
    }
    Ok(create)
}

/// Turn a `/metadata/<escaped name>` node into an executable CREATE bound
/// to this database.
pub fn create_from_store(node_name: &str, text: &str, database: &str) -> Result<CreateStatement> {
    let mut create = parse_normalized_text(node_name, text)?;
    create.database = Some(database.to_string());
    create.name = unescape_for_file_name(node_name);
    create.attach = false;
    Ok(create)
}

/// Table UUID of a normalized CREATE text, if it parses
pub fn parsed_table_uuid(text: &str) -> Option<uuid::Uuid> {
    match DdlParser::parse(text) {
        Ok(DdlStatement::Create(create)) => create.uuid,
        _ => None,
    }
}
