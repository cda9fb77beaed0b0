// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! Applying ALTER commands to a table definition
//!
//! The apply path needs the post-ALTER definition to refresh both the
//! local metadata file and the store snapshot, so supported commands are
//! executed against the parsed CREATE statement.

use crate::ast::{AlterCommand, AlterStatement, CreateStatement};
use rdc_common::{RdcError, Result};

/// Apply every command of `alter` to a copy of `create`.
pub fn apply_alter(create: &CreateStatement, alter: &AlterStatement) -> Result<CreateStatement> {
    let mut next = create.clone();
    for command in &alter.commands {
        apply_command(&mut next, command)?;
    }
    Ok(next)
}

fn apply_command(create: &mut CreateStatement, command: &AlterCommand) -> Result<()> {
    match command {
        AlterCommand::AddColumn {
            column,
            if_not_exists,
        } => {
            if create.column(&column.name).is_some() {
                if *if_not_exists {
                    return Ok(());
                }
                return Err(RdcError::IncorrectQuery(format!(
                    "cannot add column {}: it already exists",
                    column.name
                )));
            }
            create.columns.push(column.clone());
        }
        AlterCommand::DropColumn { name, if_exists } => {
            let before = create.columns.len();
            create.columns.retain(|c| c.name != *name);
            if create.columns.len() == before && !if_exists {
                return Err(unknown_column(name));
            }
            if create.columns.is_empty() {
                return Err(RdcError::IncorrectQuery(
                    "cannot drop the last column of a table".to_string(),
                ));
            }
        }
        AlterCommand::ModifyColumn { column } => {
            let slot = create
                .columns
                .iter_mut()
                .find(|c| c.name == column.name)
                .ok_or_else(|| unknown_column(&column.name))?;
            *slot = column.clone();
        }
        AlterCommand::RenameColumn { from, to } => {
            if create.column(to).is_some() {
                return Err(RdcError::IncorrectQuery(format!(
                    "cannot rename column {} to {}: target already exists",
                    from, to
                )));
            }
            let slot = create
                .columns
                .iter_mut()
                .find(|c| c.name == *from)
                .ok_or_else(|| unknown_column(from))?;
            slot.name = to.clone();
        }
        AlterCommand::CommentColumn { name, comment } => {
            let slot = create
                .columns
                .iter_mut()
                .find(|c| c.name == *name)
                .ok_or_else(|| unknown_column(name))?;
            slot.comment = Some(comment.clone());
        }
        AlterCommand::Other { text } => {
            return Err(RdcError::NotImplemented(format!(
                "unsupported ALTER command: {}",
                text
            )));
        }
    }
    Ok(())
}

fn unknown_column(name: &str) -> RdcError {
    RdcError::IncorrectQuery(format!("column {} does not exist", name))
}
