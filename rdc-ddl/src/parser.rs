// Copyright 2025 RDC Contributors
// Licensed under the Apache License, Version 2.0

//! DDL parser built on the sqlparser tokenizer
//!
//! Standard SQL parsers cannot express the clauses this catalog relies on
//! (`UUID '...'` bound to a table, `ENGINE = Name(args)`), so statements
//! are assembled from the token stream directly.

use crate::ast::*;
use rdc_common::{ObjectKind, RdcError, Result};
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use uuid::Uuid;

pub struct DdlParser;

impl DdlParser {
    /// Parse a single DDL statement
    pub fn parse(sql: &str) -> Result<DdlStatement> {
        let mut cur = TokenCursor::new(sql)?;
        let stmt = if cur.accept_keyword("CREATE") {
            Self::parse_create(&mut cur, false)?
        } else if cur.accept_keyword("ATTACH") {
            Self::parse_create(&mut cur, true)?
        } else if cur.accept_keyword("ALTER") {
            Self::parse_alter(&mut cur)?
        } else if cur.accept_keyword("DROP") {
            Self::parse_drop(&mut cur)?
        } else if cur.accept_keyword("DETACH") {
            Self::parse_detach(&mut cur)?
        } else if cur.accept_keyword("RENAME") {
            Self::parse_rename(&mut cur)?
        } else if cur.accept_keyword("EXCHANGE") {
            Self::parse_exchange(&mut cur)?
        } else {
            return Err(RdcError::ParseError(format!(
                "unsupported statement: {}",
                sql.trim()
            )));
        };
        cur.expect_eof()?;
        Ok(stmt)
    }

    fn parse_create(cur: &mut TokenCursor, attach: bool) -> Result<DdlStatement> {
        let kind = if cur.accept_keyword("TABLE") {
            ObjectKind::Table
        } else if cur.accept_keyword("DICTIONARY") {
            ObjectKind::Dictionary
        } else {
            return Err(cur.unexpected("TABLE or DICTIONARY"));
        };

        let if_not_exists = cur.accept_keyword_sequence(&["IF", "NOT", "EXISTS"]);
        let (database, name) = cur.parse_qualified_name()?;

        let mut uuid = None;
        let mut on_cluster = None;
        loop {
            if uuid.is_none() && cur.accept_keyword("UUID") {
                let literal = cur.parse_string_literal()?;
                uuid = Some(Uuid::parse_str(&literal).map_err(|e| {
                    RdcError::ParseError(format!("invalid table UUID '{}': {}", literal, e))
                })?);
            } else if on_cluster.is_none() && cur.accept_keyword_sequence(&["ON", "CLUSTER"]) {
                on_cluster = Some(cur.parse_identifier()?);
            } else {
                break;
            }
        }

        let mut columns = Vec::new();
        if cur.accept_token(&Token::LParen) {
            loop {
                columns.push(cur.parse_column_def(true)?);
                if cur.accept_token(&Token::Comma) {
                    continue;
                }
                cur.expect_token(&Token::RParen)?;
                break;
            }
        }

        let engine = if cur.accept_keyword("ENGINE") {
            cur.expect_token(&Token::Eq)?;
            let engine_name = cur.parse_identifier()?;
            let mut args = Vec::new();
            if cur.accept_token(&Token::LParen) {
                if cur.accept_token(&Token::RParen) {
                    // empty argument list
                } else {
                    loop {
                        let tokens = cur.collect_balanced(&[Token::Comma, Token::RParen]);
                        args.push(join_tokens(&tokens));
                        if cur.accept_token(&Token::Comma) {
                            continue;
                        }
                        cur.expect_token(&Token::RParen)?;
                        break;
                    }
                }
            }
            Some(EngineClause {
                name: engine_name,
                args,
            })
        } else {
            None
        };

        let rest = cur.collect_balanced(&[]);
        let suffix = if rest.is_empty() {
            None
        } else {
            Some(join_tokens(&rest))
        };

        Ok(DdlStatement::Create(CreateStatement {
            kind,
            database,
            name,
            uuid,
            attach,
            if_not_exists,
            on_cluster,
            columns,
            engine,
            suffix,
        }))
    }

    fn parse_alter(cur: &mut TokenCursor) -> Result<DdlStatement> {
        cur.expect_keyword("TABLE")?;
        let (database, name) = cur.parse_qualified_name()?;
        let on_cluster = if cur.accept_keyword_sequence(&["ON", "CLUSTER"]) {
            Some(cur.parse_identifier()?)
        } else {
            None
        };

        let mut commands = Vec::new();
        loop {
            commands.push(Self::parse_alter_command(cur)?);
            if !cur.accept_token(&Token::Comma) {
                break;
            }
        }

        Ok(DdlStatement::Alter(AlterStatement {
            database,
            name,
            on_cluster,
            commands,
        }))
    }

    fn parse_alter_command(cur: &mut TokenCursor) -> Result<AlterCommand> {
        if cur.accept_keyword_sequence(&["ADD", "COLUMN"]) {
            let if_not_exists = cur.accept_keyword_sequence(&["IF", "NOT", "EXISTS"]);
            let column = cur.parse_column_def(false)?;
            Ok(AlterCommand::AddColumn {
                column,
                if_not_exists,
            })
        } else if cur.accept_keyword_sequence(&["DROP", "COLUMN"]) {
            let if_exists = cur.accept_keyword_sequence(&["IF", "EXISTS"]);
            let name = cur.parse_identifier()?;
            Ok(AlterCommand::DropColumn { name, if_exists })
        } else if cur.accept_keyword_sequence(&["MODIFY", "COLUMN"]) {
            let column = cur.parse_column_def(false)?;
            Ok(AlterCommand::ModifyColumn { column })
        } else if cur.accept_keyword_sequence(&["RENAME", "COLUMN"]) {
            let from = cur.parse_identifier()?;
            cur.expect_keyword("TO")?;
            let to = cur.parse_identifier()?;
            Ok(AlterCommand::RenameColumn { from, to })
        } else if cur.accept_keyword_sequence(&["COMMENT", "COLUMN"]) {
            let name = cur.parse_identifier()?;
            let comment = cur.parse_string_literal()?;
            Ok(AlterCommand::CommentColumn { name, comment })
        } else {
            let tokens = cur.collect_balanced(&[Token::Comma]);
            if tokens.is_empty() {
                Err(cur.unexpected("ALTER command"))
            } else {
                Ok(AlterCommand::Other {
                    text: join_tokens(&tokens),
                })
            }
        }
    }

    fn parse_drop(cur: &mut TokenCursor) -> Result<DdlStatement> {
        let kind = if cur.accept_keyword("TABLE") {
            ObjectKind::Table
        } else if cur.accept_keyword("DICTIONARY") {
            ObjectKind::Dictionary
        } else {
            return Err(cur.unexpected("TABLE or DICTIONARY"));
        };
        let if_exists = cur.accept_keyword_sequence(&["IF", "EXISTS"]);
        let (database, name) = cur.parse_qualified_name()?;
        let on_cluster = if cur.accept_keyword_sequence(&["ON", "CLUSTER"]) {
            Some(cur.parse_identifier()?)
        } else {
            None
        };
        let sync = cur.accept_keyword("SYNC") || cur.accept_keyword_sequence(&["NO", "DELAY"]);
        Ok(DdlStatement::Drop(DropStatement {
            kind,
            database,
            name,
            if_exists,
            on_cluster,
            sync,
        }))
    }

    fn parse_detach(cur: &mut TokenCursor) -> Result<DdlStatement> {
        cur.expect_keyword("TABLE")?;
        let (database, name) = cur.parse_qualified_name()?;
        let on_cluster = if cur.accept_keyword_sequence(&["ON", "CLUSTER"]) {
            Some(cur.parse_identifier()?)
        } else {
            None
        };
        let permanently = cur.accept_keyword("PERMANENTLY");
        Ok(DdlStatement::Detach(DetachStatement {
            database,
            name,
            on_cluster,
            permanently,
        }))
    }

    fn parse_rename(cur: &mut TokenCursor) -> Result<DdlStatement> {
        cur.expect_keyword("TABLE")?;
        let (from_database, from) = cur.parse_qualified_name()?;
        cur.expect_keyword("TO")?;
        let (to_database, to) = cur.parse_qualified_name()?;
        let on_cluster = if cur.accept_keyword_sequence(&["ON", "CLUSTER"]) {
            Some(cur.parse_identifier()?)
        } else {
            None
        };
        Ok(DdlStatement::Rename(RenameStatement {
            from_database,
            from,
            to_database,
            to,
            on_cluster,
            exchange: false,
        }))
    }

    fn parse_exchange(cur: &mut TokenCursor) -> Result<DdlStatement> {
        cur.expect_keyword("TABLES")?;
        let (from_database, from) = cur.parse_qualified_name()?;
        cur.expect_keyword("AND")?;
        let (to_database, to) = cur.parse_qualified_name()?;
        let on_cluster = if cur.accept_keyword_sequence(&["ON", "CLUSTER"]) {
            Some(cur.parse_identifier()?)
        } else {
            None
        };
        Ok(DdlStatement::Rename(RenameStatement {
            from_database,
            from,
            to_database,
            to,
            on_cluster,
            exchange: true,
        }))
    }
}

/// Cursor over the significant tokens of one statement
struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    fn new(sql: &str) -> Result<Self> {
        let dialect = GenericDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| RdcError::ParseError(e.to_string()))?;
        let mut tokens: Vec<Token> = tokens
            .into_iter()
            .filter(|t| !matches!(t, Token::Whitespace(_) | Token::EOF))
            .collect();
        while matches!(tokens.last(), Some(Token::SemiColon)) {
            tokens.pop();
        }
        Ok(Self { tokens, pos: 0 })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn is_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(self.peek_at(offset), Some(Token::Word(w))
            if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword))
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword_at(0, keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn accept_keyword_sequence(&mut self, keywords: &[&str]) -> bool {
        for (offset, keyword) in keywords.iter().enumerate() {
            if !self.is_keyword_at(offset, keyword) {
                return false;
            }
        }
        self.pos += keywords.len();
        true
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn accept_token(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, token: &Token) -> Result<()> {
        if self.accept_token(token) {
            Ok(())
        } else {
            Err(self.unexpected(&token.to_string()))
        }
    }

    fn expect_eof(&mut self) -> Result<()> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(RdcError::ParseError(format!(
                "unexpected trailing token: {}",
                token
            ))),
        }
    }

    fn unexpected(&self, expected: &str) -> RdcError {
        match self.peek() {
            Some(token) => RdcError::ParseError(format!("expected {}, found {}", expected, token)),
            None => RdcError::ParseError(format!("expected {}, found end of statement", expected)),
        }
    }

    fn parse_identifier(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::Word(w)) => {
                let value = w.value.clone();
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn parse_qualified_name(&mut self) -> Result<(Option<String>, String)> {
        let first = self.parse_identifier()?;
        if self.accept_token(&Token::Period) {
            let second = self.parse_identifier()?;
            Ok((Some(first), second))
        } else {
            Ok((None, first))
        }
    }

    fn parse_string_literal(&mut self) -> Result<String> {
        match self.peek() {
            Some(Token::SingleQuotedString(s)) => {
                let value = s.clone();
                self.pos += 1;
                Ok(value)
            }
            _ => Err(self.unexpected("string literal")),
        }
    }

    /// Parse `name <definition tokens> [COMMENT '...']`. The definition ends
    /// at the first top-level comma, or at the closing parenthesis of the
    /// column list when `inside_parens`.
    fn parse_column_def(&mut self, inside_parens: bool) -> Result<ColumnDef> {
        let name = self.parse_identifier()?;
        let mut tokens = Vec::new();
        let mut comment = None;
        let mut depth: usize = 0;
        loop {
            match self.peek() {
                None => break,
                Some(Token::Comma) if depth == 0 => break,
                Some(Token::RParen) if depth == 0 && inside_parens => break,
                Some(Token::Word(w))
                    if depth == 0
                        && w.quote_style.is_none()
                        && w.value.eq_ignore_ascii_case("COMMENT")
                        && matches!(self.peek_at(1), Some(Token::SingleQuotedString(_))) =>
                {
                    self.pos += 1;
                    comment = Some(self.parse_string_literal()?);
                }
                Some(token) => {
                    match token {
                        Token::LParen => depth += 1,
                        Token::RParen => depth = depth.saturating_sub(1),
                        _ => {}
                    }
                    tokens.push(self.advance().expect("peeked token"));
                }
            }
        }
        Ok(ColumnDef {
            name,
            definition: join_tokens(&tokens),
            comment,
        })
    }

    /// Collect tokens until one of `stops` appears at parenthesis depth
    /// zero; the stop token is not consumed.
    fn collect_balanced(&mut self, stops: &[Token]) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut depth: usize = 0;
        while let Some(token) = self.peek() {
            if depth == 0 && stops.contains(token) {
                break;
            }
            match token {
                Token::LParen => depth += 1,
                Token::RParen => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                _ => {}
            }
            tokens.push(self.advance().expect("peeked token"));
        }
        tokens
    }

}

/// Render tokens back to canonical SQL text. The rules are chosen so that
/// re-tokenizing the result yields the same stream, making normalization a
/// fixed point.
pub(crate) fn join_tokens(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&Token> = None;
    for token in tokens {
        let separated = match (prev, token) {
            (None, _) => false,
            (_, Token::Comma) | (_, Token::RParen) | (_, Token::Period) => false,
            (Some(Token::LParen), _) | (Some(Token::Period), _) => false,
            (Some(Token::Word(_)), Token::LParen) | (Some(Token::RParen), Token::LParen) => false,
            _ => true,
        };
        if separated {
            out.push(' ');
        }
        out.push_str(&token.to_string());
        prev = Some(token);
    }
    out
}
