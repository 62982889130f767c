//! Recursive-descent parser for queries. Expressions live in `expr.rs`.

use super::ast::*;
use super::error::{Span, SyntaxError};
use super::lexer::Lexer;
use super::token::{Keyword, Token, TokenKind};

/// Parser over the tokens of one query text.
pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
    lex_error: Option<SyntaxError>,
}

impl<'a> Parser<'a> {
    /// Lexical errors are reported by the first call to [`Parser::parse`].
    pub fn new(input: &'a str) -> Self {
        let (tokens, lex_error) = match Lexer::tokenize(input) {
            Ok(tokens) => (tokens, None),
            Err(e) => (Vec::new(), Some(e)),
        };

        Self {
            tokens,
            pos: 0,
            input,
            lex_error,
        }
    }

    /// Parses one statement with an optional trailing semicolon. Text made of
    /// whitespace and comments only yields `Ok(None)`.
    pub fn parse(&mut self) -> Result<Option<Statement>, SyntaxError> {
        if let Some(e) = self.lex_error.take() {
            return Err(e);
        }

        if self.is_eof() {
            return Ok(None);
        }

        let stmt = self.parse_query()?;

        self.consume_token(TokenKind::Semicolon);

        if !self.is_eof() {
            let span = self.current_span();
            return Err(SyntaxError::unexpected_token(
                "end of input",
                &self.current_token_name(),
                span,
            ));
        }

        Ok(Some(stmt))
    }

    /// Parses a query: one or more SELECTs joined by set operators.
    ///
    /// Set operators are left-associative: `a UNION b UNION c` is
    /// `(a UNION b) UNION c`.
    pub(crate) fn parse_query(&mut self) -> Result<Statement, SyntaxError> {
        let mut stmt = self.parse_query_operand()?;

        loop {
            let op = if self.consume_keyword(Keyword::Union) {
                SetOperator::Union
            } else if self.consume_keyword(Keyword::Intersect) {
                SetOperator::Intersect
            } else if self.consume_keyword(Keyword::Except) {
                SetOperator::Except
            } else {
                break;
            };

            let all = if self.consume_keyword(Keyword::All) {
                true
            } else {
                self.consume_keyword(Keyword::Distinct);
                false
            };

            let right = self.parse_query_operand()?;
            stmt = Statement::SetOperation {
                op,
                all,
                left: Box::new(stmt),
                right: Box::new(right),
            };
        }

        Ok(stmt)
    }

    /// Parses a SELECT or a parenthesized query.
    fn parse_query_operand(&mut self) -> Result<Statement, SyntaxError> {
        if self.consume_token(TokenKind::LParen) {
            let query = self.parse_query()?;
            self.expect_token(TokenKind::RParen)?;
            return Ok(query);
        }

        if self.check_keyword(Keyword::Select) {
            let select = self.parse_select_stmt()?;
            return Ok(Statement::Select(Box::new(select)));
        }

        let span = self.current_span();
        Err(SyntaxError::unexpected_token(
            "SELECT",
            &self.current_token_name(),
            span,
        ))
    }

    pub(crate) fn parse_select_stmt(&mut self) -> Result<SelectStmt, SyntaxError> {
        self.expect_keyword(Keyword::Select)?;

        // DISTINCT / ALL
        let distinct = if self.consume_keyword(Keyword::Distinct) {
            true
        } else {
            self.consume_keyword(Keyword::All);
            false
        };

        let columns = self.parse_select_list()?;

        let from = if self.consume_keyword(Keyword::From) {
            Some(self.parse_from_clause()?)
        } else {
            None
        };

        let where_clause = if self.consume_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.consume_keyword(Keyword::Group) {
            self.expect_keyword(Keyword::By)?;
            self.parse_expr_list()?
        } else {
            vec![]
        };

        let having = if self.consume_keyword(Keyword::Having) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let order_by = if self.consume_keyword(Keyword::Order) {
            self.expect_keyword(Keyword::By)?;
            self.parse_order_by_list()?
        } else {
            vec![]
        };

        let limit = if self.consume_keyword(Keyword::Limit) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let offset = if self.consume_keyword(Keyword::Offset) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let locking = if self.consume_keyword(Keyword::For) {
            Some(self.parse_locking_clause()?)
        } else {
            None
        };

        Ok(SelectStmt {
            distinct,
            columns,
            from,
            where_clause,
            group_by,
            having,
            order_by,
            limit,
            offset,
            locking,
        })
    }

    fn parse_select_list(&mut self) -> Result<Vec<SelectItem>, SyntaxError> {
        let mut items = vec![self.parse_select_item()?];
        while self.consume_token(TokenKind::Comma) {
            items.push(self.parse_select_item()?);
        }
        Ok(items)
    }

    fn parse_select_item(&mut self) -> Result<SelectItem, SyntaxError> {
        if self.consume_token(TokenKind::Asterisk) {
            return Ok(SelectItem::Wildcard);
        }

        // table.*
        if let Some(name) = self.peek_nth_identifier(0)
            && self.peek_nth_kind(1) == Some(&TokenKind::Dot)
            && self.peek_nth_kind(2) == Some(&TokenKind::Asterisk)
        {
            self.pos += 3;
            return Ok(SelectItem::QualifiedWildcard(name));
        }

        let expr = self.parse_expr()?;
        let alias = self.parse_optional_alias()?;

        Ok(SelectItem::Expr { expr, alias })
    }

    /// Parses `[AS] alias`, where the alias may be omitted entirely.
    fn parse_optional_alias(&mut self) -> Result<Option<String>, SyntaxError> {
        if self.consume_keyword(Keyword::As) {
            return self.expect_identifier().map(Some);
        }
        match self.peek_kind() {
            Some(TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name)) => {
                let alias = name.clone();
                self.advance();
                Ok(Some(alias))
            }
            _ => Ok(None),
        }
    }

    fn parse_from_clause(&mut self) -> Result<FromClause, SyntaxError> {
        let mut tables = vec![self.parse_table_ref()?];
        while self.consume_token(TokenKind::Comma) {
            tables.push(self.parse_table_ref()?);
        }
        Ok(FromClause { tables })
    }

    /// Parses a table reference followed by any number of JOINs.
    fn parse_table_ref(&mut self) -> Result<TableRef, SyntaxError> {
        let mut table_ref = self.parse_primary_table_ref()?;

        while let Some(join_type) = self.parse_join_keyword()? {
            let right = self.parse_primary_table_ref()?;

            let condition = if matches!(join_type, JoinType::Cross | JoinType::Natural) {
                None
            } else if self.consume_keyword(Keyword::On) {
                Some(JoinCondition::On(self.parse_expr()?))
            } else if self.consume_keyword(Keyword::Using) {
                self.expect_token(TokenKind::LParen)?;
                let columns = self.parse_identifier_list()?;
                self.expect_token(TokenKind::RParen)?;
                Some(JoinCondition::Using(columns))
            } else {
                None
            };

            table_ref = TableRef::Join {
                left: Box::new(table_ref),
                join_type,
                right: Box::new(right),
                condition,
            };
        }

        Ok(table_ref)
    }

    /// Consumes a join introducer, returning its type.
    fn parse_join_keyword(&mut self) -> Result<Option<JoinType>, SyntaxError> {
        let join_type = if self.consume_keyword(Keyword::Cross) {
            JoinType::Cross
        } else if self.consume_keyword(Keyword::Natural) {
            if self.consume_keyword(Keyword::Left) || self.consume_keyword(Keyword::Right) {
                self.consume_keyword(Keyword::Outer);
            }
            JoinType::Natural
        } else if self.consume_keyword(Keyword::StraightJoin) {
            return Ok(Some(JoinType::Straight));
        } else if self.consume_keyword(Keyword::Inner) {
            JoinType::Inner
        } else if self.consume_keyword(Keyword::Left) {
            self.consume_keyword(Keyword::Outer);
            JoinType::Left
        } else if self.consume_keyword(Keyword::Right) {
            self.consume_keyword(Keyword::Outer);
            JoinType::Right
        } else if self.consume_keyword(Keyword::Full) {
            self.consume_keyword(Keyword::Outer);
            JoinType::Full
        } else if self.check_keyword(Keyword::Join) {
            JoinType::Inner
        } else {
            return Ok(None);
        };

        self.expect_keyword(Keyword::Join)?;
        Ok(Some(join_type))
    }

    /// Parses a primary table reference: a table name, a subquery, or a
    /// parenthesized join tree.
    fn parse_primary_table_ref(&mut self) -> Result<TableRef, SyntaxError> {
        if self.check_token(TokenKind::LParen) {
            if self.starts_query_at(1) {
                self.advance();
                let query = self.parse_query()?;
                self.expect_token(TokenKind::RParen)?;

                // Subquery alias is required
                self.consume_keyword(Keyword::As);
                let alias = self.expect_identifier()?;

                return Ok(TableRef::Subquery {
                    query: Box::new(query),
                    alias,
                });
            }

            self.advance();
            let inner = self.parse_table_ref()?;
            self.expect_token(TokenKind::RParen)?;
            return Ok(TableRef::Nested(Box::new(inner)));
        }

        let name = self.expect_identifier()?;
        let alias = self.parse_optional_alias()?;

        Ok(TableRef::Table { name, alias })
    }

    /// Returns true if the token `n` ahead begins a query, possibly behind
    /// further opening parentheses.
    fn starts_query_at(&self, mut n: usize) -> bool {
        loop {
            match self.peek_nth_kind(n) {
                Some(TokenKind::LParen) => n += 1,
                Some(TokenKind::Keyword(Keyword::Select)) => return true,
                _ => return false,
            }
        }
    }

    fn parse_order_by_list(&mut self) -> Result<Vec<OrderByItem>, SyntaxError> {
        let mut items = Vec::new();

        loop {
            let expr = self.parse_expr()?;

            let direction = if self.consume_keyword(Keyword::Asc) {
                SortDirection::Asc
            } else if self.consume_keyword(Keyword::Desc) {
                SortDirection::Desc
            } else {
                SortDirection::default()
            };

            let nulls = if self.consume_keyword(Keyword::Nulls) {
                if self.consume_keyword(Keyword::First) {
                    NullOrdering::First
                } else if self.consume_keyword(Keyword::Last) {
                    NullOrdering::Last
                } else {
                    let span = self.current_span();
                    return Err(SyntaxError::unexpected_token(
                        "FIRST or LAST",
                        &self.current_token_name(),
                        span,
                    ));
                }
            } else {
                NullOrdering::default()
            };

            items.push(OrderByItem {
                expr,
                direction,
                nulls,
            });

            if !self.consume_token(TokenKind::Comma) {
                break;
            }
        }

        Ok(items)
    }

    fn parse_locking_clause(&mut self) -> Result<LockingClause, SyntaxError> {
        let mode = if self.consume_keyword(Keyword::Update) {
            LockMode::Update
        } else if self.consume_keyword(Keyword::Share) {
            LockMode::Share
        } else {
            let span = self.current_span();
            return Err(SyntaxError::unexpected_token(
                "UPDATE or SHARE",
                &self.current_token_name(),
                span,
            ));
        };

        Ok(LockingClause { mode })
    }

    // ==================== Helper methods ====================

    pub(crate) fn is_eof(&self) -> bool {
        self.peek().is_none_or(|t| t.is_eof())
    }

    pub(crate) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    pub(crate) fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    pub(crate) fn peek_nth_kind(&self, n: usize) -> Option<&TokenKind> {
        self.tokens.get(self.pos + n).map(|t| &t.kind)
    }

    pub(crate) fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    pub(crate) fn current_span(&self) -> Span {
        self.peek().map_or(Span::at(self.input.len()), |t| t.span)
    }

    pub(crate) fn current_token_name(&self) -> String {
        self.peek()
            .map_or("end of input".to_string(), |t| t.kind.display_name())
    }

    pub(crate) fn check_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Keyword(k)) if *k == kw)
    }

    pub(crate) fn consume_keyword(&mut self, kw: Keyword) -> bool {
        if self.check_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, kw: Keyword) -> Result<(), SyntaxError> {
        if self.consume_keyword(kw) {
            Ok(())
        } else {
            let span = self.current_span();
            Err(SyntaxError::unexpected_token(
                &format!("keyword '{}'", kw.as_str()),
                &self.current_token_name(),
                span,
            ))
        }
    }

    pub(crate) fn check_token(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(&kind)
    }

    pub(crate) fn consume_token(&mut self, kind: TokenKind) -> bool {
        if self.check_token(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_token(&mut self, kind: TokenKind) -> Result<(), SyntaxError> {
        if self.consume_token(kind.clone()) {
            Ok(())
        } else {
            let span = self.current_span();
            Err(SyntaxError::unexpected_token(
                &kind.display_name(),
                &self.current_token_name(),
                span,
            ))
        }
    }

    /// Returns the identifier at `n` tokens ahead, if any.
    ///
    /// Non-reserved keywords count as identifiers and keep their source spelling.
    pub(crate) fn peek_nth_identifier(&self, n: usize) -> Option<String> {
        let token = self.tokens.get(self.pos + n)?;
        match &token.kind {
            TokenKind::Identifier(name) | TokenKind::QuotedIdentifier(name) => Some(name.clone()),
            TokenKind::Keyword(kw) if !kw.is_reserved() => {
                Some(self.input[token.span.start..token.span.end].to_string())
            }
            _ => None,
        }
    }

    pub(crate) fn expect_identifier(&mut self) -> Result<String, SyntaxError> {
        match self.peek_nth_identifier(0) {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => {
                let span = self.current_span();
                Err(SyntaxError::unexpected_token(
                    "identifier",
                    &self.current_token_name(),
                    span,
                ))
            }
        }
    }

    fn parse_identifier_list(&mut self) -> Result<Vec<String>, SyntaxError> {
        let mut list = vec![self.expect_identifier()?];
        while self.consume_token(TokenKind::Comma) {
            list.push(self.expect_identifier()?);
        }
        Ok(list)
    }

    pub(crate) fn parse_expr_list(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut list = vec![self.parse_expr()?];
        while self.consume_token(TokenKind::Comma) {
            list.push(self.parse_expr()?);
        }
        Ok(list)
    }
}
