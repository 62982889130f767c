//! Expression grammar, parsed by precedence climbing.

use super::ast::{BinaryOperator, Expr, UnaryOperator, WhenClause};
use super::error::SyntaxError;
use super::parser::Parser;
use super::token::{Keyword, TokenKind};

/// Binding strength of operators, weakest first:
/// 1. OR
/// 2. AND
/// 3. NOT (unary)
/// 4. =, <>, <, <=, >, >=, <=>
/// 5. ||
/// 6. +, -
/// 7. *, /, %
/// 8. Unary -, +
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
    Lowest = 0,
    Or = 1,
    And = 2,
    Not = 3,
    Comparison = 4,
    Concat = 5,
    AddSub = 6,
    MulDiv = 7,
    UnaryPlusMinus = 8,
}

impl Precedence {
    /// Returns the next higher precedence level.
    pub fn next(self) -> Self {
        match self {
            Precedence::Lowest => Precedence::Or,
            Precedence::Or => Precedence::And,
            Precedence::And => Precedence::Not,
            Precedence::Not => Precedence::Comparison,
            Precedence::Comparison => Precedence::Concat,
            Precedence::Concat => Precedence::AddSub,
            Precedence::AddSub => Precedence::MulDiv,
            Precedence::MulDiv => Precedence::UnaryPlusMinus,
            Precedence::UnaryPlusMinus => Precedence::UnaryPlusMinus,
        }
    }
}

/// Types a numeric literal.
///
/// A literal that parses as an integer and converts to the same floating-point
/// value is an integer; everything else (fractions, exponents, integers too
/// large for i64) is a float.
pub fn numeric_literal(text: &str) -> Option<Expr> {
    let float = text.parse::<f64>().ok()?;
    match text.parse::<i64>() {
        Ok(int) if int as f64 == float => Some(Expr::Integer(int)),
        _ => Some(Expr::Float(float)),
    }
}

impl<'a> Parser<'a> {
    pub fn parse_expr(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_expr_with_precedence(Precedence::Lowest)
    }

    /// Parses an expression with minimum precedence.
    pub fn parse_expr_with_precedence(
        &mut self,
        min_prec: Precedence,
    ) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary_expr()?;

        while let Some((op, prec)) = self.peek_binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();

            // Left-associative: the right operand binds one level tighter
            let right = self.parse_expr_with_precedence(prec.next())?;

            left = Expr::BinaryOp {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parses a unary expression (NOT, -, +) or primary expression.
    fn parse_unary_expr(&mut self) -> Result<Expr, SyntaxError> {
        // NOT binds looser than comparisons: NOT a > 3 is NOT (a > 3)
        if self.consume_keyword(Keyword::Not) {
            let operand = self.parse_expr_with_precedence(Precedence::Not)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Not,
                operand: Box::new(operand),
            });
        }

        if self.consume_token(TokenKind::Minus) {
            let operand = self.parse_expr_with_precedence(Precedence::UnaryPlusMinus)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Minus,
                operand: Box::new(operand),
            });
        }

        if self.consume_token(TokenKind::Plus) {
            let operand = self.parse_expr_with_precedence(Precedence::UnaryPlusMinus)?;
            return Ok(Expr::UnaryOp {
                op: UnaryOperator::Plus,
                operand: Box::new(operand),
            });
        }

        self.parse_postfix_expr()
    }

    /// Returns true if the current token is NOT followed by a postfix
    /// predicate keyword (IN, BETWEEN, LIKE, ILIKE).
    fn check_negated_predicate(&self) -> bool {
        self.check_keyword(Keyword::Not)
            && matches!(
                self.peek_nth_kind(1),
                Some(TokenKind::Keyword(
                    Keyword::In | Keyword::Between | Keyword::Like | Keyword::Ilike
                ))
            )
    }

    /// Parses postfix expressions (IS NULL, IN, BETWEEN, LIKE).
    fn parse_postfix_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary_expr()?;

        loop {
            // IS [NOT] NULL
            if self.consume_keyword(Keyword::Is) {
                let negated = self.consume_keyword(Keyword::Not);
                self.expect_keyword(Keyword::Null)?;
                expr = Expr::IsNull {
                    expr: Box::new(expr),
                    negated,
                };
                continue;
            }

            let negated = self.check_negated_predicate();
            if negated {
                self.advance();
            }

            // [NOT] IN (...)
            if self.consume_keyword(Keyword::In) {
                self.expect_token(TokenKind::LParen)?;
                if self.check_keyword(Keyword::Select) {
                    let subquery = self.parse_query()?;
                    self.expect_token(TokenKind::RParen)?;
                    expr = Expr::InSubquery {
                        expr: Box::new(expr),
                        subquery: Box::new(subquery),
                        negated,
                    };
                } else {
                    let list = self.parse_expr_list()?;
                    self.expect_token(TokenKind::RParen)?;
                    expr = Expr::InList {
                        expr: Box::new(expr),
                        list,
                        negated,
                    };
                }
                continue;
            }

            // [NOT] BETWEEN low AND high
            if self.consume_keyword(Keyword::Between) {
                let low = self.parse_expr_with_precedence(Precedence::Comparison)?;
                self.expect_keyword(Keyword::And)?;
                let high = self.parse_expr_with_precedence(Precedence::Comparison)?;
                expr = Expr::Between {
                    expr: Box::new(expr),
                    low: Box::new(low),
                    high: Box::new(high),
                    negated,
                };
                continue;
            }

            // [NOT] LIKE / ILIKE pattern [ESCAPE escape]
            let case_insensitive = self.consume_keyword(Keyword::Ilike);
            if case_insensitive || self.consume_keyword(Keyword::Like) {
                let pattern = self.parse_expr_with_precedence(Precedence::Comparison)?;
                let escape = if self.consume_keyword(Keyword::Escape) {
                    Some(Box::new(
                        self.parse_expr_with_precedence(Precedence::Comparison)?,
                    ))
                } else {
                    None
                };
                expr = Expr::Like {
                    expr: Box::new(expr),
                    pattern: Box::new(pattern),
                    escape,
                    negated,
                    case_insensitive,
                };
                continue;
            }

            break;
        }

        Ok(expr)
    }

    /// Literals, column references, calls, CASE and parenthesized forms.
    fn parse_primary_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.consume_keyword(Keyword::Null) {
            return Ok(Expr::Null);
        }
        if self.consume_keyword(Keyword::True) {
            return Ok(Expr::Boolean(true));
        }
        if self.consume_keyword(Keyword::False) {
            return Ok(Expr::Boolean(false));
        }

        // EXISTS (subquery)
        if self.consume_keyword(Keyword::Exists) {
            self.expect_token(TokenKind::LParen)?;
            let subquery = self.parse_query()?;
            self.expect_token(TokenKind::RParen)?;
            return Ok(Expr::Exists {
                subquery: Box::new(subquery),
                negated: false,
            });
        }

        if self.consume_keyword(Keyword::Case) {
            return self.parse_case_expr();
        }

        match self.peek_kind() {
            Some(TokenKind::Number(text)) => {
                let span = self.current_span();
                let expr =
                    numeric_literal(text).ok_or_else(|| SyntaxError::invalid_number(span))?;
                self.advance();
                return Ok(expr);
            }
            Some(TokenKind::String(s)) => {
                let s = s.clone();
                self.advance();
                return Ok(Expr::String(s));
            }
            Some(TokenKind::Parameter(n)) => {
                let n = *n;
                self.advance();
                return Ok(Expr::Parameter(n));
            }
            _ => {}
        }

        // Parenthesized expression or subquery
        if self.consume_token(TokenKind::LParen) {
            if self.check_keyword(Keyword::Select) {
                let query = self.parse_query()?;
                self.expect_token(TokenKind::RParen)?;
                return Ok(Expr::Subquery(Box::new(query)));
            }

            let expr = self.parse_expr()?;
            self.expect_token(TokenKind::RParen)?;
            return Ok(expr);
        }

        // Identifier (column reference or function call)
        if let Some(name) = self.peek_nth_identifier(0) {
            self.advance();

            if self.check_token(TokenKind::LParen) {
                return self.parse_function_call(name);
            }

            if self.consume_token(TokenKind::Dot) {
                let column = self.expect_identifier()?;
                return Ok(Expr::ColumnRef {
                    table: Some(name),
                    column,
                });
            }

            return Ok(Expr::ColumnRef {
                table: None,
                column: name,
            });
        }

        let span = self.current_span();
        Err(SyntaxError::unexpected_token(
            "expression",
            &self.current_token_name(),
            span,
        ))
    }

    fn parse_function_call(&mut self, name: String) -> Result<Expr, SyntaxError> {
        self.expect_token(TokenKind::LParen)?;

        let distinct = self.consume_keyword(Keyword::Distinct);

        if self.consume_token(TokenKind::RParen) {
            return Ok(Expr::Function {
                name,
                args: vec![],
                distinct,
            });
        }

        // COUNT(*)
        if self.consume_token(TokenKind::Asterisk) {
            self.expect_token(TokenKind::RParen)?;
            return Ok(Expr::Function {
                name,
                args: vec![Expr::Star],
                distinct,
            });
        }

        let args = self.parse_expr_list()?;
        self.expect_token(TokenKind::RParen)?;

        Ok(Expr::Function {
            name,
            args,
            distinct,
        })
    }

    /// Parses a CASE expression.
    ///
    /// Supports both simple CASE (CASE expr WHEN value THEN result)
    /// and searched CASE (CASE WHEN condition THEN result).
    fn parse_case_expr(&mut self) -> Result<Expr, SyntaxError> {
        let operand = if !self.check_keyword(Keyword::When) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        let mut when_clauses = Vec::new();
        while self.consume_keyword(Keyword::When) {
            let condition = self.parse_expr()?;
            self.expect_keyword(Keyword::Then)?;
            let result = self.parse_expr()?;
            when_clauses.push(WhenClause { condition, result });
        }

        if when_clauses.is_empty() {
            let span = self.current_span();
            return Err(SyntaxError::unexpected_token(
                "WHEN in CASE expression",
                &self.current_token_name(),
                span,
            ));
        }

        let else_result = if self.consume_keyword(Keyword::Else) {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };

        self.expect_keyword(Keyword::End)?;

        Ok(Expr::Case {
            operand,
            when_clauses,
            else_result,
        })
    }

    /// Peeks at the next token and returns the binary operator and its precedence.
    fn peek_binary_op(&self) -> Option<(BinaryOperator, Precedence)> {
        match self.peek_kind()? {
            TokenKind::Keyword(Keyword::Or) => Some((BinaryOperator::Or, Precedence::Or)),
            TokenKind::Keyword(Keyword::And) => Some((BinaryOperator::And, Precedence::And)),
            TokenKind::Eq => Some((BinaryOperator::Eq, Precedence::Comparison)),
            TokenKind::Neq => Some((BinaryOperator::Neq, Precedence::Comparison)),
            TokenKind::Lt => Some((BinaryOperator::Lt, Precedence::Comparison)),
            TokenKind::LtEq => Some((BinaryOperator::LtEq, Precedence::Comparison)),
            TokenKind::Gt => Some((BinaryOperator::Gt, Precedence::Comparison)),
            TokenKind::GtEq => Some((BinaryOperator::GtEq, Precedence::Comparison)),
            TokenKind::NullSafeEq => Some((BinaryOperator::NullSafeEq, Precedence::Comparison)),
            TokenKind::Concat => Some((BinaryOperator::Concat, Precedence::Concat)),
            TokenKind::Plus => Some((BinaryOperator::Add, Precedence::AddSub)),
            TokenKind::Minus => Some((BinaryOperator::Sub, Precedence::AddSub)),
            TokenKind::Asterisk => Some((BinaryOperator::Mul, Precedence::MulDiv)),
            TokenKind::Slash => Some((BinaryOperator::Div, Precedence::MulDiv)),
            TokenKind::Percent => Some((BinaryOperator::Mod, Precedence::MulDiv)),
            _ => None,
        }
    }
}
