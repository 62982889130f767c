//! Query text front end: tokens, statement tree and parser.

mod ast;
mod error;
mod expr;
mod lexer;
mod parser;
mod token;

pub use ast::*;
pub use error::{Span, SyntaxError};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{Keyword, Token, TokenKind};

/// Parses a single SQL query.
///
/// # Errors
///
/// Returns a [`SyntaxError`] if the text is not a valid query or is empty.
pub fn parse_query(sql: &str) -> Result<Statement, SyntaxError> {
    Parser::new(sql)
        .parse()?
        .ok_or_else(|| SyntaxError::unexpected_eof("SELECT", sql.len()))
}
