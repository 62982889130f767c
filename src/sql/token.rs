//! Tokens of the SELECT dialect.

use std::fmt;

use super::error::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Numeric literal as written. The parser decides between integer and
    /// float.
    Number(String),
    String(String),
    Identifier(String),
    /// `"name"` or `` `name` ``; never a keyword.
    QuotedIdentifier(String),
    /// `$n`
    Parameter(u32),
    Keyword(Keyword),

    Plus,
    Minus,
    Asterisk,
    Slash,
    Percent,
    Eq,
    /// `<>` or `!=`
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    NullSafeEq,
    Concat,

    LParen,
    RParen,
    Comma,
    Semicolon,
    Dot,

    Eof,
}

impl TokenKind {
    /// Source text of an operator or punctuation token.
    fn symbol(&self) -> Option<&'static str> {
        let s = match self {
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Asterisk => "*",
            TokenKind::Slash => "/",
            TokenKind::Percent => "%",
            TokenKind::Eq => "=",
            TokenKind::Neq => "<>",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::NullSafeEq => "<=>",
            TokenKind::Concat => "||",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Dot => ".",
            _ => return None,
        };
        Some(s)
    }

    /// Describes the token for "expected X, found Y" messages.
    pub fn display_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(symbol) = self.symbol() {
            return write!(f, "'{symbol}'");
        }
        match self {
            TokenKind::Number(n) => write!(f, "number '{n}'"),
            TokenKind::String(s) => write!(f, "string '{s}'"),
            TokenKind::Identifier(s) => write!(f, "identifier '{s}'"),
            TokenKind::QuotedIdentifier(s) => write!(f, "identifier '\"{s}\"'"),
            TokenKind::Parameter(n) => write!(f, "parameter '${n}'"),
            TokenKind::Keyword(kw) => write!(f, "keyword '{}'", kw.as_str()),
            _ => f.write_str("end of input"),
        }
    }
}

macro_rules! keywords {
    ($($variant:ident => $text:literal),+ $(,)?) => {
        /// Keywords of the dialect, matched case-insensitively.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Keyword {
            $($variant),+
        }

        impl Keyword {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Keyword::$variant => $text),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Some(Keyword::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

keywords! {
    Select => "SELECT",
    From => "FROM",
    Where => "WHERE",
    As => "AS",
    Distinct => "DISTINCT",
    All => "ALL",
    Group => "GROUP",
    Having => "HAVING",
    Order => "ORDER",
    By => "BY",
    Asc => "ASC",
    Desc => "DESC",
    Limit => "LIMIT",
    Offset => "OFFSET",
    Nulls => "NULLS",
    First => "FIRST",
    Last => "LAST",
    Union => "UNION",
    Intersect => "INTERSECT",
    Except => "EXCEPT",
    Join => "JOIN",
    Inner => "INNER",
    Left => "LEFT",
    Right => "RIGHT",
    Full => "FULL",
    Outer => "OUTER",
    Cross => "CROSS",
    Natural => "NATURAL",
    StraightJoin => "STRAIGHT_JOIN",
    On => "ON",
    Using => "USING",
    And => "AND",
    Or => "OR",
    Not => "NOT",
    Is => "IS",
    Null => "NULL",
    True => "TRUE",
    False => "FALSE",
    In => "IN",
    Between => "BETWEEN",
    Like => "LIKE",
    Ilike => "ILIKE",
    Escape => "ESCAPE",
    Exists => "EXISTS",
    Case => "CASE",
    When => "WHEN",
    Then => "THEN",
    Else => "ELSE",
    End => "END",
    For => "FOR",
    Update => "UPDATE",
    Share => "SHARE",
}

impl Keyword {
    /// Non-reserved keywords double as table, column and alias names.
    pub fn is_reserved(&self) -> bool {
        !matches!(
            self,
            Keyword::First | Keyword::Last | Keyword::Nulls | Keyword::Share
        )
    }
}
