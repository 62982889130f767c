//! Tokenizer for query text.

use super::error::{Span, SyntaxError};
use super::token::{Keyword, Token, TokenKind};

/// Yields tokens until the EOF token or the first error, whichever comes
/// first. Whitespace, `--` comments and nestable `/* */` comments are
/// skipped.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            done: false,
        }
    }

    /// Tokenizes the whole input, stopping at the first lexical error.
    ///
    /// The returned vector always ends with an EOF token.
    pub fn tokenize(input: &'a str) -> Result<Vec<Token>, SyntaxError> {
        Lexer::new(input).collect()
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.input[self.pos..].starts_with(prefix)
    }

    /// Returns the character at `pos + offset` without consuming it.
    fn peek(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    /// Advances the position by `n` characters.
    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(ch) = self.peek(0) {
                self.pos += ch.len_utf8();
            }
        }
    }

    fn advance_while(&mut self, pred: impl Fn(char) -> bool) {
        while self.peek(0).is_some_and(&pred) {
            self.advance(1);
        }
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), SyntaxError> {
        loop {
            self.advance_while(char::is_whitespace);
            if !self.skip_comment()? {
                return Ok(());
            }
        }
    }

    /// Attempts to skip a comment, returning whether one was present.
    fn skip_comment(&mut self) -> Result<bool, SyntaxError> {
        if self.starts_with("--") {
            self.advance(2);
            while let Some(ch) = self.peek(0) {
                self.advance(1);
                if ch == '\n' {
                    break;
                }
            }
            return Ok(true);
        }

        if self.starts_with("/*") {
            let start = self.pos;
            self.advance(2);
            let mut depth = 1;
            while depth > 0 && !self.is_eof() {
                if self.starts_with("/*") {
                    depth += 1;
                    self.advance(2);
                } else if self.starts_with("*/") {
                    depth -= 1;
                    self.advance(2);
                } else {
                    self.advance(1);
                }
            }
            if depth > 0 {
                return Err(SyntaxError::new(
                    "unterminated block comment",
                    Span::new(start, self.pos),
                ));
            }
            return Ok(true);
        }

        Ok(false)
    }

    /// Scans the next token from the input.
    fn scan_token(&mut self) -> Result<Token, SyntaxError> {
        self.skip_whitespace_and_comments()?;

        let start = self.pos;
        let Some(ch) = self.peek(0) else {
            return Ok(Token::new(TokenKind::Eof, Span::at(start)));
        };

        match ch {
            '\'' => {
                let (value, span) = self.scan_quoted(ch, "string literal")?;
                Ok(Token::new(TokenKind::String(value), span))
            }
            '"' | '`' => {
                let (value, span) = self.scan_quoted(ch, "quoted identifier")?;
                Ok(Token::new(TokenKind::QuotedIdentifier(value), span))
            }
            '$' => self.scan_parameter(),
            c if c.is_ascii_digit()
                || (c == '.' && self.peek(1).is_some_and(|n| n.is_ascii_digit())) =>
            {
                self.scan_number()
            }
            c if is_ident_start(c) => Ok(self.scan_identifier_or_keyword()),
            _ => self.scan_operator_or_punctuation(),
        }
    }

    /// Reads a quoted run starting at the opening `quote`. A doubled quote
    /// stands for one literal quote character.
    fn scan_quoted(&mut self, quote: char, what: &str) -> Result<(String, Span), SyntaxError> {
        let start = self.pos;
        self.advance(1);
        let mut value = String::new();
        loop {
            let Some(ch) = self.peek(0) else {
                return Err(SyntaxError::new(
                    format!("{what} is not closed"),
                    Span::new(start, self.pos),
                ));
            };
            self.advance(1);
            if ch != quote {
                value.push(ch);
            } else if self.peek(0) == Some(quote) {
                value.push(quote);
                self.advance(1);
            } else {
                return Ok((value, Span::new(start, self.pos)));
            }
        }
    }

    fn scan_parameter(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.advance(1);

        let num_start = self.pos;
        self.advance_while(|c| c.is_ascii_digit());
        let num_str = &self.input[num_start..self.pos];
        let span = Span::new(start, self.pos);

        if num_str.is_empty() {
            return Err(SyntaxError::new(
                "expected parameter number after '$'",
                span,
            ));
        }
        num_str
            .parse::<u32>()
            .map(|n| Token::new(TokenKind::Parameter(n), span))
            .map_err(|_| SyntaxError::new("parameter number too large", span))
    }

    fn scan_number(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;
        self.advance_while(|c| c.is_ascii_digit());

        if self.peek(0) == Some('.') && self.peek(1).is_some_and(|c| c.is_ascii_digit()) {
            self.advance(1);
            self.advance_while(|c| c.is_ascii_digit());
        }

        if let Some('e' | 'E') = self.peek(0) {
            self.advance(1);
            if let Some('+' | '-') = self.peek(0) {
                self.advance(1);
            }
            let exp_start = self.pos;
            self.advance_while(|c| c.is_ascii_digit());
            if self.pos == exp_start {
                return Err(SyntaxError::invalid_number(Span::new(start, self.pos)));
            }
        }

        let text = &self.input[start..self.pos];
        let span = Span::new(start, self.pos);
        if text.parse::<f64>().is_err() {
            return Err(SyntaxError::invalid_number(span));
        }
        Ok(Token::new(TokenKind::Number(text.to_string()), span))
    }

    fn scan_identifier_or_keyword(&mut self) -> Token {
        let start = self.pos;
        self.advance_while(is_ident_continue);

        let ident = &self.input[start..self.pos];
        let span = Span::new(start, self.pos);

        match Keyword::parse(ident) {
            Some(kw) => Token::new(TokenKind::Keyword(kw), span),
            None => Token::new(TokenKind::Identifier(ident.to_string()), span),
        }
    }

    fn scan_operator_or_punctuation(&mut self) -> Result<Token, SyntaxError> {
        let start = self.pos;

        if self.starts_with("<=>") {
            self.pos += 3;
            return Ok(Token::new(
                TokenKind::NullSafeEq,
                Span::new(start, self.pos),
            ));
        }

        if let Some(two_chars) = self.input.get(self.pos..self.pos + 2) {
            let kind = match two_chars {
                "<>" | "!=" => Some(TokenKind::Neq),
                "<=" => Some(TokenKind::LtEq),
                ">=" => Some(TokenKind::GtEq),
                "||" => Some(TokenKind::Concat),
                _ => None,
            };
            if let Some(kind) = kind {
                self.pos += 2;
                return Ok(Token::new(kind, Span::new(start, self.pos)));
            }
        }

        let Some(ch) = self.peek(0) else {
            return Ok(Token::new(TokenKind::Eof, Span::at(start)));
        };
        self.advance(1);
        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Asterisk,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '=' => TokenKind::Eq,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semicolon,
            '.' => TokenKind::Dot,
            _ => {
                return Err(SyntaxError::new(
                    format!("unexpected character '{ch}'"),
                    Span::new(start, self.pos),
                ));
            }
        };

        Ok(Token::new(kind, Span::new(start, self.pos)))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, SyntaxError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let token = self.scan_token();
        match &token {
            Ok(t) if t.is_eof() => self.done = true,
            Err(_) => self.done = true,
            Ok(_) => {}
        }
        Some(token)
    }
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_ident_continue(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(input: &str) -> Vec<TokenKind> {
        Lexer::tokenize(input)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    fn kw(k: Keyword) -> TokenKind {
        TokenKind::Keyword(k)
    }

    fn num(s: &str) -> TokenKind {
        TokenKind::Number(s.to_string())
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(lex(""), vec![TokenKind::Eof]);
        assert_eq!(lex("  \n\t  "), vec![TokenKind::Eof]);
    }

    #[test]
    fn test_keywords_case_insensitive() {
        assert_eq!(
            lex("select FROM WhErE"),
            vec![
                kw(Keyword::Select),
                kw(Keyword::From),
                kw(Keyword::Where),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(
            lex(r#"foo _bar "my table" `tick`"#),
            vec![
                TokenKind::Identifier("foo".to_string()),
                TokenKind::Identifier("_bar".to_string()),
                TokenKind::QuotedIdentifier("my table".to_string()),
                TokenKind::QuotedIdentifier("tick".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers_keep_source_form() {
        assert_eq!(
            lex("4 0.25 1e3 .5"),
            vec![num("4"), num("0.25"), num("1e3"), num(".5"), TokenKind::Eof]
        );
    }

    #[test]
    fn test_qualified_name_is_not_a_number() {
        assert_eq!(
            lex("t.a"),
            vec![
                TokenKind::Identifier("t".to_string()),
                TokenKind::Dot,
                TokenKind::Identifier("a".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_literals() {
        assert_eq!(
            lex("'hello' 'it''s' ''"),
            vec![
                TokenKind::String("hello".to_string()),
                TokenKind::String("it's".to_string()),
                TokenKind::String("".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            lex("+ - * / % = <> != < <= > >= <=> ||"),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Asterisk,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Neq,
                TokenKind::Lt,
                TokenKind::LtEq,
                TokenKind::Gt,
                TokenKind::GtEq,
                TokenKind::NullSafeEq,
                TokenKind::Concat,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments() {
        assert_eq!(
            lex("SELECT -- line\n/* outer /* nested */ */ FROM"),
            vec![kw(Keyword::Select), kw(Keyword::From), TokenKind::Eof]
        );
    }

    #[test]
    fn test_parameters() {
        assert_eq!(
            lex("$1 $23"),
            vec![
                TokenKind::Parameter(1),
                TokenKind::Parameter(23),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_lexical_errors() {
        let err = Lexer::tokenize("'unterminated").unwrap_err();
        assert_eq!(err.message, "string literal is not closed");

        let err = Lexer::tokenize("SELECT /* open").unwrap_err();
        assert_eq!(err.message, "unterminated block comment");

        let err = Lexer::tokenize("SELECT @ FROM").unwrap_err();
        assert_eq!(err.message, "unexpected character '@'");
        assert_eq!(err.span, Span::new(7, 8));

        let err = Lexer::tokenize("1e").unwrap_err();
        assert_eq!(err.message, "malformed numeric literal");
    }

    #[test]
    fn test_token_spans() {
        let tokens = Lexer::tokenize("SELECT foo").unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 6));
        assert_eq!(tokens[1].span, Span::new(7, 10));
        assert_eq!(tokens[2].span, Span::at(10));
    }

    #[test]
    fn test_iterator_stops_after_error() {
        let mut lexer = Lexer::new("a @ b");
        assert!(matches!(lexer.next(), Some(Ok(_))));
        assert!(matches!(lexer.next(), Some(Err(_))));
        assert!(lexer.next().is_none());
    }
}
