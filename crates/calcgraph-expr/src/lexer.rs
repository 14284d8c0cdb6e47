//! Formula tokenizer.
//!
//! One scanner serves two callers: the parser uses [`tokenize`], which fails
//! on the first malformed token, and the identifier extractor uses
//! [`tokenize_lenient`], which skips anything it cannot read so extraction
//! never fails.

use std::fmt;

use crate::error::CompileError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,

    // Keywords
    If,
    Else,
    In,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Power,
    EqEq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    AndAnd,
    OrOr,
    Bang,
    Question,
    QuestionQuestion,
    Colon,

    // Delimiters
    Comma,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Int(v) => write!(f, "number {v}"),
            TokenKind::Float(v) => write!(f, "number {v}"),
            TokenKind::Str(s) => write!(f, "string {s:?}"),
            TokenKind::Ident(name) => write!(f, "identifier '{name}'"),
            TokenKind::True => f.write_str("'true'"),
            TokenKind::False => f.write_str("'false'"),
            TokenKind::Null => f.write_str("'null'"),
            TokenKind::If => f.write_str("'if'"),
            TokenKind::Else => f.write_str("'else'"),
            TokenKind::In => f.write_str("'in'"),
            TokenKind::Plus => f.write_str("'+'"),
            TokenKind::Minus => f.write_str("'-'"),
            TokenKind::Star => f.write_str("'*'"),
            TokenKind::Slash => f.write_str("'/'"),
            TokenKind::Percent => f.write_str("'%'"),
            TokenKind::Power => f.write_str("'**'"),
            TokenKind::EqEq => f.write_str("'=='"),
            TokenKind::NotEq => f.write_str("'!='"),
            TokenKind::Lt => f.write_str("'<'"),
            TokenKind::LtEq => f.write_str("'<='"),
            TokenKind::Gt => f.write_str("'>'"),
            TokenKind::GtEq => f.write_str("'>='"),
            TokenKind::AndAnd => f.write_str("'&&'"),
            TokenKind::OrOr => f.write_str("'||'"),
            TokenKind::Bang => f.write_str("'!'"),
            TokenKind::Question => f.write_str("'?'"),
            TokenKind::QuestionQuestion => f.write_str("'??'"),
            TokenKind::Colon => f.write_str("':'"),
            TokenKind::Comma => f.write_str("','"),
            TokenKind::Dot => f.write_str("'.'"),
            TokenKind::LParen => f.write_str("'('"),
            TokenKind::RParen => f.write_str("')'"),
            TokenKind::LBracket => f.write_str("'['"),
            TokenKind::RBracket => f.write_str("']'"),
            TokenKind::LBrace => f.write_str("'{'"),
            TokenKind::RBrace => f.write_str("'}'"),
            TokenKind::Eof => f.write_str("end of formula"),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Tokenizes `src`, failing on the first malformed token.
///
/// The returned list always ends with [`TokenKind::Eof`].
pub fn tokenize(src: &str) -> Result<Vec<Token>, CompileError> {
    Lexer::new(src, false).run()
}

/// Tokenizes `src`, skipping malformed input instead of failing.
///
/// Unknown characters are dropped and an unterminated string runs to the end
/// of input.
pub fn tokenize_lenient(src: &str) -> Vec<Token> {
    Lexer::new(src, true).run().unwrap_or_default()
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    lenient: bool,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, lenient: bool) -> Self {
        Lexer {
            src,
            pos: 0,
            lenient,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let offset = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    offset,
                });
                return Ok(tokens);
            };
            match self.scan(c, offset) {
                Ok(kind) => tokens.push(Token { kind, offset }),
                Err(_) if self.lenient => {
                    if self.pos == offset {
                        self.bump();
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    // === Character access ===

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }

    // === Token scanning ===

    fn scan(&mut self, c: char, offset: usize) -> Result<TokenKind, CompileError> {
        if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.number(offset);
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return Ok(self.word());
        }
        if c == '"' || c == '\'' {
            return self.string(c, offset);
        }

        self.bump();
        let kind = match c {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' if self.eat('*') => TokenKind::Power,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '^' => TokenKind::Power,
            '=' if self.eat('=') => TokenKind::EqEq,
            '!' if self.eat('=') => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '<' if self.eat('=') => TokenKind::LtEq,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::GtEq,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            '?' if self.eat('?') => TokenKind::QuestionQuestion,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            other => return Err(CompileError::UnexpectedChar { ch: other, offset }),
        };
        Ok(kind)
    }

    fn number(&mut self, offset: usize) -> Result<TokenKind, CompileError> {
        let start = self.pos;
        let mut is_float = false;

        self.take_digits();
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
            is_float = true;
            self.bump();
            self.take_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let signed = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if signed { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                self.bump();
                if signed {
                    self.bump();
                }
                self.take_digits();
            }
        }

        let src = self.src;
        let text = &src[start..self.pos];
        let invalid = || CompileError::InvalidNumber {
            text: text.to_string(),
            offset,
        };
        if is_float {
            text.parse::<f64>().map(TokenKind::Float).map_err(|_| invalid())
        } else {
            text.parse::<i64>().map(TokenKind::Int).map_err(|_| invalid())
        }
    }

    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        let src = self.src;
        match &src[start..self.pos] {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" | "nil" => TokenKind::Null,
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "in" => TokenKind::In,
            "and" => TokenKind::AndAnd,
            "or" => TokenKind::OrOr,
            "not" => TokenKind::Bang,
            ident => TokenKind::Ident(ident.to_string()),
        }
    }

    fn string(&mut self, quote: char, offset: usize) -> Result<TokenKind, CompileError> {
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None if self.lenient => return Ok(TokenKind::Str(out)),
                None => return Err(CompileError::UnterminatedString { offset }),
                Some(c) if c == quote => return Ok(TokenKind::Str(out)),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(other) => out.push(other),
                    None => {}
                },
                Some(c) => out.push(c),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_arithmetic_tokens() {
        assert_eq!(
            kinds("42 + 8.5 * x"),
            vec![
                TokenKind::Int(42),
                TokenKind::Plus,
                TokenKind::Float(8.5),
                TokenKind::Star,
                TokenKind::Ident("x".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_two_char_operators() {
        assert_eq!(
            kinds("a ** b ?? c != d"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Power,
                TokenKind::Ident("b".into()),
                TokenKind::QuestionQuestion,
                TokenKind::Ident("c".into()),
                TokenKind::NotEq,
                TokenKind::Ident("d".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_word_operators() {
        assert_eq!(
            kinds("not a and b or nil"),
            vec![
                TokenKind::Bang,
                TokenKind::Ident("a".into()),
                TokenKind::AndAnd,
                TokenKind::Ident("b".into()),
                TokenKind::OrOr,
                TokenKind::Null,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_member_access_is_not_a_float() {
        assert_eq!(
            kinds("a.b"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Dot,
                TokenKind::Ident("b".into()),
                TokenKind::Eof,
            ]
        );
        assert_eq!(kinds("1e3"), vec![TokenKind::Float(1000.0), TokenKind::Eof]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b" 'c'"#),
            vec![
                TokenKind::Str("a\"b".into()),
                TokenKind::Str("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strict_mode_rejects_garbage() {
        assert_eq!(
            tokenize("a # b").unwrap_err(),
            CompileError::UnexpectedChar { ch: '#', offset: 2 }
        );
        assert_eq!(
            tokenize("\"open").unwrap_err(),
            CompileError::UnterminatedString { offset: 0 }
        );
        assert!(matches!(
            tokenize("a = b").unwrap_err(),
            CompileError::UnexpectedChar { ch: '=', .. }
        ));
    }

    #[test]
    fn test_lenient_mode_skips_garbage() {
        let kinds: Vec<TokenKind> = tokenize_lenient("a # $ b \"open")
            .into_iter()
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Ident("b".into()),
                TokenKind::Str("open".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_integer_overflow_literal_is_invalid() {
        assert!(matches!(
            tokenize("99999999999999999999").unwrap_err(),
            CompileError::InvalidNumber { .. }
        ));
    }
}
