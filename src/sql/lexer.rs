//! # SQL Lexer
//!
//! Single-pass tokenizer for the engine's SQL dialect. Keywords resolve
//! through a compile-time perfect hash map (`phf`), so keyword lookup is
//! one hash and one comparison regardless of keyword count. Identifiers
//! are case-preserved; keywords are case-insensitive.
//!
//! The lexer tracks line and column so parse errors can point at the
//! offending token.

use eyre::{bail, Result};
use phf::phf_map;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    Select,
    Insert,
    Update,
    Delete,
    From,
    Where,
    Group,
    By,
    Having,
    Set,
    Values,
    Into,
    Begin,
    Commit,
    Rollback,
    Create,
    Drop,
    Table,
    Explain,
    Count,
    Sum,
    Avg,
    Max,
    Min,
    And,
    Or,
    Not,
    Null,
    Primary,
    Key,
    Order,
    Asc,
    Desc,
    Limit,
    Offset,
    Join,
    On,
    True,
    False,
    As,
}

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "SELECT" => Keyword::Select,
    "INSERT" => Keyword::Insert,
    "UPDATE" => Keyword::Update,
    "DELETE" => Keyword::Delete,
    "FROM" => Keyword::From,
    "WHERE" => Keyword::Where,
    "GROUP" => Keyword::Group,
    "BY" => Keyword::By,
    "HAVING" => Keyword::Having,
    "SET" => Keyword::Set,
    "VALUES" => Keyword::Values,
    "INTO" => Keyword::Into,
    "BEGIN" => Keyword::Begin,
    "COMMIT" => Keyword::Commit,
    "ROLLBACK" => Keyword::Rollback,
    "CREATE" => Keyword::Create,
    "DROP" => Keyword::Drop,
    "TABLE" => Keyword::Table,
    "EXPLAIN" => Keyword::Explain,
    "COUNT" => Keyword::Count,
    "SUM" => Keyword::Sum,
    "AVG" => Keyword::Avg,
    "MAX" => Keyword::Max,
    "MIN" => Keyword::Min,
    "AND" => Keyword::And,
    "OR" => Keyword::Or,
    "NOT" => Keyword::Not,
    "NULL" => Keyword::Null,
    "PRIMARY" => Keyword::Primary,
    "KEY" => Keyword::Key,
    "ORDER" => Keyword::Order,
    "ASC" => Keyword::Asc,
    "DESC" => Keyword::Desc,
    "LIMIT" => Keyword::Limit,
    "OFFSET" => Keyword::Offset,
    "JOIN" => Keyword::Join,
    "ON" => Keyword::On,
    "TRUE" => Keyword::True,
    "FALSE" => Keyword::False,
    "AS" => Keyword::As,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Keyword(Keyword),
    Ident(String),
    Integer(i64),
    Float(f64),
    Str(String),
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    Comma,
    Semicolon,
    LParen,
    RParen,
    Star,
    Dot,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Keyword(kw) => write!(f, "{:?}", kw),
            Token::Ident(name) => write!(f, "identifier '{}'", name),
            Token::Integer(v) => write!(f, "{}", v),
            Token::Float(v) => write!(f, "{}", v),
            Token::Str(s) => write!(f, "'{}'", s),
            Token::Eq => f.write_str("="),
            Token::Neq => f.write_str("!="),
            Token::Lt => f.write_str("<"),
            Token::Gt => f.write_str(">"),
            Token::Le => f.write_str("<="),
            Token::Ge => f.write_str(">="),
            Token::Comma => f.write_str(","),
            Token::Semicolon => f.write_str(";"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
            Token::Star => f.write_str("*"),
            Token::Dot => f.write_str("."),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

/// Token plus the 1-based source position it started at.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: u32,
    pub column: u32,
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Tokenizes the whole input, ending with `Token::Eof`.
    pub fn tokenize(mut self) -> Result<Vec<SpannedToken>> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.bump();
                }
                Some(b'-') if self.peek_at(1) == Some(b'-') => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<SpannedToken> {
        self.skip_whitespace_and_comments();
        let line = self.line;
        let column = self.column;

        let spanned = |token| SpannedToken {
            token,
            line,
            column,
        };

        let byte = match self.peek() {
            Some(b) => b,
            None => return Ok(spanned(Token::Eof)),
        };

        let token = match byte {
            b',' => {
                self.bump();
                Token::Comma
            }
            b';' => {
                self.bump();
                Token::Semicolon
            }
            b'(' => {
                self.bump();
                Token::LParen
            }
            b')' => {
                self.bump();
                Token::RParen
            }
            b'*' => {
                self.bump();
                Token::Star
            }
            b'.' => {
                self.bump();
                Token::Dot
            }
            b'=' => {
                self.bump();
                Token::Eq
            }
            b'!' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Neq
                } else {
                    bail!("unexpected '!' at line {}, column {}", line, column);
                }
            }
            b'<' => {
                self.bump();
                match self.peek() {
                    Some(b'=') => {
                        self.bump();
                        Token::Le
                    }
                    Some(b'>') => {
                        self.bump();
                        Token::Neq
                    }
                    _ => Token::Lt,
                }
            }
            b'>' => {
                self.bump();
                if self.peek() == Some(b'=') {
                    self.bump();
                    Token::Ge
                } else {
                    Token::Gt
                }
            }
            b'\'' => self.lex_string(line, column)?,
            b'0'..=b'9' => self.lex_number(line, column)?,
            b'-' => self.lex_number(line, column)?,
            b if b.is_ascii_alphabetic() || b == b'_' => self.lex_word(),
            other => bail!(
                "unexpected character '{}' at line {}, column {}",
                other as char,
                line,
                column
            ),
        };

        Ok(spanned(token))
    }

    fn lex_string(&mut self, line: u32, column: u32) -> Result<Token> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                // '' escapes a single quote inside the literal
                Some(b'\'') if self.peek() == Some(b'\'') => {
                    self.bump();
                    text.push('\'');
                }
                Some(b'\'') => return Ok(Token::Str(text)),
                Some(b) => text.push(b as char),
                None => bail!(
                    "unterminated string literal starting at line {}, column {}",
                    line,
                    column
                ),
            }
        }
    }

    fn lex_number(&mut self, line: u32, column: u32) -> Result<Token> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.bump();
        }
        let mut is_float = false;
        while let Some(b) = self.peek() {
            match b {
                b'0'..=b'9' => {
                    self.bump();
                }
                b'.' if !is_float && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => {
                    is_float = true;
                    self.bump();
                }
                _ => break,
            }
        }

        let text = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|e| eyre::eyre!("non-UTF-8 numeric literal: {}", e))?;
        if is_float {
            let value: f64 = text.parse().map_err(|e| {
                eyre::eyre!("bad float '{}' at line {}, column {}: {}", text, line, column, e)
            })?;
            Ok(Token::Float(value))
        } else {
            let value: i64 = text.parse().map_err(|e| {
                eyre::eyre!("bad integer '{}' at line {}, column {}: {}", text, line, column, e)
            })?;
            Ok(Token::Integer(value))
        }
    }

    fn lex_word(&mut self) -> Token {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.input[start..self.pos]).unwrap_or("");
        match KEYWORDS.get(word.to_ascii_uppercase().as_str()) {
            Some(&keyword) => Token::Keyword(keyword),
            None => Token::Ident(word.to_string()),
        }
    }
}
