//! # SQL Lexer
//!
//! A hand-written, single-pass scanner. Whitespace and comments (`--` to
//! end of line, `/* ... */`) are skipped; everything else becomes one
//! token carrying its zero-based `(line, char)` start position.
//!
//! Quoting follows the dialect's split: single quotes delimit string
//! literals, double quotes delimit identifiers. String escapes cover
//! `\'`, `\"`, `\\`, `\n`, `\r`, `\t`; an unknown escape produces the
//! `BadEscape` diagnostic token and an unterminated literal produces
//! `BadString`, so the parser can report a position instead of the lexer
//! guessing a recovery.

use super::token::{lookup_keyword, Pos, Token};

pub struct Lexer {
    input: Vec<char>,
    offset: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Lexer {
        Lexer { input: input.chars().collect(), offset: 0, line: 0, col: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.offset).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.input.get(self.offset + ahead).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(c)
    }

    fn pos(&self) -> Pos {
        Pos { line: self.line, char: self.col }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('-') if self.peek_at(1) == Some('-') => {
                    while let Some(c) = self.advance() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.advance() {
                            Some('*') if self.peek() == Some('/') => {
                                self.advance();
                                break;
                            }
                            Some(_) => {}
                            None => break,
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn scan_ident(&mut self, first: char) -> String {
        let mut ident = String::new();
        ident.push(first);
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        ident
    }

    fn scan_number(&mut self, first: char) -> Token {
        let mut text = String::new();
        text.push(first);
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '.' && !is_float && self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) {
                is_float = true;
                text.push(c);
                self.advance();
            } else if (c == 'e' || c == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|d| d.is_ascii_digit() || d == '+' || d == '-')
            {
                is_float = true;
                text.push(c);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.peek() {
                    text.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Token::Integer(i);
            }
        }
        match text.parse::<f64>() {
            Ok(f) => Token::Number(f),
            Err(_) => Token::BadString,
        }
    }

    fn scan_string(&mut self, quote: char) -> Token {
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Token::BadString,
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('\'') => text.push('\''),
                    Some('"') => text.push('"'),
                    Some('\\') => text.push('\\'),
                    Some('n') => text.push('\n'),
                    Some('r') => text.push('\r'),
                    Some('t') => text.push('\t'),
                    _ => return Token::BadEscape,
                },
                Some(c) => text.push(c),
            }
        }
        if quote == '"' {
            Token::Ident(text)
        } else {
            Token::Str(text)
        }
    }

    /// Scans the next token, returning it with its start position.
    pub fn next_token(&mut self) -> (Token, Pos) {
        self.skip_trivia();
        let pos = self.pos();
        let Some(c) = self.advance() else {
            return (Token::Eof, pos);
        };

        let token = match c {
            c if c.is_ascii_alphabetic() || c == '_' => {
                let ident = self.scan_ident(c);
                lookup_keyword(&ident).unwrap_or(Token::Ident(ident))
            }
            c if c.is_ascii_digit() => self.scan_number(c),
            '\'' | '"' => self.scan_string(c),
            '$' => match self.peek() {
                Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                    let first = self.advance().expect("peeked");
                    Token::NamedParam(self.scan_ident(first))
                }
                _ => Token::Illegal('$'),
            },
            '?' => Token::PositionalParam,
            '+' => Token::Add,
            '-' => Token::Sub,
            '*' => Token::Mul,
            '/' => Token::Div,
            '%' => Token::Mod,
            '&' => Token::BitAnd,
            '^' => Token::BitXor,
            '|' => {
                if self.peek() == Some('|') {
                    self.advance();
                    Token::Concat
                } else {
                    Token::BitOr
                }
            }
            '=' => {
                if self.peek() == Some('~') {
                    self.advance();
                    Token::RegexEq
                } else {
                    Token::Eq
                }
            }
            '!' => match self.peek() {
                Some('=') => {
                    self.advance();
                    Token::Neq
                }
                Some('~') => {
                    self.advance();
                    Token::RegexNeq
                }
                _ => Token::Illegal('!'),
            },
            '<' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Lte
                } else {
                    Token::Lt
                }
            }
            '>' => {
                if self.peek() == Some('=') {
                    self.advance();
                    Token::Gte
                } else {
                    Token::Gt
                }
            }
            '(' => Token::Lparen,
            ')' => Token::Rparen,
            '{' => Token::Lbrace,
            '}' => Token::Rbrace,
            '[' => Token::Lbracket,
            ']' => Token::Rbracket,
            ',' => Token::Comma,
            ':' => Token::Colon,
            ';' => Token::Semicolon,
            '.' => Token::Dot,
            other => Token::Illegal(other),
        };
        (token, pos)
    }
}
