//! Tokenizer for the plotting subset of Python.
//!
//! Only flat scripts are accepted: an indented statement is rejected here,
//! which rules out every block construct before parsing starts.

use ragchart_core::{AppError, AppResult};

/// Deepest bracket nesting, and longest operator or call chain, accepted.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Num(f64),
    Str(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

fn reject(line: usize, msg: impl std::fmt::Display) -> AppError {
    AppError::Sandbox(format!("line {}: {}", line, msg))
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    depth: usize,
    at_line_start: bool,
    tokens: Vec<Token>,
}

/// Split `source` into tokens, ending with a newline and [`Tok::Eof`].
pub fn tokenize(source: &str) -> AppResult<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().peekable(),
        line: 1,
        depth: 0,
        at_line_start: true,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl<'a> Lexer<'a> {
    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn end_statement(&mut self) {
        let last_is_break = matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline)
        );
        if !last_is_break {
            self.push(Tok::Newline);
        }
    }

    fn run(&mut self) -> AppResult<()> {
        while let Some(&c) = self.chars.peek() {
            if self.at_line_start {
                self.at_line_start = false;
                if self.depth == 0 && (c == ' ' || c == '\t') {
                    self.check_indent()?;
                    continue;
                }
            }

            match c {
                '\n' => {
                    self.chars.next();
                    if self.depth == 0 {
                        self.end_statement();
                    }
                    self.line += 1;
                    self.at_line_start = true;
                }
                ' ' | '\t' | '\r' => {
                    self.chars.next();
                }
                '#' => {
                    while self.chars.peek().is_some_and(|c| *c != '\n') {
                        self.chars.next();
                    }
                }
                '\\' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'\r') {
                        self.chars.next();
                    }
                    if self.chars.next() != Some('\n') {
                        return Err(reject(self.line, "unexpected '\\'"));
                    }
                    self.line += 1;
                }
                ';' => {
                    self.chars.next();
                    if self.depth > 0 {
                        return Err(reject(self.line, "unexpected ';'"));
                    }
                    self.end_statement();
                }
                '\'' | '"' => {
                    let s = self.string()?;
                    self.push(Tok::Str(s));
                }
                '0'..='9' => {
                    let n = self.number()?;
                    self.push(Tok::Num(n));
                }
                '.' => {
                    self.chars.next();
                    if self.chars.peek().is_some_and(|c| c.is_ascii_digit()) {
                        let n = self.number_from(String::from("0."))?;
                        self.push(Tok::Num(n));
                    } else {
                        self.push(Tok::Dot);
                    }
                }
                c if c.is_alphabetic() || c == '_' => self.name()?,
                _ => self.punct(c)?,
            }
        }

        if self.depth > 0 {
            return Err(reject(self.line, "unclosed bracket"));
        }
        self.end_statement();
        self.push(Tok::Eof);
        Ok(())
    }

    fn check_indent(&mut self) -> AppResult<()> {
        while self.chars.peek().is_some_and(|c| *c == ' ' || *c == '\t') {
            self.chars.next();
        }
        match self.chars.peek() {
            None | Some('\n') | Some('\r') | Some('#') => Ok(()),
            Some(_) => Err(reject(self.line, "indented blocks are not allowed")),
        }
    }

    fn punct(&mut self, c: char) -> AppResult<()> {
        self.chars.next();
        let next = self.chars.peek().copied();

        let tok = match c {
            '(' => Tok::LParen,
            '[' => Tok::LBracket,
            '{' => Tok::LBrace,
            ')' => Tok::RParen,
            ']' => Tok::RBracket,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            ':' => Tok::Colon,
            '=' if next == Some('=') => return Err(reject(self.line, "comparisons are not allowed")),
            '=' => Tok::Assign,
            '+' | '-' | '*' | '/' | '%' if next == Some('=') => {
                return Err(reject(self.line, "augmented assignment is not allowed"))
            }
            '*' if next == Some('*') => return Err(reject(self.line, "'**' is not allowed")),
            '/' if next == Some('/') => return Err(reject(self.line, "'//' is not allowed")),
            '+' => Tok::Plus,
            '-' => Tok::Minus,
            '*' => Tok::Star,
            '/' => Tok::Slash,
            '%' => Tok::Percent,
            other => return Err(reject(self.line, format!("unexpected character '{}'", other))),
        };

        match tok {
            Tok::LParen | Tok::LBracket | Tok::LBrace => {
                self.depth += 1;
                if self.depth > MAX_NESTING {
                    return Err(reject(self.line, "brackets nested too deeply"));
                }
            }
            Tok::RParen | Tok::RBracket | Tok::RBrace => {
                self.depth = self
                    .depth
                    .checked_sub(1)
                    .ok_or_else(|| reject(self.line, "unbalanced bracket"))?;
            }
            _ => {}
        }
        self.push(tok);
        Ok(())
    }

    fn name(&mut self) -> AppResult<()> {
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                ident.push(c);
                self.chars.next();
            } else {
                break;
            }
        }

        // String prefixes: f and r are read as plain text, bytes are refused.
        if matches!(self.chars.peek(), Some('\'') | Some('"')) {
            match ident.to_lowercase().as_str() {
                "f" | "r" | "rf" | "fr" | "u" => {
                    let s = self.string()?;
                    self.push(Tok::Str(s));
                    return Ok(());
                }
                "b" | "rb" | "br" => {
                    return Err(reject(self.line, "byte strings are not allowed"))
                }
                _ => {}
            }
        }

        if ident.contains("__") {
            return Err(reject(
                self.line,
                format!("dunder name '{}' is not allowed", ident),
            ));
        }

        self.push(Tok::Name(ident));
        Ok(())
    }

    fn string(&mut self) -> AppResult<String> {
        let quote = self.chars.next().unwrap_or('"');
        let start_line = self.line;

        let triple = {
            let mut ahead = self.chars.clone();
            ahead.next() == Some(quote) && ahead.next() == Some(quote)
        };
        if triple {
            self.chars.next();
            self.chars.next();
        }

        let mut out = String::new();
        loop {
            let c = self
                .chars
                .next()
                .ok_or_else(|| reject(start_line, "unterminated string"))?;
            match c {
                '\\' => match self.chars.next() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\n') => self.line += 1,
                    Some(other) => out.push(other),
                    None => return Err(reject(start_line, "unterminated string")),
                },
                '\n' if !triple => return Err(reject(start_line, "unterminated string")),
                '\n' => {
                    self.line += 1;
                    out.push('\n');
                }
                c if c == quote => {
                    if !triple {
                        return Ok(out);
                    }
                    let mut ahead = self.chars.clone();
                    if ahead.next() == Some(quote) && ahead.next() == Some(quote) {
                        self.chars.next();
                        self.chars.next();
                        return Ok(out);
                    }
                    out.push(c);
                }
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> AppResult<f64> {
        self.number_from(String::new())
    }

    fn number_from(&mut self, mut text: String) -> AppResult<f64> {
        let mut seen_exp = false;
        while let Some(&c) = self.chars.peek() {
            match c {
                '0'..='9' | '.' => text.push(c),
                '_' => {}
                'e' | 'E' if !seen_exp => {
                    seen_exp = true;
                    text.push(c);
                    self.chars.next();
                    if let Some(&sign) = self.chars.peek() {
                        if sign == '+' || sign == '-' {
                            text.push(sign);
                            self.chars.next();
                        }
                    }
                    continue;
                }
                _ => break,
            }
            self.chars.next();
        }

        if self.chars.peek().is_some_and(|c| c.is_alphabetic()) {
            return Err(reject(self.line, format!("malformed number '{}'", text)));
        }

        text.parse::<f64>()
            .map_err(|_| reject(self.line, format!("malformed number '{}'", text)))
    }
}
