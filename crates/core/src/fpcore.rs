//! Scanning of FPCore text produced by the engine.
//!
//! Only the header is interpreted: the argument list (for arity) and the
//! `:name` / `:description` properties. The body is checked for balance and
//! otherwise kept verbatim as the expression text.

use crate::expr::Expr;
use crate::key::{ExprKey, KeySpace};
use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected end of FPCore text")]
    UnexpectedEnd,
    #[error("expected {expected}, found `{found}`")]
    Unexpected {
        expected: &'static str,
        found: String,
    },
    #[error("trailing input after FPCore: `{0}`")]
    Trailing(String),
    #[error("invalid numeral `{0}`")]
    InvalidNumeral(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Symbol(String),
    String(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::LParen => "(".to_string(),
            Token::RParen => ")".to_string(),
            Token::Symbol(s) => s.clone(),
            Token::String(s) => format!("\"{s}\""),
        }
    }
}

struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            match c {
                '(' | '[' => {
                    self.chars.next();
                    return Some(Token::LParen);
                }
                ')' | ']' => {
                    self.chars.next();
                    return Some(Token::RParen);
                }
                ';' => {
                    while let Some(&x) = self.chars.peek() {
                        if x == '\n' {
                            break;
                        }
                        self.chars.next();
                    }
                }
                '"' => {
                    self.chars.next();
                    let mut s = String::new();
                    while let Some(x) = self.chars.next() {
                        match x {
                            '"' => return Some(Token::String(s)),
                            '\\' => match self.chars.next() {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(other) => s.push(other),
                                None => break,
                            },
                            _ => s.push(x),
                        }
                    }
                    return Some(Token::String(s));
                }
                _ => {
                    let mut s = String::new();
                    while let Some(&x) = self.chars.peek() {
                        if x.is_whitespace() || matches!(x, '(' | ')' | '[' | ']' | ';' | '"') {
                            break;
                        }
                        s.push(x);
                        self.chars.next();
                    }
                    return Some(Token::Symbol(s));
                }
            }
        }
        None
    }
}

struct Scanner<'a> {
    lexer: Lexer<'a>,
    undo: Option<Token>,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            undo: None,
        }
    }

    fn peek(&mut self) -> Option<&Token> {
        if self.undo.is_none() {
            self.undo = self.lexer.next_token();
        }
        self.undo.as_ref()
    }

    fn consume(&mut self) -> Result<Token, ParseError> {
        match self.undo.take() {
            Some(token) => Ok(token),
            None => self.lexer.next_token().ok_or(ParseError::UnexpectedEnd),
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ParseError> {
        let token = self.consume()?;
        if token == expected {
            Ok(())
        } else {
            Err(ParseError::Unexpected {
                expected: what,
                found: token.describe(),
            })
        }
    }

    /// Skips one datum: an atom or a balanced list.
    fn skip_datum(&mut self) -> Result<(), ParseError> {
        match self.consume()? {
            Token::LParen => {
                let mut depth = 1usize;
                while depth > 0 {
                    match self.consume()? {
                        Token::LParen => depth += 1,
                        Token::RParen => depth -= 1,
                        _ => {}
                    }
                }
                Ok(())
            }
            Token::RParen => Err(ParseError::Unexpected {
                expected: "datum",
                found: ")".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Parses one FPCore, deriving arity, name and description from its header.
///
/// The key lives in the [`KeySpace::Parsed`] namespace and is derived from
/// the `:name` property, or from the whole text when the core is unnamed.
pub fn parse_core(text: &str) -> Result<Expr, ParseError> {
    let text = text.trim();
    let mut scanner = Scanner::new(text);

    scanner.expect(Token::LParen, "(")?;
    match scanner.consume()? {
        Token::Symbol(head) if head == "FPCore" => {}
        other => {
            return Err(ParseError::Unexpected {
                expected: "FPCore",
                found: other.describe(),
            })
        }
    }

    // FPCore 2.0 allows an identifier before the argument list.
    if let Some(Token::Symbol(_)) = scanner.peek() {
        scanner.consume()?;
    }

    scanner.expect(Token::LParen, "argument list")?;
    let mut argc = 0;
    loop {
        match scanner.peek() {
            Some(Token::RParen) => {
                scanner.consume()?;
                break;
            }
            Some(_) => {
                scanner.skip_datum()?;
                argc += 1;
            }
            None => return Err(ParseError::UnexpectedEnd),
        }
    }

    let mut name = None;
    let mut descr = None;
    loop {
        let prop = match scanner.peek() {
            Some(Token::Symbol(prop)) if prop.starts_with(':') => prop.clone(),
            _ => break,
        };
        scanner.consume()?;
        let value = match scanner.peek() {
            Some(Token::String(_)) | Some(Token::Symbol(_)) => match scanner.consume()? {
                Token::String(s) | Token::Symbol(s) => Some(s),
                _ => None,
            },
            _ => {
                scanner.skip_datum()?;
                None
            }
        };
        match prop.as_str() {
            ":name" => name = value,
            ":description" => descr = value,
            _ => {}
        }
    }

    scanner.skip_datum()?;
    scanner.expect(Token::RParen, ")")?;
    if let Some(token) = scanner.peek() {
        return Err(ParseError::Trailing(token.describe()));
    }

    let key = ExprKey::new(KeySpace::Parsed, name.as_deref().unwrap_or(text));
    Ok(Expr::new(key, name, argc, text).with_descr(descr))
}
