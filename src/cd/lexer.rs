//! Hand rolled lexer for the class description language.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexerError {
    #[error("Unexpected character {0:?} at line {1}")]
    UnexpectedChar(char, usize),
    #[error("Unterminated string at line {0}")]
    UnterminatedString(usize),
}

const KEYWORDS: &[&str] = &["class", "constant_pool", "fields", "method", "bytecode", "auto"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    LBrace,
    RBrace,
    Comma,
    Colon,
    Sharp,
    At,
    Str(String),
    Num(u32),
    Keyword(String),
    Id(String),
}

/// Token stream with single-token lookahead.
#[derive(Debug)]
pub struct Lexer {
    tokens: Vec<Token>,
    position: usize,
}

impl Lexer {
    pub fn tokenize(input: &str) -> Result<Self, LexerError> {
        let mut tokens = Vec::new();
        let mut chars = input.chars().peekable();
        let mut line = 1;

        while let Some(&c) = chars.peek() {
            match c {
                '\n' => {
                    line += 1;
                    chars.next();
                }
                _ if c.is_whitespace() => {
                    chars.next();
                }
                '/' => {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        // Comment runs to the end of the line
                        while let Some(&c) = chars.peek() {
                            if c == '\n' {
                                break;
                            }
                            chars.next();
                        }
                    } else {
                        return Err(LexerError::UnexpectedChar('/', line));
                    }
                }
                '{' => {
                    tokens.push(Token::LBrace);
                    chars.next();
                }
                '}' => {
                    tokens.push(Token::RBrace);
                    chars.next();
                }
                ',' => {
                    tokens.push(Token::Comma);
                    chars.next();
                }
                ':' => {
                    tokens.push(Token::Colon);
                    chars.next();
                }
                '#' => {
                    tokens.push(Token::Sharp);
                    chars.next();
                }
                '@' => {
                    tokens.push(Token::At);
                    chars.next();
                }
                '"' => {
                    chars.next();
                    let mut value = String::new();
                    loop {
                        match chars.next() {
                            Some('"') => break,
                            Some('\n') | None => {
                                return Err(LexerError::UnterminatedString(line))
                            }
                            Some(c) => value.push(c),
                        }
                    }
                    tokens.push(Token::Str(value));
                }
                _ if c.is_ascii_digit() => {
                    let mut value: u32 = 0;
                    while let Some(&c) = chars.peek() {
                        match c.to_digit(10) {
                            Some(digit) => {
                                value = value * 10 + digit;
                                chars.next();
                            }
                            None => break,
                        }
                    }
                    tokens.push(Token::Num(value));
                }
                _ if c.is_ascii_alphabetic() || c == '_' => {
                    let mut word = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_ascii_alphanumeric() || c == '_' {
                            word.push(c);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    if KEYWORDS.contains(&word.as_str()) {
                        tokens.push(Token::Keyword(word));
                    } else {
                        tokens.push(Token::Id(word));
                    }
                }
                other => return Err(LexerError::UnexpectedChar(other, line)),
            }
        }

        Ok(Lexer {
            tokens,
            position: 0,
        })
    }

    pub fn has_next(&self) -> bool {
        self.position < self.tokens.len()
    }

    pub fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    pub fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Consume the next token if it is exactly `token`.
    pub fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            return true;
        }
        false
    }

    pub fn is_next(&self, token: &Token) -> bool {
        self.peek() == Some(token)
    }

    pub fn is_next_num(&self) -> bool {
        matches!(self.peek(), Some(Token::Num(_)))
    }

    pub fn is_next_id(&self) -> bool {
        matches!(self.peek(), Some(Token::Id(_)))
    }

    pub fn is_next_str(&self) -> bool {
        matches!(self.peek(), Some(Token::Str(_)))
    }

    pub fn is_next_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Keyword(k)) if k == keyword)
    }

    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_next_keyword(keyword) {
            self.position += 1;
            return true;
        }
        false
    }
}
