//! Parser for the class description language, a textual representation of
//! class files used primarily by tests. It produces `Class` values holding
//! the same invariants as the binary decoder.

use std::io::Read;

use thiserror::Error;

use crate::class::constant::PoolError;
use crate::class::{Class, FormatError};

mod lexer;
mod parser;

pub use lexer::{Lexer, LexerError, Token};

#[derive(Debug, Error)]
pub enum ParserError {
    #[error(transparent)]
    Lexer(#[from] LexerError),
    #[error("{0}")]
    Unexpected(String),
    #[error("Undefined label {0}")]
    UndefinedLabel(String),
    #[error("Unable to parse method bytecode for {0}")]
    UnknownInstruction(String),
    #[error("constant pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("malformed class: {0}")]
    Class(#[from] FormatError),
}

/// Parse a class description from a string.
pub fn parse_from_string(input: &str) -> Result<Class, ParserError> {
    let mut lexer = Lexer::tokenize(input)?;
    parser::parse_class(&mut lexer)
}

/// Parse a class description from a reader, consuming it to completion.
pub fn parse_from_reader(input: &mut dyn Read) -> Result<Class, ParserError> {
    let mut text = String::new();
    input
        .read_to_string(&mut text)
        .map_err(|e| ParserError::Unexpected(format!("Unreadable input: {}", e)))?;
    parse_from_string(&text)
}
