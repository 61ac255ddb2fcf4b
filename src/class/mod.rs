//! Typed in-memory class representation and the binary class-file decoder.

use std::io;

use thiserror::Error;

use crate::class::constant::PoolError;
use crate::instruction::BytecodeError;
use crate::types::ParsingError;

pub mod constant;

mod attribute;
mod class_file;
mod version;

pub use attribute::CodeAttribute;
pub use class_file::{AccessFlags, Class, Field, Method};
pub use version::ClassVersion;

/// Structural class file errors.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Magic word in a wrong format")]
    BadMagic,
    #[error("Unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("Unsupported constant pool tag {0}")]
    UnsupportedTag(u8),
    #[error("Unexpected string byte in constant {0}")]
    BadUtf8Byte(u16),
    #[error("Unicode is not fully supported in constant {0}")]
    UnsupportedUnicode(u16),
    #[error("Interface inheritance is not supported")]
    InterfacesUnsupported,
    #[error("Access flags can not be parsed")]
    BadAccessFlags,
    #[error("Couldn't find method code attribute")]
    MissingCode,
    #[error("Unrecognized stack map frame type {0}")]
    UnknownStackMapFrame(u8),
    #[error("Unrecognized verification type tag {0}")]
    UnknownVerificationType(u8),
    #[error("Unexpected end of class file: {0}")]
    Truncated(#[from] io::Error),
    #[error("Constant pool error: {0}")]
    Pool(#[from] PoolError),
    #[error("Unable to parse method bytecode: {0}")]
    Bytecode(#[from] BytecodeError),
    #[error("Bad descriptor: {0}")]
    Descriptor(#[from] ParsingError),
}
