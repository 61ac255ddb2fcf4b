//! Top level error type: every failure surfaced to an embedding program is
//! one of these families.

use thiserror::Error;

use crate::cd::ParserError;
use crate::class::FormatError;
use crate::jvm::RuntimeError;
use crate::verifier::VerificationError;

#[derive(Debug, Error)]
pub enum Error {
    /// The class file failed a structural check.
    #[error("class file format error: {0}")]
    Format(#[from] FormatError),
    /// A verifier rule was violated.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// The loader could not locate the class.
    #[error("class {0} was not found")]
    ClassNotFound(String),
    /// A conflicting (name, loader) registration was detected.
    #[error("class {0} already loaded")]
    Linkage(String),
    /// The interpreter hit an unrecoverable condition.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    /// A textual class description failed to parse.
    #[error("class description error: {0}")]
    ClassDescription(#[from] ParserError),
}
