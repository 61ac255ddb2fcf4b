// Ensure each result error is either handled or returned
#![deny(unused_must_use)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod cd;
pub mod class;
pub mod error;
pub mod instruction;
pub mod jvm;
pub mod types;
pub mod verifier;

pub use error::Error;
