#![forbid(unsafe_code)]
#![doc = "Common types and error codes for the Tern TLS implementation."]

pub mod error;

pub use error::*;
