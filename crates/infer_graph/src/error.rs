//! Error types for the triple substrate.

use thiserror::Error;

/// A specialized `Result` type for graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can occur while reading or writing a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The triple contains a term that may not be stored (a variable or a wildcard).
    #[error("invalid triple: {0}")]
    InvalidTriple(String),

    /// The SPO/POS/OSP indexes disagree with each other.
    #[error("index error: {0}")]
    Index(String),
}
