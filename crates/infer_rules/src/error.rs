//! Error types for the inference engine.

use thiserror::Error;

/// A specialized `Result` type for inference operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines the errors that can occur while compiling rules or running inference.
///
/// Configuration errors (`Config`, `InvalidRule`, `UnknownBuiltin`,
/// `ArityMismatch`, `UnsafeBuiltin`) are reported while a rule set is
/// compiled. `Invariant` means the derived state can no longer be trusted;
/// the inference graph that raised it is closed afterwards.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The reasoner configuration or rule set combination is not usable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rule was defined incorrectly.
    #[error("Invalid rule {rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    /// A rule head or a backward rule refers to a builtin that is not registered.
    #[error("Unknown builtin {name} in rule {rule}")]
    UnknownBuiltin { name: String, rule: String },

    /// A builtin was called with the wrong number of arguments.
    #[error("Builtin {builtin} expects {expected} arguments, found {found}")]
    ArityMismatch {
        builtin: String,
        expected: usize,
        found: usize,
    },

    /// A builtin with side effects is used where only speculative evaluation happens.
    #[error("Builtin {name} has side effects and cannot run in backward rule {rule}")]
    UnsafeBuiltin { name: String, rule: String },

    /// Backward evaluation went deeper than the configured limit.
    #[error("Max inference depth exceeded: {depth}")]
    MaxDepthExceeded { depth: usize },

    /// Token memory or derivation bookkeeping is inconsistent.
    #[error("Internal invariant violated: {0}")]
    Invariant(String),

    /// The inference graph was closed, either explicitly or after an invariant violation.
    #[error("Inference graph is closed")]
    Closed,

    /// An error originating from the underlying graph.
    #[error("Graph error: {0}")]
    Graph(#[from] infer_graph::Error),

    /// An error occurred during data serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Returns `true` for errors that leave the engine unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Invariant(_) | Error::Closed)
    }
}
