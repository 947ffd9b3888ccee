//! Errors raised when reading or mutating conversation state.

use thiserror::Error;

/// Errors from knowledge-state field access and map conversion.
#[derive(Debug, Error)]
pub enum StateError {
    /// The dotted path does not name a known section or field.
    #[error("unknown knowledge field: {0}")]
    UnknownField(String),

    /// An update carried a value the field cannot hold.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// A flat map could not be rebuilt into a knowledge state.
    #[error("malformed knowledge map: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StateError>;
