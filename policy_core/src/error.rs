//! Error types for the policy engine.
//!
//! Only startup problems (bad configuration, unreadable catalog) are hard
//! failures. Per-turn problems degrade to fallback behavior and are logged.

use dialogue_state::{ConversationId, StateError};
use std::path::PathBuf;
use thiserror::Error;

/// The action catalog could not be loaded.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML catalog: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported catalog format: {0}")]
    UnsupportedFormat(String),

    /// Every entry was malformed, or the file had none.
    #[error("catalog contains no valid actions ({skipped} skipped)")]
    Empty { skipped: usize },
}

/// The tuning configuration could not be loaded or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// An external capability (semantic matching, text generation) did not deliver.
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("{0} is unavailable")]
    Unavailable(String),

    #[error("{capability} failed: {reason}")]
    Failed { capability: String, reason: String },
}

/// Errors surfaced by the engine and session APIs.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Another turn for the same conversation is still running.
    #[error("conversation {0} already has a turn in progress")]
    TurnInProgress(ConversationId),

    /// A previous turn panicked while holding the conversation.
    #[error("conversation {0} is poisoned by an earlier panic")]
    Poisoned(ConversationId),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("failed to serialize turn context: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
