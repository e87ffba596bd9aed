//! Error types for crowdq.

use thiserror::Error;

use crate::marketplace::MarketplaceError;

/// Boxed error returned by dispatcher handlers.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// An event was fired while the record was not in one of its source states.
    #[error("no transition found: {machine} cannot handle `{event}` in state `{state}`")]
    NoTransitionFound {
        machine: &'static str,
        event: String,
        state: String,
    },

    /// Progress was evaluated before the remote task exists.
    #[error("state error: {0}")]
    State(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("marketplace error: {0}")]
    Marketplace(#[from] MarketplaceError),

    /// A compare-and-set write lost against a concurrent writer.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("assignment {event} handler failed: {source}")]
    Hook {
        event: String,
        #[source]
        source: HookError,
    },

    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a queued task that failed with this error should be redelivered.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Conflict(_) | Error::Storage(_) | Error::Io(_) | Error::Other(_) => true,
            Error::Marketplace(e) => e.is_transient(),
            Error::NoTransitionFound { .. }
            | Error::State(_)
            | Error::NotFound(_)
            | Error::Hook { .. }
            | Error::InvalidJob(_)
            | Error::Config(_)
            | Error::Serde(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
