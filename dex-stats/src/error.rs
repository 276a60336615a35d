use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated while fetching upstream data in `dex-stats`.
///
/// `Clone` is required so a single in-flight failure can be handed to every
/// caller awaiting the same [`Deduplicator`](crate::cache::Deduplicator) key.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: String },

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("response from {url} is missing data")]
    MissingData { url: String },

    #[error("service error: {message}")]
    Service { message: String },

    #[error("arithmetic overflow computing {context}")]
    Overflow { context: String },
}

impl FetchError {
    /// Construct a [`FetchError::Api`] from a non-zero envelope `code`, falling back to a
    /// generic message when the upstream did not provide one.
    pub fn api(code: i64, message: Option<String>) -> Self {
        Self::Api {
            code,
            message: message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| "unknown API error".to_string()),
        }
    }

    /// Determine if the failure happened before any response body was interpreted.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_transport(&self) -> bool {
        match self {
            FetchError::Transport { .. } | FetchError::Status { .. } => true,
            _ => false,
        }
    }
}
