//! Error types for the change-detection pipelines.
//!
//! Upstream failures are split into "the entity does not exist"
//! ([`FetchError::NotFound`]) and everything that is worth retrying on the
//! next tick. Persistence failures are wrapped in [`ArchiveError`]. A tick
//! reports either one through [`PipelineError`].

use sea_orm::DbErr;

/// Failure of a single upstream game-API call.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The requested clan, player or war does not exist upstream (HTTP 404).
    #[error("not found upstream: {0}")]
    NotFound(String),

    /// The request did not complete within the configured timeout.
    #[error("upstream request timed out: {0}")]
    Timeout(String),

    /// Upstream throttled us and retries were exhausted.
    #[error("rate limited by upstream; retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds the upstream asked us to wait.
        retry_after_secs: u64,
    },

    /// The API token is invalid or the caller IP is not whitelisted (HTTP 403).
    #[error("upstream rejected the API token (HTTP 403)")]
    Forbidden,

    /// Network error, 5xx response or any other unexpected status.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The response body did not match the expected shape.
    #[error("malformed upstream payload: {0}")]
    Decode(String),

    /// The pipeline was asked to stop while the request was in flight.
    #[error("fetch cancelled by shutdown")]
    Cancelled,
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }

    /// Failures that a later tick can reasonably expect to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_) | FetchError::RateLimited { .. } | FetchError::Transient(_)
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transient(e.to_string())
        }
    }
}

/// Failure of the persistence gateway.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("database error: {0}")]
    Database(#[from] DbErr),

    /// A stored building snapshot could not be decoded back into a map.
    #[error("corrupt building snapshot for {player_tag}: {source}")]
    CorruptSnapshot {
        player_tag: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to hand an event to the outbound transport.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Error that abandons a whole pipeline tick and triggers the failure backoff.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

impl PipelineError {
    /// The tick was cut short by shutdown and has no outcome of its own.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Fetch(FetchError::Cancelled))
    }
}

/// Invalid or missing configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
