//! Error types for every layer of the gateway.
//!
//! Remote failures abort whatever sequence is in flight. Local store
//! failures are only ever logged by the orchestrator, because by the time
//! they happen the upstream side effect has already been committed.

use thiserror::Error;

use crate::upstream::Envelope;

/// The upstream session could not be established. Fatal at startup.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("login request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("login returned status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("login response is not valid JSON: {source} (body: {body})")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("login response is missing `{0}`")]
    MissingField(&'static str),
}

/// A call against the upstream control API failed.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(String),
    #[error("upstream response is not valid JSON: {reason} (body: {body})")]
    Decode { reason: String, body: String },
    /// The upstream answered with status >= 400. The parsed envelope, if
    /// any, is kept so callers can inspect partial data.
    #[error("upstream request failed with status {status}: {message}")]
    Status {
        status: u16,
        message: String,
        envelope: Option<Envelope>,
    },
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        UpstreamError::Transport(err.to_string())
    }
}

impl UpstreamError {
    /// The envelope returned alongside a failure status, if it parsed.
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            UpstreamError::Status { envelope, .. } => envelope.as_ref(),
            _ => None,
        }
    }
}

/// Deriving a new container identity failed.
#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("failed to query next free id: {0}")]
    Upstream(#[from] UpstreamError),
    #[error("next free id is not an integer: {0}")]
    InvalidNextId(String),
    #[error("id {0} does not fit in the last address octet (expected 1-254)")]
    IdOutOfRange(u32),
}

/// The local state mirror could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("unknown container status `{0}`")]
    InvalidStatus(String),
}

/// Caller-visible failure of a lifecycle operation.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("failed to allocate container identity: {0}")]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("container {0} not found")]
    NotFound(u32),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("failed to read local state: {0}")]
    Store(#[from] StoreError),
}
