//! Error types shared by the backend client, auth layer and import tracker.

use thiserror::Error;

use crate::model::JobStatus;

/// Failures of the identity-provider layer.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The OAuth flow or token refresh failed.
    #[error("oauth error: {0}")]
    OAuth(#[from] yup_oauth2::Error),
    /// Token storage or authenticator setup hit an I/O error.
    #[error("auth io error: {0}")]
    Io(#[from] std::io::Error),
    /// The provider answered without an access token.
    #[error("no access token")]
    NoToken,
    /// `initialize` was called on a session that is already live.
    #[error("{0} session already initialized")]
    AlreadyInitialized(&'static str),
    /// Provider settings are incomplete or unusable.
    #[error("auth misconfigured: {0}")]
    Misconfigured(String),
}

/// Failures talking to the backend REST API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP status {status} error: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// A 2xx response whose body is missing something the flow depends on.
    #[error("unexpected response: {0}")]
    Malformed(String),
}

/// Errors surfaced by the import tracker.
#[derive(Debug, Error)]
pub enum ImportError {
    /// The creation request failed; nothing was tracked.
    #[error("import submission failed: {0}")]
    Submission(#[source] ApiError),
    /// A status query kept failing after the retry budget was spent.
    #[error("status query for import {import_id} failed: {source}")]
    PollTransport {
        import_id: String,
        #[source]
        source: ApiError,
    },
    #[error("import {0} is not tracked")]
    NotTracked(String),
    #[error("import {0} is still being polled")]
    AlreadyPolling(String),
    /// The backend handed out an id that is already tracked.
    #[error("import id {0} is already tracked")]
    Duplicate(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Rejected state changes on the job model.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid job transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}
