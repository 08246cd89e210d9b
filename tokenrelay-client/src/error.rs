//! Error types for the tokenrelay client.
//!
//! Failures are classified once, at the transport boundary, into an
//! [`HttpError`] with a closed [`ErrorKind`]. Everything downstream
//! (classifier, coordinator, callers) matches on the kind instead of probing
//! response fields.

use std::fmt;
use std::time::Duration;

use tokenrelay_core::StoreError;

/// What went wrong with a single HTTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server answered 401.
    Unauthorized,
    /// The server answered with any other non-success status.
    Status,
    /// The request never produced a response (connect, timeout, I/O).
    Network,
    /// A response arrived but its body did not have the expected shape.
    Validation,
    /// The request could not be built (bad path, body encoding). No request
    /// was sent, so there is no request context to recover.
    InvalidRequest,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unauthorized => "unauthorized",
            Self::Status => "http status",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::InvalidRequest => "invalid request",
        };
        f.write_str(label)
    }
}

/// Typed failure produced by a [`Transport`](crate::transport::Transport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} error: {message}")]
pub struct HttpError {
    pub kind: ErrorKind,
    /// Response status, when a response was received.
    pub status: Option<u16>,
    /// Response body as text, when a response was received.
    pub body: Option<String>,
    pub message: String,
}

impl HttpError {
    /// Build an error from a non-success response.
    ///
    /// 401 maps to [`ErrorKind::Unauthorized`], everything else to
    /// [`ErrorKind::Status`].
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let kind = if status == 401 {
            ErrorKind::Unauthorized
        } else {
            ErrorKind::Status
        };
        Self {
            kind,
            status: Some(status),
            body: Some(body.into()),
            message: format!("server returned {}", status),
        }
    }

    pub fn unauthorized(body: impl Into<String>) -> Self {
        Self::from_status(401, body)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Network,
            status: None,
            body: None,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            status: None,
            body: None,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::InvalidRequest,
            status: None,
            body: None,
            message: message.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind == ErrorKind::Unauthorized
    }
}

/// Why a credential renewal did not produce a new access token.
///
/// Cloned once per waiter, so every variant is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenewalError {
    /// No refresh credential is stored.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The signed-in user's identifier is unknown.
    #[error("no user id available for renewal")]
    MissingUserId,

    /// The renewal call itself failed.
    #[error("renewal request failed: {0}")]
    Transport(HttpError),

    /// The renewal endpoint answered without a usable token pair.
    #[error("invalid renewal response: {message}")]
    InvalidResponse { message: String },

    /// Reading or writing the credential store failed.
    #[error("credential store error: {message}")]
    Store { message: String },

    /// The renewal call exceeded the configured bound.
    #[error("renewal timed out after {0:?}")]
    Timeout(Duration),

    /// The session was logged out while the renewal was outstanding.
    #[error("session was reset during renewal")]
    SessionReset,

    /// The renewing request was dropped before it settled.
    #[error("renewal abandoned before completion")]
    Abandoned,
}

impl RenewalError {
    /// Whether this failure means the session cannot continue and must be
    /// torn down.
    ///
    /// `SessionReset` and `Abandoned` do not: the former already happened,
    /// the latter says nothing about the credentials.
    pub fn ends_session(&self) -> bool {
        !matches!(self, Self::SessionReset | Self::Abandoned)
    }
}

impl From<StoreError> for RenewalError {
    fn from(err: StoreError) -> Self {
        Self::Store {
            message: err.to_string(),
        }
    }
}

/// Errors surfaced to callers of [`ApiClient`](crate::ApiClient).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request failed and was not recoverable, or its single replay failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Credential renewal failed; the request was not replayed.
    #[error("credential renewal failed: {0}")]
    Renewal(#[from] RenewalError),

    /// Credential storage error outside of renewal.
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),

    /// A body could not be encoded to or decoded from JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// True if the caller's session was ended by this failure and the user
    /// must sign in again.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Self::Renewal(e) if e.ends_session())
    }

    /// The HTTP error, if this failure came straight from the transport.
    pub fn http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(e) => Some(e),
            Self::Renewal(RenewalError::Transport(e)) => Some(e),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
