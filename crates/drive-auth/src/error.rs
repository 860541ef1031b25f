//! Error types for the authorization flow
//!
//! StateGuard and CredentialStore never produce these for expected
//! conditions (unknown state, absent credential); they surface only at the
//! AuthorizationFlow boundary and from the token endpoint client.

use std::time::Duration;

/// Errors from OAuth authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Client id, client secret or redirect URI is not configured.
    #[error("OAuth configuration missing: {0}")]
    Config(String),

    /// The authorization server reported an error, or the callback carried no code.
    #[error("authorization callback rejected: {0}")]
    Callback(String),

    /// State parameter missing, unknown, replayed or expired.
    #[error("state parameter is missing, unknown or expired")]
    Csrf,

    #[error("token endpoint did not respond within {0:?}")]
    ExchangeTimeout(Duration),

    #[error("token exchange failed: {0}")]
    ExchangeFailure(String),
}

impl Error {
    /// HTTP status the callback collaborator should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Config(_) => 500,
            Error::Callback(_) | Error::Csrf => 400,
            Error::ExchangeTimeout(_) => 504,
            Error::ExchangeFailure(_) => 500,
        }
    }

    /// Stable machine-readable label for response bodies and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "configuration_error",
            Error::Callback(_) => "callback_error",
            Error::Csrf => "csrf_error",
            Error::ExchangeTimeout(_) => "exchange_timeout",
            Error::ExchangeFailure(_) => "exchange_failure",
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
