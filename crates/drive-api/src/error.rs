//! Error types for Drive API calls

/// Errors from the Drive facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No credential is stored for the owner; nothing was sent downstream.
    #[error("no Google account connected")]
    NotAuthorized,

    /// Drive answered with a non-success status.
    #[error("Drive API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Connection, TLS or timeout failure talking to Drive.
    #[error("Drive request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Drive answered 2xx with a body we could not read.
    #[error("invalid Drive response: {0}")]
    Parse(String),

    /// The configured base URL cannot carry a file path.
    #[error("invalid Drive base URL: {0}")]
    Config(String),
}

/// Result alias for Drive operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_names_status() {
        let err = Error::Api {
            status: 404,
            message: "File not found: abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("404"));
        assert!(msg.contains("File not found"));
    }

    #[test]
    fn not_authorized_message_is_stable() {
        assert_eq!(Error::NotAuthorized.to_string(), "no Google account connected");
    }
}
