//! Common error types

use thiserror::Error;

/// Errors raised while loading service configuration
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias using common Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_names_the_problem() {
        let err = Error::Config("token_endpoint must start with http:// or https://".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: token_endpoint must start with http:// or https://"
        );
    }

    #[test]
    fn toml_errors_convert() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("[oauth\nclient_id =");
        let err: Error = parse.unwrap_err().into();
        assert!(
            err.to_string().starts_with("TOML parse error:"),
            "got: {err}"
        );
    }

    #[test]
    fn io_errors_convert() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        let debug = format!("{err:?}");
        assert!(debug.contains("Io"), "got: {debug}");
    }
}
