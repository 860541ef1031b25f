//! Token endpoint client
//!
//! Two grants go to the same endpoint: `authorization_code` when a callback
//! completes, and `refresh_token` when a stored credential goes stale. The
//! `TokenExchanger` trait is the seam the flow and the store call through,
//! so tests can count exchanges without a network.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{EXCHANGE_TIMEOUT, TOKEN_ENDPOINT};
use crate::error::{Error, Result};

/// Body of a successful token endpoint response.
///
/// Google omits `refresh_token` on refresh responses, and on code exchanges
/// when the user had already granted offline access without `prompt=consent`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

/// Registered OAuth client. Any field may be unset until configured.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: Option<String>,
}

impl ClientCredentials {
    /// Borrow all three values, or name the first one missing.
    pub fn require(&self) -> Result<(&str, &str, &str)> {
        let client_id = present(self.client_id.as_deref(), "client_id")?;
        let secret = present(
            self.client_secret.as_ref().map(|s| s.expose().as_str()),
            "client_secret",
        )?;
        let redirect_uri = present(self.redirect_uri.as_deref(), "redirect_uri")?;
        Ok((client_id, secret, redirect_uri))
    }
}

fn present<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("{name} is not set"))),
    }
}

/// Boxed future returned by `TokenExchanger` methods.
pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;

/// Calls the token endpoint.
///
/// Uses `Pin<Box<dyn Future>>` returns so the trait is dyn-compatible and the
/// store can hold an `Arc<dyn TokenExchanger>`.
pub trait TokenExchanger: Send + Sync {
    /// `grant_type=authorization_code`
    fn exchange_code<'a>(&'a self, code: &'a str) -> ExchangeFuture<'a>;

    /// `grant_type=refresh_token`
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a>;
}

/// `TokenExchanger` backed by reqwest.
pub struct HttpTokenExchanger {
    http: reqwest::Client,
    token_endpoint: String,
    credentials: ClientCredentials,
    timeout: Duration,
}

impl HttpTokenExchanger {
    pub fn new(credentials: ClientCredentials) -> Result<Self> {
        Self::with_endpoint(credentials, TOKEN_ENDPOINT.to_string(), EXCHANGE_TIMEOUT)
    }

    pub fn with_endpoint(
        credentials: ClientCredentials,
        token_endpoint: String,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("building token client: {e}")))?;
        Ok(Self {
            http,
            token_endpoint,
            credentials,
            timeout,
        })
    }

    async fn post(&self, grant: &'static str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        debug!(grant, endpoint = %self.token_endpoint, "calling token endpoint");
        let response = self
            .http
            .post(&self.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| self.transport_error(grant, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(Error::ExchangeFailure(format!(
                "{grant} grant returned {status}: {body}"
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| self.transport_error(grant, e))
    }

    fn transport_error(&self, grant: &str, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::ExchangeTimeout(self.timeout)
        } else if e.is_decode() {
            Error::ExchangeFailure(format!("invalid {grant} response: {e}"))
        } else {
            Error::ExchangeFailure(format!("{grant} request failed: {e}"))
        }
    }
}

impl TokenExchanger for HttpTokenExchanger {
    fn exchange_code<'a>(&'a self, code: &'a str) -> ExchangeFuture<'a> {
        Box::pin(async move {
            let (client_id, secret, redirect_uri) = self.credentials.require()?;
            self.post(
                "authorization_code",
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_id", client_id),
                    ("client_secret", secret),
                    ("redirect_uri", redirect_uri),
                ],
            )
            .await
        })
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a> {
        Box::pin(async move {
            let (client_id, secret, _) = self.credentials.require()?;
            self.post(
                "refresh_token",
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", client_id),
                    ("client_secret", secret),
                ],
            )
            .await
        })
    }
}

impl std::fmt::Debug for HttpTokenExchanger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTokenExchanger")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.credentials.client_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn credentials() -> ClientCredentials {
        ClientCredentials {
            client_id: Some("client-123".into()),
            client_secret: Some(Secret::from("shh")),
            redirect_uri: Some("http://localhost:8000/oauth2callback".into()),
        }
    }

    fn exchanger(server: &MockServer, timeout: Duration) -> HttpTokenExchanger {
        HttpTokenExchanger::with_endpoint(credentials(), format!("{}/token", server.uri()), timeout)
            .unwrap()
    }

    #[test]
    fn token_response_tolerates_missing_optionals() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token":"A"}"#).unwrap();
        assert_eq!(token.access_token, "A");
        assert!(token.refresh_token.is_none());
        assert!(token.expires_in.is_none());
    }

    #[test]
    fn token_response_reads_google_shape() {
        let json = r#"{"access_token":"ya29.a","expires_in":3599,"refresh_token":"1//r",
            "scope":"https://www.googleapis.com/auth/drive.readonly","token_type":"Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("1//r"));
        assert_eq!(token.expires_in, Some(3599));
        assert_eq!(token.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn require_names_missing_field() {
        let mut creds = credentials();
        creds.client_secret = None;
        let err = creds.require().unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("client_secret")));

        let blank = ClientCredentials {
            client_id: Some("  ".into()),
            ..credentials()
        };
        assert!(matches!(blank.require(), Err(Error::Config(_))));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let ex = HttpTokenExchanger::new(credentials()).unwrap();
        let debug = format!("{ex:?}");
        assert!(!debug.contains("shh"));
        assert!(debug.contains("client-123"));
    }

    #[tokio::test]
    async fn exchange_code_posts_authorization_code_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=abc"))
            .and(body_string_contains("client_secret=shh"))
            .and(body_string_contains("redirect_uri="))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "A",
                "refresh_token": "R",
                "expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let token = exchanger(&server, Duration::from_secs(5))
            .exchange_code("abc")
            .await
            .unwrap();
        assert_eq!(token.access_token, "A");
        assert_eq!(token.refresh_token.as_deref(), Some("R"));
    }

    #[tokio::test]
    async fn refresh_posts_refresh_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=R"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "A2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let token = exchanger(&server, Duration::from_secs(5))
            .refresh("R")
            .await
            .unwrap();
        assert_eq!(token.access_token, "A2");
        assert!(token.refresh_token.is_none());
    }

    #[tokio::test]
    async fn non_success_status_is_exchange_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
            .mount(&server)
            .await;

        let err = exchanger(&server, Duration::from_secs(5))
            .exchange_code("bad")
            .await
            .unwrap_err();
        match err {
            Error::ExchangeFailure(msg) => assert!(msg.contains("invalid_grant"), "{msg}"),
            other => panic!("expected ExchangeFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_exchange_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = exchanger(&server, Duration::from_secs(5))
            .exchange_code("abc")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExchangeFailure(_)), "{err:?}");
    }

    #[tokio::test]
    async fn slow_endpoint_is_exchange_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = exchanger(&server, Duration::from_millis(100))
            .exchange_code("abc")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExchangeTimeout(_)), "{err:?}");
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let ex = HttpTokenExchanger::with_endpoint(
            ClientCredentials::default(),
            format!("{}/token", server.uri()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert!(matches!(ex.exchange_code("abc").await, Err(Error::Config(_))));
    }
}
