//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The config file is
//! optional; a missing file yields defaults. The client secret comes only
//! from `GOOGLE_CLIENT_SECRET` and is never read from the TOML.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use drive_auth::constants::{
    AUTHORIZE_ENDPOINT, DEFAULT_OWNER, DEFAULT_SCOPES, EXCHANGE_TIMEOUT, REFRESH_THRESHOLD,
    TOKEN_ENDPOINT,
};
use drive_auth::{ClientCredentials, FlowSettings};
use serde::Deserialize;
use tracing::info;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub oauth: OAuthConfig,
    pub drive: DriveConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

/// Google OAuth client and credential lifecycle settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: Option<String>,
    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub owner_email: String,
    pub exchange_timeout_secs: u64,
    pub refresh_threshold_secs: u64,
}

/// Downstream Drive API settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub api_base_url: String,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_connections: 1000,
        }
    }
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.into(),
            token_endpoint: TOKEN_ENDPOINT.into(),
            owner_email: DEFAULT_OWNER.into(),
            exchange_timeout_secs: EXCHANGE_TIMEOUT.as_secs(),
            refresh_threshold_secs: REFRESH_THRESHOLD.as_secs(),
        }
    }
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base_url: drive_api::client::DEFAULT_API_BASE.into(),
            timeout_secs: drive_api::client::DEFAULT_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            info!(path = %path.display(), "loaded config file");
            config
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Config::default()
        };

        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Some(id) = env_nonempty("GOOGLE_CLIENT_ID") {
            self.oauth.client_id = Some(id);
        }
        if let Some(secret) = env_nonempty("GOOGLE_CLIENT_SECRET") {
            self.oauth.client_secret = Some(Secret::new(secret));
        }
        if let Some(uri) = env_nonempty("GOOGLE_REDIRECT_URI") {
            self.oauth.redirect_uri = Some(uri);
        }
        if let Some(owner) = env_nonempty("OWNER_EMAIL") {
            self.oauth.owner_email = owner;
        }
        if let Some(addr) = env_nonempty("LISTEN_ADDR") {
            self.server.listen_addr = addr.parse().map_err(|e| {
                common::Error::Config(format!("LISTEN_ADDR is not a socket address ({addr}): {e}"))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        for (name, value) in [
            ("oauth.authorize_endpoint", &self.oauth.authorize_endpoint),
            ("oauth.token_endpoint", &self.oauth.token_endpoint),
            ("drive.api_base_url", &self.drive.api_base_url),
        ] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {value}"
                )));
            }
        }

        if self.oauth.exchange_timeout_secs == 0 {
            return Err(common::Error::Config(
                "oauth.exchange_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.drive.timeout_secs == 0 {
            return Err(common::Error::Config(
                "drive.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.oauth.owner_email.trim().is_empty() {
            return Err(common::Error::Config("oauth.owner_email must not be empty".into()));
        }

        Ok(())
    }

    /// Whether client id, secret and redirect URI are all present.
    pub fn oauth_configured(&self) -> bool {
        self.client_credentials().require().is_ok()
    }

    pub fn client_credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.oauth.client_id.clone(),
            client_secret: self.oauth.client_secret.clone(),
            redirect_uri: self.oauth.redirect_uri.clone(),
        }
    }

    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            client: self.client_credentials(),
            scopes: self.oauth.scopes.clone(),
            authorize_endpoint: self.oauth.authorize_endpoint.clone(),
            owner: self.oauth.owner_email.clone(),
            exchange_timeout: self.exchange_timeout(),
        }
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.oauth.exchange_timeout_secs)
    }

    pub fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.oauth.refresh_threshold_secs)
    }

    pub fn drive_timeout(&self) -> Duration {
        Duration::from_secs(self.drive.timeout_secs)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("drive-mcp.toml")
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
