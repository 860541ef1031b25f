//! Authorization-code flow orchestration
//!
//! 1. `begin_redirect` issues a state token and builds the consent URL.
//! 2. The owner approves on Google's page, which redirects to our callback.
//! 3. `complete_callback` checks the callback parameters, consumes the state
//!    token, exchanges the code and stores the resulting credential.
//!
//! Nothing partial is retained when step 3 fails; the owner starts over.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use url::Url;

use crate::constants::{AUTHORIZE_ENDPOINT, DEFAULT_OWNER, DEFAULT_SCOPES, EXCHANGE_TIMEOUT};
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::state::StateGuard;
use crate::token::{ClientCredentials, TokenExchanger};

/// Static inputs to the flow.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub client: ClientCredentials,
    pub scopes: Vec<String>,
    pub authorize_endpoint: String,
    pub owner: String,
    pub exchange_timeout: Duration,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            client: ClientCredentials::default(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            authorize_endpoint: AUTHORIZE_ENDPOINT.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            exchange_timeout: EXCHANGE_TIMEOUT,
        }
    }
}

/// Where the owner is in the authorization lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    NoCredential,
    AwaitingCallback,
    Authorized,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::NoCredential => "no_credential",
            FlowState::AwaitingCallback => "awaiting_callback",
            FlowState::Authorized => "authorized",
        }
    }
}

/// Outcome of a completed callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    pub owner: String,
}

/// Ties the state guard, the token endpoint and the credential store together.
pub struct AuthorizationFlow {
    settings: FlowSettings,
    guard: Arc<StateGuard>,
    store: Arc<CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
}

impl AuthorizationFlow {
    pub fn new(
        settings: FlowSettings,
        guard: Arc<StateGuard>,
        store: Arc<CredentialStore>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Self {
        Self {
            settings,
            guard,
            store,
            exchanger,
        }
    }

    pub fn owner(&self) -> &str {
        &self.settings.owner
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Consent URL carrying a freshly issued state token.
    pub async fn begin_redirect(&self) -> Result<Url> {
        let (client_id, _, redirect_uri) = self.settings.client.require()?;
        let scope = self.settings.scopes.join(" ");

        let state = self.guard.issue().await;
        let url = Url::parse_with_params(
            &self.settings.authorize_endpoint,
            &[
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| Error::Config(format!("invalid authorize endpoint: {e}")))?;

        info!(owner = %self.settings.owner, "issued authorization redirect");
        Ok(url)
    }

    /// Validate the callback, exchange the code and store the credential.
    ///
    /// Checks run in a fixed order: an authorization-server `error` wins over
    /// everything and leaves the state guard untouched; a missing code comes
    /// next; then the state token is consumed. The token endpoint is only
    /// contacted after the state verifies.
    pub async fn complete_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        error: Option<&str>,
    ) -> Result<Authorized> {
        if let Some(reason) = error {
            warn!(reason, "authorization server returned an error");
            return Err(Error::Callback(reason.to_string()));
        }

        let code = match code {
            Some(c) if !c.is_empty() => c,
            _ => {
                warn!("callback missing authorization code");
                return Err(Error::Callback("missing authorization code".into()));
            }
        };

        if !self.guard.verify(state.unwrap_or_default()).await {
            warn!("callback state failed verification");
            return Err(Error::Csrf);
        }

        let timeout = self.settings.exchange_timeout;
        let response = tokio::time::timeout(timeout, self.exchanger.exchange_code(code))
            .await
            .map_err(|_| Error::ExchangeTimeout(timeout))?
            .inspect_err(|e| warn!(error = %e, "authorization code exchange failed"))?;

        self.store.store(&self.settings.owner, response).await;
        info!(owner = %self.settings.owner, "owner account connected");

        Ok(Authorized {
            owner: self.settings.owner.clone(),
        })
    }

    /// Current lifecycle state, derived from the store and the guard.
    pub async fn state(&self) -> FlowState {
        if self.store.contains(&self.settings.owner).await {
            FlowState::Authorized
        } else if self.guard.pending().await > 0 {
            FlowState::AwaitingCallback
        } else {
            FlowState::NoCredential
        }
    }
}

impl std::fmt::Debug for AuthorizationFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationFlow")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
