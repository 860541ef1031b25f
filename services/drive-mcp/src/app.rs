//! Application state, router and the small informational handlers

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use drive_api::DriveClient;
use drive_auth::{
    AuthorizationFlow, Clock, CredentialStore, HttpTokenExchanger, OsEntropy, StateGuard,
    SystemClock, TokenExchanger,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::warn;

use crate::config::Config;
use crate::metrics::MeteredExchanger;
use crate::tools::{self, McpTool, ToolContext};

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: ToolContext,
    pub tools: Arc<Vec<Box<dyn McpTool>>>,
    pub prometheus: PrometheusHandle,
}

impl AppState {
    pub fn flow(&self) -> &AuthorizationFlow {
        &self.ctx.flow
    }

    /// Whether a credential is stored for the owner.
    pub async fn authenticated(&self) -> bool {
        self.ctx.flow.store().contains(self.ctx.flow.owner()).await
    }
}

/// Wire the credential lifecycle, the Drive facade and the tool registry from config.
pub fn build_state(config: &Config, prometheus: PrometheusHandle) -> Result<AppState> {
    if !config.oauth_configured() {
        warn!("GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET or GOOGLE_REDIRECT_URI missing; /auth will fail until configured");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let http_exchanger = HttpTokenExchanger::with_endpoint(
        config.client_credentials(),
        config.oauth.token_endpoint.clone(),
        config.exchange_timeout(),
    )
    .context("failed to build token endpoint client")?;
    let exchanger: Arc<dyn TokenExchanger> =
        Arc::new(MeteredExchanger::new(
            Arc::new(http_exchanger),
            config.exchange_timeout(),
        ));

    let store = Arc::new(
        CredentialStore::new(exchanger.clone(), clock.clone())
            .with_refresh_threshold(config.refresh_threshold())
            .with_exchange_timeout(config.exchange_timeout()),
    );
    let guard = Arc::new(StateGuard::new(clock, Arc::new(OsEntropy)));
    let flow = Arc::new(AuthorizationFlow::new(
        config.flow_settings(),
        guard,
        store.clone(),
        exchanger,
    ));

    let drive = Arc::new(
        DriveClient::with_base_url(
            store,
            config.oauth.owner_email.clone(),
            &config.drive.api_base_url,
            config.drive_timeout(),
        )
        .context("failed to build Drive client")?,
    );

    Ok(AppState {
        ctx: ToolContext { flow, drive },
        tools: Arc::new(tools::register_all_tools()),
        prometheus,
    })
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
pub fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/auth", get(crate::auth::start_auth))
        .route("/oauth2callback", get(crate::auth::oauth_callback))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/mcp", post(crate::mcp::handle_mcp))
        .route("/mcp/", post(crate::mcp::handle_mcp))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

fn json_ok(body: serde_json::Value) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Service index listing endpoints.
async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    json_ok(serde_json::json!({
        "service": "Google Drive MCP Server",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "auth": "/auth - Start OAuth flow",
            "callback": "/oauth2callback - OAuth callback",
            "health": "/health - Health check",
            "metrics": "/metrics - Prometheus metrics",
            "mcp": "/mcp - MCP protocol endpoint (POST only)"
        },
        "authenticated": state.authenticated().await,
    }))
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    json_ok(serde_json::json!({
        "status": "ok",
        "authenticated": state.authenticated().await,
        "owner": state.flow().owner(),
    }))
}

/// Prometheus metrics endpoint, text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, Response};
    use drive_auth::TokenResponse;
    use tower::ServiceExt;

    pub const OWNER: &str = "owner@example.com";

    /// PrometheusHandle without installing a global recorder.
    pub fn test_prometheus_handle() -> PrometheusHandle {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle()
    }

    /// Fully configured client pointing at mock token and Drive servers.
    pub fn test_config(token_base: &str, drive_base: &str) -> Config {
        let mut config = Config::default();
        config.oauth.client_id = Some("client-123.apps.googleusercontent.com".into());
        config.oauth.client_secret = Some(common::Secret::from("shh"));
        config.oauth.redirect_uri = Some("http://localhost:8000/oauth2callback".into());
        config.oauth.token_endpoint = format!("{token_base}/token");
        config.oauth.exchange_timeout_secs = 2;
        config.drive.api_base_url = drive_base.to_string();
        config.drive.timeout_secs = 5;
        config
    }

    pub fn test_app(config: &Config) -> (AppState, Router) {
        let state = build_state(config, test_prometheus_handle()).unwrap();
        let router = build_router(state.clone(), 1000);
        (state, router)
    }

    pub async fn authorize(state: &AppState) {
        state
            .flow()
            .store()
            .store(
                OWNER,
                TokenResponse {
                    access_token: "ya29.token".into(),
                    refresh_token: Some("1//refresh".into()),
                    expires_in: Some(3599),
                    scope: None,
                    token_type: Some("Bearer".into()),
                },
            )
            .await;
    }

    pub async fn get(router: &Router, uri: &str) -> Response<Body> {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}
