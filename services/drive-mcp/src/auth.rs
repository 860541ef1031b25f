//! OAuth redirect and callback endpoints
//!
//! - GET /auth            returns the Google consent URL with a fresh state token
//! - GET /oauth2callback  validates the callback, exchanges the code, stores the credential

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{Instrument, info, info_span};

use crate::app::AppState;
use crate::error::{auth_error_response, request_id};
use crate::metrics;

/// GET /auth: start the authorization-code flow.
pub async fn start_auth(State(state): State<AppState>) -> Response {
    let request_id = request_id();
    let span = info_span!("start_auth", request_id = %request_id);

    async move {
        match state.flow().begin_redirect().await {
            Ok(url) => (
                StatusCode::OK,
                [(axum::http::header::CONTENT_TYPE, "application/json")],
                serde_json::json!({ "auth_url": url.as_str() }).to_string(),
            )
                .into_response(),
            Err(e) => {
                tracing::error!(error = %e, "cannot build authorization redirect");
                auth_error_response(&e, &request_id)
            }
        }
    }
    .instrument(span)
    .await
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /oauth2callback: complete the flow.
pub async fn oauth_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let request_id = request_id();
    let span = info_span!("oauth_callback", request_id = %request_id);

    async move {
        let result = state
            .flow()
            .complete_callback(
                query.code.as_deref(),
                query.state.as_deref(),
                query.error.as_deref(),
            )
            .await;

        match result {
            Ok(authorized) => {
                metrics::record_callback("connected");
                info!(owner = %authorized.owner, "callback completed");
                (
                    StatusCode::OK,
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    serde_json::json!({
                        "status": "connected",
                        "owner": authorized.owner,
                    })
                    .to_string(),
                )
                    .into_response()
            }
            Err(e) => {
                metrics::record_callback(e.kind());
                auth_error_response(&e, &request_id)
            }
        }
    }
    .instrument(span)
    .await
}
