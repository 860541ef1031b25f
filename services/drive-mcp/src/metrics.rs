//! Prometheus metrics exposition
//!
//! - `oauth_token_exchanges_total` (counter): labels `grant`, `outcome`
//! - `oauth_callbacks_total` (counter): label `outcome`
//! - `mcp_tool_calls_total` (counter): labels `tool`, `outcome`
//! - `mcp_tool_duration_seconds` (histogram): label `tool`

use std::sync::Arc;
use std::time::Duration;

use drive_auth::{ExchangeFuture, TokenExchanger, TokenResponse};
use tokio::time::Instant;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const TOOL_DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

fn builder() -> PrometheusBuilder {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("mcp_tool_duration_seconds".to_string()),
            TOOL_DURATION_BUCKETS,
        )
        .expect("failed to set histogram buckets")
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Tool durations render as a histogram with buckets from 10ms to 30s, the
/// upper bound matching the default Drive request timeout.
pub fn install_recorder() -> PrometheusHandle {
    builder()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one call to the token endpoint.
pub fn record_token_exchange(grant: &'static str, outcome: &str) {
    metrics::counter!("oauth_token_exchanges_total", "grant" => grant, "outcome" => outcome.to_string())
        .increment(1);
}

/// Record how an OAuth callback ended (`connected` or an error type).
pub fn record_callback(outcome: &str) {
    metrics::counter!("oauth_callbacks_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a completed MCP tool call.
pub fn record_tool_call(tool: &str, outcome: &'static str, duration_secs: f64) {
    metrics::counter!("mcp_tool_calls_total", "tool" => tool.to_string(), "outcome" => outcome)
        .increment(1);
    metrics::histogram!("mcp_tool_duration_seconds", "tool" => tool.to_string())
        .record(duration_secs);
}

/// `TokenExchanger` that counts calls by grant and outcome.
///
/// Wraps the HTTP exchanger so refreshes triggered inside the credential
/// store are counted alongside callback code exchanges. The flow and the
/// store drop the exchange future when their own timeout fires, so the
/// wrapper applies the same timeout with a deadline fixed at call time and
/// counts `exchange_timeout` itself before the outer deadline is reached.
pub struct MeteredExchanger {
    inner: Arc<dyn TokenExchanger>,
    timeout: Duration,
}

impl MeteredExchanger {
    pub fn new(inner: Arc<dyn TokenExchanger>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl TokenExchanger for MeteredExchanger {
    fn exchange_code<'a>(&'a self, code: &'a str) -> ExchangeFuture<'a> {
        let deadline = Instant::now() + self.timeout;
        Box::pin(metered(
            "authorization_code",
            deadline,
            self.timeout,
            self.inner.exchange_code(code),
        ))
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a> {
        let deadline = Instant::now() + self.timeout;
        Box::pin(metered(
            "refresh_token",
            deadline,
            self.timeout,
            self.inner.refresh(refresh_token),
        ))
    }
}

async fn metered(
    grant: &'static str,
    deadline: Instant,
    timeout: Duration,
    exchange: ExchangeFuture<'_>,
) -> drive_auth::Result<TokenResponse> {
    let result = tokio::time::timeout_at(deadline, exchange)
        .await
        .unwrap_or_else(|_| Err(drive_auth::Error::ExchangeTimeout(timeout)));
    record_token_exchange(grant, outcome(&result));
    result
}

fn outcome<T>(result: &drive_auth::Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    }
}
