//! Google OAuth constants
//!
//! Endpoints and lifetimes for the Google authorization server. The client id,
//! client secret and redirect URI are deployment-specific and come from
//! configuration; only the public endpoints and fixed windows live here.

use std::time::Duration;

/// Google's consent page for the authorization-code grant
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Read-only Drive scopes requested on every authorization.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive.metadata.readonly",
    "https://www.googleapis.com/auth/drive.readonly",
];

/// Owner identity used when none is configured
pub const DEFAULT_OWNER: &str = "owner@example.com";

/// Lifetime of an anti-forgery state token.
pub const STATE_TTL: Duration = Duration::from_secs(600);

/// Age after which a stored credential is refreshed before use.
/// Google access tokens live 60 minutes; this leaves a 10 minute margin.
pub const REFRESH_THRESHOLD: Duration = Duration::from_secs(50 * 60);

/// Upper bound on a single call to the token endpoint.
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);
