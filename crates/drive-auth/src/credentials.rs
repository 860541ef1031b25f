//! Owner credential storage with refresh-on-read
//!
//! Holds one `CredentialRecord` per identity in memory. `resolve` is the read
//! path for downstream callers: it hands back the stored record, refreshing it
//! first when it is older than the refresh threshold. A refresh that fails for
//! any reason leaves the stale record in place and returns it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::constants::{EXCHANGE_TIMEOUT, REFRESH_THRESHOLD};
use crate::error::{Error, Result};
use crate::token::{TokenExchanger, TokenResponse};

/// Tokens for one identity plus the time they were stored.
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub access: Secret<String>,
    pub refresh: Option<Secret<String>>,
    /// Unix milliseconds from the store's clock
    pub stored_at: u64,
    /// As reported by the token endpoint; informational only
    pub expires_in: Option<u64>,
}

impl CredentialRecord {
    fn from_response(response: TokenResponse, stored_at: u64) -> Self {
        Self {
            access: Secret::from(response.access_token),
            refresh: response.refresh_token.map(Secret::from),
            stored_at,
            expires_in: response.expires_in,
        }
    }

    pub fn age(&self, now_millis: u64) -> Duration {
        Duration::from_millis(now_millis.saturating_sub(self.stored_at))
    }

    /// Whether `other` is the same stored grant rather than a replacement.
    fn same_grant(&self, other: &CredentialRecord) -> bool {
        self.stored_at == other.stored_at && self.access.expose() == other.access.expose()
    }
}

/// In-memory credential store.
///
/// `records` is locked only for map reads and writes, never across a network
/// call. `refresh_guard` serializes refreshes so concurrent stale reads
/// trigger one exchange between them. `refresh_attempts` counts finished
/// attempts; a caller that saw it change while queued on the guard takes
/// whatever the attempt left behind instead of exchanging again.
pub struct CredentialStore {
    records: Mutex<HashMap<String, CredentialRecord>>,
    refresh_guard: Mutex<()>,
    refresh_attempts: AtomicU64,
    exchanger: Arc<dyn TokenExchanger>,
    clock: Arc<dyn Clock>,
    refresh_threshold: Duration,
    exchange_timeout: Duration,
}

impl CredentialStore {
    pub fn new(exchanger: Arc<dyn TokenExchanger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            refresh_guard: Mutex::new(()),
            refresh_attempts: AtomicU64::new(0),
            exchanger,
            clock,
            refresh_threshold: REFRESH_THRESHOLD,
            exchange_timeout: EXCHANGE_TIMEOUT,
        }
    }

    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Replace the record for `identity` wholesale, stamped with now.
    pub async fn store(&self, identity: &str, response: TokenResponse) {
        let record = CredentialRecord::from_response(response, self.clock.now_millis());
        let has_refresh = record.refresh.is_some();
        self.records
            .lock()
            .await
            .insert(identity.to_string(), record);
        info!(identity, has_refresh, "stored credential");
    }

    /// Raw record without refresh.
    pub async fn get(&self, identity: &str) -> Option<CredentialRecord> {
        self.records.lock().await.get(identity).cloned()
    }

    /// Whether any record exists for `identity`.
    pub async fn contains(&self, identity: &str) -> bool {
        self.records.lock().await.contains_key(identity)
    }

    /// Record for `identity`, refreshed first if it has gone stale.
    pub async fn resolve(&self, identity: &str) -> Option<CredentialRecord> {
        let record = self.get(identity).await?;
        if !self.needs_refresh(&record) {
            return Some(record);
        }

        let attempts_seen = self.refresh_attempts.load(Ordering::Acquire);
        let _guard = self.refresh_guard.lock().await;

        // Another caller may have refreshed while we waited for the guard
        let record = self.get(identity).await?;
        if !self.needs_refresh(&record) {
            debug!(identity, "credential refreshed by concurrent caller");
            return Some(record);
        }
        if self.refresh_attempts.load(Ordering::Acquire) != attempts_seen {
            debug!(identity, "refresh failed while queued, serving stale token");
            return Some(record);
        }

        let outcome = self.refresh(identity, &record).await;
        self.refresh_attempts.fetch_add(1, Ordering::Release);
        match outcome {
            Ok(fresh) => Some(fresh),
            Err(e) => {
                warn!(identity, error = %e, "credential refresh failed, serving stale token");
                // A store during the failed exchange may have replaced the record
                Some(self.get(identity).await.unwrap_or(record))
            }
        }
    }

    fn needs_refresh(&self, record: &CredentialRecord) -> bool {
        record.refresh.is_some() && record.age(self.clock.now_millis()) > self.refresh_threshold
    }

    async fn refresh(
        &self,
        identity: &str,
        stale: &CredentialRecord,
    ) -> Result<CredentialRecord> {
        let Some(refresh_token) = stale.refresh.as_ref() else {
            return Ok(stale.clone());
        };

        let age_secs = stale.age(self.clock.now_millis()).as_secs();
        debug!(identity, age_secs, "refreshing credential");
        let response = tokio::time::timeout(
            self.exchange_timeout,
            self.exchanger.refresh(refresh_token.expose()),
        )
        .await
        .map_err(|_| Error::ExchangeTimeout(self.exchange_timeout))??;

        let mut fresh = CredentialRecord::from_response(response, self.clock.now_millis());
        if fresh.refresh.is_none() {
            fresh.refresh = stale.refresh.clone();
        }

        let mut records = self.records.lock().await;
        if let Some(current) = records.get(identity)
            && !current.same_grant(stale)
        {
            info!(identity, "credential replaced during refresh, discarding refreshed token");
            return Ok(current.clone());
        }
        records.insert(identity.to_string(), fresh.clone());
        info!(identity, "refreshed credential");
        Ok(fresh)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("refresh_threshold", &self.refresh_threshold)
            .field("exchange_timeout", &self.exchange_timeout)
            .finish_non_exhaustive()
    }
}
