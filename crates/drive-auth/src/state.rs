//! Anti-forgery state tokens
//!
//! Each redirect to the consent page carries a fresh token. The callback must
//! present it back within `STATE_TTL`, and a token is consumed by the first
//! verification whether or not that verification succeeds.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::sync::Mutex;
use tracing::debug;

use crate::clock::{Clock, Entropy};
use crate::constants::STATE_TTL;

/// Random bytes per token (256 bits).
const STATE_BYTES: usize = 32;

/// Single-use, time-limited state token registry.
pub struct StateGuard {
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn Entropy>,
    ttl: Duration,
    /// token -> issued-at (unix millis)
    live: Mutex<HashMap<String, u64>>,
}

impl StateGuard {
    pub fn new(clock: Arc<dyn Clock>, entropy: Arc<dyn Entropy>) -> Self {
        Self::with_ttl(clock, entropy, STATE_TTL)
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, entropy: Arc<dyn Entropy>, ttl: Duration) -> Self {
        Self {
            clock,
            entropy,
            ttl,
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a new token and record it with the current time.
    ///
    /// Expired tokens are swept on every call, so the live set never holds
    /// more than the tokens issued within one TTL window.
    pub async fn issue(&self) -> String {
        let mut bytes = [0u8; STATE_BYTES];
        self.entropy.fill(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let now = self.clock.now_millis();
        let ttl = self.ttl_millis();
        let mut live = self.live.lock().await;
        let before = live.len();
        live.retain(|_, issued| now.saturating_sub(*issued) <= ttl);
        let swept = before - live.len();
        if swept > 0 {
            debug!(swept, "evicted expired state tokens");
        }
        live.insert(token.clone(), now);

        token
    }

    /// Consume `token`. True only if it was issued here and is within the TTL.
    pub async fn verify(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let issued = self.live.lock().await.remove(token);
        match issued {
            Some(issued) => {
                let age = self.clock.now_millis().saturating_sub(issued);
                age <= self.ttl_millis()
            }
            None => false,
        }
    }

    /// Number of unexpired tokens awaiting a callback.
    pub async fn pending(&self) -> usize {
        let now = self.clock.now_millis();
        let ttl = self.ttl_millis();
        self.live
            .lock()
            .await
            .values()
            .filter(|issued| now.saturating_sub(**issued) <= ttl)
            .count()
    }

    fn ttl_millis(&self) -> u64 {
        self.ttl.as_millis() as u64
    }
}

impl std::fmt::Debug for StateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGuard")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
