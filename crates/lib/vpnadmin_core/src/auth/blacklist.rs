//! Token blacklist: revocation of bearer tokens before their natural expiry.
//!
//! Entries are keyed by the SHA-256 digest of the raw token and carry the
//! token's own expiry, after which the periodic sweep drops them. The set is
//! process-local: it starts empty on every restart and is not shared between
//! replicas.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Interval between sweeps of expired entries (5 minutes).
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// SHA-256 hash a token for use as a blacklist key.
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// In-memory revocation set.
#[derive(Debug, Default)]
pub struct TokenBlacklist {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl TokenBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke `token` until `expires_at`.
    pub async fn add(&self, token: &str, expires_at: DateTime<Utc>) {
        let key = hash_token(token);
        self.entries.write().await.insert(key, expires_at);
    }

    /// Whether `token` has been revoked.
    pub async fn is_blacklisted(&self, token: &str) -> bool {
        let key = hash_token(token);
        self.entries.read().await.contains_key(&key)
    }

    /// Number of entries currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop entries whose expiry has passed. Returns how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    /// Spawn the periodic sweep. It exits once `shutdown` is cancelled.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let blacklist = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("token blacklist sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = blacklist.purge_expired().await;
                        if removed > 0 {
                            debug!(removed, "purged expired blacklist entries");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn added_token_is_blacklisted_and_others_are_not() {
        let blacklist = TokenBlacklist::new();
        let exp = Utc::now() + ChronoDuration::hours(1);
        blacklist.add("token-a", exp).await;

        assert!(blacklist.is_blacklisted("token-a").await);
        assert!(!blacklist.is_blacklisted("token-b").await);
    }

    #[tokio::test]
    async fn independent_tokens_do_not_interfere() {
        let blacklist = TokenBlacklist::new();
        let exp = Utc::now() + ChronoDuration::hours(1);
        blacklist.add("token-a", exp).await;
        blacklist.add("token-b", exp).await;

        assert!(blacklist.is_blacklisted("token-a").await);
        assert!(blacklist.is_blacklisted("token-b").await);
        assert_eq!(blacklist.len().await, 2);
    }

    #[tokio::test]
    async fn purge_drops_only_expired_entries() {
        let blacklist = TokenBlacklist::new();
        blacklist
            .add("old", Utc::now() - ChronoDuration::seconds(1))
            .await;
        blacklist
            .add("fresh", Utc::now() + ChronoDuration::hours(1))
            .await;

        assert_eq!(blacklist.purge_expired().await, 1);
        assert!(!blacklist.is_blacklisted("old").await);
        assert!(blacklist.is_blacklisted("fresh").await);
    }

    #[tokio::test]
    async fn sweeper_purges_and_stops_on_cancel() {
        let blacklist = Arc::new(TokenBlacklist::new());
        blacklist
            .add("old", Utc::now() - ChronoDuration::seconds(1))
            .await;

        let shutdown = CancellationToken::new();
        let handle = blacklist.spawn_sweeper(Duration::from_millis(10), shutdown.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(blacklist.is_empty().await);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit after cancel")
            .unwrap();
    }
}
