//! Short-TTL cache of validated claims.
//!
//! Keyed by the token fingerprint (a one-way hash, never the raw
//! credential), so repeated requests carrying the same token within a
//! burst skip re-validation. Entries are immutable `Arc`s; concurrent
//! writes for the same fingerprint race benignly, last write wins.
//!
//! An entry never outlives the token itself: the stored expiry is the
//! minimum of the configured TTL and the token's own `exp`. The expiry
//! check on read is mandatory; the periodic sweep is an optimization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::claims::ValidatedClaims;

struct CacheEntry {
    claims: Arc<ValidatedClaims>,
    expires_at: OffsetDateTime,
}

/// In-memory cache of validated claims, keyed by token fingerprint.
pub struct ContextCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ContextCache {
    /// Creates a cache with the configured entry TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Looks up cached claims by fingerprint.
    ///
    /// Expired entries are never returned; they are evicted on the spot.
    pub async fn get(&self, fingerprint: &str) -> Option<Arc<ValidatedClaims>> {
        let now = OffsetDateTime::now_utc();

        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                Some(entry) if now < entry.expires_at => return Some(Arc::clone(&entry.claims)),
                Some(_) => {}
                None => return None,
            }
        }

        // Entry exists but has expired: evict lazily.
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(fingerprint)
            && now >= entry.expires_at
        {
            entries.remove(fingerprint);
        }
        None
    }

    /// Stores validated claims under a token fingerprint.
    ///
    /// The entry's lifetime is the minimum of the configured TTL and the
    /// token's remaining validity; claims already past their expiry are
    /// not stored at all.
    pub async fn put(&self, fingerprint: impl Into<String>, claims: Arc<ValidatedClaims>) {
        let now = OffsetDateTime::now_utc();
        let token_expiry = OffsetDateTime::from_unix_timestamp(claims.exp)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let expires_at = (now + self.ttl).min(token_expiry);

        if expires_at <= now {
            return;
        }

        let mut entries = self.entries.write().await;
        entries.insert(fingerprint.into(), CacheEntry { claims, expires_at });
    }

    /// Removes the entry for a single token, e.g. on sign-out.
    pub async fn clear_token(&self, fingerprint: &str) {
        let mut entries = self.entries.write().await;
        entries.remove(fingerprint);
    }

    /// Removes every entry.
    pub async fn clear_all(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Evicts all expired entries.
    pub async fn sweep(&self) {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        let before = entries.len();

        entries.retain(|_, entry| entry.expires_at > now);

        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired context cache entries");
        }
    }

    /// Returns the number of entries, including any not yet evicted.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` if the cache is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
