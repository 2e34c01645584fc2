//! Shared token cache with TTL eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tokio::sync::RwLock;

use crate::token::Token;

/// Cache key for a token: base64 of the canonical JSON identity.
pub fn token_cache_key(address: &str, blockchain: &str) -> String {
    let payload = serde_json::json!({ "address": address, "blockchain": blockchain });
    BASE64_STANDARD.encode(payload.to_string())
}

/// Process-shared token cache.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Token>;
    async fn set(&self, key: &str, token: &Token, ttl: Duration);
}

struct CacheEntry {
    token: Token,
    expires_at: Instant,
}

/// In-memory TTL cache. Expired entries are dropped lazily on read and
/// pruned when the map grows past a threshold on write.
#[derive(Default)]
pub struct InMemoryTokenCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

const PRUNE_THRESHOLD: usize = 4096;

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, key: &str) -> Option<Token> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.token.clone())
    }

    async fn set(&self, key: &str, token: &Token, ttl: Duration) {
        let mut entries = self.entries.write().await;
        if entries.len() >= PRUNE_THRESHOLD {
            let now = Instant::now();
            entries.retain(|_, entry| entry.expires_at > now);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                token: token.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
    }
}
