//! Short-lived key/value storage for OTP codes and refresh tokens

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::AppResult;

/// Expiring string store shared by the OTP and session logic
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Store `value` under `key` for `ttl_seconds`
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()>;

    async fn get(&self, key: &str) -> AppResult<Option<String>>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Increment a counter, creating it with `ttl_seconds` on first use
    async fn incr(&self, key: &str, ttl_seconds: u64) -> AppResult<i64>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store, used when no Redis URL is configured and in tests
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.write().await.retain(|_, e| e.expires_at > now);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()> {
        let entry = Entry {
            value: value.to_string(),
            expires_at: Instant::now() + Duration::from_secs(ttl_seconds),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > Instant::now())
            .map(|e| e.value.clone()))
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.expires_at > Instant::now()))
    }

    async fn incr(&self, key: &str, ttl_seconds: u64) -> AppResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.expires_at <= now {
                    e.value = "0".to_string();
                    e.expires_at = now + Duration::from_secs(ttl_seconds);
                }
            })
            .or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: now + Duration::from_secs(ttl_seconds),
            });
        let next = entry.value.parse::<i64>().unwrap_or(0) + 1;
        entry.value = next.to_string();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryTokenStore::new();
        store.set("k", "v", 60).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_expires_immediately() {
        let store = MemoryTokenStore::new();
        store.set("k", "v", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        store.purge_expired().await;
        assert!(store.entries.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_incr_counts_up() {
        let store = MemoryTokenStore::new();
        assert_eq!(store.incr("n", 60).await.unwrap(), 1);
        assert_eq!(store.incr("n", 60).await.unwrap(), 2);
        assert_eq!(store.incr("other", 60).await.unwrap(), 1);
    }
}
