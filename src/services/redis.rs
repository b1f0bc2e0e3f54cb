//! Redis-backed token store for OTP codes and refresh tokens

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};

use super::token_store::TokenStore;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct RedisService {
    manager: ConnectionManager,
}

fn redis_error(context: &str, e: redis::RedisError) -> AppError {
    AppError::Internal(format!("{}: {}", context, e))
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url).map_err(|e| redis_error("Failed to create Redis client", e))?;

        let mut manager = ConnectionManager::new(client)
            .await
            .map_err(|e| redis_error("Failed to connect to Redis", e))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut manager)
            .await
            .map_err(|e| redis_error("Redis connection test failed", e))?;

        Ok(Self { manager })
    }
}

#[async_trait]
impl TokenStore for RedisService {
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds.max(1))
            .await
            .map_err(|e| redis_error("Failed to store key in Redis", e))
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| redis_error("Failed to read key from Redis", e))
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .del(key)
            .await
            .map_err(|e| redis_error("Failed to delete key from Redis", e))?;
        Ok(removed > 0)
    }

    async fn incr(&self, key: &str, ttl_seconds: u64) -> AppResult<i64> {
        let mut conn = self.manager.clone();
        let value: i64 = conn
            .incr(key, 1)
            .await
            .map_err(|e| redis_error("Failed to increment counter in Redis", e))?;
        if value == 1 {
            conn.expire::<_, ()>(key, ttl_seconds.max(1) as i64)
                .await
                .map_err(|e| redis_error("Failed to set counter expiry in Redis", e))?;
        }
        Ok(value)
    }
}
