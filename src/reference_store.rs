//! Storage for consumed payment references
//!
//! A reference may pay for exactly one request. The [`ReferenceStore`] trait is
//! the seam that records which references have been spent; the guard asks it
//! whether a reference is already consumed and then consumes it atomically once
//! the payment has been verified.

use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Set of consumed payment references
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// Check whether a reference has been consumed
    async fn is_consumed(&self, reference: &str) -> Result<bool>;

    /// Consume a reference
    ///
    /// Returns `true` if this call consumed it and `false` if it was already
    /// consumed. Concurrent callers with the same reference must see exactly
    /// one `true`.
    async fn try_consume(&self, reference: &str) -> Result<bool>;
}

/// In-memory reference store
///
/// Consumed references live for the lifetime of the process and are lost on
/// restart.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReferenceStore {
    consumed: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryReferenceStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of consumed references
    pub async fn len(&self) -> usize {
        self.consumed.read().await.len()
    }

    /// Whether no reference has been consumed yet
    pub async fn is_empty(&self) -> bool {
        self.consumed.read().await.is_empty()
    }
}

#[async_trait]
impl ReferenceStore for InMemoryReferenceStore {
    async fn is_consumed(&self, reference: &str) -> Result<bool> {
        let consumed = self.consumed.read().await;
        Ok(consumed.contains(reference))
    }

    async fn try_consume(&self, reference: &str) -> Result<bool> {
        let mut consumed = self.consumed.write().await;
        Ok(consumed.insert(reference.to_string()))
    }
}


#[cfg(feature = "redis")]
pub mod redis_store {
    use super::{ReferenceStore, Result};
    use crate::X402Error;
    use redis::{AsyncCommands, Client};

    /// Default key prefix for consumed references
    pub const DEFAULT_KEY_PREFIX: &str = "x402:reference:";

    /// Default lifetime of a consumed reference, in seconds
    pub const DEFAULT_TTL_SECS: u64 = 86_400;

    /// Redis-backed reference store
    ///
    /// Consumed references survive restarts and are shared between guard
    /// instances. Keys expire after `ttl_secs`, which should comfortably exceed
    /// the challenge window.
    #[derive(Debug, Clone)]
    pub struct RedisReferenceStore {
        client: Client,
        key_prefix: String,
        ttl_secs: u64,
    }

    impl RedisReferenceStore {
        /// Create a new Redis store
        ///
        /// # Arguments
        ///
        /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
        /// * `key_prefix` - Optional prefix for Redis keys (default: "x402:reference:")
        pub fn new(redis_url: &str, key_prefix: Option<&str>) -> Result<Self> {
            let client = Client::open(redis_url).map_err(|e| {
                X402Error::config("redis_url", format!("invalid Redis URL: {}", e))
            })?;

            Ok(Self {
                client,
                key_prefix: key_prefix.unwrap_or(DEFAULT_KEY_PREFIX).to_string(),
                ttl_secs: DEFAULT_TTL_SECS,
            })
        }

        /// Set how long consumed references are remembered
        pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
            self.ttl_secs = ttl_secs;
            self
        }

        fn make_key(&self, reference: &str) -> String {
            format!("{}{}", self.key_prefix, reference)
        }

        async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
            self.client
                .get_multiplexed_async_connection()
                .await
                .map_err(|e| store_error("connect", e))
        }
    }

    fn store_error(operation: &str, err: redis::RedisError) -> X402Error {
        X402Error::Network {
            message: format!("Redis {} failed: {}", operation, err),
            timed_out: err.is_timeout(),
            source: Some(Box::new(err)),
        }
    }

    #[async_trait::async_trait]
    impl ReferenceStore for RedisReferenceStore {
        async fn is_consumed(&self, reference: &str) -> Result<bool> {
            let mut conn = self.connection().await?;
            let key = self.make_key(reference);
            conn.exists(&key)
                .await
                .map_err(|e| store_error("EXISTS", e))
        }

        async fn try_consume(&self, reference: &str) -> Result<bool> {
            let mut conn = self.connection().await?;
            let key = self.make_key(reference);

            // SET NX answers OK for the first writer and nil for everyone else
            let reply = redis::cmd("SET")
                .arg(&key)
                .arg("1")
                .arg("NX")
                .arg("EX")
                .arg(self.ttl_secs)
                .query_async::<Option<String>>(&mut conn)
                .await
                .map_err(|e| store_error("SET", e))?;

            Ok(reply.is_some())
        }
    }

}

#[cfg(feature = "redis")]
pub use redis_store::RedisReferenceStore;
