//! Shared store for in-flight authorization requests
//!
//! A pending request is written when a link is started and consumed when the
//! provider redirects back. The callback can land on any process, so the
//! production backend is Redis; [`MemoryStateStore`] serves single-process
//! deployments and tests.
//!
//! Entries expire after at most [`MAX_STATE_TTL`]. [`StateStore::take`] is an
//! atomic get-and-delete, which is what guarantees a pending request completes
//! at most one link.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::types::{PendingOAuthRequest, Provider};

/// Upper bound on how long a pending request may live
pub const MAX_STATE_TTL: Duration = Duration::from_secs(600);

/// State store errors
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    /// Backend could not be reached
    #[error("state store unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected a command
    #[error("state store command failed: {0}")]
    Backend(String),

    /// Stored value could not be (de)serialized
    #[error("invalid pending request payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for StateStoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_timeout() || err.is_io_error() {
            Self::Unavailable(err.to_string())
        } else {
            Self::Backend(err.to_string())
        }
    }
}

/// Namespaced store key for a provider's correlation token
#[must_use]
pub fn state_key(provider: Provider, token: &str) -> String {
    format!("{}:{token}", provider.state_prefix())
}

/// Clamp a requested TTL into `1s..=MAX_STATE_TTL`
#[must_use]
pub fn clamp_ttl(ttl: Duration) -> Duration {
    ttl.clamp(Duration::from_secs(1), MAX_STATE_TTL)
}

/// TTL-bound key-value store for pending authorization requests
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    async fn put(
        &self,
        key: &str,
        value: &PendingOAuthRequest,
        ttl: Duration,
    ) -> Result<(), StateStoreError>;

    /// Read without consuming
    async fn get(&self, key: &str) -> Result<Option<PendingOAuthRequest>, StateStoreError>;

    /// Atomically read and delete
    ///
    /// Of any number of concurrent callers for the same key, at most one
    /// receives `Some`.
    async fn take(&self, key: &str) -> Result<Option<PendingOAuthRequest>, StateStoreError>;

    /// Delete, returning whether a live entry existed
    async fn delete(&self, key: &str) -> Result<bool, StateStoreError>;

    /// Remaining lifetime of a live entry
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StateStoreError>;

    /// Check backend connectivity
    async fn ping(&self) -> Result<(), StateStoreError>;
}

/// In-process state store
///
/// Only suitable when a single process serves both start and callback.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryStateStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    /// Whether the store holds no live entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live(
        entry: Option<(String, Instant)>,
    ) -> Result<Option<PendingOAuthRequest>, StateStoreError> {
        match entry {
            Some((payload, expires_at)) if expires_at > Instant::now() => {
                Ok(Some(serde_json::from_str(&payload)?))
            }
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(
        &self,
        key: &str,
        value: &PendingOAuthRequest,
        ttl: Duration,
    ) -> Result<(), StateStoreError> {
        let payload = serde_json::to_string(value)?;
        let expires_at = Instant::now() + clamp_ttl(ttl);

        let mut entries = self.entries.lock();
        let now = Instant::now();
        entries.retain(|_, (_, exp)| *exp > now);
        entries.insert(key.to_string(), (payload, expires_at));
        drop(entries);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<PendingOAuthRequest>, StateStoreError> {
        let entry = self.entries.lock().get(key).cloned();
        Self::live(entry)
    }

    async fn take(&self, key: &str) -> Result<Option<PendingOAuthRequest>, StateStoreError> {
        let entry = self.entries.lock().remove(key);
        Self::live(entry)
    }

    async fn delete(&self, key: &str) -> Result<bool, StateStoreError> {
        let entry = self.entries.lock().remove(key);
        Ok(entry.is_some_and(|(_, expires_at)| expires_at > Instant::now()))
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StateStoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(_, expires_at)| *expires_at - now))
    }

    async fn ping(&self) -> Result<(), StateStoreError> {
        Ok(())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisStateStore;

#[cfg(feature = "redis")]
mod redis_store {
    use std::time::Duration;

    use async_trait::async_trait;
    use deadpool_redis::{Config, Pool, Runtime};

    use super::{clamp_ttl, StateStore, StateStoreError};
    use crate::oauth::types::PendingOAuthRequest;

    /// Redis-backed state store shared by every process
    #[derive(Clone)]
    pub struct RedisStateStore {
        pool: Pool,
    }

    impl std::fmt::Debug for RedisStateStore {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("RedisStateStore")
                .field("pool_status", &self.pool.status())
                .finish()
        }
    }

    impl RedisStateStore {
        /// Wrap an existing connection pool
        #[must_use]
        pub const fn new(pool: Pool) -> Self {
            Self { pool }
        }

        /// Create a pool for `url`
        ///
        /// # Errors
        ///
        /// Returns error if the URL is invalid
        pub fn connect(url: &str) -> Result<Self, StateStoreError> {
            let pool = Config::from_url(url)
                .create_pool(Some(Runtime::Tokio1))
                .map_err(|e| StateStoreError::Unavailable(format!("Redis pool: {e}")))?;
            Ok(Self::new(pool))
        }

        async fn connection(&self) -> Result<deadpool_redis::Connection, StateStoreError> {
            self.pool.get().await.map_err(|e| {
                StateStoreError::Unavailable(format!("Failed to get Redis connection: {e}"))
            })
        }

        fn decode(payload: Option<String>) -> Result<Option<PendingOAuthRequest>, StateStoreError> {
            payload
                .map(|p| serde_json::from_str(&p))
                .transpose()
                .map_err(StateStoreError::from)
        }
    }

    #[async_trait]
    impl StateStore for RedisStateStore {
        async fn put(
            &self,
            key: &str,
            value: &PendingOAuthRequest,
            ttl: Duration,
        ) -> Result<(), StateStoreError> {
            let payload = serde_json::to_string(value)?;
            let mut conn = self.connection().await?;
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(payload)
                .arg("EX")
                .arg(clamp_ttl(ttl).as_secs())
                .query_async(&mut *conn)
                .await?;
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<PendingOAuthRequest>, StateStoreError> {
            let mut conn = self.connection().await?;
            let payload: Option<String> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut *conn)
                .await?;
            Self::decode(payload)
        }

        async fn take(&self, key: &str) -> Result<Option<PendingOAuthRequest>, StateStoreError> {
            let mut conn = self.connection().await?;
            let payload: Option<String> = redis::cmd("GETDEL")
                .arg(key)
                .query_async(&mut *conn)
                .await?;
            Self::decode(payload)
        }

        async fn delete(&self, key: &str) -> Result<bool, StateStoreError> {
            let mut conn = self.connection().await?;
            let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut *conn).await?;
            Ok(removed > 0)
        }

        async fn ttl(&self, key: &str) -> Result<Option<Duration>, StateStoreError> {
            let mut conn = self.connection().await?;
            let millis: i64 = redis::cmd("PTTL").arg(key).query_async(&mut *conn).await?;
            // -2: no such key, -1: no expiry
            Ok(u64::try_from(millis).ok().map(Duration::from_millis))
        }

        async fn ping(&self) -> Result<(), StateStoreError> {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod tests {
        use std::sync::Arc;

        use super::*;

        fn store() -> RedisStateStore {
            let url = std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
            RedisStateStore::connect(&url).unwrap()
        }

        fn key() -> String {
            format!("test:{}", uuid::Uuid::new_v4().simple())
        }

        fn pending() -> PendingOAuthRequest {
            PendingOAuthRequest {
                workspace_id: "ws1".to_string(),
                return_url: "https://app/ad-accounts/ws1".to_string(),
                secret: Some("rts".to_string()),
            }
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
        #[ignore = "Requires Redis server"]
        async fn test_concurrent_take_has_one_winner() {
            let store = Arc::new(store());
            let key = key();
            store.put(&key, &pending(), Duration::from_secs(60)).await.unwrap();

            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let key = key.clone();
                    tokio::spawn(async move { store.take(&key).await })
                })
                .collect();
            let mut winners = Vec::new();
            for handle in handles {
                if let Some(pending) = handle.await.unwrap().unwrap() {
                    winners.push(pending);
                }
            }

            assert_eq!(winners.len(), 1);
            assert_eq!(winners[0].secret.as_deref(), Some("rts"));
            assert!(store.get(&key).await.unwrap().is_none());
        }

        #[tokio::test]
        #[ignore = "Requires Redis server"]
        async fn test_entries_expire_after_ttl() {
            let store = store();
            let key = key();
            store.put(&key, &pending(), Duration::from_secs(1)).await.unwrap();

            let remaining = store.ttl(&key).await.unwrap().unwrap();
            assert!(remaining <= Duration::from_secs(1));
            assert!(store.get(&key).await.unwrap().is_some());

            tokio::time::sleep(Duration::from_millis(1500)).await;

            assert!(store.take(&key).await.unwrap().is_none());
            assert!(store.ttl(&key).await.unwrap().is_none());
        }

        #[tokio::test]
        #[ignore = "Requires Redis server"]
        async fn test_ttl_is_capped() {
            let store = store();
            let key = key();
            store.put(&key, &pending(), Duration::from_secs(3600)).await.unwrap();

            let remaining = store.ttl(&key).await.unwrap().unwrap();
            assert!(remaining <= Duration::from_secs(600));
            assert!(remaining > Duration::from_secs(590));
            assert!(store.delete(&key).await.unwrap());
            store.ping().await.unwrap();
        }
    }
}
