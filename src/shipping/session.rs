//! Aggregator login session.
//!
//! The bearer token is held in a [`TokenStore`] behind an explicit session
//! object with a TTL. The in-process store serves a single instance; with the
//! `cache` feature the Redis store shares one login across instances.
//! Concurrent callers that all see an empty store may each log in; the
//! aggregator accepts repeated logins and the last token written wins.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error)]
#[error("token store error: {0}")]
pub struct TokenStoreError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SessionToken>, TokenStoreError>;
    async fn put(&self, key: &str, token: &SessionToken) -> Result<(), TokenStoreError>;
    async fn remove(&self, key: &str) -> Result<(), TokenStoreError>;
}

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, SessionToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<SessionToken>, TokenStoreError> {
        Ok(self.tokens.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, token: &SessionToken) -> Result<(), TokenStoreError> {
        self.tokens
            .write()
            .await
            .insert(key.to_string(), token.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
        self.tokens.write().await.remove(key);
        Ok(())
    }
}

#[cfg(feature = "cache")]
pub use redis_store::RedisTokenStore;

#[cfg(feature = "cache")]
mod redis_store {
    use super::*;
    use crate::cache::RedisPool;

    /// Token store shared by every instance through Redis; entries expire
    /// with the token
    pub struct RedisTokenStore {
        pool: RedisPool,
    }

    impl RedisTokenStore {
        pub fn new(pool: RedisPool) -> Self {
            Self { pool }
        }
    }

    fn store_err(e: impl std::fmt::Display) -> TokenStoreError {
        TokenStoreError(e.to_string())
    }

    #[async_trait]
    impl TokenStore for RedisTokenStore {
        async fn get(&self, key: &str) -> Result<Option<SessionToken>, TokenStoreError> {
            let mut conn = self.pool.get().await.map_err(store_err)?;
            let raw: Option<String> = redis::cmd("GET")
                .arg(key)
                .query_async(&mut *conn)
                .await
                .map_err(store_err)?;

            raw.map(|json| serde_json::from_str::<SessionToken>(&json).map_err(store_err))
                .transpose()
        }

        async fn put(&self, key: &str, token: &SessionToken) -> Result<(), TokenStoreError> {
            let ttl = (token.expires_at - Utc::now()).num_seconds();
            if ttl <= 0 {
                return Ok(());
            }
            let json = serde_json::to_string(token).map_err(store_err)?;

            let mut conn = self.pool.get().await.map_err(store_err)?;
            let _: () = redis::cmd("SET")
                .arg(key)
                .arg(json)
                .arg("EX")
                .arg(ttl)
                .query_async(&mut *conn)
                .await
                .map_err(store_err)?;
            Ok(())
        }

        async fn remove(&self, key: &str) -> Result<(), TokenStoreError> {
            let mut conn = self.pool.get().await.map_err(store_err)?;
            let _: i64 = redis::cmd("DEL")
                .arg(key)
                .query_async(&mut *conn)
                .await
                .map_err(store_err)?;
            Ok(())
        }
    }
}

/// Injected login session for one aggregator account
#[derive(Clone)]
pub struct ShippingSession {
    store: Arc<dyn TokenStore>,
    key: String,
    ttl: Duration,
}

impl ShippingSession {
    pub fn new(store: Arc<dyn TokenStore>, key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
        }
    }

    /// Session backed by the in-process store
    pub fn in_memory(key: impl Into<String>, ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()), key, ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live token, if any. Store failures read as "no token" so the caller
    /// falls back to a fresh login.
    pub async fn current_token(&self) -> Option<String> {
        match self.store.get(&self.key).await {
            Ok(Some(token)) if !token.is_expired_at(Utc::now()) => Some(token.token),
            Ok(Some(_)) => {
                debug!(key = %self.key, "shipping session token expired");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(key = %self.key, error = %e, "token store read failed");
                None
            }
        }
    }

    pub async fn store_token(&self, token: impl Into<String>) -> SessionToken {
        let ttl = ChronoDuration::from_std(self.ttl).unwrap_or_else(|_| ChronoDuration::hours(1));
        let session = SessionToken {
            token: token.into(),
            expires_at: Utc::now() + ttl,
        };
        if let Err(e) = self.store.put(&self.key, &session).await {
            warn!(key = %self.key, error = %e, "token store write failed");
        }
        session
    }

    pub async fn invalidate(&self) {
        if let Err(e) = self.store.remove(&self.key).await {
            warn!(key = %self.key, error = %e, "token store delete failed");
        }
    }

    pub async fn is_active(&self) -> bool {
        self.current_token().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stored_token_is_returned_until_invalidated() {
        let session = ShippingSession::in_memory("v1:shipping:token:test", Duration::from_secs(60));
        assert!(session.current_token().await.is_none());

        session.store_token("tok-1").await;
        assert_eq!(session.current_token().await.as_deref(), Some("tok-1"));

        session.invalidate().await;
        assert!(!session.is_active().await);
    }

    #[tokio::test]
    async fn expired_token_is_ignored() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .put(
                "k",
                &SessionToken {
                    token: "stale".to_string(),
                    expires_at: Utc::now() - ChronoDuration::seconds(1),
                },
            )
            .await
            .unwrap();

        let session = ShippingSession::new(store, "k", Duration::from_secs(60));
        assert!(session.current_token().await.is_none());
    }

    #[tokio::test]
    async fn sessions_sharing_a_store_share_the_token() {
        let store: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new());
        let a = ShippingSession::new(store.clone(), "shared", Duration::from_secs(60));
        let b = ShippingSession::new(store, "shared", Duration::from_secs(60));

        a.store_token("tok-shared").await;
        assert_eq!(b.current_token().await.as_deref(), Some("tok-shared"));
    }
}
