//! Token cache.
//!
//! Entries are complete token responses stored under a key derived from the
//! registry host, the requested scope and a digest of the caller's
//! credentials. Entries never change after they are written; freshness is
//! checked when reading, so there is no eviction task.

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::time::Instant;

use crate::http::ProxyResponse;

/// How long a token response is served from cache. Registry tokens are
/// issued for 300 seconds, so a cached one never outlives its validity.
pub const TOKEN_TTL: Duration = Duration::from_secs(240);

/// Number of hex characters of the credential digest kept in a cache key.
const CREDENTIAL_DIGEST_LEN: usize = 16;

/// A buffered token response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl CachedToken {
    /// A fresh response carrying a copy of this entry.
    pub fn to_response(&self) -> ProxyResponse {
        ProxyResponse {
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone().into(),
        }
    }
}

/// Key/value store for token responses with TTL-aware reads.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Returns the entry only while it is fresh.
    async fn get(&self, key: &str) -> Option<CachedToken>;

    /// Store a complete entry, replacing any previous one.
    async fn put(&self, key: &str, token: CachedToken, ttl: Duration);
}

#[derive(Debug, Clone)]
struct Entry {
    token: CachedToken,
    expires_at: Instant,
}

/// Process-local [`TokenCache`].
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    entries: DashMap<String, Entry>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, key: &str) -> Option<CachedToken> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if now < entry.expires_at {
                return Some(entry.token.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| now >= entry.expires_at);
        None
    }

    async fn put(&self, key: &str, token: CachedToken, ttl: Duration) {
        let entry = Entry {
            token,
            expires_at: Instant::now() + ttl,
        };
        self.entries.insert(key.to_string(), entry);
    }
}

/// Leading hex characters of the SHA-256 of a raw `Authorization` value.
pub fn credential_digest(authorization: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(authorization);
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(CREDENTIAL_DIGEST_LEN);
    digest
}

/// `token:<host>:<scope|default>:<digest|anonymous>`
pub fn cache_key(hostname: &str, scope: Option<&str>, authorization: Option<&[u8]>) -> String {
    let scope = scope.filter(|s| !s.is_empty()).unwrap_or("default");
    let principal = match authorization {
        Some(auth) => credential_digest(auth),
        None => "anonymous".to_string(),
    };
    format!("token:{hostname}:{scope}:{principal}")
}
