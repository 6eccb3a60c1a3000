// Copyright 2025 Memophor Labs
// SPDX-License-Identifier: Apache-2.0

//! Process-local response cache with per-entry TTL.
//!
//! Entries are JSON values keyed by a digest of the upstream endpoint and the
//! parameters that reach it. Expired entries are dropped lazily on read and in
//! bulk by the janitor task.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub keys: usize,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Trait for cache backends
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError>;
    async fn set(&self, key: String, value: Value, ttl: Duration) -> Result<CacheEntry, AppError>;
    async fn delete(&self, key: &str) -> Result<bool, AppError>;
    async fn clear(&self) -> Result<usize, AppError>;
    async fn purge_expired(&self) -> Result<usize, AppError>;
    async fn stats(&self) -> Result<CacheStats, AppError>;
}

/// In-memory cache backend
pub struct MemoryCache {
    inner: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    async fn lookup_at(&self, key: &str, now: DateTime<Utc>) -> Option<Value> {
        let mut guard = self.inner.write().await;

        let found = match guard.get(key) {
            Some(entry) if entry.is_expired(now) => {
                guard.remove(key);
                tracing::debug!(key, "cache entry expired");
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        };
        drop(guard);

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);

        found
    }

    async fn insert_at(
        &self,
        key: String,
        value: Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> CacheEntry {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let entry = CacheEntry {
            value,
            stored_at: now,
            expires_at: now + chrono_duration(ttl),
        };

        let mut guard = self.inner.write().await;
        guard.insert(key.clone(), entry.clone());
        drop(guard);

        tracing::debug!(
            key,
            stored_at = %entry.stored_at,
            expires_at = %entry.expires_at,
            "stored cache entry"
        );

        entry
    }

    async fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, entry| !entry.is_expired(now));
        before - guard.len()
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        Ok(self.lookup_at(key, Utc::now()).await)
    }

    async fn set(&self, key: String, value: Value, ttl: Duration) -> Result<CacheEntry, AppError> {
        Ok(self.insert_at(key, value, ttl, Utc::now()).await)
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        let mut guard = self.inner.write().await;
        Ok(guard.remove(key).is_some())
    }

    async fn clear(&self) -> Result<usize, AppError> {
        let mut guard = self.inner.write().await;
        let removed = guard.len();
        guard.clear();
        tracing::info!(removed, "cache cleared");
        Ok(removed)
    }

    async fn purge_expired(&self) -> Result<usize, AppError> {
        Ok(self.purge_expired_at(Utc::now()).await)
    }

    async fn stats(&self) -> Result<CacheStats, AppError> {
        let keys = self.inner.read().await.len();
        Ok(CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            keys,
        })
    }
}

/// Cache wrapper that can use different backends
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
}

impl Cache {
    pub fn new(backend: impl CacheBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn in_memory(default_ttl: Duration) -> Self {
        Self::new(MemoryCache::new(default_ttl))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        self.backend.get(key).await
    }

    pub async fn set(&self, key: String, value: Value, ttl: Duration) -> Result<CacheEntry, AppError> {
        self.backend.set(key, value, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool, AppError> {
        self.backend.delete(key).await
    }

    pub async fn clear(&self) -> Result<usize, AppError> {
        self.backend.clear().await
    }

    pub async fn purge_expired(&self) -> Result<usize, AppError> {
        self.backend.purge_expired().await
    }

    pub async fn stats(&self) -> Result<CacheStats, AppError> {
        self.backend.stats().await
    }
}

/// Deterministic key for an upstream call: parameter order does not matter.
pub fn cache_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_unstable();

    let mut hasher = Sha256::new();
    for (name, value) in sorted {
        hasher.update(name.as_bytes());
        hasher.update([0x1f]);
        hasher.update(value.as_bytes());
        hasher.update([0x1e]);
    }
    let digest = hex::encode(hasher.finalize());

    format!("{endpoint}:{}", &digest[..16])
}

fn chrono_duration(ttl: Duration) -> ChronoDuration {
    ChronoDuration::from_std(ttl).unwrap_or_else(|_| {
        const MAX_SECS: u64 = i64::MAX as u64 / 1_000;
        ChronoDuration::seconds(ttl.as_secs().min(MAX_SECS) as i64)
    })
}
