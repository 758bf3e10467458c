// SPDX-License-Identifier: BSD-3-Clause
// Copyright (c) 2026 Aleksandr Ptakhin

//! Key/value cache with per-entry TTL and tag invalidation.

use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Storage behind [`Cache`]. Values are JSON so any backend can hold them.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<serde_json::Value>;
    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration, tags: &[&str]);
    /// Drop every entry stored with `tag`. Returns how many were removed.
    async fn invalidate_tag(&self, tag: &str) -> usize;
    async fn clear(&self);
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
    tags: Vec<String>,
}

/// Process-local [`CacheStore`]. Expired entries are dropped lazily on read.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
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
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    async fn set(&self, key: &str, value: serde_json::Value, ttl: Duration, tags: &[&str]) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
                tags: tags.iter().map(|t| t.to_string()).collect(),
            },
        );
    }

    async fn invalidate_tag(&self, tag: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        before.saturating_sub(self.entries.len())
    }

    async fn clear(&self) {
        self.entries.clear();
    }
}

/// Typed front of a [`CacheStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCache::new()))
    }

    /// Cached value for `key`; entries that no longer decode count as misses.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.store.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration, tags: &[&str]) {
        match serde_json::to_value(value) {
            Ok(json) => self.store.set(key, json, ttl, tags).await,
            Err(e) => tracing::warn!("Skipping cache write for {}: {}", key, e),
        }
    }

    /// Return the cached value or compute, store and return it. Errors from
    /// `factory` are passed through and nothing is cached.
    pub async fn remember<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        tags: &[&str],
        factory: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }
        let value = factory().await?;
        self.set(key, &value, ttl, tags).await;
        Ok(value)
    }

    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        self.store.invalidate_tag(tag).await
    }

    pub async fn clear(&self) {
        self.store.clear().await
    }
}
