//! Short-lived response cache with separate search and chat namespaces.

mod key;

pub use key::{canonical_json, normalize_query, CacheKey, KeyBuilder};

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::config::CacheConfig;
use crate::models::{ChatResponse, SearchResponse};

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// One TTL-bounded namespace.
///
/// Reads never promote entries, so once the size bound is hit the oldest
/// insertion is evicted first.
pub struct TtlStore<V> {
    name: &'static str,
    enabled: bool,
    ttl: Duration,
    entries: Mutex<LruCache<CacheKey, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlStore<V> {
    fn new(name: &'static str, enabled: bool, ttl: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            enabled,
            ttl,
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry. Expired entries are dropped and count as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        if !self.enabled {
            return None;
        }

        let now = Instant::now();
        let mut entries = self.lock();
        let found = match entries.peek(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            _ => None,
        };
        if found.is_none() {
            entries.pop(key);
        }
        drop(entries);

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(namespace = self.name, key = %key, "Cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(namespace = self.name, key = %key, "Cache miss");
        }
        found
    }

    /// Store a value, replacing any previous entry and restarting its TTL.
    pub fn put(&self, key: CacheKey, value: V) {
        if !self.enabled {
            return;
        }

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };
        let mut entries = self.lock();
        entries.pop(&key);
        if let Some((evicted, _)) = entries.push(key, entry) {
            tracing::debug!(namespace = self.name, key = %evicted, "Cache entry evicted");
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let mut removed = 0;
        while let Some((_, entry)) = entries.peek_lru() {
            if now < entry.expires_at {
                break;
            }
            entries.pop_lru();
            removed += 1;
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Hit/miss counters per namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CacheStats {
    pub search_hits: u64,
    pub search_misses: u64,
    pub chat_hits: u64,
    pub chat_misses: u64,
}

struct CacheInner {
    search: TtlStore<SearchResponse>,
    chat: TtlStore<ChatResponse>,
}

/// Shared handle over both namespaces. Cloning is cheap.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<CacheInner>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                search: TtlStore::new(
                    "search",
                    config.enabled,
                    Duration::from_secs(config.search_ttl_secs),
                    config.search_capacity,
                ),
                chat: TtlStore::new(
                    "chat",
                    config.enabled,
                    Duration::from_secs(config.chat_ttl_secs),
                    config.chat_capacity,
                ),
            }),
        }
    }

    /// A cache that stores nothing and always misses.
    pub fn disabled() -> Self {
        Self::new(&CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        })
    }

    /// Retrieval-only responses.
    pub fn search(&self) -> &TtlStore<SearchResponse> {
        &self.inner.search
    }

    /// Full chat answers for requests without history.
    pub fn chat(&self) -> &TtlStore<ChatResponse> {
        &self.inner.chat
    }

    pub fn prune_expired(&self) -> usize {
        self.inner.search.prune_expired() + self.inner.chat.prune_expired()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            search_hits: self.inner.search.hits(),
            search_misses: self.inner.search.misses(),
            chat_hits: self.inner.chat.hits(),
            chat_misses: self.inner.chat.misses(),
        }
    }
}
