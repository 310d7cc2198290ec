//! In-process fallback cache
//!
//! Owned by [`crate::SessionCache`]; lives exactly as long as the cache that
//! constructed it.

use dashmap::DashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct LocalEntry {
    data: String,
    expires_at: Instant,
}

impl LocalEntry {
    #[inline]
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Concurrent map of serialized values with per-entry expiry
#[derive(Debug, Default)]
pub struct LocalCache {
    entries: DashMap<String, LocalEntry>,
}

impl LocalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Some(entry.data.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        None
    }

    pub fn set(&self, key: &str, data: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                data,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every expired entry; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
