//! TTL read-through cache with an explicit fallback policy.
//!
//! The engine caches catalog lookups (requirement type -> achievement chains).
//! When a refresh fails the caller decides, through [`FallbackPolicy`],
//! whether to surface the error, serve the last value that was fetched
//! successfully, or serve a fixed placeholder. Every read reports how fresh
//! the value is so degraded reads are never mistaken for live data.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What to serve when a refresh fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackPolicy<V> {
    /// Propagate the fetch error.
    Fail,
    /// Serve the most recent successfully fetched value, if any.
    LastKnownGood,
    /// Serve the given value.
    Synthetic(V),
}

/// Provenance of a value returned by [`Cache::get_or_refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Fetched during this call.
    Fresh,
    /// Served from an entry younger than the TTL.
    Cached,
    /// Refresh failed; served an expired last-known-good entry.
    Stale,
    /// Refresh failed; served the policy's placeholder.
    Synthetic,
}

/// A cache read together with its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRead<V> {
    pub value: V,
    pub freshness: Freshness,
    /// When the served value was fetched; `None` for synthetic values.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<V> CacheRead<V> {
    /// Whether the value was served despite a failed refresh.
    pub fn is_degraded(&self) -> bool {
        matches!(self.freshness, Freshness::Stale | Freshness::Synthetic)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    fetched_at: DateTime<Utc>,
}

/// Keyed TTL cache.
///
/// The lock is never held across a fetch, so a slow refresh does not block
/// readers of other keys.
#[derive(Debug)]
pub struct Cache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the entry for `key` if it is younger than `ttl`, otherwise
    /// call `fetcher` and store its result.
    ///
    /// # Errors
    /// Returns the fetch error when the policy is [`FallbackPolicy::Fail`],
    /// or when it is [`FallbackPolicy::LastKnownGood`] and nothing was ever
    /// fetched for `key`.
    pub fn get_or_refresh<F>(
        &self,
        key: &K,
        fetcher: F,
        ttl: Duration,
        policy: &FallbackPolicy<V>,
        now: DateTime<Utc>,
    ) -> Result<CacheRead<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(entry) = self.lock().get(key) {
            if now - entry.fetched_at < ttl {
                return Ok(CacheRead {
                    value: entry.value.clone(),
                    freshness: Freshness::Cached,
                    fetched_at: Some(entry.fetched_at),
                });
            }
        }

        match fetcher() {
            Ok(value) => {
                self.lock().insert(
                    key.clone(),
                    CacheEntry {
                        value: value.clone(),
                        fetched_at: now,
                    },
                );
                Ok(CacheRead {
                    value,
                    freshness: Freshness::Fresh,
                    fetched_at: Some(now),
                })
            }
            Err(err) => match policy {
                FallbackPolicy::Fail => Err(err),
                FallbackPolicy::LastKnownGood => {
                    let previous = self.lock().get(key).cloned();
                    match previous {
                        Some(entry) => {
                            tracing::warn!(
                                ?key,
                                fetched_at = %entry.fetched_at,
                                error = %err,
                                "refresh failed, serving last known good value"
                            );
                            Ok(CacheRead {
                                value: entry.value,
                                freshness: Freshness::Stale,
                                fetched_at: Some(entry.fetched_at),
                            })
                        }
                        None => Err(err),
                    }
                }
                FallbackPolicy::Synthetic(value) => {
                    tracing::warn!(?key, error = %err, "refresh failed, serving synthetic value");
                    Ok(CacheRead {
                        value: value.clone(),
                        freshness: Freshness::Synthetic,
                        fetched_at: None,
                    })
                }
            },
        }
    }

    pub fn invalidate(&self, key: &K) {
        self.lock().remove(key);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
