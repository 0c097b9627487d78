//! Durable TTL cache for request results
//!
//! An in-memory map sits in front of a persisted [`KeyValueStore`]. Reads
//! promote valid persisted entries into memory; writes go to both layers.
//! Expiry is lazy: stale entries are ignored on read and never swept.

use parking_lot::Mutex;
use pulse_shared::Clock;
use pulse_storage::{JsonStoreExt, KeyValueStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cache entry as stored in both layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Absolute expiry in epoch milliseconds
    #[serde(rename = "exp")]
    pub expires_at: i64,
    #[serde(rename = "val")]
    pub value: Value,
}

impl CacheEntry {
    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        now_ms < self.expires_at
    }
}

/// Two-layer cache of JSON results
pub struct DurableCache {
    memory: Mutex<HashMap<String, CacheEntry>>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DurableCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            store,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Valid value under `key`, if any
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();

        if let Some(entry) = self.memory.lock().get(key) {
            if entry.is_valid_at(now) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
        }

        match self.store.get_json::<CacheEntry>(key) {
            Ok(Some(entry)) if entry.is_valid_at(now) => {
                let value = entry.value.clone();
                self.memory.lock().insert(key.to_string(), entry);
                self.hits.fetch_add(1, Ordering::Relaxed);
                log::debug!("Promoted persisted cache entry {}", key);
                Some(value)
            }
            Ok(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                log::warn!("Ignoring unreadable cache entry {}: {}", key, e);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`
    ///
    /// Persistence failures are logged and otherwise ignored; the in-memory
    /// layer keeps serving the value for this session.
    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            expires_at: self.clock.now_ms().saturating_add(ttl.as_millis() as i64),
            value,
        };

        if let Err(e) = self.store.set_json(key, &entry) {
            log::warn!("Cache entry {} kept in memory only: {}", key, e);
        }
        self.memory.lock().insert(key.to_string(), entry);
    }

    /// Drop `key` from both layers
    pub fn remove(&self, key: &str) {
        self.memory.lock().remove(key);
        if let Err(e) = self.store.remove(key) {
            log::warn!("Failed to remove persisted cache entry {}: {}", key, e);
        }
    }

    pub fn get_stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            memory_entries: self.memory.lock().len(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f32 / lookups as f32
            },
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f32,
}

/// Fingerprint-scoped pointers to backend jobs that are still being awaited
///
/// Markers are mirrored in memory so resumption keeps working within the
/// session when the persisted store refuses writes.
pub struct ActiveJobMarkers {
    memory: Mutex<HashMap<String, String>>,
    store: Arc<dyn KeyValueStore>,
}

impl ActiveJobMarkers {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            memory: Mutex::new(HashMap::new()),
            store,
        }
    }

    pub fn get(&self, key: &str) -> Option<pulse_shared::JobId> {
        if let Some(id) = self.memory.lock().get(key) {
            return Some(pulse_shared::JobId::new(id.clone()));
        }

        match self.store.get_json::<String>(key) {
            Ok(found) => found.map(pulse_shared::JobId::new),
            Err(e) => {
                log::warn!("Ignoring unreadable job marker {}: {}", key, e);
                None
            }
        }
    }

    pub fn set(&self, key: &str, job_id: &pulse_shared::JobId) {
        self.memory
            .lock()
            .insert(key.to_string(), job_id.as_str().to_string());
        if let Err(e) = self.store.set_json(key, &job_id.as_str()) {
            log::warn!("Job marker {} kept in memory only: {}", key, e);
        }
    }

    pub fn clear(&self, key: &str) {
        self.memory.lock().remove(key);
        if let Err(e) = self.store.remove(key) {
            log::warn!("Failed to remove job marker {}: {}", key, e);
        }
    }
}
