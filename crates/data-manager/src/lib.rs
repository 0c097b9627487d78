//! Data manager crate for the Pulse client
//! Turns expensive backend jobs into cached, deduplicated results

pub mod backend;
pub mod backoff;
pub mod cache;
pub mod coordinator;
pub mod fingerprint;
pub mod local;
pub mod realtime;
pub mod supabase;
pub mod waiter;

use pulse_config::{BackendKind, PulseConfig, StorageConfig};
use pulse_shared::{PulseError, PulseResult, SystemClock};
use pulse_storage::{FileStore, KeyValueStore, MemoryStore};
use std::sync::Arc;

pub use backend::{BackendError, ChannelEvent, JobBackend, JobSubscription};
pub use backoff::Backoff;
pub use cache::{ActiveJobMarkers, CacheEntry, CacheStats, DurableCache};
pub use coordinator::{CoordinatorStats, RequestCoordinator, RequestOptions, PROFILE_STATS_KIND};
pub use fingerprint::{canonical_params, Fingerprint};
pub use local::{JobHandler, LocalBackend, PushMode};
pub use supabase::SupabaseBackend;
pub use waiter::{CompletionWaiter, Settlement};

/// Persisted store described by `config`
///
/// Falls back to memory when the file cannot be opened, so a broken disk
/// only costs cross-session caching.
pub fn open_store(config: &StorageConfig) -> Arc<dyn KeyValueStore> {
    match &config.path {
        Some(path) => match FileStore::open(path) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                log::warn!(
                    "Cannot open store {}, keeping results in memory: {}",
                    path.display(),
                    e
                );
                Arc::new(MemoryStore::new())
            }
        },
        None => Arc::new(MemoryStore::new()),
    }
}

/// Coordinator over `backend` with the store and tunables of `config`
pub fn coordinator_with(config: &PulseConfig, backend: Arc<dyn JobBackend>) -> RequestCoordinator {
    RequestCoordinator::new(
        backend,
        open_store(&config.storage),
        Arc::new(SystemClock),
        config,
    )
}

/// Coordinator talking to the remote backend configured in `config`
pub fn connect(config: &PulseConfig) -> PulseResult<RequestCoordinator> {
    match config.backend.kind {
        BackendKind::Supabase => {
            let backend = SupabaseBackend::new(&config.backend)?;
            log::info!("Using Supabase backend at {}", config.backend.url);
            Ok(coordinator_with(config, Arc::new(backend)))
        }
        BackendKind::Local => Err(PulseError::InvalidConfig {
            message: "the local backend has no remote endpoint; build a LocalBackend and use coordinator_with".to_string(),
            field: Some("backend.kind".to_string()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_store_defaults_to_memory() {
        let store = open_store(&StorageConfig::default());
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_open_store_on_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = StorageConfig {
            path: Some(dir.path().join("pulse").join("store.json")),
        };
        open_store(&config).set("k", "v").unwrap();
        assert_eq!(open_store(&config).get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_connect_requires_remote_kind() {
        assert!(matches!(
            connect(&PulseConfig::default()),
            Err(PulseError::InvalidConfig { .. })
        ));
    }
}
