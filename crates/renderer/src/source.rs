//! Where the chart gets its series from

use async_trait::async_trait;
use pulse_data::RequestCoordinator;
use pulse_shared::PulseResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Query payload sent with a series request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesQuery {
    pub from: i64,
    pub to: i64,
    pub bucket_ms: i64,
    pub limit: i64,
}

#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// Raw rows for `kind`; normalization happens in the chart
    async fn fetch_series(&self, kind: &str, query: &SeriesQuery) -> PulseResult<Value>;
}

#[async_trait]
impl SeriesSource for RequestCoordinator {
    async fn fetch_series(&self, kind: &str, query: &SeriesQuery) -> PulseResult<Value> {
        let params = serde_json::to_value(query)?;
        self.request(kind, params, self.default_options()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_config::PulseConfig;
    use pulse_data::LocalBackend;
    use pulse_shared::{ManualClock, SubjectId};
    use pulse_storage::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_coordinator_serves_series() {
        let backend = LocalBackend::new()
            .with_subject(SubjectId::new("user-1"))
            .with_handler("messages_series", |params| {
                Ok(json!([{"ts": params["from"], "y": params["bucket_ms"]}]))
            });
        let coordinator = RequestCoordinator::new(
            Arc::new(backend.clone()),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(0)),
            &PulseConfig::default(),
        );

        let query = SeriesQuery {
            from: 10,
            to: 20,
            bucket_ms: 1_000,
            limit: 160,
        };
        let rows = coordinator.fetch_series("messages_series", &query).await.unwrap();
        assert_eq!(rows, json!([{"ts": 10, "y": 1000}]));

        // Second fetch of the same query is a cache hit
        coordinator.fetch_series("messages_series", &query).await.unwrap();
        assert_eq!(backend.submissions(), 1);
    }
}
