//! Request coordinator
//!
//! Entry point for every backend computation the client needs. For each
//! fingerprint it guarantees at most one outstanding submission: cached
//! results are served directly, concurrent callers share one in-flight
//! computation, and a job left pending by an earlier session is resumed
//! instead of resubmitted.

use crate::backend::JobBackend;
use crate::backoff::Backoff;
use crate::cache::{ActiveJobMarkers, DurableCache};
use crate::fingerprint::Fingerprint;
use crate::waiter::CompletionWaiter;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use pulse_config::{PulseConfig, RequestDefaults};
use pulse_shared::{Clock, JobId, JobStatus, ProfileStats, PulseError, PulseResult};
use pulse_storage::KeyValueStore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Request kind of the profile statistics blob
pub const PROFILE_STATS_KIND: &str = "profile_stats";

/// Per-call tuning of [`RequestCoordinator::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    pub cache_ttl: Duration,
    /// Minimum spacing between submissions for the same fingerprint
    pub cooldown: Duration,
    /// Budget for the job to complete once submitted or resumed
    pub timeout: Duration,
}

impl RequestOptions {
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::from(&RequestDefaults::default())
    }
}

impl From<&RequestDefaults> for RequestOptions {
    fn from(defaults: &RequestDefaults) -> Self {
        Self {
            cache_ttl: Duration::from_millis(defaults.cache_ttl_ms),
            cooldown: Duration::from_millis(defaults.cooldown_ms),
            timeout: Duration::from_millis(defaults.timeout_ms),
        }
    }
}

/// Coordinator counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Calls answered from the cache
    pub cache_hits: u64,
    /// Calls that joined an in-flight computation
    pub joined: u64,
    /// Computations started
    pub computations: u64,
    /// Submission attempts, including ones rejected by cooldown
    pub submit_attempts: u64,
    /// Computations that reused a persisted job instead of submitting
    pub resumed: u64,
}

type SharedResult = Shared<BoxFuture<'static, PulseResult<Value>>>;

struct InFlight {
    generation: u64,
    result: SharedResult,
}

struct CoordinatorInner {
    backend: Arc<dyn JobBackend>,
    cache: DurableCache,
    markers: ActiveJobMarkers,
    waiter: CompletionWaiter,
    submit_backoff: Backoff,
    defaults: RequestOptions,
    in_flight: Mutex<HashMap<Fingerprint, InFlight>>,
    cooldowns: Mutex<HashMap<Fingerprint, Instant>>,
    generations: AtomicU64,
    stats: Mutex<CoordinatorStats>,
}

/// Deduplicating, caching front of a [`JobBackend`]
#[derive(Clone)]
pub struct RequestCoordinator {
    inner: Arc<CoordinatorInner>,
}

enum Lookup {
    Cached(Value),
    Pending(SharedResult),
}

impl RequestCoordinator {
    pub fn new(
        backend: Arc<dyn JobBackend>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &PulseConfig,
    ) -> Self {
        let waiter = CompletionWaiter::new(
            Arc::clone(&backend),
            Backoff::from(&config.poll_backoff),
        );

        Self {
            inner: Arc::new(CoordinatorInner {
                backend,
                cache: DurableCache::new(Arc::clone(&store), clock),
                markers: ActiveJobMarkers::new(store),
                waiter,
                submit_backoff: Backoff::from(&config.submit_backoff),
                defaults: RequestOptions::from(&config.requests),
                in_flight: Mutex::new(HashMap::new()),
                cooldowns: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                stats: Mutex::new(CoordinatorStats::default()),
            }),
        }
    }

    /// Coordinator with the default configuration
    pub fn with_defaults(
        backend: Arc<dyn JobBackend>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(backend, store, clock, &PulseConfig::default())
    }

    /// Options taken from the configuration
    pub fn default_options(&self) -> RequestOptions {
        self.inner.defaults
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.inner.stats.lock().clone()
    }

    /// Fingerprints whose client-side cooldown is tracked
    pub fn cooling_down(&self) -> usize {
        self.inner.cooldowns.lock().len()
    }

    pub fn cache(&self) -> &DurableCache {
        &self.inner.cache
    }

    /// Result of job `kind` with `params`
    ///
    /// Fails with `NotAuthenticated` when nobody is signed in. Concurrent
    /// callers with the same fingerprint observe the same outcome.
    pub async fn request(
        &self,
        kind: &str,
        params: Value,
        options: RequestOptions,
    ) -> PulseResult<Value> {
        let subject = self
            .inner
            .backend
            .current_subject()
            .await
            .ok_or(PulseError::NotAuthenticated)?;
        let fingerprint = Fingerprint::new(&subject, kind, &params);

        match self.lookup_or_start(fingerprint, kind, params, options) {
            Lookup::Cached(value) => Ok(value),
            Lookup::Pending(result) => result.await,
        }
    }

    /// [`RequestCoordinator::request`] with the result deserialized into `T`
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        kind: &str,
        params: Value,
        options: RequestOptions,
    ) -> PulseResult<T> {
        let value = self.request(kind, params, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Statistics of the signed-in user
    pub async fn profile_stats(&self) -> PulseResult<ProfileStats> {
        self.request_as(
            PROFILE_STATS_KIND,
            Value::Object(Default::default()),
            self.inner.defaults,
        )
        .await
    }

    // Cache check, join and start happen under one lock so a computation
    // finishing concurrently cannot slip between them.
    fn lookup_or_start(
        &self,
        fingerprint: Fingerprint,
        kind: &str,
        params: Value,
        options: RequestOptions,
    ) -> Lookup {
        let mut in_flight = self.inner.in_flight.lock();

        if let Some(value) = self.inner.cache.get(&fingerprint.cache_key()) {
            log::debug!("Cache hit for {}", fingerprint);
            self.inner.stats.lock().cache_hits += 1;
            return Lookup::Cached(value);
        }

        if let Some(existing) = in_flight.get(&fingerprint) {
            log::debug!("Joining in-flight request {}", fingerprint);
            self.inner.stats.lock().joined += 1;
            return Lookup::Pending(existing.result.clone());
        }

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        self.inner.stats.lock().computations += 1;

        let guard = InFlightGuard {
            inner: Arc::clone(&self.inner),
            fingerprint: fingerprint.clone(),
            generation,
        };
        let kind = kind.to_string();

        // Runs detached so the job is still awaited if every caller goes away
        let handle = tokio::spawn(async move {
            guard
                .inner
                .compute(&guard.fingerprint, &kind, &params, options)
                .await
        });

        let result = async move {
            handle.await.unwrap_or_else(|e| {
                Err(PulseError::Internal {
                    message: format!("request task failed: {}", e),
                })
            })
        }
        .boxed()
        .shared();

        in_flight.insert(
            fingerprint,
            InFlight {
                generation,
                result: result.clone(),
            },
        );
        Lookup::Pending(result)
    }
}

/// Removes the in-flight entry when its computation ends, however it ends
struct InFlightGuard {
    inner: Arc<CoordinatorInner>,
    fingerprint: Fingerprint,
    generation: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.inner.in_flight.lock();
        if in_flight
            .get(&self.fingerprint)
            .is_some_and(|entry| entry.generation == self.generation)
        {
            in_flight.remove(&self.fingerprint);
        }
    }
}

impl CoordinatorInner {
    async fn compute(
        &self,
        fingerprint: &Fingerprint,
        kind: &str,
        params: &Value,
        options: RequestOptions,
    ) -> PulseResult<Value> {
        self.respect_cooldown(fingerprint, options.cooldown).await;

        let active_key = fingerprint.active_key();
        if let Some(job_id) = self.markers.get(&active_key) {
            if let Some(result) = self.resume(fingerprint, &job_id, options).await {
                return result;
            }
            self.markers.clear(&active_key);
        }

        let job_id = self.submit_with_retry(kind, params).await?;
        self.await_job(fingerprint, &job_id, options).await
    }

    /// Wait out the previous cooldown, then start a new one
    async fn respect_cooldown(&self, fingerprint: &Fingerprint, cooldown: Duration) {
        let until = self.cooldowns.lock().get(fingerprint).copied();
        if let Some(until) = until {
            if until > Instant::now() {
                log::debug!("Cooling down {} for {:?}", fingerprint, until - Instant::now());
                tokio::time::sleep_until(until).await;
            }
        }
        let now = Instant::now();
        let mut cooldowns = self.cooldowns.lock();
        cooldowns.retain(|_, until| *until > now);
        cooldowns.insert(fingerprint.clone(), now + cooldown);
    }

    /// Outcome of a persisted job, or `None` when it should be resubmitted
    async fn resume(
        &self,
        fingerprint: &Fingerprint,
        job_id: &JobId,
        options: RequestOptions,
    ) -> Option<PulseResult<Value>> {
        let snapshot = match self.backend.job_status(job_id).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                log::info!("Job {} for {} is unknown, resubmitting", job_id, fingerprint);
                return None;
            }
            Err(e) => {
                log::warn!("Could not check job {} for {}: {}", job_id, fingerprint, e);
                return None;
            }
        };

        match snapshot.status {
            JobStatus::Done => {
                self.stats.lock().resumed += 1;
                let value = snapshot.result.unwrap_or(Value::Null);
                self.cache
                    .set(&fingerprint.cache_key(), value.clone(), options.cache_ttl);
                self.markers.clear(&fingerprint.active_key());
                Some(Ok(value))
            }
            JobStatus::Pending => {
                log::info!("Resuming job {} for {}", job_id, fingerprint);
                self.stats.lock().resumed += 1;
                Some(self.await_job(fingerprint, job_id, options).await)
            }
            JobStatus::Error | JobStatus::Unknown => {
                log::info!(
                    "Job {} for {} ended as {}, resubmitting",
                    job_id,
                    fingerprint,
                    snapshot.status.as_str()
                );
                None
            }
        }
    }

    async fn submit_with_retry(&self, kind: &str, params: &Value) -> PulseResult<JobId> {
        let mut delays = self.submit_backoff.delays();
        let mut attempt = 1u32;

        loop {
            self.stats.lock().submit_attempts += 1;

            match self.backend.submit_job(kind, params).await {
                Ok(job_id) => {
                    log::info!("Submitted {} job {} (attempt {})", kind, job_id, attempt);
                    return Ok(job_id);
                }
                Err(e) if e.is_cooldown() => {
                    if !self.submit_backoff.allows(attempt + 1) {
                        log::warn!("Giving up on {} after {} cooldown rejections", kind, attempt);
                        return Err(PulseError::CooldownViolation { attempts: attempt });
                    }
                    let delay = delays.next().unwrap_or(self.submit_backoff.max);
                    log::debug!("Submission of {} cooling down, retrying in {:?}", kind, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    log::warn!("Submission of {} failed: {}", kind, e);
                    return Err(PulseError::SubmissionFailed {
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    /// Persist the marker, wait, then cache the result and drop the marker
    async fn await_job(
        &self,
        fingerprint: &Fingerprint,
        job_id: &JobId,
        options: RequestOptions,
    ) -> PulseResult<Value> {
        let active_key = fingerprint.active_key();
        self.markers.set(&active_key, job_id);

        // Only a timeout leaves the marker for the next request to resume
        let value = match self.waiter.wait(job_id, options.timeout).await {
            Ok(value) => value,
            Err(e) => {
                if e.is_job_failure() {
                    self.markers.clear(&active_key);
                }
                return Err(e);
            }
        };

        self.markers.clear(&active_key);
        self.cache
            .set(&fingerprint.cache_key(), value.clone(), options.cache_ttl);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBackend;
    use pulse_shared::{ManualClock, SubjectId};
    use pulse_storage::MemoryStore;
    use serde_json::json;

    fn coordinator(backend: &LocalBackend) -> RequestCoordinator {
        RequestCoordinator::with_defaults(
            Arc::new(backend.clone()),
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(0)),
        )
    }

    #[test]
    fn test_options_from_defaults() {
        let options = RequestOptions::default();
        assert_eq!(options.cache_ttl, Duration::from_secs(30));
        assert_eq!(options.cooldown, Duration::from_millis(1_500));
        assert_eq!(options.timeout, Duration::from_secs(80));
        assert_eq!(
            options.with_timeout(Duration::from_secs(1)).timeout,
            Duration::from_secs(1)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_requires_subject() {
        let backend = LocalBackend::new().with_handler("profile_stats", |_| Ok(json!({})));
        let coordinator = coordinator(&backend);

        let result = coordinator
            .request("profile_stats", json!({}), RequestOptions::default())
            .await;
        assert_eq!(result, Err(PulseError::NotAuthenticated));
        assert_eq!(backend.submissions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_stats() {
        let backend = LocalBackend::new()
            .with_subject(SubjectId::new("u1"))
            .with_handler(PROFILE_STATS_KIND, |_| {
                Ok(json!({"messages": 12, "lvl": 3, "user_name": "Ada"}))
            });
        let coordinator = coordinator(&backend);

        let stats = coordinator.profile_stats().await.unwrap();
        assert_eq!(stats.messages, 12);
        assert_eq!(stats.lvl, 3);
        assert_eq!(stats.user_name, "Ada");
        assert_eq!(stats.voice_time, "00:00");
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_entry_cleared_after_failure() {
        let backend = LocalBackend::new()
            .with_subject(SubjectId::new("u1"))
            .with_handler("flaky", |_| Err(json!("boom")));
        let coordinator = coordinator(&backend);

        let first = coordinator
            .request("flaky", json!({}), RequestOptions::default())
            .await;
        assert!(matches!(first, Err(PulseError::JobFailed { .. })));
        assert!(coordinator.inner.in_flight.lock().is_empty());

        let second = coordinator
            .request("flaky", json!({}), RequestOptions::default())
            .await;
        assert!(second.is_err());
        assert_eq!(backend.submissions(), 2);
        assert_eq!(coordinator.stats().computations, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_cooldown_rejection_is_fatal() {
        let backend = LocalBackend::new().with_subject(SubjectId::new("u1"));
        let coordinator = coordinator(&backend);

        let result = coordinator
            .request("unregistered", json!({}), RequestOptions::default())
            .await;
        assert!(matches!(result, Err(PulseError::SubmissionFailed { .. })));
        assert_eq!(coordinator.stats().submit_attempts, 1);
    }
}
