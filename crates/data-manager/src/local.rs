//! In-process job processor
//!
//! Runs registered handlers on the tokio runtime after a configurable
//! latency, enforces a server-side cooldown per (kind, params) and pushes
//! status changes to subscribers. Used for demos, offline mode and tests.

use crate::backend::{BackendError, ChannelEvent, JobBackend, JobSubscription};
use crate::fingerprint::canonical_params;
use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_shared::{JobId, JobSnapshot, SubjectId};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Computes a job result from its parameters; `Err` becomes the error payload
pub type JobHandler = Arc<dyn Fn(&Value) -> Result<Value, Value> + Send + Sync>;

/// How subscriptions behave
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// Acknowledge and deliver every status change
    Deliver,
    /// Acknowledge but never deliver changes, leaving completion to polling
    Silent,
    /// Fail to subscribe
    Refuse,
}

struct Watcher {
    id: u64,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

struct LocalInner {
    subject: Mutex<Option<SubjectId>>,
    handlers: Mutex<HashMap<String, JobHandler>>,
    latency: Mutex<Duration>,
    cooldown: Mutex<Duration>,
    push_mode: Mutex<PushMode>,
    jobs: Mutex<HashMap<JobId, JobSnapshot>>,
    watchers: Mutex<HashMap<JobId, Vec<Watcher>>>,
    last_accepted: Mutex<HashMap<String, Instant>>,
    scripted: Mutex<VecDeque<BackendError>>,
    next_id: AtomicU64,
    submissions: AtomicUsize,
    status_checks: AtomicUsize,
    unsubscribes: AtomicUsize,
}

/// In-process [`JobBackend`]
#[derive(Clone)]
pub struct LocalBackend {
    inner: Arc<LocalInner>,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(LocalInner {
                subject: Mutex::new(None),
                handlers: Mutex::new(HashMap::new()),
                latency: Mutex::new(Duration::ZERO),
                cooldown: Mutex::new(Duration::ZERO),
                push_mode: Mutex::new(PushMode::Deliver),
                jobs: Mutex::new(HashMap::new()),
                watchers: Mutex::new(HashMap::new()),
                last_accepted: Mutex::new(HashMap::new()),
                scripted: Mutex::new(VecDeque::new()),
                next_id: AtomicU64::new(1),
                submissions: AtomicUsize::new(0),
                status_checks: AtomicUsize::new(0),
                unsubscribes: AtomicUsize::new(0),
            }),
        }
    }

    pub fn with_subject(self, subject: SubjectId) -> Self {
        self.set_subject(Some(subject));
        self
    }

    pub fn with_handler<F>(self, kind: &str, handler: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, Value> + Send + Sync + 'static,
    {
        self.register(kind, handler);
        self
    }

    /// Processing time of every job
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock() = latency;
        self
    }

    /// Minimum spacing between accepted submissions of the same request
    pub fn with_cooldown(self, cooldown: Duration) -> Self {
        *self.inner.cooldown.lock() = cooldown;
        self
    }

    pub fn with_push_mode(self, mode: PushMode) -> Self {
        *self.inner.push_mode.lock() = mode;
        self
    }

    pub fn set_subject(&self, subject: Option<SubjectId>) {
        *self.inner.subject.lock() = subject;
    }

    pub fn register<F>(&self, kind: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, Value> + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .lock()
            .insert(kind.to_string(), Arc::new(handler));
    }

    /// Fail the next submission with `error`, ahead of any other check
    pub fn reject_next(&self, error: BackendError) {
        self.inner.scripted.lock().push_back(error);
    }

    /// Seed a job row, e.g. one left behind by an earlier session
    pub fn insert_job(&self, job_id: JobId, snapshot: JobSnapshot) {
        self.inner.jobs.lock().insert(job_id, snapshot);
    }

    /// Move a job to `snapshot` and notify its subscribers
    pub fn update_job(&self, job_id: &JobId, snapshot: JobSnapshot) {
        self.inner.update(job_id, snapshot);
    }

    /// Accepted submissions so far
    pub fn submissions(&self) -> usize {
        self.inner.submissions.load(Ordering::SeqCst)
    }

    pub fn status_checks(&self) -> usize {
        self.inner.status_checks.load(Ordering::SeqCst)
    }

    /// Subscriptions currently open
    pub fn active_subscriptions(&self) -> usize {
        self.inner.watchers.lock().values().map(Vec::len).sum()
    }

    pub fn unsubscribes(&self) -> usize {
        self.inner.unsubscribes.load(Ordering::SeqCst)
    }

    pub fn job(&self, job_id: &JobId) -> Option<JobSnapshot> {
        self.inner.jobs.lock().get(job_id).cloned()
    }
}

impl LocalInner {
    fn update(&self, job_id: &JobId, snapshot: JobSnapshot) {
        self.jobs.lock().insert(job_id.clone(), snapshot.clone());

        if *self.push_mode.lock() != PushMode::Deliver {
            return;
        }
        if let Some(watchers) = self.watchers.lock().get(job_id) {
            for watcher in watchers {
                let _ = watcher.events.send(ChannelEvent::Update(snapshot.clone()));
            }
        }
    }

    fn unsubscribe(&self, job_id: &JobId, watcher_id: u64) {
        let mut watchers = self.watchers.lock();
        if let Some(list) = watchers.get_mut(job_id) {
            list.retain(|w| w.id != watcher_id);
            if list.is_empty() {
                watchers.remove(job_id);
            }
        }
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
    }

    fn check_cooldown(&self, kind: &str, params: &Value) -> Result<(), BackendError> {
        let cooldown = *self.cooldown.lock();
        let key = format!("{}:{}", kind, canonical_params(params));
        let now = Instant::now();

        let mut last = self.last_accepted.lock();
        if let Some(previous) = last.get(&key) {
            if now < *previous + cooldown {
                return Err(BackendError::Cooldown {
                    message: format!("cooldown active for {}", kind),
                });
            }
        }
        last.insert(key, now);
        Ok(())
    }
}

#[async_trait]
impl JobBackend for LocalBackend {
    async fn current_subject(&self) -> Option<SubjectId> {
        self.inner.subject.lock().clone()
    }

    async fn submit_job(&self, kind: &str, params: &Value) -> Result<JobId, BackendError> {
        if let Some(error) = self.inner.scripted.lock().pop_front() {
            return Err(error);
        }

        let handler = self.inner.handlers.lock().get(kind).cloned().ok_or_else(|| {
            BackendError::Rejected {
                code: "unknown_kind".to_string(),
                message: format!("no handler for {}", kind),
            }
        })?;
        self.inner.check_cooldown(kind, params)?;

        let job_id = JobId::new(format!(
            "job-{}",
            self.inner.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        self.inner
            .jobs
            .lock()
            .insert(job_id.clone(), JobSnapshot::pending());
        self.inner.submissions.fetch_add(1, Ordering::SeqCst);
        log::debug!("Local backend accepted {} as {}", kind, job_id);

        let inner = Arc::clone(&self.inner);
        let latency = *self.inner.latency.lock();
        let params = params.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            let snapshot = match handler(&params) {
                Ok(result) => JobSnapshot::done(result),
                Err(error) => JobSnapshot::failed(error),
            };
            inner.update(&id, snapshot);
        });

        Ok(job_id)
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, BackendError> {
        self.inner.status_checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.inner.jobs.lock().get(job_id).cloned())
    }

    async fn subscribe_job(&self, job_id: &JobId) -> Result<JobSubscription, BackendError> {
        if *self.inner.push_mode.lock() == PushMode::Refuse {
            return Err(BackendError::Transport("realtime unavailable".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let watcher_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(ChannelEvent::Subscribed);
        self.inner
            .watchers
            .lock()
            .entry(job_id.clone())
            .or_default()
            .push(Watcher {
                id: watcher_id,
                events: tx,
            });

        let inner = Arc::clone(&self.inner);
        let id = job_id.clone();
        Ok(JobSubscription::new(rx, move || {
            inner.unsubscribe(&id, watcher_id)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn test_job_runs_after_latency() {
        let backend = LocalBackend::new()
            .with_latency(Duration::from_millis(500))
            .with_handler("echo", |params| Ok(params.clone()));

        let id = backend.submit_job("echo", &json!({"a": 1})).await.unwrap();
        assert_eq!(backend.job(&id), Some(JobSnapshot::pending()));

        tokio::time::sleep(Duration::from_millis(501)).await;
        assert_eq!(backend.job(&id), Some(JobSnapshot::done(json!({"a": 1}))));
        assert_eq!(backend.submissions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_cooldown() {
        let backend = LocalBackend::new()
            .with_cooldown(Duration::from_secs(2))
            .with_handler("k", |_| Ok(json!(1)));

        backend.submit_job("k", &json!({})).await.unwrap();
        let err = backend.submit_job("k", &json!({})).await.unwrap_err();
        assert!(err.is_cooldown());

        // Other parameters are not affected
        backend.submit_job("k", &json!({"x": 1})).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        backend.submit_job("k", &json!({})).await.unwrap();
        assert_eq!(backend.submissions(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_receives_updates() {
        let backend = LocalBackend::new().with_handler("k", |_| Err(json!("bad input")));
        let id = JobId::new("seeded");
        backend.insert_job(id.clone(), JobSnapshot::pending());

        let mut subscription = backend.subscribe_job(&id).await.unwrap();
        assert_eq!(subscription.next_event().await, Some(ChannelEvent::Subscribed));
        assert_eq!(backend.active_subscriptions(), 1);

        backend.update_job(&id, JobSnapshot::done(json!(9)));
        assert_eq!(
            subscription.next_event().await,
            Some(ChannelEvent::Update(JobSnapshot::done(json!(9))))
        );

        drop(subscription);
        assert_eq!(backend.active_subscriptions(), 0);
        assert_eq!(backend.unsubscribes(), 1);
    }

    #[tokio::test]
    async fn test_refused_push_and_scripted_rejection() {
        let backend = LocalBackend::new()
            .with_push_mode(PushMode::Refuse)
            .with_handler("k", |_| Ok(json!(1)));
        assert!(backend.subscribe_job(&JobId::new("x")).await.is_err());

        backend.reject_next(BackendError::Transport("offline".into()));
        assert_eq!(
            backend.submit_job("k", &json!({})).await,
            Err(BackendError::Transport("offline".into()))
        );
        assert!(backend.submit_job("k", &json!({})).await.is_ok());
        assert_eq!(backend.job_status(&JobId::new("nope")).await, Ok(None));
    }
}
