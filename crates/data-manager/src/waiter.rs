//! Job completion waiter
//!
//! Races a push subscription against exponential-backoff polling, under an
//! overall deadline. All three paths report into one [`Settlement`]; the first
//! report wins and later ones are ignored.

use crate::backend::{ChannelEvent, JobBackend};
use crate::backoff::Backoff;
use parking_lot::Mutex;
use pulse_shared::{JobId, JobSnapshot, JobStatus, PulseError, PulseResult};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinSet;

/// Single-resolution slot shared by competing producers
pub struct Settlement<T> {
    sender: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Settlement<T> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<T> Settlement<T> {
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                sender: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Resolve with `value`; returns false if already settled
    pub fn settle(&self, value: T) -> bool {
        match self.sender.lock().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.sender.lock().is_none()
    }
}

/// Outcome carried by a status row, if it is terminal
pub fn terminal_outcome(job_id: &JobId, snapshot: JobSnapshot) -> Option<PulseResult<Value>> {
    match snapshot.status {
        JobStatus::Done => Some(Ok(snapshot.result.unwrap_or(Value::Null))),
        JobStatus::Error => Some(Err(PulseError::JobFailed {
            job_id: job_id.to_string(),
            payload: snapshot
                .error
                .unwrap_or_else(|| Value::String("job error".to_string())),
        })),
        JobStatus::Pending | JobStatus::Unknown => None,
    }
}

/// Waits for backend jobs to reach a terminal status
#[derive(Clone)]
pub struct CompletionWaiter {
    backend: Arc<dyn JobBackend>,
    poll: Backoff,
}

impl CompletionWaiter {
    pub fn new(backend: Arc<dyn JobBackend>, poll: Backoff) -> Self {
        Self { backend, poll }
    }

    /// Resolve with the job result, `JobFailed`, or `Timeout` after `timeout`
    pub async fn wait(&self, job_id: &JobId, timeout: Duration) -> PulseResult<Value> {
        let (settlement, outcome) = Settlement::new();
        let start_polling = Arc::new(Notify::new());
        let mut tasks = JoinSet::new();

        tasks.spawn(push_task(
            Arc::clone(&self.backend),
            job_id.clone(),
            settlement.clone(),
            Arc::clone(&start_polling),
        ));
        tasks.spawn(poll_task(
            Arc::clone(&self.backend),
            job_id.clone(),
            settlement.clone(),
            start_polling,
            self.poll,
        ));
        tasks.spawn(deadline_task(
            Arc::clone(&self.backend),
            job_id.clone(),
            settlement,
            timeout,
        ));

        let result = outcome.await.unwrap_or_else(|_| {
            Err(PulseError::Internal {
                message: format!("waiter for job {} stopped without a result", job_id),
            })
        });

        // Releases the subscription and timers
        tasks.shutdown().await;

        match &result {
            Ok(_) => log::debug!("Job {} completed", job_id),
            Err(e) => log::debug!("Job {} settled with error: {}", job_id, e),
        }
        result
    }
}

/// One status read; `None` while the job is not terminal or unreadable
async fn check_once(backend: &dyn JobBackend, job_id: &JobId) -> Option<PulseResult<Value>> {
    match backend.job_status(job_id).await {
        Ok(Some(snapshot)) => terminal_outcome(job_id, snapshot),
        Ok(None) => None,
        Err(e) => {
            log::debug!("Status check for job {} failed: {}", job_id, e);
            None
        }
    }
}

async fn push_task(
    backend: Arc<dyn JobBackend>,
    job_id: JobId,
    settlement: Settlement<PulseResult<Value>>,
    start_polling: Arc<Notify>,
) {
    let mut subscription = match backend.subscribe_job(&job_id).await {
        Ok(subscription) => subscription,
        Err(e) => {
            log::warn!("Realtime unavailable for job {}, polling only: {}", job_id, e);
            start_polling.notify_one();
            return;
        }
    };

    while let Some(event) = subscription.next_event().await {
        match event {
            ChannelEvent::Update(snapshot) => {
                if let Some(outcome) = terminal_outcome(&job_id, snapshot) {
                    settlement.settle(outcome);
                    return;
                }
            }
            lifecycle => {
                // The job may have finished before the channel was live
                if let Some(outcome) = check_once(backend.as_ref(), &job_id).await {
                    settlement.settle(outcome);
                    return;
                }
                if let ChannelEvent::ChannelError(reason) = &lifecycle {
                    log::debug!("Channel error for job {}: {}", job_id, reason);
                }
                start_polling.notify_one();
                if lifecycle == ChannelEvent::Closed {
                    return;
                }
            }
        }
    }

    start_polling.notify_one();
}

async fn poll_task(
    backend: Arc<dyn JobBackend>,
    job_id: JobId,
    settlement: Settlement<PulseResult<Value>>,
    start_polling: Arc<Notify>,
    policy: Backoff,
) {
    start_polling.notified().await;

    for delay in policy.delays() {
        tokio::time::sleep(delay).await;
        if settlement.is_settled() {
            return;
        }
        if let Some(outcome) = check_once(backend.as_ref(), &job_id).await {
            settlement.settle(outcome);
            return;
        }
    }
}

async fn deadline_task(
    backend: Arc<dyn JobBackend>,
    job_id: JobId,
    settlement: Settlement<PulseResult<Value>>,
    timeout: Duration,
) {
    tokio::time::sleep(timeout).await;

    let outcome = check_once(backend.as_ref(), &job_id)
        .await
        .unwrap_or_else(|| {
            Err(PulseError::Timeout {
                job_id: job_id.to_string(),
                duration_ms: timeout.as_millis() as u64,
            })
        });
    if !settlement.settle(outcome) {
        log::debug!("Deadline for job {} passed after settlement", job_id);
    }
}
