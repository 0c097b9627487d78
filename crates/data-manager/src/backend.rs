//! Interface to the backend job processor

use async_trait::async_trait;
use pulse_shared::{JobId, JobSnapshot, PulseError, SubjectId};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by a job backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// Server-side rate limit for this request; safe to retry later
    #[error("Rejected by cooldown: {message}")]
    Cooldown { message: String },

    #[error("Backend rejected request ({code}): {message}")]
    Rejected { code: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed backend response: {0}")]
    Decode(String),
}

impl BackendError {
    pub fn is_cooldown(&self) -> bool {
        matches!(self, BackendError::Cooldown { .. })
    }
}

impl From<BackendError> for PulseError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Transport(message) => PulseError::Network { message },
            BackendError::Decode(message) => PulseError::DataParse { message },
            other => PulseError::SubmissionFailed {
                message: other.to_string(),
            },
        }
    }
}

/// Lifecycle and payload events of one job subscription
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The backend acknowledged the subscription
    Subscribed,
    ChannelError(String),
    /// No acknowledgment arrived in time
    TimedOut,
    Closed,
    /// The job row changed
    Update(JobSnapshot),
}

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// Live subscription to status changes of one job
///
/// Dropping the subscription releases it on the backend exactly once.
pub struct JobSubscription {
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    unsubscribe: Option<Unsubscribe>,
}

impl JobSubscription {
    pub fn new<F>(events: mpsc::UnboundedReceiver<ChannelEvent>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            events,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// Next event, or `None` once the backend side has gone away
    pub async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }
}

impl Drop for JobSubscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

/// Narrow interface of the job processor
#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Identity of the signed-in user, if any
    async fn current_subject(&self) -> Option<SubjectId>;

    /// Enqueue a job of `kind` with `params`
    async fn submit_job(&self, kind: &str, params: &Value) -> Result<JobId, BackendError>;

    /// Current status row; `None` when the backend does not know the id
    async fn job_status(&self, job_id: &JobId) -> Result<Option<JobSnapshot>, BackendError>;

    /// Subscribe to status changes of `job_id`
    async fn subscribe_job(&self, job_id: &JobId) -> Result<JobSubscription, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_subscription_unsubscribes_once_on_drop() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let counter = calls.clone();
        let mut subscription = JobSubscription::new(rx, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(ChannelEvent::Subscribed).unwrap();
        assert_eq!(subscription.next_event().await, Some(ChannelEvent::Subscribed));

        drop(tx);
        assert_eq!(subscription.next_event().await, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        drop(subscription);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_error_mapping() {
        assert!(BackendError::Cooldown {
            message: "cooldown".into()
        }
        .is_cooldown());

        let err: PulseError = BackendError::Transport("reset".into()).into();
        assert_eq!(
            err,
            PulseError::Network {
                message: "reset".into()
            }
        );

        let err: PulseError = BackendError::Rejected {
            code: "42501".into(),
            message: "denied".into(),
        }
        .into();
        assert!(matches!(err, PulseError::SubmissionFailed { .. }));
    }
}
