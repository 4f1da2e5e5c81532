use crate::consts::{INTAKE_MAX_ATTEMPTS, INTAKE_RETRY_BASE_MILLIS, SEEN_EVENT_WINDOW};
use crate::reconciler::{handle_event, Reconciled};
use crate::store::EventStore;
use crate::telnyx_types::WebhookEnvelope;

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// A verified webhook delivery waiting to be applied to the store.
#[derive(Debug, Clone)]
pub struct IntakeJob {
    pub job_id: Uuid,
    pub envelope: WebhookEnvelope,
    pub attempt: u32,
}

impl IntakeJob {
    pub fn new(envelope: WebhookEnvelope) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            envelope,
            attempt: 1,
        }
    }

    /// Provider event id; redeliveries of one event share it.
    fn idempotency_key(&self) -> Option<&str> {
        self.envelope.data.id.as_deref()
    }
}

/// Bounded memory of event ids that were already applied, plus the ids whose retry is
/// still waiting in the queue.
pub struct SeenEvents {
    capacity: usize,
    order: VecDeque<String>,
    ids: HashSet<String>,
    retrying: HashSet<String>,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
            retrying: HashSet::new(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn is_retrying(&self, id: &str) -> bool {
        self.retrying.contains(id)
    }

    pub fn mark_retrying(&mut self, id: &str) {
        self.retrying.insert(id.to_string());
    }

    pub fn clear_retrying(&mut self, id: &str) {
        self.retrying.remove(id);
    }

    /// Remembers `id`, forgetting the oldest one once the window is full.
    pub fn insert(&mut self, id: &str) {
        self.retrying.remove(id);
        if self.capacity == 0 || !self.ids.insert(id.to_string()) {
            return;
        }
        self.order.push_back(id.to_string());
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Applied(Reconciled),
    Duplicate,
    Dropped,
    Retry(Duration),
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(INTAKE_RETRY_BASE_MILLIS << attempt.saturating_sub(1).min(10))
}

/// Runs one job against the store. Failures are logged here and never reach the provider.
/// A fresh delivery of an event whose retry is already queued counts as a duplicate; the queued
/// retry owns that event until it is applied or dropped.
pub async fn process_job(
    store: &dyn EventStore,
    seen: &mut SeenEvents,
    job: &IntakeJob,
) -> JobOutcome {
    if let Some(key) = job.idempotency_key() {
        if seen.contains(key) {
            debug!(event_id = key, job_id=%job.job_id, "already processed; skipping redelivery");
            return JobOutcome::Duplicate;
        }
        if job.attempt == 1 && seen.is_retrying(key) {
            debug!(event_id = key, job_id=%job.job_id, "retry pending; skipping redelivery");
            return JobOutcome::Duplicate;
        }
    }

    match handle_event(store, &job.envelope).await {
        Ok(reconciled) => {
            if let Some(key) = job.idempotency_key() {
                seen.insert(key);
            }
            debug!(job_id=%job.job_id, outcome=?reconciled, "webhook event applied");
            JobOutcome::Applied(reconciled)
        }
        Err(e) if e.is_retryable() && job.attempt < INTAKE_MAX_ATTEMPTS => {
            let delay = backoff(job.attempt);
            if let Some(key) = job.idempotency_key() {
                seen.mark_retrying(key);
            }
            warn!(error=%e, job_id=%job.job_id, attempt = job.attempt, ?delay, "webhook event failed; retrying");
            JobOutcome::Retry(delay)
        }
        Err(e) => {
            if let Some(key) = job.idempotency_key() {
                seen.clear_retrying(key);
            }
            error!(error=%e, job_id=%job.job_id, attempt = job.attempt, event_type=%job.envelope.data.event_type, "dropping webhook event");
            JobOutcome::Dropped
        }
    }
}

/// Task that drains the intake queue for the life of the process. Retries are re-queued after
/// their backoff so one slow event does not hold up the rest.
pub async fn process_webhook_events(
    mut intake_stream: mpsc::Receiver<IntakeJob>,
    intake_sink: mpsc::Sender<IntakeJob>,
    store: Arc<dyn EventStore>,
) {
    let mut seen = SeenEvents::new(SEEN_EVENT_WINDOW);
    while let Some(job) = intake_stream.recv().await {
        if let JobOutcome::Retry(delay) = process_job(store.as_ref(), &mut seen, &job).await {
            let sink = intake_sink.clone();
            let retry = IntakeJob {
                attempt: job.attempt + 1,
                ..job
            };
            tokio::spawn(async move {
                sleep(delay).await;
                if sink.send(retry).await.is_err() {
                    error!("intake queue closed before retry could be queued");
                }
            });
        }
    }
    debug!("intake queue closed");
}
