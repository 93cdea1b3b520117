//! C10 — Job Supervisor. The one place that touches every other component:
//! validates and admits submissions, resolves the idempotency/force-new
//! distinction, hands accepted work to the queue, and is the worker-side
//! entry point that actually drives a job through the pipeline.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::{
    AnalysisResult, ErrorKind, ErrorRecord, IdempotencyRecord, Job, JobEvent, JobStatus,
    SubmitInputs, WorkItem,
};
use crate::events::EventHub;
use crate::fingerprint;
use crate::ledger::{now_epoch_ms, FjallStore};
use crate::observability::Metrics;
use crate::pipeline::{self, PipelineContext, ProgressSink};
use crate::providers::ProviderManager;
use crate::queue::TaskBroker;
use crate::validation;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("validation failed: {0}")]
    Validation(#[from] validation::ValidationError),
    #[error("rate limit exceeded: at most {limit} force-new analyses per hour per origin")]
    ForceNewRateLimited { limit: u64 },
    #[error("job not found: {0}")]
    JobNotFound(String),
    #[error("job {0} has already reached a terminal state and cannot be cancelled")]
    AlreadyTerminal(String),
    #[error(transparent)]
    Ledger(#[from] crate::ledger::LedgerError),
    #[error(transparent)]
    Queue(#[from] crate::queue::store::QueueError),
}

/// Outcome of a submission: either a freshly admitted job, or an
/// immediately-resolved idempotent replay of a prior result.
pub enum SubmitOutcome {
    Admitted { job_id: String },
    Replayed { job_id: String, result: AnalysisResult },
}

pub struct Supervisor {
    ledger: FjallStore,
    broker: Arc<TaskBroker>,
    events: Arc<EventHub>,
    providers: Arc<ProviderManager>,
    config: Arc<Config>,
    metrics: Arc<Metrics>,
    cancel_flags: Mutex<HashMap<String, Arc<AtomicBool>>>,
    force_new_hits: Mutex<HashMap<String, Vec<i64>>>,
}

impl Supervisor {
    pub fn new(
        ledger: FjallStore,
        broker: Arc<TaskBroker>,
        events: Arc<EventHub>,
        providers: Arc<ProviderManager>,
        config: Arc<Config>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ledger,
            broker,
            events,
            providers,
            config,
            metrics,
            cancel_flags: Mutex::new(HashMap::new()),
            force_new_hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &FjallStore {
        &self.ledger
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn broker(&self) -> &TaskBroker {
        &self.broker
    }

    pub fn providers(&self) -> &ProviderManager {
        &self.providers
    }

    /// Submit a new analysis, serving a cached result if one exists for the
    /// same idempotency key (spec §4.2: identical shop_name +
    /// shop_specialization + policy_type + policy_text within the TTL
    /// window never re-runs the pipeline).
    pub async fn submit(&self, inputs: SubmitInputs) -> Result<SubmitOutcome, SupervisorError> {
        validation::validate(&inputs, &self.config.validation)?;

        let idempotency_key = fingerprint::idempotency_key(&inputs);
        let content_hash = fingerprint::content_hash(&inputs.policy_text);

        if let Some(record) = self.ledger.get_idempotent(&idempotency_key)? {
            info!(job_id = %record.job_id, "idempotent resubmission, serving cached result");
            self.metrics.cache_hit();
            return Ok(SubmitOutcome::Replayed { job_id: record.job_id, result: record.value });
        }

        let job_id = self.admit(inputs, idempotency_key, content_hash).await?;
        Ok(SubmitOutcome::Admitted { job_id })
    }

    /// Force a fresh analysis, bypassing the idempotency cache, subject to
    /// a per-origin rate limit (spec §6 "Force new analysis").
    pub async fn force_new(
        &self,
        inputs: SubmitInputs,
        origin: &str,
    ) -> Result<SubmitOutcome, SupervisorError> {
        validation::validate(&inputs, &self.config.validation)?;
        self.check_force_new_rate_limit(origin)?;

        let idempotency_key = fingerprint::idempotency_key(&inputs);
        let content_hash = fingerprint::content_hash(&inputs.policy_text);
        let job_id = self.admit(inputs, idempotency_key, content_hash).await?;
        Ok(SubmitOutcome::Admitted { job_id })
    }

    fn check_force_new_rate_limit(&self, origin: &str) -> Result<(), SupervisorError> {
        let limit = self.config.force_new.rate_limit_per_hour;
        let now = now_epoch_ms();
        let window_start = now - 3_600_000;

        let mut hits = self.force_new_hits.lock();
        let entry = hits.entry(origin.to_string()).or_default();
        entry.retain(|ts| *ts >= window_start);

        if entry.len() as u64 >= limit {
            return Err(SupervisorError::ForceNewRateLimited { limit });
        }
        entry.push(now);
        Ok(())
    }

    async fn admit(
        &self,
        inputs: SubmitInputs,
        idempotency_key: String,
        content_hash: String,
    ) -> Result<String, SupervisorError> {
        let job_id = uuid::Uuid::now_v7().to_string();
        let now = chrono::Utc::now().to_rfc3339();

        let job = Job::new(job_id.clone(), inputs.clone(), idempotency_key.clone(), content_hash.clone(), &now);
        self.ledger.upsert_job(&job)?;
        self.metrics.job_accepted();

        // Registered here, not at dequeue, so a cancel arriving while the
        // job still sits in the broker (PENDING) is observed at the job's
        // first suspension point instead of being silently dropped.
        self.cancel_flags.lock().insert(job_id.clone(), Arc::new(AtomicBool::new(false)));

        let item = WorkItem { job_id: job_id.clone(), inputs, idempotency_key, content_hash, attempt: 1 };
        self.broker.enqueue(item).await?;

        Ok(job_id)
    }

    pub fn status(&self, job_id: &str) -> Result<Job, SupervisorError> {
        self.ledger
            .get_job(job_id)?
            .ok_or_else(|| SupervisorError::JobNotFound(job_id.to_string()))
    }

    /// Request cooperative cancellation. Only Pending/Running jobs can be
    /// cancelled; the cancel flag is only consulted at stage boundaries, so
    /// cancellation never interrupts a provider call mid-flight (spec:
    /// cancellation is cooperative, not preemptive).
    pub fn cancel(&self, job_id: &str) -> Result<(), SupervisorError> {
        let job = self.status(job_id)?;
        if matches!(job.status, JobStatus::Completed | JobStatus::Failed) {
            return Err(SupervisorError::AlreadyTerminal(job_id.to_string()));
        }
        if let Some(flag) = self.cancel_flags.lock().get(job_id) {
            flag.store(true, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Run one job end to end. Called by the worker loop after dequeuing a
    /// `WorkItem`; does not return until the job reaches a terminal state.
    pub async fn run_job(&self, item: WorkItem) {
        let job_id = item.job_id.clone();
        // The flag is normally registered at admission time (`admit`); this
        // only creates a fresh one as a fallback for a job dequeued without
        // going through `admit` first (e.g. directly-constructed test work
        // items), so a missing entry never causes a panic or a lost cancel.
        let cancel = self
            .cancel_flags
            .lock()
            .entry(job_id.clone())
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();

        if let Err(err) = self.mark_running(&job_id) {
            warn!(job_id = %job_id, error = %err, "failed to mark job running");
        }

        let policy_type = item.inputs.policy_type.clone();
        let idempotency_key = item.idempotency_key.clone();
        let attempt = item.attempt;
        let retry_blueprint = item.clone();

        let ctx = PipelineContext::new(
            job_id.clone(),
            item.inputs,
            item.content_hash,
            self.providers.clone(),
            cancel,
        );
        let stages = pipeline::build_stages(&self.config.pipeline);
        let sink = SupervisorProgressSink {
            ledger: &self.ledger,
            events: &self.events,
            job_id: job_id.clone(),
        };

        let outcome = pipeline::run(
            ctx,
            &stages,
            &sink,
            &self.ledger,
            self.config.degradation.ttl_secs,
            &policy_type,
            std::time::Duration::from_secs(self.config.worker.soft_time_limit_secs),
            std::time::Duration::from_secs(self.config.worker.hard_time_limit_secs),
        )
        .await;

        match outcome {
            Ok(result) => self.finish_success(&job_id, &idempotency_key, result).await,
            Err(error) if error.kind.retryable() && attempt < self.config.worker.max_retries => {
                self.schedule_retry(retry_blueprint, attempt, error).await;
            }
            Err(error) => self.finish_failure(&job_id, error).await,
        }

        self.cancel_flags.lock().remove(&job_id);
        self.events.retire(&job_id);
    }

    /// Re-enqueue a task whose classified error is retryable and hasn't yet
    /// exhausted `worker.max_retries`, after an exponential backoff from
    /// `worker.retry_backoff_secs` (spec §5 Retry policy). The pipeline runs
    /// fully from scratch on the next attempt — there is no partial-stage
    /// resume, matching the at-least-once rather than exactly-once contract.
    async fn schedule_retry(&self, mut item: WorkItem, prior_attempt: u32, error: ErrorRecord) {
        item.attempt = prior_attempt + 1;
        let backoff = self.config.worker.retry_backoff_secs.saturating_mul(1u64 << prior_attempt.min(16));
        let job_id = item.job_id.clone();

        info!(
            job_id = %job_id,
            attempt = item.attempt,
            backoff_secs = backoff,
            error = %error.message,
            "retryable task failure, scheduling broker retry"
        );

        if let Ok(Some(mut job)) = self.ledger.get_job(&job_id) {
            job.status = JobStatus::Pending;
            job.progress_message = format!("retry_scheduled:{}", item.attempt);
            job.updated_at = chrono::Utc::now().to_rfc3339();
            if let Err(err) = self.ledger.upsert_job(&job) {
                warn!(job_id = %job_id, error = %err, "failed to persist retry-pending job state");
            }
        }

        let broker = self.broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(backoff)).await;
            if let Err(err) = broker.enqueue(item).await {
                warn!(job_id = %job_id, error = %err, "failed to re-enqueue retried task");
            }
        });
    }

    fn mark_running(&self, job_id: &str) -> Result<(), crate::ledger::LedgerError> {
        if let Some(mut job) = self.ledger.get_job(job_id)? {
            job.status = JobStatus::Running;
            job.updated_at = chrono::Utc::now().to_rfc3339();
            self.ledger.upsert_job(&job)?;
        }
        Ok(())
    }

    async fn finish_success(&self, job_id: &str, idempotency_key: &str, result: AnalysisResult) {
        self.metrics.job_completed();
        if let Ok(Some(mut job)) = self.ledger.get_job(job_id) {
            job.status = JobStatus::Completed;
            job.result = Some(result.clone());
            job.progress_message = "completed".to_string();
            job.current_stage = job.total_stages;
            job.updated_at = chrono::Utc::now().to_rfc3339();
            if let Err(err) = self.ledger.upsert_job(&job) {
                warn!(job_id, error = %err, "failed to persist completed job");
            }
        }

        let record = IdempotencyRecord {
            key: idempotency_key.to_string(),
            value: result.clone(),
            job_id: job_id.to_string(),
            expires_at_epoch_ms: now_epoch_ms() + self.config.idempotency.ttl_secs as i64 * 1000,
        };
        if let Err(err) = self.ledger.remember_idempotency(&record) {
            warn!(job_id, error = %err, "failed to cache idempotency record");
        }

        self.events.publish(job_id, JobEvent::Completed { result });
    }

    async fn finish_failure(&self, job_id: &str, error: ErrorRecord) {
        self.metrics.job_failed();

        if let Ok(Some(mut job)) = self.ledger.get_job(job_id) {
            job.status = JobStatus::Failed;
            job.error = Some(error.clone());
            job.progress_message = "failed".to_string();
            job.completed_stages = error.completed_stages.clone();
            job.updated_at = chrono::Utc::now().to_rfc3339();
            if let Err(err) = self.ledger.upsert_job(&job) {
                warn!(job_id, error = %err, "failed to persist failed job");
            }
        }

        self.events.publish(job_id, JobEvent::Failed { error });
    }
}

struct SupervisorProgressSink<'a> {
    ledger: &'a FjallStore,
    events: &'a EventHub,
    job_id: String,
}

#[async_trait]
impl<'a> ProgressSink for SupervisorProgressSink<'a> {
    async fn on_progress(&self, current: u32, total: u32, status: &str) {
        if let Ok(Some(mut job)) = self.ledger.get_job(&self.job_id) {
            job.current_stage = current;
            job.progress_message = status.to_string();
            job.updated_at = chrono::Utc::now().to_rfc3339();
            let _ = self.ledger.upsert_job(&job);
        }

        self.events.publish(
            &self.job_id,
            JobEvent::Progress { current, total, status: status.to_string(), shop_name: None },
        );
    }
}
