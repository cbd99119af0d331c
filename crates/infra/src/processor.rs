//! Publishing queue processor.
//!
//! One call to [`QueueProcessor::run_once`] is one pass over the queue:
//!
//! ```text
//! due_jobs ──▶ for each job:
//!                claim ─▶ open attempt ─▶ dispatch ─▶ close attempt + resolve job
//! ```
//!
//! ## Guarantees
//!
//! - A failed queue read aborts the pass before any job is touched
//! - Jobs are processed sequentially; a failure, timeout or panic in one job
//!   never stops the rest of the batch
//! - Every claimed job gets exactly one resolution, so none is left in
//!   `processing` when the pass returns (unless the store itself rejects the
//!   write, which is logged and reported)
//! - The reported result follows the job row: a delivery record that cannot
//!   be closed is logged, but the job is still reported by its resolution
//! - If the delivery record cannot be opened the attempt still counts, so a
//!   job on its last attempt can end `failed` with no record for that attempt
//! - A job whose claim loses to another pass is skipped and not reported

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn, Span};

use jbsaas_core::JobId;
use jbsaas_publishing::{
    AttemptOutcome, DeliveryStatusRecord, JobResolution, Platform, PublishReceipt, RetryPolicy,
};

use crate::platforms::{PublishError, PublishRequest, Publishers};
use crate::store::{DueJob, PublishStore, StoreError};

/// Processor configuration.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Upper bound on a single publish, including every HTTP step
    pub publish_timeout: Duration,
    /// Maximum number of jobs read per pass
    pub batch_limit: usize,
    pub retry: RetryPolicy,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(30),
            batch_limit: 50,
            retry: RetryPolicy::default(),
        }
    }
}

impl ProcessorConfig {
    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn with_batch_limit(mut self, limit: usize) -> Self {
        self.batch_limit = limit;
        self
    }
}

/// Batch-fatal processor error.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to read publishing queue: {0}")]
    QueueRead(#[source] StoreError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Success,
    Error,
}

/// Per-job line of a pass summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job_id: JobId,
    pub status: ReportStatus,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub will_retry: Option<bool>,
}

impl JobReport {
    fn success(job_id: JobId, platform: String) -> Self {
        Self {
            job_id,
            status: ReportStatus::Success,
            platform,
            error: None,
            will_retry: None,
        }
    }

    fn failure(job_id: JobId, platform: String, error: String, will_retry: Option<bool>) -> Self {
        Self {
            job_id,
            status: ReportStatus::Error,
            platform,
            error: Some(error),
            will_retry,
        }
    }
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub processed: usize,
    pub results: Vec<JobReport>,
}

impl ProcessSummary {
    fn new(results: Vec<JobReport>) -> Self {
        Self {
            processed: results.len(),
            results,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ReportStatus::Success)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.processed - self.succeeded()
    }

    pub fn message(&self) -> String {
        if self.processed == 0 {
            "No jobs to process".to_string()
        } else {
            format!(
                "Processed {} jobs: {} succeeded, {} failed",
                self.processed,
                self.succeeded(),
                self.failed()
            )
        }
    }
}

/// Sequential queue processor over a [`PublishStore`].
#[derive(Debug)]
pub struct QueueProcessor<S: PublishStore> {
    store: S,
    publishers: Publishers,
    config: ProcessorConfig,
}

impl<S: PublishStore> QueueProcessor<S> {
    pub fn new(store: S, publishers: Publishers, config: ProcessorConfig) -> Self {
        Self {
            store,
            publishers,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run one pass over every job due at `now`.
    #[instrument(
        skip(self),
        fields(due = tracing::field::Empty, succeeded = tracing::field::Empty),
        err
    )]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ProcessSummary, ProcessError> {
        let batch = self
            .store
            .due_jobs(now, &self.config.retry, self.config.batch_limit)
            .await
            .map_err(ProcessError::QueueRead)?;

        let span = Span::current();
        span.record("due", batch.len());

        let mut results = Vec::with_capacity(batch.len());
        for due in batch {
            if let Some(report) = self.process_job(due).await {
                results.push(report);
            }
        }

        let summary = ProcessSummary::new(results);
        span.record("succeeded", summary.succeeded());
        info!(
            processed = summary.processed,
            failed = summary.failed(),
            "publishing pass finished"
        );
        Ok(summary)
    }

    async fn process_job(&self, due: DueJob) -> Option<JobReport> {
        let DueJob { job, post, account } = due;
        let job_id = job.id;
        let policy = &self.config.retry;
        let platform_label = platform_label(&account.platform);

        let attempt = match self.store.claim_job(job_id, policy, Utc::now()).await {
            Ok(Some(attempt)) => attempt,
            Ok(None) => {
                debug!(job_id = %job_id, "job already claimed by another pass; skipping");
                return None;
            }
            Err(err) => {
                error!(job_id = %job_id, error = %err, "failed to claim job");
                return Some(JobReport::failure(
                    job_id,
                    platform_label,
                    format!("failed to claim job: {err}"),
                    None,
                ));
            }
        };

        let record = DeliveryStatusRecord::open(job_id, attempt, Utc::now());
        if let Err(err) = self.store.open_attempt(&record).await {
            let message = format!("failed to record attempt: {err}");
            error!(job_id = %job_id, attempt, error = %err, "failed to open delivery record");
            let resolution = JobResolution::after_failure(policy, attempt, &message, true);
            let will_retry = resolution.will_retry();
            if let Err(err) = self.store.resolve_job(job_id, &resolution, Utc::now()).await {
                error!(job_id = %job_id, error = %err, "failed to resolve job");
            }
            return Some(JobReport::failure(
                job_id,
                platform_label,
                message,
                Some(will_retry),
            ));
        }

        let request = PublishRequest::new(&post, &account);
        let result = self.dispatch(&account.platform, request).await;

        let (outcome, resolution) = match result {
            Ok(receipt) => (
                AttemptOutcome::from_receipt(&receipt),
                JobResolution::Completed {
                    published_post_id: receipt.external_post_id,
                },
            ),
            Err(err) => (
                AttemptOutcome::Error {
                    message: err.to_string(),
                },
                JobResolution::after_failure(policy, attempt, err.to_string(), err.is_retryable()),
            ),
        };

        if let Err(err) = self.store.close_attempt(record.id, &outcome, Utc::now()).await {
            error!(
                job_id = %job_id,
                attempt,
                record_id = %record.id,
                error = %err,
                "failed to close delivery record"
            );
        }

        if let Err(err) = self.store.resolve_job(job_id, &resolution, Utc::now()).await {
            error!(job_id = %job_id, attempt, error = %err, "failed to resolve job");
            return Some(JobReport::failure(
                job_id,
                platform_label,
                format!("failed to record outcome: {err}"),
                None,
            ));
        }

        let will_retry = resolution.will_retry();
        Some(match resolution {
            JobResolution::Completed { published_post_id } => {
                info!(
                    job_id = %job_id,
                    platform = %platform_label,
                    attempt,
                    external_post_id = %published_post_id,
                    "post published"
                );
                JobReport::success(job_id, platform_label)
            }
            JobResolution::Rescheduled { error } | JobResolution::Failed { error } => {
                warn!(
                    job_id = %job_id,
                    platform = %platform_label,
                    attempt,
                    will_retry,
                    error = %error,
                    "publish failed"
                );
                JobReport::failure(job_id, platform_label, error, Some(will_retry))
            }
        })
    }

    /// Route to the platform's publisher, isolated in its own task so a
    /// panic or hang stays inside this job.
    async fn dispatch(
        &self,
        platform_tag: &str,
        request: PublishRequest,
    ) -> Result<PublishReceipt, PublishError> {
        let platform: Platform = platform_tag
            .parse()
            .map_err(|_| PublishError::UnsupportedPlatform(platform_tag.to_string()))?;

        let publishers = self.publishers.clone();
        let mut task = tokio::spawn(async move { publishers.publish(platform, &request).await });

        match tokio::time::timeout(self.config.publish_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(PublishError::Panicked(panic_message(join_err))),
            Err(_) => {
                task.abort();
                Err(PublishError::Timeout)
            }
        }
    }
}

/// Canonical tag for known platforms, the stored tag otherwise.
fn platform_label(tag: &str) -> String {
    tag.parse::<Platform>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|_| tag.to_string())
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "publisher task was cancelled".to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
