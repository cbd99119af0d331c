//! Publish job storage.
//!
//! ## Design
//!
//! - The store is the only shared resource between queue passes; all
//!   coordination happens through row status transitions
//! - `claim_job` is a conditional update (`scheduled` → `processing`), so two
//!   overlapping passes can never both own a job
//! - Delivery status records are append-only per attempt
//!
//! ## Implementations
//!
//! - `InMemoryPublishStore`: tests/dev
//! - `PgPublishStore`: Postgres via sqlx

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use jbsaas_core::{DeliveryRecordId, JobId};
use jbsaas_publishing::{
    AttemptOutcome, DeliveryStatusRecord, DestinationAccount, JobResolution, JobStatus, PostContent,
    PublishJob, RetryPolicy,
};

pub use in_memory::InMemoryPublishStore;
pub use postgres::PgPublishStore;

/// A due job joined with everything needed to publish it.
#[derive(Debug, Clone, PartialEq)]
pub struct DueJob {
    pub job: PublishJob,
    pub post: PostContent,
    pub account: DestinationAccount,
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("delivery record not found: {0}")]
    RecordNotFound(DeliveryRecordId),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Decode(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Job counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub scheduled: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus) {
        match status {
            JobStatus::Scheduled => self.scheduled += 1,
            JobStatus::Processing => self.processing += 1,
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
        }
    }
}

/// Publish job store abstraction.
#[async_trait]
pub trait PublishStore: Send + Sync {
    /// Jobs that are scheduled, due at `now` and still have attempts left,
    /// joined with their post and destination account. Read-only.
    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
        limit: usize,
    ) -> Result<Vec<DueJob>, StoreError>;

    /// Atomically move a job from `scheduled` to `processing` and bump its
    /// attempt count.
    ///
    /// Returns the new attempt count, or `None` when the job was no longer
    /// claimable (another pass claimed it, or it ran out of attempts).
    async fn claim_job(
        &self,
        job_id: JobId,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError>;

    /// Insert the `processing` delivery record for a new attempt.
    async fn open_attempt(&self, record: &DeliveryStatusRecord) -> Result<(), StoreError>;

    /// Close an open delivery record. Closed records are never rewritten.
    async fn close_attempt(
        &self,
        record_id: DeliveryRecordId,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Write the terminal decision for a `processing` job.
    async fn resolve_job(
        &self,
        job_id: JobId,
        resolution: &JobResolution,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Get a job by ID.
    async fn get_job(&self, job_id: JobId) -> Result<Option<PublishJob>, StoreError>;

    /// List jobs, most recently updated first.
    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<PublishJob>, StoreError>;

    /// Delivery records of a job, oldest attempt first.
    async fn attempts_for(&self, job_id: JobId) -> Result<Vec<DeliveryStatusRecord>, StoreError>;

    /// Move a failed job back to `scheduled` with a fresh attempt budget.
    async fn requeue_failed(
        &self,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<PublishJob, StoreError>;

    /// Get job statistics.
    async fn stats(&self) -> Result<JobStats, StoreError>;
}

#[async_trait]
impl<S> PublishStore for Arc<S>
where
    S: PublishStore + ?Sized,
{
    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
        limit: usize,
    ) -> Result<Vec<DueJob>, StoreError> {
        (**self).due_jobs(now, policy, limit).await
    }

    async fn claim_job(
        &self,
        job_id: JobId,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        (**self).claim_job(job_id, policy, now).await
    }

    async fn open_attempt(&self, record: &DeliveryStatusRecord) -> Result<(), StoreError> {
        (**self).open_attempt(record).await
    }

    async fn close_attempt(
        &self,
        record_id: DeliveryRecordId,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).close_attempt(record_id, outcome, now).await
    }

    async fn resolve_job(
        &self,
        job_id: JobId,
        resolution: &JobResolution,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).resolve_job(job_id, resolution, now).await
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<PublishJob>, StoreError> {
        (**self).get_job(job_id).await
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<PublishJob>, StoreError> {
        (**self).list_jobs(status, limit).await
    }

    async fn attempts_for(&self, job_id: JobId) -> Result<Vec<DeliveryStatusRecord>, StoreError> {
        (**self).attempts_for(job_id).await
    }

    async fn requeue_failed(
        &self,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<PublishJob, StoreError> {
        (**self).requeue_failed(job_id, now).await
    }

    async fn stats(&self) -> Result<JobStats, StoreError> {
        (**self).stats().await
    }
}
