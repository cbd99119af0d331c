//! Publish job lifecycle.
//!
//! ```text
//! scheduled ──claim──▶ processing ──▶ completed
//!     ▲                    │
//!     └──── retry left ────┤
//!                          └──▶ failed
//! ```

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jbsaas_core::{AccountId, DomainError, DomainResult, JobId, PostId, TenantId};

use crate::outcome::JobResolution;
use crate::retry::RetryPolicy;

/// Lifecycle status of a publish job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for its scheduled time (fresh or re-queued after a failure).
    Scheduled,
    /// Claimed by a queue pass; an attempt is in flight.
    Processing,
    /// Delivered.
    Completed,
    /// Exhausted retries or failed permanently.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Scheduled => "scheduled",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(JobStatus::Scheduled),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// One pending delivery of a post to one destination account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishJob {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub post_id: PostId,
    pub account_id: AccountId,
    pub scheduled_for: DateTime<Utc>,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub published_post_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PublishJob {
    /// Create a job in `scheduled` state.
    pub fn new(
        tenant_id: TenantId,
        post_id: PostId,
        account_id: AccountId,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant_id,
            post_id,
            account_id,
            scheduled_for,
            status: JobStatus::Scheduled,
            attempt_count: 0,
            last_error: None,
            published_post_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the queue reader should return this job at `now`.
    pub fn is_due(&self, now: DateTime<Utc>, policy: &RetryPolicy) -> bool {
        self.status == JobStatus::Scheduled
            && self.scheduled_for <= now
            && policy.allows_attempt(self.attempt_count)
    }

    /// Claim the job for an attempt: `scheduled` → `processing`, attempt +1.
    ///
    /// Returns the new attempt count. Fails if the job is not claimable, which
    /// is how a store detects that another pass got there first.
    pub fn claim(&mut self, policy: &RetryPolicy, now: DateTime<Utc>) -> DomainResult<u32> {
        if self.status != JobStatus::Scheduled {
            return Err(DomainError::conflict(format!(
                "job {} is {}, not scheduled",
                self.id, self.status
            )));
        }
        if !policy.allows_attempt(self.attempt_count) {
            return Err(DomainError::invariant(format!(
                "job {} has used all {} attempts",
                self.id, policy.max_attempts
            )));
        }

        self.status = JobStatus::Processing;
        self.attempt_count += 1;
        self.updated_at = now;
        Ok(self.attempt_count)
    }

    /// Apply the terminal decision for the in-flight attempt.
    pub fn resolve(&mut self, resolution: &JobResolution, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::conflict(format!(
                "job {} is {}, not processing",
                self.id, self.status
            )));
        }

        match resolution {
            JobResolution::Completed { published_post_id } => {
                self.published_post_id = Some(published_post_id.clone());
                self.last_error = None;
            }
            JobResolution::Rescheduled { error } | JobResolution::Failed { error } => {
                self.last_error = Some(error.clone());
            }
        }
        self.status = resolution.status();
        self.updated_at = now;
        Ok(())
    }

    /// Operator replay of a permanently failed job: back to `scheduled` with
    /// a fresh attempt budget.
    pub fn requeue(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.status != JobStatus::Failed {
            return Err(DomainError::conflict(format!(
                "only failed jobs can be requeued; job {} is {}",
                self.id, self.status
            )));
        }

        self.status = JobStatus::Scheduled;
        self.attempt_count = 0;
        self.updated_at = now;
        Ok(())
    }
}
