//! Per-attempt outcomes and the terminal decision they lead to.

use serde::{Deserialize, Serialize};

use crate::job::JobStatus;
use crate::retry::RetryPolicy;

/// Normalised result of a successful platform publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub external_post_id: String,
    pub external_url: Option<String>,
    /// Raw platform response, kept for the delivery audit trail.
    pub raw_response: serde_json::Value,
}

/// The single write that resolves a claimed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resolution", rename_all = "snake_case")]
pub enum JobResolution {
    /// Delivered; the platform's post id is stored on the job.
    Completed { published_post_id: String },
    /// Failed with retries remaining; back to `scheduled`.
    Rescheduled { error: String },
    /// Failed permanently.
    Failed { error: String },
}

impl JobResolution {
    /// Decide how to resolve a failed attempt.
    ///
    /// `attempt_count` is the count *after* the claim incremented it.
    pub fn after_failure(
        policy: &RetryPolicy,
        attempt_count: u32,
        error: impl Into<String>,
        retryable: bool,
    ) -> Self {
        let error = error.into();
        if retryable && policy.should_retry(attempt_count) {
            JobResolution::Rescheduled { error }
        } else {
            JobResolution::Failed { error }
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobResolution::Completed { .. } => JobStatus::Completed,
            JobResolution::Rescheduled { .. } => JobStatus::Scheduled,
            JobResolution::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn will_retry(&self) -> bool {
        matches!(self, JobResolution::Rescheduled { .. })
    }
}
