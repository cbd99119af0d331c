use serde::{Deserialize, Serialize};

use jbsaas_infra::{JobReport, ProcessSummary};
use jbsaas_publishing::{DeliveryStatusRecord, PublishJob};

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 500;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

impl ListJobsQuery {
    pub fn limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT)
    }
}

// -------------------------
// Response DTOs
// -------------------------

/// Body of the queue trigger endpoint.
#[derive(Debug, Serialize)]
pub struct ProcessQueueResponse {
    pub message: String,
    pub processed: usize,
    pub results: Vec<JobReport>,
}

impl From<ProcessSummary> for ProcessQueueResponse {
    fn from(summary: ProcessSummary) -> Self {
        Self {
            message: summary.message(),
            processed: summary.processed,
            results: summary.results,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobDetailResponse {
    pub job: PublishJob,
    pub attempts: Vec<DeliveryStatusRecord>,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<PublishJob>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_limit_is_clamped() {
        assert_eq!(ListJobsQuery::default().limit(), 50);
        let q = ListJobsQuery {
            status: None,
            limit: Some(10_000),
        };
        assert_eq!(q.limit(), 500);
        let q = ListJobsQuery {
            status: None,
            limit: Some(0),
        };
        assert_eq!(q.limit(), 1);
    }
}
