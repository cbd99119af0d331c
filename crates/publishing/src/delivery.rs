//! Delivery status records: the per-attempt audit trail.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jbsaas_core::{DeliveryRecordId, DomainError, DomainResult, JobId};

use crate::outcome::PublishReceipt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Processing,
    Completed,
    Error,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Completed => "completed",
            DeliveryStatus::Error => "error",
        }
    }
}

impl FromStr for DeliveryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DeliveryStatus::Processing),
            "completed" => Ok(DeliveryStatus::Completed),
            "error" => Ok(DeliveryStatus::Error),
            other => Err(DomainError::validation(format!(
                "unknown delivery status: {other}"
            ))),
        }
    }
}

/// How an attempt ended, as written to its delivery record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Completed {
        published_url: Option<String>,
        platform_response: serde_json::Value,
    },
    Error {
        message: String,
    },
}

impl AttemptOutcome {
    pub fn from_receipt(receipt: &PublishReceipt) -> Self {
        AttemptOutcome::Completed {
            published_url: receipt.external_url.clone(),
            platform_response: receipt.raw_response.clone(),
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        match self {
            AttemptOutcome::Completed { .. } => DeliveryStatus::Completed,
            AttemptOutcome::Error { .. } => DeliveryStatus::Error,
        }
    }
}

/// Audit entry for one processing attempt of a publish job.
///
/// Created in `processing` when the attempt starts and closed exactly once.
/// A closed record is never touched again; the next attempt gets a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStatusRecord {
    pub id: DeliveryRecordId,
    pub job_id: JobId,
    pub attempt: u32,
    pub status: DeliveryStatus,
    pub published_url: Option<String>,
    pub platform_response: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DeliveryStatusRecord {
    pub fn open(job_id: JobId, attempt: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: DeliveryRecordId::new(),
            job_id,
            attempt,
            status: DeliveryStatus::Processing,
            published_url: None,
            platform_response: None,
            error_message: None,
            created_at: now,
            completed_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == DeliveryStatus::Processing
    }

    pub fn close(&mut self, outcome: &AttemptOutcome, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.is_open() {
            return Err(DomainError::invariant(format!(
                "delivery record {} already closed as {}",
                self.id,
                self.status.as_str()
            )));
        }

        match outcome {
            AttemptOutcome::Completed {
                published_url,
                platform_response,
            } => {
                self.published_url = published_url.clone();
                self.platform_response = Some(platform_response.clone());
            }
            AttemptOutcome::Error { message } => {
                self.error_message = Some(message.clone());
            }
        }
        self.status = outcome.status();
        self.completed_at = Some(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_closes_once() {
        let mut record = DeliveryStatusRecord::open(JobId::new(), 1, Utc::now());
        assert!(record.is_open());

        let outcome = AttemptOutcome::from_receipt(&PublishReceipt {
            external_post_id: "abc123".into(),
            external_url: Some("https://facebook.com/abc123".into()),
            raw_response: serde_json::json!({"id": "abc123"}),
        });
        record.close(&outcome, Utc::now()).unwrap();

        assert_eq!(record.status, DeliveryStatus::Completed);
        assert_eq!(
            record.published_url.as_deref(),
            Some("https://facebook.com/abc123")
        );
        assert!(record.completed_at.is_some());

        let again = record.close(
            &AttemptOutcome::Error {
                message: "late".into(),
            },
            Utc::now(),
        );
        assert!(again.is_err());
        assert_eq!(record.status, DeliveryStatus::Completed);
        assert!(record.error_message.is_none());
    }

    #[test]
    fn error_outcome_keeps_message() {
        let mut record = DeliveryStatusRecord::open(JobId::new(), 2, Utc::now());
        record
            .close(
                &AttemptOutcome::Error {
                    message: "HTTP 401: token expired".into(),
                },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(record.status, DeliveryStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some("HTTP 401: token expired"));
    }
}
