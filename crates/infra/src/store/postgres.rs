//! Postgres-backed publish store.
//!
//! Schema lives in `migrations/0001_publishing.sql`.
//!
//! ## Error Mapping
//!
//! | SQLx Error | StoreError |
//! |------------|------------|
//! | Database (unique violation `23505`) | `Conflict` |
//! | Database (foreign key violation `23503`) | `Conflict` |
//! | Database (other) | `Storage` |
//! | PoolClosed / Io / Tls / timeouts | `Storage` |
//! | ColumnDecode / ColumnNotFound | `Decode` |
//!
//! ## Claiming
//!
//! `claim_job` is a single conditional `UPDATE ... WHERE status = 'scheduled'
//! RETURNING attempt_count`. Only the statement that actually flips the row
//! gets a value back, so overlapping queue passes cannot double-process a job.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{instrument, Span};
use uuid::Uuid;

use jbsaas_core::{AccountId, DeliveryRecordId, JobId, PostId, TenantId};
use jbsaas_publishing::{
    AccessToken, AttemptOutcome, DeliveryStatus, DeliveryStatusRecord, DestinationAccount,
    JobResolution, JobStatus, PostContent, PublishJob, RetryPolicy,
};

use super::{DueJob, JobStats, PublishStore, StoreError};

const SCHEMA: &str = include_str!("../../migrations/0001_publishing.sql");

const JOB_COLUMNS: &str = r#"
    j.id, j.tenant_id, j.post_id, j.account_id, j.scheduled_for, j.status,
    j.attempt_count, j.last_error, j.published_post_id, j.created_at, j.updated_at
"#;

const RECORD_COLUMNS: &str = r#"
    id, job_id, attempt, status, published_url, platform_response,
    error_message, created_at, completed_at
"#;

/// Postgres-backed publish store.
///
/// `Send + Sync`; all operations go through the SQLx connection pool.
#[derive(Debug, Clone)]
pub struct PgPublishStore {
    pool: Arc<PgPool>,
}

impl PgPublishStore {
    /// Create a store over an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect a small pool; the queue processor is sequential.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create the publishing tables if they do not exist yet.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    async fn job_exists(&self, job_id: JobId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM publish_jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("job_exists", e))?;
        Ok(row.is_some())
    }

    /// Turn a zero-row conditional update into the right error.
    async fn missing_or_conflict(&self, job_id: JobId, msg: String) -> StoreError {
        match self.job_exists(job_id).await {
            Ok(true) => StoreError::Conflict(msg),
            Ok(false) => StoreError::NotFound(job_id),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl PublishStore for PgPublishStore {
    #[instrument(skip(self, policy), fields(row_count = tracing::field::Empty), err)]
    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
        limit: usize,
    ) -> Result<Vec<DueJob>, StoreError> {
        let sql = format!(
            r#"
            SELECT
                {JOB_COLUMNS},
                p.content AS post_content,
                p.image_urls AS post_image_urls,
                p.created_at AS post_created_at,
                a.platform AS account_platform,
                a.platform_account_id AS account_platform_account_id,
                a.display_name AS account_display_name,
                a.access_token AS account_access_token
            FROM publish_jobs j
            JOIN posts p ON p.id = j.post_id
            JOIN social_accounts a ON a.id = j.account_id
            WHERE j.status = 'scheduled'
              AND j.scheduled_for <= $1
              AND j.attempt_count < $2
            ORDER BY j.scheduled_for ASC, j.id ASC
            LIMIT $3
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(policy.max_attempts as i32)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("due_jobs", e))?;

        let mut batch = Vec::with_capacity(rows.len());
        for row in &rows {
            batch.push(due_job_from_row(row)?);
        }

        Span::current().record("row_count", batch.len());
        Ok(batch)
    }

    #[instrument(skip(self, policy), fields(job_id = %job_id), err)]
    async fn claim_job(
        &self,
        job_id: JobId,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = 'processing',
                attempt_count = attempt_count + 1,
                updated_at = $2
            WHERE id = $1
              AND status = 'scheduled'
              AND attempt_count < $3
            RETURNING attempt_count
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(now)
        .bind(policy.max_attempts as i32)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_job", e))?;

        match row {
            Some(row) => {
                let attempts: i32 = row
                    .try_get("attempt_count")
                    .map_err(|e| map_sqlx_error("claim_job", e))?;
                Ok(Some(to_u32(attempts, "attempt_count")?))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, record), fields(job_id = %record.job_id, attempt = record.attempt), err)]
    async fn open_attempt(&self, record: &DeliveryStatusRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO delivery_status_records (
                id, job_id, attempt, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(record.job_id.as_uuid())
        .bind(record.attempt as i32)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_attempt", e))?;
        Ok(())
    }

    #[instrument(skip(self, outcome), fields(record_id = %record_id), err)]
    async fn close_attempt(
        &self,
        record_id: DeliveryRecordId,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let (published_url, platform_response, error_message) = match outcome {
            AttemptOutcome::Completed {
                published_url,
                platform_response,
            } => (published_url.clone(), Some(platform_response.clone()), None),
            AttemptOutcome::Error { message } => (None, None, Some(message.clone())),
        };

        let result = sqlx::query(
            r#"
            UPDATE delivery_status_records
            SET status = $2,
                published_url = $3,
                platform_response = $4,
                error_message = $5,
                completed_at = $6
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(record_id.as_uuid())
        .bind(outcome.status().as_str())
        .bind(published_url)
        .bind(platform_response)
        .bind(error_message)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("close_attempt", e))?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM delivery_status_records WHERE id = $1")
                .bind(record_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("close_attempt", e))?;
            return Err(match exists {
                Some(_) => StoreError::Conflict(format!(
                    "delivery record {record_id} already closed"
                )),
                None => StoreError::RecordNotFound(record_id),
            });
        }
        Ok(())
    }

    #[instrument(skip(self, resolution), fields(job_id = %job_id, status = %resolution.status()), err)]
    async fn resolve_job(
        &self,
        job_id: JobId,
        resolution: &JobResolution,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let (published_post_id, last_error) = match resolution {
            JobResolution::Completed { published_post_id } => (Some(published_post_id.clone()), None),
            JobResolution::Rescheduled { error } | JobResolution::Failed { error } => {
                (None, Some(error.clone()))
            }
        };

        let result = sqlx::query(
            r#"
            UPDATE publish_jobs
            SET status = $2,
                published_post_id = COALESCE($3, published_post_id),
                last_error = $4,
                updated_at = $5
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(resolution.status().as_str())
        .bind(published_post_id)
        .bind(last_error)
        .bind(now)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("resolve_job", e))?;

        if result.rows_affected() == 0 {
            return Err(self
                .missing_or_conflict(job_id, format!("job {job_id} is not processing"))
                .await);
        }
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<PublishJob>, StoreError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM publish_jobs j WHERE j.id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;

        row.as_ref().map(job_from_row).transpose()
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<PublishJob>, StoreError> {
        let sql = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM publish_jobs j
            WHERE ($1::text IS NULL OR j.status = $1)
            ORDER BY j.updated_at DESC, j.id DESC
            LIMIT $2
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_jobs", e))?;

        rows.iter().map(job_from_row).collect()
    }

    async fn attempts_for(&self, job_id: JobId) -> Result<Vec<DeliveryStatusRecord>, StoreError> {
        let sql = format!(
            r#"
            SELECT {RECORD_COLUMNS}
            FROM delivery_status_records
            WHERE job_id = $1
            ORDER BY attempt ASC, created_at ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("attempts_for", e))?;

        rows.iter().map(record_from_row).collect()
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn requeue_failed(
        &self,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<PublishJob, StoreError> {
        let sql = format!(
            r#"
            UPDATE publish_jobs j
            SET status = 'scheduled',
                attempt_count = 0,
                updated_at = $2
            WHERE j.id = $1 AND j.status = 'failed'
            RETURNING {JOB_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(job_id.as_uuid())
            .bind(now)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("requeue_failed", e))?;

        match row {
            Some(row) => job_from_row(&row),
            None => Err(self
                .missing_or_conflict(job_id, format!("only failed jobs can be requeued; job {job_id}"))
                .await),
        }
    }

    async fn stats(&self) -> Result<JobStats, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM publish_jobs GROUP BY status")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| map_sqlx_error("stats", e))?;
            let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("stats", e))?;
            let status = status
                .parse::<JobStatus>()
                .map_err(|e| StoreError::Decode(e.to_string()))?;
            let n = usize::try_from(n).map_err(|e| StoreError::Decode(e.to_string()))?;
            match status {
                JobStatus::Scheduled => stats.scheduled += n,
                JobStatus::Processing => stats.processing += n,
                JobStatus::Completed => stats.completed += n,
                JobStatus::Failed => stats.failed += n,
            }
        }
        Ok(stats)
    }
}

fn job_from_row(row: &PgRow) -> Result<PublishJob, StoreError> {
    let decode = |e| map_sqlx_error("decode publish_jobs", e);
    let status: String = row.try_get("status").map_err(decode)?;
    let attempt_count: i32 = row.try_get("attempt_count").map_err(decode)?;

    Ok(PublishJob {
        id: JobId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(decode)?),
        post_id: PostId::from_uuid(row.try_get::<Uuid, _>("post_id").map_err(decode)?),
        account_id: AccountId::from_uuid(row.try_get::<Uuid, _>("account_id").map_err(decode)?),
        scheduled_for: row.try_get("scheduled_for").map_err(decode)?,
        status: status
            .parse()
            .map_err(|e: jbsaas_core::DomainError| StoreError::Decode(e.to_string()))?,
        attempt_count: to_u32(attempt_count, "attempt_count")?,
        last_error: row.try_get("last_error").map_err(decode)?,
        published_post_id: row.try_get("published_post_id").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
    })
}

fn due_job_from_row(row: &PgRow) -> Result<DueJob, StoreError> {
    let decode = |e| map_sqlx_error("decode due job", e);
    let job = job_from_row(row)?;

    let post = PostContent {
        id: job.post_id,
        tenant_id: job.tenant_id,
        content: row.try_get("post_content").map_err(decode)?,
        image_urls: row
            .try_get::<Option<Vec<String>>, _>("post_image_urls")
            .map_err(decode)?
            .unwrap_or_default(),
        created_at: row.try_get("post_created_at").map_err(decode)?,
    };

    let account = DestinationAccount {
        id: job.account_id,
        tenant_id: job.tenant_id,
        platform: row.try_get("account_platform").map_err(decode)?,
        platform_account_id: row.try_get("account_platform_account_id").map_err(decode)?,
        display_name: row.try_get("account_display_name").map_err(decode)?,
        access_token: AccessToken::new(
            row.try_get::<String, _>("account_access_token")
                .map_err(decode)?,
        ),
    };

    Ok(DueJob { job, post, account })
}

fn record_from_row(row: &PgRow) -> Result<DeliveryStatusRecord, StoreError> {
    let decode = |e| map_sqlx_error("decode delivery_status_records", e);
    let status: String = row.try_get("status").map_err(decode)?;
    let attempt: i32 = row.try_get("attempt").map_err(decode)?;

    Ok(DeliveryStatusRecord {
        id: DeliveryRecordId::from_uuid(row.try_get::<Uuid, _>("id").map_err(decode)?),
        job_id: JobId::from_uuid(row.try_get::<Uuid, _>("job_id").map_err(decode)?),
        attempt: to_u32(attempt, "attempt")?,
        status: status
            .parse::<DeliveryStatus>()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        published_url: row.try_get("published_url").map_err(decode)?,
        platform_response: row.try_get("platform_response").map_err(decode)?,
        error_message: row.try_get("error_message").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        completed_at: row.try_get("completed_at").map_err(decode)?,
    })
}

fn to_u32(value: i32, column: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Decode(format!("negative {column}: {value}")))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") => StoreError::Conflict(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) => {
            StoreError::Decode(format!("{operation}: {err}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Storage(format!("sqlx error in {operation}: {err}")),
    }
}
