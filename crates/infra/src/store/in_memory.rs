//! In-memory publish store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jbsaas_core::{AccountId, DeliveryRecordId, JobId, PostId};
use jbsaas_publishing::{
    AttemptOutcome, DeliveryStatusRecord, DestinationAccount, JobResolution, JobStatus, PostContent,
    PublishJob, RetryPolicy,
};

use super::{DueJob, JobStats, PublishStore, StoreError};

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, PublishJob>,
    posts: HashMap<PostId, PostContent>,
    accounts: HashMap<AccountId, DestinationAccount>,
    records: HashMap<DeliveryRecordId, DeliveryStatusRecord>,
}

/// In-memory publish store.
///
/// A single lock guards all tables, so `claim_job` is a true
/// compare-and-set just like the conditional update in Postgres.
#[derive(Debug, Default)]
pub struct InMemoryPublishStore {
    state: RwLock<State>,
}

impl InMemoryPublishStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert_post(&self, post: PostContent) -> Result<(), StoreError> {
        self.write()?.posts.insert(post.id, post);
        Ok(())
    }

    pub fn insert_account(&self, account: DestinationAccount) -> Result<(), StoreError> {
        self.write()?.accounts.insert(account.id, account);
        Ok(())
    }

    /// Enqueue a job. Its post and account must already be present.
    pub fn insert_job(&self, job: PublishJob) -> Result<JobId, StoreError> {
        let mut state = self.write()?;
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job already exists: {}", job.id)));
        }
        if !state.posts.contains_key(&job.post_id) {
            return Err(StoreError::Conflict(format!("unknown post: {}", job.post_id)));
        }
        if !state.accounts.contains_key(&job.account_id) {
            return Err(StoreError::Conflict(format!("unknown account: {}", job.account_id)));
        }
        let id = job.id;
        state.jobs.insert(id, job);
        Ok(id)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::Storage("in-memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::Storage("in-memory store lock poisoned".into()))
    }
}

#[async_trait]
impl PublishStore for InMemoryPublishStore {
    async fn due_jobs(
        &self,
        now: DateTime<Utc>,
        policy: &RetryPolicy,
        limit: usize,
    ) -> Result<Vec<DueJob>, StoreError> {
        let state = self.read()?;

        let mut due: Vec<DueJob> = state
            .jobs
            .values()
            .filter(|j| j.is_due(now, policy))
            .filter_map(|j| {
                let post = state.posts.get(&j.post_id)?;
                let account = state.accounts.get(&j.account_id)?;
                Some(DueJob {
                    job: j.clone(),
                    post: post.clone(),
                    account: account.clone(),
                })
            })
            .collect();

        due.sort_by_key(|d| (d.job.scheduled_for, d.job.id));
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_job(
        &self,
        job_id: JobId,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        let mut state = self.write()?;
        let job = state.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        Ok(job.claim(policy, now).ok())
    }

    async fn open_attempt(&self, record: &DeliveryStatusRecord) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.jobs.contains_key(&record.job_id) {
            return Err(StoreError::NotFound(record.job_id));
        }
        if state.records.contains_key(&record.id) {
            return Err(StoreError::Conflict(format!(
                "delivery record already exists: {}",
                record.id
            )));
        }
        state.records.insert(record.id, record.clone());
        Ok(())
    }

    async fn close_attempt(
        &self,
        record_id: DeliveryRecordId,
        outcome: &AttemptOutcome,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let record = state
            .records
            .get_mut(&record_id)
            .ok_or(StoreError::RecordNotFound(record_id))?;
        record
            .close(outcome, now)
            .map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn resolve_job(
        &self,
        job_id: JobId,
        resolution: &JobResolution,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let job = state.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        job.resolve(resolution, now)
            .map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<PublishJob>, StoreError> {
        Ok(self.read()?.jobs.get(&job_id).cloned())
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<PublishJob>, StoreError> {
        let state = self.read()?;
        let mut result: Vec<_> = state
            .jobs
            .values()
            .filter(|j| status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();

        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(b.id.cmp(&a.id)));
        result.truncate(limit);
        Ok(result)
    }

    async fn attempts_for(&self, job_id: JobId) -> Result<Vec<DeliveryStatusRecord>, StoreError> {
        let state = self.read()?;
        let mut result: Vec<_> = state
            .records
            .values()
            .filter(|r| r.job_id == job_id)
            .cloned()
            .collect();

        result.sort_by_key(|r| (r.attempt, r.created_at));
        Ok(result)
    }

    async fn requeue_failed(
        &self,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<PublishJob, StoreError> {
        let mut state = self.write()?;
        let job = state.jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        job.requeue(now)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        Ok(job.clone())
    }

    async fn stats(&self) -> Result<JobStats, StoreError> {
        let state = self.read()?;
        let mut stats = JobStats::default();
        for job in state.jobs.values() {
            stats.record(job.status);
        }
        Ok(stats)
    }
}
