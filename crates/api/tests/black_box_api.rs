use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::StatusCode;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use jbsaas_api::app::services::{AppServices, SharedStore};
use jbsaas_api::middleware::CronAuth;
use jbsaas_core::{AccountId, DeliveryRecordId, JobId, PostId, TenantId};
use jbsaas_infra::{
    DueJob, InMemoryPublishStore, JobStats, PlatformEndpoints, ProcessorConfig, PublishStore,
    Publishers, StoreError,
};
use jbsaas_publishing::{
    AccessToken, AttemptOutcome, DeliveryStatusRecord, DestinationAccount, JobResolution,
    JobStatus, PostContent, PublishJob, RetryPolicy,
};

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(store: SharedStore, platforms: &MockServer, secret: Option<&str>) -> Self {
        let endpoints = PlatformEndpoints {
            facebook_graph_url: platforms.uri(),
            linkedin_api_url: platforms.uri(),
            twitter_api_url: platforms.uri(),
        };
        let publishers = Publishers::http(&endpoints, Duration::from_secs(5)).unwrap();
        let services = AppServices::new(store, publishers, ProcessorConfig::default());

        // Same router as prod, bound to an ephemeral port.
        let app = jbsaas_api::app::router(
            Arc::new(services),
            CronAuth::new(secret.map(str::to_string)),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn seed(store: &InMemoryPublishStore, platform: &str, images: &[&str]) -> JobId {
    let tenant_id = TenantId::new();
    let post = PostContent {
        id: PostId::new(),
        tenant_id,
        content: "Skin checks now bulk billed".into(),
        image_urls: images.iter().map(|s| s.to_string()).collect(),
        created_at: Utc::now(),
    };
    let account = DestinationAccount {
        id: AccountId::new(),
        tenant_id,
        platform: platform.into(),
        platform_account_id: "acct-1".into(),
        display_name: "Bayside Dermatology".into(),
        access_token: AccessToken::new("token"),
    };
    let job = PublishJob::new(
        tenant_id,
        post.id,
        account.id,
        Utc::now() - ChronoDuration::days(1),
    );
    store.insert_post(post).unwrap();
    store.insert_account(account).unwrap();
    store.insert_job(job).unwrap()
}

fn result_for<'a>(body: &'a Value, job_id: JobId) -> &'a Value {
    body["results"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["jobId"] == job_id.to_string())
        .unwrap_or_else(|| panic!("no result for job {job_id}"))
}

#[tokio::test]
async fn empty_queue_returns_200_with_no_results() {
    let platforms = MockServer::start().await;
    let server = TestServer::spawn(InMemoryPublishStore::arc(), &platforms, None).await;

    let res = reqwest::Client::new()
        .post(server.url("/functions/process-publishing-queue"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["processed"], 0);
    assert_eq!(body["results"], json!([]));
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn mixed_batch_reports_each_job_and_still_returns_200() {
    let platforms = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/acct-1/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "abc123"})))
        .mount(&platforms)
        .await;
    Mock::given(method("POST"))
        .and(path("/2/tweets"))
        .respond_with(ResponseTemplate::new(503).set_body_string("over capacity"))
        .mount(&platforms)
        .await;

    let store = InMemoryPublishStore::arc();
    let facebook = seed(&store, "facebook", &[]);
    let twitter = seed(&store, "twitter", &[]);
    let instagram = seed(&store, "instagram", &[]);
    let unknown = seed(&store, "tiktok", &[]);

    let server = TestServer::spawn(store.clone(), &platforms, None).await;
    let res = reqwest::Client::new()
        .post(server.url("/functions/process-publishing-queue"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["processed"], 4);

    let fb = result_for(&body, facebook);
    assert_eq!(fb["status"], "success");
    assert_eq!(fb["platform"], "facebook");
    assert!(fb.get("error").is_none());

    let tw = result_for(&body, twitter);
    assert_eq!(tw["status"], "error");
    assert_eq!(tw["error"], "HTTP 503: over capacity");
    assert_eq!(tw["willRetry"], true);

    let ig = result_for(&body, instagram);
    assert_eq!(ig["status"], "error");
    assert!(ig["error"]
        .as_str()
        .unwrap()
        .contains("requires at least one image"));
    assert_eq!(ig["willRetry"], false);

    let un = result_for(&body, unknown);
    assert_eq!(un["platform"], "tiktok");
    assert_eq!(un["error"], "Unsupported platform: tiktok");

    assert_eq!(
        store.get_job(facebook).await.unwrap().unwrap().published_post_id.as_deref(),
        Some("abc123")
    );
    assert_eq!(
        store.get_job(twitter).await.unwrap().unwrap().status,
        JobStatus::Scheduled
    );

    // Only the facebook and twitter jobs reached the network.
    let received = platforms.received_requests().await.unwrap_or_default();
    assert_eq!(received.len(), 2);
}

#[tokio::test]
async fn cron_secret_guards_everything_but_health() {
    let platforms = MockServer::start().await;
    let server =
        TestServer::spawn(InMemoryPublishStore::arc(), &platforms, Some("tick-tock")).await;
    let client = reqwest::Client::new();

    let res = client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(server.url("/functions/process-publishing-queue"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url("/publishing/stats"))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(server.url("/functions/process-publishing-queue"))
        .bearer_auth("tick-tock")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn failed_job_can_be_inspected_and_requeued() {
    let platforms = MockServer::start().await;
    let store = InMemoryPublishStore::arc();
    let job_id = seed(&store, "myspace", &[]);
    let server = TestServer::spawn(store.clone(), &platforms, None).await;
    let client = reqwest::Client::new();

    client
        .post(server.url("/functions/process-publishing-queue"))
        .send()
        .await
        .unwrap();

    let res = client
        .get(server.url(&format!("/publishing/jobs/{job_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let detail: Value = res.json().await.unwrap();
    assert_eq!(detail["job"]["status"], "failed");
    assert_eq!(detail["job"]["attempt_count"], 1);
    assert_eq!(detail["attempts"].as_array().unwrap().len(), 1);
    assert_eq!(detail["attempts"][0]["status"], "error");

    let res = client
        .get(server.url("/publishing/jobs?status=failed"))
        .send()
        .await
        .unwrap();
    let list: Value = res.json().await.unwrap();
    assert_eq!(list["count"], 1);

    let res = client
        .post(server.url(&format!("/publishing/jobs/{job_id}/requeue")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let job: Value = res.json().await.unwrap();
    assert_eq!(job["status"], "scheduled");
    assert_eq!(job["attempt_count"], 0);

    let res = client
        .post(server.url(&format!("/publishing/jobs/{job_id}/requeue")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);

    let res = client
        .get(server.url("/publishing/stats"))
        .send()
        .await
        .unwrap();
    let stats: Value = res.json().await.unwrap();
    assert_eq!(stats["scheduled"], 1);
    assert_eq!(stats["failed"], 0);
}

#[tokio::test]
async fn bad_ids_and_filters_are_client_errors() {
    let platforms = MockServer::start().await;
    let server = TestServer::spawn(InMemoryPublishStore::arc(), &platforms, None).await;
    let client = reqwest::Client::new();

    let res = client
        .get(server.url("/publishing/jobs/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");

    let res = client
        .get(server.url(&format!("/publishing/jobs/{}", JobId::new())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(server.url(&format!("/publishing/jobs/{}/requeue", JobId::new())))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(server.url("/publishing/jobs?status=retrying"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

/// Store that cannot be reached at all.
struct DownStore;

fn down() -> StoreError {
    StoreError::Storage("connection refused".into())
}

#[async_trait]
impl PublishStore for DownStore {
    async fn due_jobs(
        &self,
        _now: DateTime<Utc>,
        _policy: &RetryPolicy,
        _limit: usize,
    ) -> Result<Vec<DueJob>, StoreError> {
        Err(down())
    }
    async fn claim_job(
        &self,
        _job_id: JobId,
        _policy: &RetryPolicy,
        _now: DateTime<Utc>,
    ) -> Result<Option<u32>, StoreError> {
        Err(down())
    }
    async fn open_attempt(&self, _record: &DeliveryStatusRecord) -> Result<(), StoreError> {
        Err(down())
    }
    async fn close_attempt(
        &self,
        _record_id: DeliveryRecordId,
        _outcome: &AttemptOutcome,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(down())
    }
    async fn resolve_job(
        &self,
        _job_id: JobId,
        _resolution: &JobResolution,
        _now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(down())
    }
    async fn get_job(&self, _job_id: JobId) -> Result<Option<PublishJob>, StoreError> {
        Err(down())
    }
    async fn list_jobs(
        &self,
        _status: Option<JobStatus>,
        _limit: usize,
    ) -> Result<Vec<PublishJob>, StoreError> {
        Err(down())
    }
    async fn attempts_for(&self, _job_id: JobId) -> Result<Vec<DeliveryStatusRecord>, StoreError> {
        Err(down())
    }
    async fn requeue_failed(
        &self,
        _job_id: JobId,
        _now: DateTime<Utc>,
    ) -> Result<PublishJob, StoreError> {
        Err(down())
    }
    async fn stats(&self) -> Result<JobStats, StoreError> {
        Err(down())
    }
}

#[tokio::test]
async fn unreadable_queue_returns_500() {
    let platforms = MockServer::start().await;
    let server = TestServer::spawn(Arc::new(DownStore), &platforms, None).await;

    let res = reqwest::Client::new()
        .post(server.url("/functions/process-publishing-queue"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "queue_read_failed");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}
