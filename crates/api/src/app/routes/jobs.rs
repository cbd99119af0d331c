use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use jbsaas_core::JobId;
use jbsaas_infra::PublishStore;
use jbsaas_publishing::JobStatus;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/requeue", post(requeue_job))
        .route("/stats", get(stats))
}

fn parse_job_id(id: &str) -> Result<JobId, axum::response::Response> {
    id.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id"))
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::ListJobsQuery>,
) -> axum::response::Response {
    let status = match query.status.as_deref().map(str::parse::<JobStatus>).transpose() {
        Ok(s) => s,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_status", e.to_string());
        }
    };

    match services.store().list_jobs(status, query.limit()).await {
        Ok(jobs) => Json(dto::JobListResponse {
            count: jobs.len(),
            jobs,
        })
        .into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let job = match services.store().get_job(job_id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            return errors::json_error(StatusCode::NOT_FOUND, "not_found", "job not found");
        }
        Err(e) => return errors::store_error_to_response(e),
    };

    match services.store().attempts_for(job_id).await {
        Ok(attempts) => Json(dto::JobDetailResponse { job, attempts }).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// Give a permanently failed job a fresh attempt budget.
pub async fn requeue_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id = match parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.store().requeue_failed(job_id, Utc::now()).await {
        Ok(job) => {
            tracing::info!(job_id = %job_id, "failed job requeued");
            Json(job).into_response()
        }
        Err(e) => errors::store_error_to_response(e),
    }
}

pub async fn stats(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.store().stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}
