use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Run one publishing pass. 200 whenever the pass completes, even if every
/// job in it failed; 500 only when the queue could not be read.
pub async fn process_publishing_queue(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.processor().run_once(Utc::now()).await {
        Ok(summary) => Json(dto::ProcessQueueResponse::from(summary)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "publishing pass aborted");
            errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "queue_read_failed",
                e.to_string(),
            )
        }
    }
}
