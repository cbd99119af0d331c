use axum::{routing::get, Router};

pub mod jobs;
pub mod queue;
pub mod system;

/// Router for every endpoint behind the cron secret.
pub fn router() -> Router {
    Router::new()
        .route(
            "/functions/process-publishing-queue",
            get(queue::process_publishing_queue).post(queue::process_publishing_queue),
        )
        .nest("/publishing", jobs::router())
}
