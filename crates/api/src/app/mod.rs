//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: job store, platform clients and the queue processor
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware::{self, CronAuth};

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

use services::{AppServices, StartupError};

/// Build the full HTTP router from configuration (used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> Result<Router, StartupError> {
    let services = AppServices::from_config(config).await?;
    let auth = CronAuth::new(config.cron_secret.clone());
    if !auth.is_enabled() {
        tracing::warn!("CRON_SECRET not set; queue endpoints are unauthenticated");
    }
    Ok(router(Arc::new(services), auth))
}

/// Router over already-wired services.
pub fn router(services: Arc<AppServices>, auth: CronAuth) -> Router {
    let protected = routes::router().layer(
        ServiceBuilder::new()
            .layer(axum::middleware::from_fn_with_state(
                auth,
                middleware::cron_auth_middleware,
            ))
            .layer(Extension(services)),
    );

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
}
