use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jbsaas_infra::StoreError;

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id} not found"))
        }
        StoreError::RecordNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("delivery record {id} not found"),
        ),
        StoreError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        StoreError::Decode(msg) => {
            tracing::error!(error = %msg, "corrupt row in publish store");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
        StoreError::Storage(msg) => {
            tracing::error!(error = %msg, "publish store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
