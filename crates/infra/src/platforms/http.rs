//! Shared reqwest plumbing for the platform adapters.

use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use super::PublishError;

/// Error bodies are kept for the job's `last_error`; cap them.
const MAX_ERROR_BODY: usize = 500;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, PublishError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("jbsaas-publisher/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| PublishError::Transport(e.to_string()))
}

/// A successful JSON reply. Empty bodies decode to `Value::Null`.
#[derive(Debug)]
pub(crate) struct JsonReply {
    pub headers: HeaderMap,
    pub body: Value,
}

/// Send the request and decode the body, mapping non-2xx statuses to
/// [`PublishError::Http`].
pub(crate) async fn send_json(request: RequestBuilder) -> Result<JsonReply, PublishError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    let headers = response.headers().clone();
    let text = response.text().await.map_err(transport_error)?;

    if !status.is_success() {
        return Err(PublishError::Http {
            status: status.as_u16(),
            body: truncate(&text, MAX_ERROR_BODY),
        });
    }

    let body = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| PublishError::MalformedResponse(e.to_string()))?
    };
    Ok(JsonReply { headers, body })
}

/// Read an id-like field that platforms return either as a string or a number.
pub(crate) fn id_field(body: &Value, pointer: &str) -> Result<String, PublishError> {
    match body.pointer(pointer) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(PublishError::MalformedResponse(format!(
            "missing `{}` in response",
            pointer.trim_start_matches('/').replace('/', ".")
        ))),
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn transport_error(err: reqwest::Error) -> PublishError {
    if err.is_timeout() {
        PublishError::Timeout
    } else {
        PublishError::Transport(err.to_string())
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}
