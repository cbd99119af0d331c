use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

/// Shared secret the external scheduler presents as a bearer token.
#[derive(Clone, Default)]
pub struct CronAuth {
    secret: Option<Arc<str>>,
}

impl CronAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(Arc::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }
}

pub async fn cron_auth_middleware(
    State(auth): State<CronAuth>,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(secret) = auth.secret.as_deref() {
        let token = extract_bearer(req.headers())?;
        if !constant_time_eq(token.as_bytes(), secret.as_bytes()) {
            tracing::warn!(path = %req.uri().path(), "rejected request with wrong cron secret");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<&str, StatusCode> {
    let header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        h
    }

    #[test]
    fn bearer_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc")).unwrap(), "abc");
        assert_eq!(
            extract_bearer(&headers("Basic abc")).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            extract_bearer(&HeaderMap::new()).unwrap_err(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn secret_comparison() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret!"));
    }

    #[test]
    fn disabled_without_secret() {
        assert!(!CronAuth::new(None).is_enabled());
        assert!(CronAuth::new(Some("x".into())).is_enabled());
    }
}
