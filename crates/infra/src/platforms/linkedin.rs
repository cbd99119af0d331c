//! LinkedIn publishing via the UGC Posts API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use jbsaas_publishing::{Platform, PublishReceipt};

use super::http::{id_field, join_url, send_json};
use super::{PlatformPublisher, PublishError, PublishRequest};

#[derive(Debug, Clone)]
pub struct LinkedInPublisher {
    client: Client,
    api_url: String,
}

impl LinkedInPublisher {
    pub fn new(client: Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Accounts store either a full author URN or a bare member id.
fn author_urn(account_id: &str) -> String {
    if account_id.starts_with("urn:li:") {
        account_id.to_string()
    } else {
        format!("urn:li:person:{account_id}")
    }
}

fn share_body(author: &str, text: &str) -> Value {
    json!({
        "author": author,
        "lifecycleState": "PUBLISHED",
        "specificContent": {
            "com.linkedin.ugc.ShareContent": {
                "shareCommentary": { "text": text },
                "shareMediaCategory": "NONE"
            }
        },
        "visibility": {
            "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC"
        }
    })
}

#[async_trait]
impl PlatformPublisher for LinkedInPublisher {
    fn platform(&self) -> Platform {
        Platform::LinkedIn
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let author = author_urn(&request.platform_account_id);
        let reply = send_json(
            self.client
                .post(join_url(&self.api_url, "v2/ugcPosts"))
                .bearer_auth(request.access_token.expose())
                .header("X-Restli-Protocol-Version", "2.0.0")
                .json(&share_body(&author, &request.text)),
        )
        .await?;

        // The share URN comes back in the body, or only in `x-restli-id`.
        let share_id = match id_field(&reply.body, "/id") {
            Ok(id) => id,
            Err(err) => reply
                .headers
                .get("x-restli-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .ok_or(err)?,
        };

        Ok(PublishReceipt {
            external_url: Some(format!("https://www.linkedin.com/feed/update/{share_id}")),
            external_post_id: share_id,
            raw_response: reply.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbsaas_publishing::AccessToken;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(account: &str) -> PublishRequest {
        PublishRequest {
            text: "Our practice is hiring".into(),
            image_urls: vec![],
            platform_account_id: account.into(),
            access_token: AccessToken::new("li-token"),
        }
    }

    #[test]
    fn bare_ids_become_person_urns() {
        assert_eq!(author_urn("abc"), "urn:li:person:abc");
        assert_eq!(author_urn("urn:li:organization:9"), "urn:li:organization:9");
    }

    #[tokio::test]
    async fn posts_share_and_reads_id_from_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .and(header("Authorization", "Bearer li-token"))
            .and(header("X-Restli-Protocol-Version", "2.0.0"))
            .and(body_partial_json(json!({
                "author": "urn:li:person:abc",
                "lifecycleState": "PUBLISHED"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "urn:li:share:123"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = LinkedInPublisher::new(Client::new(), &server.uri())
            .publish(&request("abc"))
            .await
            .unwrap();

        assert_eq!(receipt.external_post_id, "urn:li:share:123");
        assert_eq!(
            receipt.external_url.as_deref(),
            Some("https://www.linkedin.com/feed/update/urn:li:share:123")
        );
    }

    #[tokio::test]
    async fn falls_back_to_restli_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/ugcPosts"))
            .respond_with(
                ResponseTemplate::new(201).insert_header("x-restli-id", "urn:li:share:456"),
            )
            .mount(&server)
            .await;

        let receipt = LinkedInPublisher::new(Client::new(), &server.uri())
            .publish(&request("urn:li:organization:9"))
            .await
            .unwrap();

        assert_eq!(receipt.external_post_id, "urn:li:share:456");
        assert_eq!(receipt.raw_response, Value::Null);
    }

    #[tokio::test]
    async fn expired_token_is_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let err = LinkedInPublisher::new(Client::new(), &server.uri())
            .publish(&request("abc"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "HTTP 401: token expired");
    }
}
