//! Facebook Page publishing via the Graph API.
//!
//! Text posts go to `/{page_id}/feed`; a post with images goes to
//! `/{page_id}/photos` with the first image and the text as caption.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use jbsaas_publishing::{Platform, PublishReceipt};

use super::http::{id_field, join_url, send_json};
use super::{PlatformPublisher, PublishError, PublishRequest};

#[derive(Debug, Clone)]
pub struct FacebookPublisher {
    client: Client,
    graph_url: String,
}

impl FacebookPublisher {
    pub fn new(client: Client, graph_url: &str) -> Self {
        Self {
            client,
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformPublisher for FacebookPublisher {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let page_id = &request.platform_account_id;

        let (url, payload) = match request.image_urls.first() {
            Some(image_url) => (
                join_url(&self.graph_url, &format!("{page_id}/photos")),
                json!({ "url": image_url, "caption": request.text }),
            ),
            None => (
                join_url(&self.graph_url, &format!("{page_id}/feed")),
                json!({ "message": request.text }),
            ),
        };

        let reply = send_json(
            self.client
                .post(url)
                .bearer_auth(request.access_token.expose())
                .json(&payload),
        )
        .await?;

        // Photo uploads answer with the photo id plus the feed post id.
        let post_id = match id_field(&reply.body, "/post_id") {
            Ok(id) => id,
            Err(_) => id_field(&reply.body, "/id")?,
        };

        Ok(PublishReceipt {
            external_url: Some(format!("https://www.facebook.com/{post_id}")),
            external_post_id: post_id,
            raw_response: reply.body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jbsaas_publishing::AccessToken;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(images: Vec<String>) -> PublishRequest {
        PublishRequest {
            text: "New clinic hours from Monday".into(),
            image_urls: images,
            platform_account_id: "page-123".into(),
            access_token: AccessToken::new("fb-token"),
        }
    }

    fn publisher(server: &MockServer) -> FacebookPublisher {
        FacebookPublisher::new(Client::new(), &server.uri())
    }

    #[tokio::test]
    async fn text_post_goes_to_feed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/page-123/feed"))
            .and(header("Authorization", "Bearer fb-token"))
            .and(body_partial_json(json!({"message": "New clinic hours from Monday"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "page-123_987"})))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = publisher(&server).publish(&request(vec![])).await.unwrap();

        assert_eq!(receipt.external_post_id, "page-123_987");
        assert_eq!(
            receipt.external_url.as_deref(),
            Some("https://www.facebook.com/page-123_987")
        );
        assert_eq!(receipt.raw_response, json!({"id": "page-123_987"}));
    }

    #[tokio::test]
    async fn image_post_goes_to_photos() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/page-123/photos"))
            .and(body_partial_json(json!({"url": "https://cdn.example/a.jpg"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "photo-1", "post_id": "page-123_555"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let receipt = publisher(&server)
            .publish(&request(vec!["https://cdn.example/a.jpg".into()]))
            .await
            .unwrap();

        assert_eq!(receipt.external_post_id, "page-123_555");
    }

    #[tokio::test]
    async fn error_status_is_retryable_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/page-123/feed"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error":{"message":"Invalid OAuth access token"}}"#),
            )
            .mount(&server)
            .await;

        let err = publisher(&server).publish(&request(vec![])).await.unwrap_err();

        match &err {
            PublishError::Http { status, body } => {
                assert_eq!(*status, 400);
                assert!(body.contains("Invalid OAuth access token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn missing_id_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let err = publisher(&server).publish(&request(vec![])).await.unwrap_err();
        assert!(matches!(err, PublishError::MalformedResponse(_)));
    }
}
