//! Instagram Business publishing via the Graph API.
//!
//! Two steps: create a media container (`/{ig_user_id}/media`), then publish
//! it (`/{ig_user_id}/media_publish`). The publish call is only made once a
//! container id is in hand.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use jbsaas_publishing::{Platform, PublishReceipt};

use super::http::{id_field, join_url, send_json};
use super::{PlatformPublisher, PublishError, PublishRequest};

#[derive(Debug, Clone)]
pub struct InstagramPublisher {
    client: Client,
    graph_url: String,
}

impl InstagramPublisher {
    pub fn new(client: Client, graph_url: &str) -> Self {
        Self {
            client,
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }

    async fn create_container(
        &self,
        request: &PublishRequest,
        image_url: &str,
    ) -> Result<(String, serde_json::Value), PublishError> {
        let url = join_url(
            &self.graph_url,
            &format!("{}/media", request.platform_account_id),
        );
        let reply = send_json(
            self.client
                .post(url)
                .bearer_auth(request.access_token.expose())
                .json(&json!({ "image_url": image_url, "caption": request.text })),
        )
        .await?;
        let creation_id = id_field(&reply.body, "/id")?;
        Ok((creation_id, reply.body))
    }
}

#[async_trait]
impl PlatformPublisher for InstagramPublisher {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let image_url = request
            .image_urls
            .first()
            .ok_or(PublishError::MissingImage {
                platform: Platform::Instagram,
            })?;

        let (creation_id, container) = self
            .create_container(request, image_url)
            .await
            .map_err(|e| PublishError::ContainerCreate(Box::new(e)))?;
        debug!(creation_id = %creation_id, "instagram media container created");

        let url = join_url(
            &self.graph_url,
            &format!("{}/media_publish", request.platform_account_id),
        );
        let reply = send_json(
            self.client
                .post(url)
                .bearer_auth(request.access_token.expose())
                .json(&json!({ "creation_id": creation_id })),
        )
        .await?;
        let media_id = id_field(&reply.body, "/id")?;

        Ok(PublishReceipt {
            external_post_id: media_id,
            // Permalinks need a further lookup; the media id is enough to find the post.
            external_url: None,
            raw_response: json!({ "container": container, "publish": reply.body }),
        })
    }
}
