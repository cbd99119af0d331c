//! X (Twitter) publishing via the v2 API.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use jbsaas_publishing::{Platform, PublishReceipt};

use super::http::{id_field, join_url, send_json};
use super::{PlatformPublisher, PublishError, PublishRequest};

#[derive(Debug, Clone)]
pub struct TwitterPublisher {
    client: Client,
    api_url: String,
}

impl TwitterPublisher {
    pub fn new(client: Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PlatformPublisher for TwitterPublisher {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let reply = send_json(
            self.client
                .post(join_url(&self.api_url, "2/tweets"))
                .bearer_auth(request.access_token.expose())
                .json(&json!({ "text": request.text })),
        )
        .await?;
        let tweet_id = id_field(&reply.body, "/data/id")?;

        Ok(PublishReceipt {
            external_url: Some(format!("https://x.com/i/web/status/{tweet_id}")),
            external_post_id: tweet_id,
            raw_response: reply.body,
        })
    }
}
