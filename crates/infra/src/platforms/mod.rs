//! Platform publishers.
//!
//! One adapter per [`Platform`], each turning a [`PublishRequest`] into the
//! platform's outbound API call(s) and normalising the answer into a
//! [`PublishReceipt`].
//!
//! ## Error classes
//!
//! | Class | Variants | Retryable |
//! |-------|----------|-----------|
//! | Precondition | `UnsupportedPlatform`, `MissingImage`, `EmptyContent`, `ContentTooLong`, `MissingCredential` | no |
//! | Platform call | `Http`, `Transport`, `Timeout`, `MalformedResponse`, `Panicked` | yes |
//! | Two-step | `ContainerCreate` | as its inner error |
//!
//! Preconditions are checked by [`Publishers::publish`] before any adapter
//! runs, so a request that fails them never reaches the network.

pub mod facebook;
mod http;
pub mod instagram;
pub mod linkedin;
pub mod twitter;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use jbsaas_publishing::{AccessToken, DestinationAccount, Platform, PostContent, PublishReceipt};

pub use facebook::FacebookPublisher;
pub use instagram::InstagramPublisher;
pub use linkedin::LinkedInPublisher;
pub use twitter::TwitterPublisher;

pub const DEFAULT_FACEBOOK_GRAPH_URL: &str = "https://graph.facebook.com/v18.0";
pub const DEFAULT_LINKEDIN_API_URL: &str = "https://api.linkedin.com";
pub const DEFAULT_TWITTER_API_URL: &str = "https://api.twitter.com";

/// Everything a publisher needs for one delivery. Credentials travel with
/// the request; publishers hold no per-account state.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub text: String,
    pub image_urls: Vec<String>,
    pub platform_account_id: String,
    pub access_token: AccessToken,
}

impl PublishRequest {
    pub fn new(post: &PostContent, account: &DestinationAccount) -> Self {
        Self {
            text: post.content.clone(),
            image_urls: post.image_urls.clone(),
            platform_account_id: account.platform_account_id.clone(),
            access_token: account.access_token.clone(),
        }
    }

    /// Check platform preconditions without touching the network.
    pub fn validate(&self, platform: Platform) -> Result<(), PublishError> {
        if self.access_token.is_blank() {
            return Err(PublishError::MissingCredential);
        }
        if platform.requires_image() && self.image_urls.is_empty() {
            return Err(PublishError::MissingImage { platform });
        }

        let has_text = !self.text.trim().is_empty();
        let has_media = platform.attaches_images() && !self.image_urls.is_empty();
        if !has_text && !has_media {
            return Err(PublishError::EmptyContent { platform });
        }

        let max = platform.max_text_chars();
        if self.text.chars().count() > max {
            return Err(PublishError::ContentTooLong { platform, max });
        }
        Ok(())
    }
}

/// Publisher error.
#[derive(Debug, Clone, Error)]
pub enum PublishError {
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("{} requires at least one image", platform.label())]
    MissingImage { platform: Platform },

    #[error("{} post has no content", platform.label())]
    EmptyContent { platform: Platform },

    #[error("{} post exceeds {max} characters", platform.label())]
    ContentTooLong { platform: Platform, max: usize },

    #[error("account has no access token")]
    MissingCredential,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("container creation failed: {0}")]
    ContainerCreate(Box<PublishError>),

    #[error("publisher panicked: {0}")]
    Panicked(String),
}

impl PublishError {
    /// Whether another attempt could succeed without anyone changing the
    /// post or the account.
    pub fn is_retryable(&self) -> bool {
        match self {
            PublishError::UnsupportedPlatform(_)
            | PublishError::MissingImage { .. }
            | PublishError::EmptyContent { .. }
            | PublishError::ContentTooLong { .. }
            | PublishError::MissingCredential => false,
            PublishError::Http { .. }
            | PublishError::Transport(_)
            | PublishError::Timeout
            | PublishError::MalformedResponse(_)
            | PublishError::Panicked(_) => true,
            PublishError::ContainerCreate(inner) => inner.is_retryable(),
        }
    }
}

/// Platform adapter.
#[async_trait]
pub trait PlatformPublisher: Send + Sync {
    fn platform(&self) -> Platform;

    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError>;
}

/// API base URLs, overridable for sandboxes and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformEndpoints {
    pub facebook_graph_url: String,
    pub linkedin_api_url: String,
    pub twitter_api_url: String,
}

impl Default for PlatformEndpoints {
    fn default() -> Self {
        Self {
            facebook_graph_url: DEFAULT_FACEBOOK_GRAPH_URL.to_string(),
            linkedin_api_url: DEFAULT_LINKEDIN_API_URL.to_string(),
            twitter_api_url: DEFAULT_TWITTER_API_URL.to_string(),
        }
    }
}

/// One publisher per platform. Routing is an exhaustive match, so adding a
/// platform without an adapter does not compile.
#[derive(Clone)]
pub struct Publishers {
    facebook: Arc<dyn PlatformPublisher>,
    instagram: Arc<dyn PlatformPublisher>,
    linkedin: Arc<dyn PlatformPublisher>,
    twitter: Arc<dyn PlatformPublisher>,
}

impl Publishers {
    pub fn new(
        facebook: Arc<dyn PlatformPublisher>,
        instagram: Arc<dyn PlatformPublisher>,
        linkedin: Arc<dyn PlatformPublisher>,
        twitter: Arc<dyn PlatformPublisher>,
    ) -> Self {
        Self {
            facebook,
            instagram,
            linkedin,
            twitter,
        }
    }

    /// HTTP adapters sharing one client with a per-request timeout.
    pub fn http(endpoints: &PlatformEndpoints, timeout: Duration) -> Result<Self, PublishError> {
        let client = http::build_client(timeout)?;
        Ok(Self::new(
            Arc::new(FacebookPublisher::new(client.clone(), &endpoints.facebook_graph_url)),
            Arc::new(InstagramPublisher::new(client.clone(), &endpoints.facebook_graph_url)),
            Arc::new(LinkedInPublisher::new(client.clone(), &endpoints.linkedin_api_url)),
            Arc::new(TwitterPublisher::new(client, &endpoints.twitter_api_url)),
        ))
    }

    /// Replace the adapter for one platform.
    pub fn with_publisher(mut self, publisher: Arc<dyn PlatformPublisher>) -> Self {
        match publisher.platform() {
            Platform::Facebook => self.facebook = publisher,
            Platform::Instagram => self.instagram = publisher,
            Platform::LinkedIn => self.linkedin = publisher,
            Platform::Twitter => self.twitter = publisher,
        }
        self
    }

    pub fn for_platform(&self, platform: Platform) -> Arc<dyn PlatformPublisher> {
        match platform {
            Platform::Facebook => Arc::clone(&self.facebook),
            Platform::Instagram => Arc::clone(&self.instagram),
            Platform::LinkedIn => Arc::clone(&self.linkedin),
            Platform::Twitter => Arc::clone(&self.twitter),
        }
    }

    /// Validate, then hand the request to the platform's adapter.
    pub async fn publish(
        &self,
        platform: Platform,
        request: &PublishRequest,
    ) -> Result<PublishReceipt, PublishError> {
        request.validate(platform)?;
        self.for_platform(platform).publish(request).await
    }
}

impl core::fmt::Debug for Publishers {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Publishers").finish_non_exhaustive()
    }
}
