use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use jbsaas_core::{AccountId, PostId, TenantId};

/// OAuth access token for a destination account.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl core::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("AccessToken(REDACTED)")
    }
}

/// A previously authorized identity on an external platform.
///
/// Read-only to the publishing core; created by the OAuth exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationAccount {
    pub id: AccountId,
    pub tenant_id: TenantId,
    /// Raw platform tag as stored. Parsed into [`crate::Platform`] at dispatch.
    pub platform: String,
    /// Platform-side identity: page id, IG user id, LinkedIn author URN or X user id.
    pub platform_account_id: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub access_token: AccessToken,
}

/// Content payload referenced by a publish job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    pub id: PostId,
    pub tenant_id: TenantId,
    pub content: String,
    /// Public image URLs, in display order.
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
}
