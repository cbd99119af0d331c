use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported destination platforms.
///
/// Accounts store their platform as a free-form tag; it is parsed into this
/// closed set at dispatch time so every routing decision is an exhaustive
/// match.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Facebook,
    Instagram,
    #[serde(rename = "linkedin")]
    LinkedIn,
    Twitter,
}

/// The stored platform tag does not name a supported platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported platform: {0}")]
pub struct UnsupportedPlatform(pub String);

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Facebook,
        Platform::Instagram,
        Platform::LinkedIn,
        Platform::Twitter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::LinkedIn => "linkedin",
            Platform::Twitter => "twitter",
        }
    }

    /// Whether a post must carry at least one image to be accepted.
    pub fn requires_image(&self) -> bool {
        matches!(self, Platform::Instagram)
    }

    /// Whether the publisher attaches images at all. LinkedIn and X posts
    /// are text-only here.
    pub fn attaches_images(&self) -> bool {
        matches!(self, Platform::Facebook | Platform::Instagram)
    }

    /// Longest text the platform accepts, in characters.
    pub fn max_text_chars(&self) -> usize {
        match self {
            Platform::Facebook => 63_206,
            Platform::Instagram => 2_200,
            Platform::LinkedIn => 3_000,
            Platform::Twitter => 280,
        }
    }

    /// Human-facing name used in error messages.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::Facebook => "Facebook",
            Platform::Instagram => "Instagram",
            Platform::LinkedIn => "LinkedIn",
            Platform::Twitter => "X",
        }
    }
}

impl core::fmt::Display for Platform {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnsupportedPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facebook" => Ok(Platform::Facebook),
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::LinkedIn),
            "twitter" | "x" => Ok(Platform::Twitter),
            _ => Err(UnsupportedPlatform(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_tags_case_insensitively() {
        assert_eq!("Facebook".parse::<Platform>().unwrap(), Platform::Facebook);
        assert_eq!(" instagram ".parse::<Platform>().unwrap(), Platform::Instagram);
        assert_eq!("LINKEDIN".parse::<Platform>().unwrap(), Platform::LinkedIn);
        assert_eq!("x".parse::<Platform>().unwrap(), Platform::Twitter);
    }

    #[test]
    fn unknown_tag_is_unsupported() {
        let err = "myspace".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "Unsupported platform: myspace");
    }

    #[test]
    fn tags_round_trip_through_as_str() {
        for p in Platform::ALL {
            assert_eq!(p.as_str().parse::<Platform>().unwrap(), p);
        }
    }

    #[test]
    fn only_instagram_requires_an_image() {
        let requiring: Vec<_> = Platform::ALL.iter().filter(|p| p.requires_image()).collect();
        assert_eq!(requiring, vec![&Platform::Instagram]);
    }

    #[test]
    fn image_requirement_implies_image_support() {
        for p in Platform::ALL {
            assert!(!p.requires_image() || p.attaches_images(), "{p}");
        }
    }

    #[test]
    fn x_has_the_tightest_text_limit() {
        let min = Platform::ALL.iter().map(|p| p.max_text_chars()).min();
        assert_eq!(min, Some(Platform::Twitter.max_text_chars()));
    }
}
