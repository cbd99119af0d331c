//! Process configuration read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

use jbsaas_infra::platforms::{
    DEFAULT_FACEBOOK_GRAPH_URL, DEFAULT_LINKEDIN_API_URL, DEFAULT_TWITTER_API_URL,
};
use jbsaas_infra::{PlatformEndpoints, ProcessorConfig};

const DEFAULT_BIND_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_BATCH_LIMIT: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where publish jobs live.
#[derive(Clone, PartialEq, Eq)]
pub enum StorageConfig {
    InMemory,
    Postgres { database_url: String },
}

impl core::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StorageConfig::InMemory => f.write_str("InMemory"),
            StorageConfig::Postgres { .. } => f.write_str("Postgres { database_url: REDACTED }"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageConfig,
    /// When set, every route except `/health` requires `Bearer <secret>`.
    pub cron_secret: Option<String>,
    pub publish_timeout: Duration,
    pub batch_limit: usize,
    pub endpoints: PlatformEndpoints,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage", &self.storage)
            .field("cron_secret", &self.cron_secret.as_ref().map(|_| "REDACTED"))
            .field("publish_timeout", &self.publish_timeout)
            .field("batch_limit", &self.batch_limit)
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bind_addr = parse_or("BIND_ADDR", get("BIND_ADDR"), DEFAULT_BIND_ADDR)?;

        let persistent = match get("USE_PERSISTENT_STORES") {
            None => false,
            Some(v) => parse_bool("USE_PERSISTENT_STORES", &v)?,
        };
        let storage = if persistent {
            StorageConfig::Postgres {
                database_url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
            }
        } else {
            StorageConfig::InMemory
        };

        let timeout_secs: u64 = parse_or(
            "PUBLISH_TIMEOUT_SECS",
            get("PUBLISH_TIMEOUT_SECS"),
            DEFAULT_PUBLISH_TIMEOUT_SECS,
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "PUBLISH_TIMEOUT_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let batch_limit: usize =
            parse_or("PUBLISH_BATCH_LIMIT", get("PUBLISH_BATCH_LIMIT"), DEFAULT_BATCH_LIMIT)?;
        if batch_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "PUBLISH_BATCH_LIMIT",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let endpoints = PlatformEndpoints {
            facebook_graph_url: url_or(
                "FACEBOOK_GRAPH_URL",
                get("FACEBOOK_GRAPH_URL"),
                DEFAULT_FACEBOOK_GRAPH_URL,
            )?,
            linkedin_api_url: url_or(
                "LINKEDIN_API_URL",
                get("LINKEDIN_API_URL"),
                DEFAULT_LINKEDIN_API_URL,
            )?,
            twitter_api_url: url_or(
                "TWITTER_API_URL",
                get("TWITTER_API_URL"),
                DEFAULT_TWITTER_API_URL,
            )?,
        };

        Ok(Self {
            bind_addr,
            storage,
            cron_secret: get("CRON_SECRET"),
            publish_timeout: Duration::from_secs(timeout_secs),
            batch_limit,
            endpoints,
        })
    }

    pub fn processor_config(&self) -> ProcessorConfig {
        ProcessorConfig::default()
            .with_publish_timeout(self.publish_timeout)
            .with_batch_limit(self.batch_limit)
    }
}

fn parse_or<T>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

fn url_or(key: &'static str, raw: Option<String>, default: &str) -> Result<String, ConfigError> {
    let value = raw.unwrap_or_else(|| default.to_string());
    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(ConfigError::Invalid {
            key,
            value,
            reason: "must be an http(s) URL".into(),
        });
    }
    Ok(value.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.storage, StorageConfig::InMemory);
        assert_eq!(cfg.cron_secret, None);
        assert_eq!(cfg.publish_timeout, Duration::from_secs(30));
        assert_eq!(cfg.batch_limit, 50);
        assert_eq!(cfg.endpoints, PlatformEndpoints::default());
    }

    #[test]
    fn persistent_storage_requires_database_url() {
        let err = config(&[("USE_PERSISTENT_STORES", "true")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let cfg = config(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/jbsaas"),
        ])
        .unwrap();
        assert_eq!(
            cfg.storage,
            StorageConfig::Postgres {
                database_url: "postgres://localhost/jbsaas".into()
            }
        );
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = config(&[("PUBLISH_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "PUBLISH_TIMEOUT_SECS",
                ..
            }
        ));
        assert!(config(&[("PUBLISH_BATCH_LIMIT", "0")]).is_err());
        assert!(config(&[("USE_PERSISTENT_STORES", "maybe")]).is_err());
    }

    #[test]
    fn endpoint_overrides_are_normalised() {
        let cfg = config(&[("TWITTER_API_URL", "http://127.0.0.1:9000/")]).unwrap();
        assert_eq!(cfg.endpoints.twitter_api_url, "http://127.0.0.1:9000");
        assert!(config(&[("LINKEDIN_API_URL", "ftp://nope")]).is_err());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = config(&[
            ("CRON_SECRET", "s3cret"),
            ("USE_PERSISTENT_STORES", "1"),
            ("DATABASE_URL", "postgres://user:pw@db/jbsaas"),
        ])
        .unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("s3cret"));
        assert!(!dbg.contains("pw@db"));
    }
}
