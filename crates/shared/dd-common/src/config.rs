use std::fmt;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_UPSTREAM_URL: &str = "http://localhost:3552";
const DEFAULT_UPSTREAM_USERNAME: &str = "admin";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_DEBOUNCE_SECS: u64 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Base URL plus login pair for one upstream API.
#[derive(Clone, PartialEq, Eq)]
pub struct UpstreamCredentials {
    pub url: String,
    /// Username for the container API, e-mail for the proxy manager.
    pub identity: String,
    pub secret: String,
}

impl fmt::Debug for UpstreamCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamCredentials")
            .field("url", &self.url)
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

/// Process configuration, read once from environment variables.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Container API (required).
    pub upstream: UpstreamCredentials,
    /// Reverse-proxy manager, enabled only when fully configured.
    pub proxy: Option<UpstreamCredentials>,
    pub port: u16,
    /// Raw JSON array of static bookmarks.
    pub bookmarks: Option<String>,
    pub refresh_debounce: Duration,
    /// Periodic refresh trigger, disabled when zero.
    pub refresh_interval: Option<Duration>,
    pub upstream_timeout: Duration,
    pub log_json: bool,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let password = get("UPSTREAM_PASSWORD").ok_or(ConfigError::Missing("UPSTREAM_PASSWORD"))?;
        let upstream = UpstreamCredentials {
            url: normalize_url(get("UPSTREAM_URL").as_deref().unwrap_or(DEFAULT_UPSTREAM_URL)),
            identity: get("UPSTREAM_USERNAME").unwrap_or_else(|| DEFAULT_UPSTREAM_USERNAME.to_string()),
            secret: password,
        };

        let proxy = match (get("NPM_URL"), get("NPM_EMAIL"), get("NPM_PASSWORD")) {
            (Some(url), Some(identity), Some(secret)) => Some(UpstreamCredentials {
                url: normalize_url(&url),
                identity,
                secret,
            }),
            _ => None,
        };

        let port = parse_or("PORT", get("PORT"), DEFAULT_PORT)?;
        let debounce = parse_or("REFRESH_DEBOUNCE_SECS", get("REFRESH_DEBOUNCE_SECS"), DEFAULT_DEBOUNCE_SECS)?;
        let interval = parse_or("REFRESH_INTERVAL_SECS", get("REFRESH_INTERVAL_SECS"), 0u64)?;
        let timeout = parse_or("UPSTREAM_TIMEOUT_SECS", get("UPSTREAM_TIMEOUT_SECS"), DEFAULT_TIMEOUT_SECS)?;
        if timeout == 0 {
            return Err(ConfigError::Invalid {
                var: "UPSTREAM_TIMEOUT_SECS",
                value: "0".to_string(),
                reason: "timeout must be positive".to_string(),
            });
        }

        Ok(Self {
            upstream,
            proxy,
            port,
            bookmarks: get("BOOKMARKS"),
            refresh_debounce: Duration::from_secs(debounce),
            refresh_interval: (interval > 0).then(|| Duration::from_secs(interval)),
            upstream_timeout: Duration::from_secs(timeout),
            log_json: get("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json")),
        })
    }
}

fn normalize_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_or<T>(var: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => match v.parse::<T>() {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(ConfigError::Invalid {
                var,
                reason: e.to_string(),
                value: v,
            }),
        },
    }
}
