//! Upstream endpoint and cache configuration.
//!
//! Every setting has a default and can be overridden from the environment with
//! [`UpstreamConfig::from_env`]. Absent or unparseable variables keep the default.

use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default perpetuals API base URL.
pub const DEFAULT_PERPS_URL: &str = "https://mainnet-gw.sodex.dev";

/// Default spot API base URL.
pub const DEFAULT_SPOT_URL: &str = "https://mainnet-spot.sodex.dev";

/// Default fallback mark price API base URL.
pub const DEFAULT_FALLBACK_URL: &str = "https://api.sodex.com";

/// Default internal PnL overview service base URL.
pub const DEFAULT_PNL_URL: &str = "http://127.0.0.1:8080";

/// Default HTTP request timeout (10 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time-to-live of a fulfilled cache entry (30 seconds).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Errors building an [`UpstreamConfig`].
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid {name} URL '{value}': {reason}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Upstream client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Perpetuals API: positions, symbols, account details, primary mark prices
    pub perps_url: Url,
    /// Spot API: spot token balances
    pub spot_url: Url,
    /// Secondary market data API used when the primary has no price for a token
    pub fallback_url: Url,
    /// Internal PnL overview service
    pub pnl_url: Url,
    /// Per-request timeout enforced by the HTTP client
    pub request_timeout: Duration,
    /// How long a fulfilled result is reused before the producer runs again
    pub cache_ttl: Duration,
}

impl UpstreamConfig {
    /// Configuration pointing at the default production endpoints.
    pub fn try_default() -> Result<Self, ConfigError> {
        Ok(Self {
            perps_url: parse_url("DEX_PERPS_URL", DEFAULT_PERPS_URL)?,
            spot_url: parse_url("DEX_SPOT_URL", DEFAULT_SPOT_URL)?,
            fallback_url: parse_url("DEX_FALLBACK_URL", DEFAULT_FALLBACK_URL)?,
            pnl_url: parse_url("DEX_PNL_URL", DEFAULT_PNL_URL)?,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        })
    }

    /// Build a configuration pointing every upstream at the same base URL.
    ///
    /// Primarily intended for tests that serve all endpoints from one mock server.
    pub fn with_base_url(base_url: Url) -> Self {
        Self {
            perps_url: base_url.clone(),
            spot_url: base_url.clone(),
            fallback_url: base_url.clone(),
            pnl_url: base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }

    /// Load configuration from environment variables:
    /// `DEX_PERPS_URL`, `DEX_SPOT_URL`, `DEX_FALLBACK_URL`, `DEX_PNL_URL`,
    /// `DEX_HTTP_TIMEOUT_SECS`, `DEX_CACHE_TTL_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::try_default()?;

        let url_var = |name: &str, default: Url| {
            lookup(name)
                .and_then(|raw| Url::parse(raw.trim()).ok())
                .unwrap_or(default)
        };

        let secs_var = |name: &str, default: Duration| {
            lookup(name)
                .and_then(|raw| raw.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Ok(Self {
            perps_url: url_var("DEX_PERPS_URL", defaults.perps_url),
            spot_url: url_var("DEX_SPOT_URL", defaults.spot_url),
            fallback_url: url_var("DEX_FALLBACK_URL", defaults.fallback_url),
            pnl_url: url_var("DEX_PNL_URL", defaults.pnl_url),
            request_timeout: secs_var("DEX_HTTP_TIMEOUT_SECS", defaults.request_timeout),
            cache_ttl: secs_var("DEX_CACHE_TTL_SECS", defaults.cache_ttl),
        })
    }

    /// Set the HTTP request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the cache time-to-live
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw).map_err(|error| ConfigError::InvalidUrl {
        name,
        value: raw.to_string(),
        reason: error.to_string(),
    })
}
