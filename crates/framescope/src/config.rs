//! Gateway and explorer configuration with sensible defaults.
//!
//! [`GatewayConfig`] captures endpoint, credentials, tier quotas, and retry
//! policy; [`ExplorerConfig`] captures how results are paged and reported.
//! Both are plain structs with `with_*` builders, so callers can start from
//! `Default` (or [`GatewayConfig::from_env`]) and override what they need.

use std::time::Duration;

use crate::api::limiter::TierQuota;
use crate::api::retry::ThrottleRetry;
use crate::api::transport::DESIGN_API_URL;
use crate::envelope::chunker::DEFAULT_PAGE_SIZE;
use crate::error::GatewayError;

/// Environment variable holding the API access token.
pub const ACCESS_TOKEN_ENV: &str = "FIGMA_ACCESS_TOKEN";

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "FIGMA_API_URL";

/// Configuration for a [`CachingGateway`](crate::api::gateway::CachingGateway).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API root. Default: [`DESIGN_API_URL`].
    pub base_url: String,
    /// Personal access token sent with every request.
    pub access_token: String,
    /// Admission quota per tier. Default: [`TierQuota::defaults`].
    pub tiers: Vec<TierQuota>,
    /// Throttle recovery policy. Default: unbounded, no jitter.
    pub retry: ThrottleRetry,
    /// Charge an admission slot even when the response is cached.
    /// Default: `false`.
    pub charge_cache_hits: bool,
    /// Per-request HTTP timeout. Default: 60s.
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DESIGN_API_URL.to_string(),
            access_token: String::new(),
            tiers: TierQuota::defaults(),
            retry: ThrottleRetry::default(),
            charge_cache_hits: false,
            timeout: Duration::from_secs(60),
        }
    }
}

impl GatewayConfig {
    /// Defaults plus the access token (required) and base URL (optional)
    /// from the environment.
    pub fn from_env() -> Result<Self, GatewayError> {
        let token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| GatewayError::validation(format!("{ACCESS_TOKEN_ENV} is not set")))?;
        let mut config = Self::default().with_access_token(token);
        if let Ok(url) = std::env::var(API_URL_ENV)
            && !url.trim().is_empty()
        {
            config.base_url = url;
        }
        Ok(config)
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = token.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Replace all tier quotas.
    pub fn with_tiers(mut self, tiers: Vec<TierQuota>) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_retry(mut self, retry: ThrottleRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_charge_cache_hits(mut self, charge: bool) -> Self {
        self.charge_cache_hits = charge;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How the explorer pages and annotates its responses.
#[derive(Debug, Clone)]
pub struct ExplorerConfig {
    /// Items per page for paginated results. Default: 20.
    pub page_size: usize,
    /// Attach `tokensThisResponse` to navigation blocks. Default: `true`.
    pub token_estimates: bool,
    /// Depth used when listing pages and frames. Default: `Some(3)`.
    pub outline_depth: Option<u32>,
    /// Calibrated chars-per-token ratio for estimates. Default: `None`
    /// (4 chars per token).
    pub chars_per_token: Option<f64>,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            token_estimates: true,
            outline_depth: Some(3),
            chars_per_token: None,
        }
    }
}

impl ExplorerConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_token_estimates(mut self, enabled: bool) -> Self {
        self.token_estimates = enabled;
        self
    }

    pub fn with_outline_depth(mut self, depth: Option<u32>) -> Self {
        self.outline_depth = depth;
        self
    }

    pub fn with_chars_per_token(mut self, ratio: Option<f64>) -> Self {
        self.chars_per_token = ratio;
        self
    }
}
