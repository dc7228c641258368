//! Outbound HTTP seam.
//!
//! The gateway talks to the design API only through the [`Transport`]
//! trait. [`HttpTransport`] is the production implementation on top of
//! `reqwest`; tests substitute counting or scripted transports.

use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, trace};

use crate::api::cache::{CacheKey, cache_key};
use crate::api::limiter::Tier;
use crate::api::retry::parse_retry_after;
use crate::error::GatewayError;

/// Public REST endpoint of the design API.
pub const DESIGN_API_URL: &str = "https://api.figma.com/v1";

/// Header carrying the personal access token.
pub const TOKEN_HEADER: &str = "X-Figma-Token";

/// One logical GET against the design API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    /// Path relative to the API root, e.g. `files/abc123/nodes`.
    pub endpoint: String,
    /// Query parameters in declaration order.
    pub params: Vec<(String, String)>,
    /// Admission tier the request is charged against.
    pub tier: Tier,
}

impl ApiRequest {
    pub fn new(endpoint: impl Into<String>, tier: Tier) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            tier,
        }
    }

    /// Append a query parameter.
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    /// Cache key for this request.
    pub fn cache_key(&self) -> CacheKey {
        cache_key(&self.endpoint, &self.params)
    }
}

/// Result of one outbound attempt that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Successful response body.
    Body(Value),
    /// The server asked us to slow down, optionally saying for how long.
    Throttled { retry_after: Option<Duration> },
}

/// Performs outbound GET requests.
///
/// Implementations report throttling as [`Fetched::Throttled`] and every
/// other failure as an error; the gateway owns retry policy.
pub trait Transport: Send + Sync {
    fn get<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<Fetched, GatewayError>>;
}

/// `reqwest`-backed transport for the design API.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpTransport {
    /// Create a transport against `base_url` using `access_token`.
    pub fn new(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("framescope/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            access_token: access_token.into(),
        })
    }

    /// Absolute URL for a request, query parameters included.
    pub fn url_for(&self, request: &ApiRequest) -> Result<reqwest::Url, GatewayError> {
        let raw = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            request.endpoint.trim_start_matches('/')
        );
        let parsed = if request.params.is_empty() {
            reqwest::Url::parse(&raw)
        } else {
            reqwest::Url::parse_with_params(&raw, &request.params)
        };
        parsed.map_err(|e| GatewayError::Config(format!("invalid API URL '{raw}': {e}")))
    }

    async fn send(&self, request: &ApiRequest) -> Result<Fetched, GatewayError> {
        let url = self.url_for(request)?;
        debug!("Design API request: GET {url} ({})", request.tier);

        let start = Instant::now();
        let resp = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.access_token)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(
                resp.headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            debug!("Design API throttled {}: retry after {retry_after:?}", request.endpoint);
            return Ok(Fetched::Throttled { retry_after });
        }

        let text = resp.text().await?;
        debug!(
            "Design API response: HTTP {} in {:.1}s ({} bytes)",
            status,
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(GatewayError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        trace!("Response body prefix: {}", text.chars().take(200).collect::<String>());
        Ok(Fetched::Body(serde_json::from_str(&text)?))
    }
}

impl Transport for HttpTransport {
    fn get<'a>(&'a self, request: &'a ApiRequest) -> BoxFuture<'a, Result<Fetched, GatewayError>> {
        Box::pin(self.send(request))
    }
}
