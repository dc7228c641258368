//! The single funnel for outbound design-API calls.
//!
//! Every request goes through [`CachingGateway::request`]:
//!
//! 1. a cached response for the same `(endpoint, parameters)` is returned
//!    immediately, without consuming an admission slot (unless
//!    `charge_cache_hits` is set, in which case admission comes first);
//! 2. otherwise the caller waits for a slot in the request's tier;
//! 3. the cache is checked again, since another caller may have filled it
//!    while this one was waiting;
//! 4. the request is sent. Throttled responses are retried after the
//!    server-declared delay; any other failure propagates unchanged;
//! 5. the successful body is cached and returned.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::cache::{CacheStats, ResponseCache};
use crate::api::limiter::{RateLimiter, Tier};
use crate::api::retry::ThrottleRetry;
use crate::api::transport::{ApiRequest, Fetched, HttpTransport, Transport};
use crate::config::GatewayConfig;
use crate::document::{FileDocument, Node};
use crate::error::GatewayError;

pub use crate::document::{find_frame_by_name, find_page_by_name};

/// Smallest and largest render scale accepted by the images endpoint.
pub const MIN_IMAGE_SCALE: f32 = 0.01;
pub const MAX_IMAGE_SCALE: f32 = 4.0;

/// Output format for rendered images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpg,
    Svg,
    Pdf,
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageFormat::Png => write!(f, "png"),
            ImageFormat::Jpg => write!(f, "jpg"),
            ImageFormat::Svg => write!(f, "svg"),
            ImageFormat::Pdf => write!(f, "pdf"),
        }
    }
}

/// Published style metadata from the styles endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleMeta {
    pub key: String,
    pub name: String,
    pub style_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Deserialize)]
struct NodesResponse {
    #[serde(default)]
    nodes: BTreeMap<String, Option<NodeEntry>>,
}

#[derive(Deserialize)]
struct NodeEntry {
    document: Node,
}

#[derive(Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    images: BTreeMap<String, Option<String>>,
}

#[derive(Deserialize)]
struct StylesResponse {
    meta: StylesMeta,
}

#[derive(Deserialize)]
struct StylesMeta {
    #[serde(default)]
    styles: Vec<StyleMeta>,
}

/// Rate-limited, caching, throttle-retrying client for the design API.
pub struct CachingGateway {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    cache: Mutex<ResponseCache>,
    retry: ThrottleRetry,
    charge_cache_hits: bool,
    cancel: CancellationToken,
}

impl CachingGateway {
    /// Build a gateway over an arbitrary transport.
    pub fn new(config: &GatewayConfig, transport: Arc<dyn Transport>) -> Result<Self, GatewayError> {
        Ok(Self {
            transport,
            limiter: RateLimiter::new(config.tiers.iter().copied())?,
            cache: Mutex::new(ResponseCache::new()),
            retry: config.retry.clone(),
            charge_cache_hits: config.charge_cache_hits,
            cancel: CancellationToken::new(),
        })
    }

    /// Build a gateway talking HTTP to the configured endpoint.
    pub fn connect(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if config.access_token.trim().is_empty() {
            return Err(GatewayError::validation("access token is empty"));
        }
        let transport = HttpTransport::new(&config.base_url, &config.access_token, config.timeout)?;
        Self::new(config, Arc::new(transport))
    }

    /// Use `token` for every admission wait and backoff sleep.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token observed by admission waits and backoff sleeps.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Perform one logical GET, returning the (possibly cached) JSON body.
    pub async fn request(&self, request: &ApiRequest) -> Result<Value, GatewayError> {
        let key = request.cache_key();

        if !self.charge_cache_hits
            && let Some(hit) = self.lock_cache().get(&key)
        {
            debug!("Cache hit: {} [{}]", request.endpoint, key.1);
            return Ok(hit);
        }

        self.limiter.wait_for_slot(request.tier, &self.cancel).await?;

        // Checked again after the wait: another caller may have filled it.
        let filled = if self.charge_cache_hits {
            self.lock_cache().get(&key)
        } else {
            self.lock_cache().peek(&key).cloned()
        };
        if let Some(hit) = filled {
            debug!("Cache hit after admission: {} [{}]", request.endpoint, key.1);
            return Ok(hit);
        }

        let value = self.fetch_with_retry(request).await?;
        self.lock_cache().put(key, value.clone());
        Ok(value)
    }

    async fn fetch_with_retry(&self, request: &ApiRequest) -> Result<Value, GatewayError> {
        let mut retries = 0u32;
        loop {
            match self.transport.get(request).await? {
                Fetched::Body(value) => {
                    if retries > 0 {
                        info!(
                            "{} succeeded after {retries} throttled attempt(s)",
                            request.endpoint
                        );
                    }
                    return Ok(value);
                }
                Fetched::Throttled { retry_after } => {
                    if !self.retry.allows_retry(retries) {
                        warn!(
                            "{} still throttled after {} attempt(s), giving up",
                            request.endpoint,
                            retries + 1
                        );
                        return Err(GatewayError::Throttled {
                            attempts: retries + 1,
                        });
                    }
                    let delay = self.retry.delay_for(retry_after, retries);
                    warn!(
                        "{} throttled, retrying in {:.1}s (retry {})",
                        request.endpoint,
                        delay.as_secs_f64(),
                        retries + 1
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(GatewayError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    retries += 1;
                }
            }
        }
    }

    /// Fetch a whole file, optionally limited to `depth` levels.
    pub async fn fetch_document(
        &self,
        file_id: &str,
        depth: Option<u32>,
    ) -> Result<FileDocument, GatewayError> {
        require("file id", file_id)?;
        let mut request = ApiRequest::new(format!("files/{file_id}"), Tier::Tier1);
        if let Some(depth) = depth {
            request = request.param("depth", depth);
        }
        let value = self.request(&request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Fetch a file with every hidden node (and its subtree) removed.
    pub async fn fetch_visible_document(
        &self,
        file_id: &str,
        depth: Option<u32>,
    ) -> Result<FileDocument, GatewayError> {
        let file = self.fetch_document(file_id, depth).await?;
        let document = file
            .document
            .prune_invisible()
            .ok_or_else(|| GatewayError::not_found(format!("visible content in file '{file_id}'")))?;
        Ok(FileDocument { document, ..file })
    }

    /// Fetch a single node subtree.
    pub async fn fetch_node(&self, file_id: &str, node_id: &str) -> Result<Node, GatewayError> {
        require("file id", file_id)?;
        require("node id", node_id)?;
        let request =
            ApiRequest::new(format!("files/{file_id}/nodes"), Tier::Tier1).param("ids", node_id);
        let value = self.request(&request).await?;
        let mut response: NodesResponse = serde_json::from_value(value)?;
        response
            .nodes
            .remove(node_id)
            .flatten()
            .map(|entry| entry.document)
            .ok_or_else(|| GatewayError::not_found(format!("node '{node_id}' in file '{file_id}'")))
    }

    /// Render nodes to images, returning node id → image URL (`None` when
    /// the node could not be rendered).
    pub async fn fetch_image(
        &self,
        file_id: &str,
        node_ids: &[String],
        format: ImageFormat,
        scale: f32,
    ) -> Result<BTreeMap<String, Option<String>>, GatewayError> {
        require("file id", file_id)?;
        if node_ids.is_empty() || node_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(GatewayError::validation("node ids must be non-empty"));
        }
        if !(MIN_IMAGE_SCALE..=MAX_IMAGE_SCALE).contains(&scale) {
            return Err(GatewayError::validation(format!(
                "scale {scale} outside {MIN_IMAGE_SCALE}..={MAX_IMAGE_SCALE}"
            )));
        }
        let request = ApiRequest::new(format!("images/{file_id}"), Tier::Tier1)
            .param("ids", node_ids.join(","))
            .param("format", format)
            .param("scale", scale);
        let value = self.request(&request).await?;
        let response: ImagesResponse = serde_json::from_value(value)?;
        if let Some(err) = response.err {
            return Err(GatewayError::Upstream {
                status: 200,
                body: err,
            });
        }
        Ok(response.images)
    }

    /// Fetch the published styles of a file.
    pub async fn fetch_styles(&self, file_id: &str) -> Result<Vec<StyleMeta>, GatewayError> {
        require("file id", file_id)?;
        let request = ApiRequest::new(format!("files/{file_id}/styles"), Tier::Tier3);
        let value = self.request(&request).await?;
        let response: StylesResponse = serde_json::from_value(value)?;
        Ok(response.meta.styles)
    }

    /// Discard every memoized response.
    pub fn clear_cache(&self) {
        let mut cache = self.lock_cache();
        let dropped = cache.len();
        cache.clear();
        info!("Cleared {dropped} cached response(s)");
    }

    pub fn cache_len(&self) -> usize {
        self.lock_cache().len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ResponseCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn require(what: &str, value: &str) -> Result<(), GatewayError> {
    if value.trim().is_empty() {
        Err(GatewayError::validation(format!("{what} is empty")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every request with a fixed body and counts calls.
    struct FixedTransport {
        body: Value,
        calls: AtomicUsize,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl FixedTransport {
        fn new(body: Value) -> Arc<Self> {
            Arc::new(Self {
                body,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    impl Transport for FixedTransport {
        fn get<'a>(
            &'a self,
            request: &'a ApiRequest,
        ) -> BoxFuture<'a, Result<Fetched, GatewayError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let body = self.body.clone();
            Box::pin(async move { Ok(Fetched::Body(body)) })
        }
    }

    fn gateway(transport: Arc<FixedTransport>) -> CachingGateway {
        CachingGateway::new(&GatewayConfig::default(), transport).unwrap()
    }

    #[tokio::test]
    async fn validation_happens_before_any_call() {
        let transport = FixedTransport::new(json!({}));
        let gw = gateway(transport.clone());

        assert!(matches!(
            gw.fetch_document(" ", None).await,
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            gw.fetch_node("abc", "").await,
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            gw.fetch_image("abc", &[], ImageFormat::Png, 1.0).await,
            Err(GatewayError::Validation(_))
        ));
        assert!(matches!(
            gw.fetch_image("abc", &["1:2".into()], ImageFormat::Png, 8.0).await,
            Err(GatewayError::Validation(_))
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        assert_eq!(gw.limiter().in_window(Tier::Tier1), 0);
    }

    #[tokio::test]
    async fn document_request_carries_depth() {
        let transport = FixedTransport::new(json!({
            "name": "Design",
            "document": {"id": "0:0", "name": "Document", "type": "DOCUMENT"}
        }));
        let gw = gateway(transport.clone());

        let file = gw.fetch_document("abc", Some(2)).await.unwrap();
        assert_eq!(file.name, "Design");

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].endpoint, "files/abc");
        assert_eq!(seen[0].params, vec![("depth".to_string(), "2".to_string())]);
    }

    #[tokio::test]
    async fn node_lookup_missing_is_not_found() {
        let transport = FixedTransport::new(json!({"nodes": {"1:2": null}}));
        let gw = gateway(transport);
        let err = gw.fetch_node("abc", "1:2").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound(_)));
    }

    #[tokio::test]
    async fn image_request_shape() {
        let transport = FixedTransport::new(json!({
            "err": null,
            "images": {"1:2": "https://img/1", "3:4": null}
        }));
        let gw = gateway(transport.clone());

        let images = gw
            .fetch_image("abc", &["1:2".into(), "3:4".into()], ImageFormat::Svg, 2.0)
            .await
            .unwrap();
        assert_eq!(images["1:2"].as_deref(), Some("https://img/1"));
        assert!(images["3:4"].is_none());

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen[0].endpoint, "images/abc");
        assert_eq!(seen[0].cache_key().1, "ids=1:2,3:4&format=svg&scale=2");
    }

    #[tokio::test]
    async fn styles_use_tier3() {
        let transport = FixedTransport::new(json!({
            "meta": {"styles": [
                {"key": "k1", "name": "Primary", "style_type": "FILL", "node_id": "5:1"}
            ]}
        }));
        let gw = gateway(transport.clone());
        let styles = gw.fetch_styles("abc").await.unwrap();
        assert_eq!(styles[0].name, "Primary");
        assert_eq!(transport.seen.lock().unwrap()[0].tier, Tier::Tier3);
    }

    #[tokio::test]
    async fn visible_document_prunes_hidden_nodes() {
        let transport = FixedTransport::new(json!({
            "name": "Design",
            "document": {
                "id": "0:0", "name": "Document", "type": "DOCUMENT",
                "children": [
                    {"id": "1:1", "name": "Page", "type": "CANVAS"},
                    {"id": "2:1", "name": "Scratch", "type": "CANVAS", "visible": false}
                ]
            }
        }));
        let gw = gateway(transport);
        let file = gw.fetch_visible_document("abc", None).await.unwrap();
        assert_eq!(file.document.children.len(), 1);
    }

    #[tokio::test]
    async fn cache_hit_does_not_consume_a_slot_by_default() {
        let transport = FixedTransport::new(json!({"meta": {"styles": []}}));
        let gw = gateway(transport.clone());
        gw.fetch_styles("abc").await.unwrap();
        gw.fetch_styles("abc").await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.limiter().in_window(Tier::Tier3), 1);
        assert_eq!(gw.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn charged_cache_hits_consume_a_slot() {
        let transport = FixedTransport::new(json!({"meta": {"styles": []}}));
        let config = GatewayConfig::default().with_charge_cache_hits(true);
        let gw = CachingGateway::new(&config, transport.clone()).unwrap();
        gw.fetch_styles("abc").await.unwrap();
        gw.fetch_styles("abc").await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gw.limiter().in_window(Tier::Tier3), 2);
    }

    #[tokio::test]
    async fn clear_cache_forces_refetch() {
        let transport = FixedTransport::new(json!({"meta": {"styles": []}}));
        let gw = gateway(transport.clone());
        gw.fetch_styles("abc").await.unwrap();
        gw.clear_cache();
        assert_eq!(gw.cache_len(), 0);
        gw.fetch_styles("abc").await.unwrap();
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn connect_requires_token() {
        let err = CachingGateway::connect(&GatewayConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::Validation(_)));
    }
}
