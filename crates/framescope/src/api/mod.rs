//! Design-API access layer: admission control, transport, caching, retry.
//!
//! - [`limiter`]: per-tier sliding-window [`RateLimiter`].
//! - [`transport`]: the [`Transport`] seam and the `reqwest`-backed
//!   [`HttpTransport`].
//! - [`cache`]: process-lifetime [`ResponseCache`] keyed by endpoint and
//!   ordered parameters.
//! - [`retry`]: [`ThrottleRetry`]: sleep for the server's `Retry-After`,
//!   then try again.
//! - [`gateway`]: [`CachingGateway`], the single funnel tying them together.

pub mod cache;
pub mod gateway;
pub mod limiter;
pub mod retry;
pub mod transport;

pub use cache::{CacheStats, ResponseCache};
pub use gateway::{CachingGateway, ImageFormat, StyleMeta};
pub use limiter::{RateLimiter, Tier, TierQuota};
pub use retry::ThrottleRetry;
pub use transport::{ApiRequest, DESIGN_API_URL, Fetched, HttpTransport, Transport};
