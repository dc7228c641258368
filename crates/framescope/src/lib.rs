//! Rate-limited, caching access to a design-file API, shaped for LLM agents.
//!
//! `framescope` sits between an agent and a remote design-document service
//! that meters requests per tier and answers over-quota calls with HTTP 429.
//! It provides:
//!
//! - [`RateLimiter`](api::limiter::RateLimiter): per-tier sliding-window
//!   admission with async waiting.
//! - [`CachingGateway`](api::gateway::CachingGateway): the single funnel for
//!   outbound calls. Memoizes responses per `(endpoint, parameters)` and
//!   retries throttled calls after the server's `Retry-After`.
//! - [`SessionState`](session::SessionState): what the agent has explored
//!   and which paginated results are still pending.
//! - [`wrap_response`](envelope::chunker::wrap_response): the outward
//!   `{data, _navigation, _guidance, _progress}` envelope, with a token
//!   estimate from [`TokenEstimator`](envelope::tokens::TokenEstimator).
//! - [`Explorer`](explore::Explorer): the per-session context object and the
//!   tool handlers built from the pieces above.
//!
//! # Getting started
//!
//! ```ignore
//! use framescope::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), GatewayError> {
//!     let config = GatewayConfig::from_env()?;
//!     let gateway = CachingGateway::connect(&config)?;
//!     let explorer = Explorer::new(gateway, ExplorerConfig::default());
//!
//!     let pages = explorer.list_pages("FILE_KEY").await?;
//!     println!("{}", pages.to_value());
//!
//!     let frames = explorer.list_frames("FILE_KEY", "Home", false).await?;
//!     println!("{}", frames.to_value());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod document;
pub mod envelope;
pub mod error;
pub mod explore;
pub mod prelude;
pub mod session;

pub use api::{
    ApiRequest, CachingGateway, DESIGN_API_URL, Fetched, HttpTransport, RateLimiter,
    ThrottleRetry, Tier, TierQuota, Transport,
};
pub use config::{ExplorerConfig, GatewayConfig};
pub use envelope::{Envelope, TokenEstimator, WrapOptions, wrap_response};
pub use error::GatewayError;
pub use explore::{Explorer, ToolRequest};
pub use session::SessionState;
