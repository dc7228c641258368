//! Convenience re-exports for common `framescope` types.
//!
//! ```ignore
//! use framescope::prelude::*;
//! ```
//!
//! Covers building a gateway, running the exploration handlers, and shaping
//! custom responses. Transport internals and cache bookkeeping stay in
//! their modules.

// ── Access layer ────────────────────────────────────────────────────
pub use crate::api::{CachingGateway, ImageFormat, RateLimiter, ThrottleRetry, Tier, TierQuota};
pub use crate::config::{ExplorerConfig, GatewayConfig};
pub use crate::error::GatewayError;

// ── Documents ───────────────────────────────────────────────────────
pub use crate::document::{FileDocument, Node, NodeKind};

// ── Sessions and envelopes ──────────────────────────────────────────
pub use crate::envelope::{
    Envelope, Paged, TokenBudget, TokenEstimator, WrapOptions, operation_id, paginate,
    wrap_response,
};
pub use crate::explore::{Explorer, ToolRequest};
pub use crate::session::SessionState;
