//! Response shaping: token estimates, paging, and the outward envelope.
//!
//! - [`tokens`]: [`TokenEstimator`] and the named [`TokenBudget`]s.
//! - [`chunker`]: page splitting, operation ids, and [`wrap_response`].

pub mod chunker;
pub mod tokens;

pub use chunker::{
    DEFAULT_PAGE_SIZE, Envelope, Navigation, PageView, Paged, WrapOptions, chunk_array,
    operation_id, paginate, resume_pagination, start_pagination, wrap_response,
};
pub use tokens::{CHARS_PER_TOKEN, TokenBudget, TokenEstimator};
