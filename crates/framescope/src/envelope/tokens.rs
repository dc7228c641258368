//! Approximate token cost of response payloads.
//!
//! The estimate is a size heuristic, not a tokenizer: serialize the value to
//! JSON, count characters, divide by [`CHARS_PER_TOKEN`], round up. It is
//! good enough to decide whether a payload needs paging or summarizing.

use serde::Serialize;

/// Characters per token. JSON is punctuation-heavy, so this is a bit more
/// generous than the usual prose ratio.
pub const CHARS_PER_TOKEN: f64 = 4.0;

/// Named response budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenBudget {
    /// Normal responses. 4,000 tokens.
    Default,
    /// Absolute ceiling for a single response. 10,000 tokens.
    Hard,
    /// Overviews and summaries. 1,000 tokens.
    Summary,
}

impl TokenBudget {
    pub fn limit(self) -> usize {
        match self {
            TokenBudget::Default => 4_000,
            TokenBudget::Hard => 10_000,
            TokenBudget::Summary => 1_000,
        }
    }
}

/// Estimates the token cost of serializable values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a calibrated chars-per-token ratio. Pass `None` (or a
    /// non-positive ratio) to keep the default.
    pub fn with_calibration(chars_per_token: Option<f64>) -> Self {
        match chars_per_token {
            Some(cpt) if cpt > 0.0 => Self {
                chars_per_token: cpt,
            },
            _ => Self::default(),
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// Estimated tokens for the JSON serialization of `value`.
    ///
    /// Values that fail to serialize count as zero.
    pub fn estimate<T: Serialize + ?Sized>(&self, value: &T) -> usize {
        serde_json::to_string(value).map_or(0, |json| self.estimate_text(&json))
    }

    /// Estimated tokens for raw text.
    pub fn estimate_text(&self, text: &str) -> usize {
        (text.chars().count() as f64 / self.chars_per_token).ceil() as usize
    }

    /// Whether `value` is estimated to cost more than `budget`.
    pub fn will_exceed<T: Serialize + ?Sized>(&self, value: &T, budget: TokenBudget) -> bool {
        self.estimate(value) > budget.limit()
    }
}
