//! Paging of oversized results and the outward response envelope.
//!
//! Handlers hand their result arrays to [`paginate`]. Small results come
//! back whole; large ones are cut into fixed-size pages, the first page is
//! returned, and the rest are parked in the [`SessionState`] under an
//! operation id. A later call with the same operation id and
//! `continue: true` picks them up. [`start_pagination`],
//! [`resume_pagination`] and [`chunk_array`] are the steps underneath.
//!
//! Whatever the handler returns is wrapped by [`wrap_response`] into an
//! [`Envelope`]: `{data, _navigation?, _guidance?, _progress?}`.

use serde::Serialize;
use serde_json::Value;

use crate::envelope::tokens::TokenEstimator;
use crate::error::GatewayError;
use crate::session::{NextChunk, SessionState};

/// Items per page when the caller does not say otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 20;

// ── Operation ids ──────────────────────────────────────────────────

/// Stable id for a logical query, derived from its defining parameters.
///
/// Re-issuing the same query (same kind, same parameters in the same
/// order) yields the same id, which is what lets a stateless caller resume
/// pagination.
pub fn operation_id(kind: &str, params: &[(&str, &str)]) -> String {
    let mut canonical = String::new();
    for (key, value) in params {
        canonical.push_str(key);
        canonical.push('=');
        canonical.push_str(value);
        canonical.push('\u{1f}');
    }
    format!("{kind}:{:016x}", fnv1a(&canonical))
}

/// FNV-1a 64-bit hash.
fn fnv1a(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

// ── Chunking ───────────────────────────────────────────────────────

/// First page of a result that was split into several pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FirstPage {
    pub items: Vec<Value>,
    /// Always 1.
    pub page_index: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Split `items` into pages of `page_size` and park all of them under
/// `operation_id`.
///
/// Returns `Ok(None)` when everything fits in one page; the caller should
/// then return `items` unpaginated. Otherwise returns the first page.
pub fn chunk_array(
    session: &mut SessionState,
    items: &[Value],
    operation_id: &str,
    page_size: usize,
) -> Result<Option<FirstPage>, GatewayError> {
    if page_size == 0 {
        return Err(GatewayError::validation("page size must be positive"));
    }
    if items.len() <= page_size {
        return Ok(None);
    }

    let pages: Vec<Vec<Value>> = items.chunks(page_size).map(<[Value]>::to_vec).collect();
    let total_pages = pages.len();
    let first = pages[0].clone();
    session.store_pending_chunks(operation_id, pages);

    Ok(Some(FirstPage {
        items: first,
        page_index: 1,
        total_pages,
        total_items: items.len(),
    }))
}

/// One page of a (possibly unpaginated) result, as handlers report it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub items: Vec<Value>,
    pub page_index: usize,
    pub total_pages: usize,
    /// Known only when the page comes from a fresh query.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<usize>,
    pub has_more: bool,
}

impl PageView {
    /// Progress line for the navigation block.
    pub fn progress_line(&self) -> String {
        match self.total_items {
            Some(total) => format!(
                "Page {} of {} ({} items total)",
                self.page_index, self.total_pages, total
            ),
            None => format!("Page {} of {}", self.page_index, self.total_pages),
        }
    }
}

/// Start a fresh paginated query: page the result or return it whole.
///
/// Any pages left over from an earlier run of the same query are replaced.
pub fn start_pagination(
    session: &mut SessionState,
    operation_id: &str,
    items: Vec<Value>,
    page_size: usize,
) -> Result<PageView, GatewayError> {
    match chunk_array(session, &items, operation_id, page_size)? {
        Some(first) => Ok(PageView {
            items: first.items,
            page_index: first.page_index,
            total_pages: first.total_pages,
            total_items: Some(first.total_items),
            has_more: true,
        }),
        None => {
            session.cancel_pending(operation_id);
            let total = items.len();
            Ok(PageView {
                items,
                page_index: 1,
                total_pages: 1,
                total_items: Some(total),
                has_more: false,
            })
        }
    }
}

/// Continue a paginated query. `None` means there is nothing left.
pub fn resume_pagination(session: &mut SessionState, operation_id: &str) -> Option<PageView> {
    match session.next_chunk(operation_id) {
        NextChunk::Page(page) => Some(PageView {
            items: page.items,
            page_index: page.page_index,
            total_pages: page.total_pages,
            total_items: None,
            has_more: page.has_more,
        }),
        NextChunk::NoMoreData => None,
    }
}

/// Result of one [`paginate`] step.
#[derive(Debug, Clone, PartialEq)]
pub enum Paged {
    /// A page of results, or the whole list when it fits on one page.
    Page(PageView),
    /// A continuation found nothing pending for the operation.
    Exhausted,
}

/// Run one step of the continuation protocol.
///
/// With `resume` set, hands out the next pending page of `operation_id`
/// and ignores `items`. Otherwise starts the query afresh from `items`.
pub fn paginate(
    session: &mut SessionState,
    operation_id: &str,
    items: Vec<Value>,
    resume: bool,
    page_size: usize,
) -> Result<Paged, GatewayError> {
    if resume {
        return Ok(resume_pagination(session, operation_id).map_or(Paged::Exhausted, Paged::Page));
    }
    start_pagination(session, operation_id, items, page_size).map(Paged::Page)
}

// ── Envelope ───────────────────────────────────────────────────────

/// Navigation metadata attached to an envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Navigation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub can_continue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_this_response: Option<usize>,
}

/// The object returned to the ultimate caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    pub data: Value,
    #[serde(rename = "_navigation", skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
    #[serde(rename = "_guidance", skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    #[serde(rename = "_progress", skip_serializing_if = "Option::is_none")]
    pub progress: Option<Value>,
}

impl Envelope {
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// What [`wrap_response`] should attach around the data.
#[derive(Debug, Clone, Default)]
pub struct WrapOptions {
    pub progress: Option<String>,
    pub can_continue: Option<bool>,
    pub step: Option<String>,
    pub next_step: Option<String>,
    pub guidance: Option<String>,
    pub progress_detail: Option<Value>,
    /// Attach `tokensThisResponse` to the navigation block.
    pub estimate_tokens: bool,
}

impl WrapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Progress and continuation derived from a page.
    pub fn for_page(page: &PageView) -> Self {
        Self {
            progress: Some(page.progress_line()),
            can_continue: Some(page.has_more),
            ..Default::default()
        }
    }

    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = Some(progress.into());
        self
    }

    pub fn with_can_continue(mut self, can_continue: bool) -> Self {
        self.can_continue = Some(can_continue);
        self
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_next_step(mut self, next_step: impl Into<String>) -> Self {
        self.next_step = Some(next_step.into());
        self
    }

    pub fn with_guidance(mut self, guidance: impl Into<String>) -> Self {
        self.guidance = Some(guidance.into());
        self
    }

    pub fn with_progress_detail(mut self, detail: Value) -> Self {
        self.progress_detail = Some(detail);
        self
    }

    pub fn with_token_estimate(mut self, enabled: bool) -> Self {
        self.estimate_tokens = enabled;
        self
    }
}

/// Build the outward envelope and record it as the session's last response.
///
/// The navigation block appears only when `options` carries progress text
/// or a continuation flag. When token estimation is on, the estimate covers
/// the fully assembled envelope minus the estimate field itself.
pub fn wrap_response(
    session: &mut SessionState,
    estimator: &TokenEstimator,
    data: Value,
    options: WrapOptions,
) -> Envelope {
    let navigation = (options.progress.is_some() || options.can_continue.is_some()).then(|| {
        Navigation {
            progress: options.progress,
            can_continue: options.can_continue,
            step: options.step,
            next_step: options.next_step,
            tokens_this_response: None,
        }
    });

    let mut envelope = Envelope {
        data,
        navigation,
        guidance: options.guidance,
        progress: options.progress_detail,
    };

    if options.estimate_tokens {
        let tokens = estimator.estimate(&envelope);
        if let Some(nav) = envelope.navigation.as_mut() {
            nav.tokens_this_response = Some(tokens);
        }
    }

    session.store_last_response(envelope.to_value());
    envelope
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn numbered(n: usize) -> Vec<Value> {
        (1..=n).map(|i| json!(i)).collect()
    }

    #[test]
    fn small_result_is_not_chunked() {
        let mut session = SessionState::new();
        let items = numbered(20);
        assert!(chunk_array(&mut session, &items, "op", 20).unwrap().is_none());
        assert!(!session.has_pending_chunks("op"));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut session = SessionState::new();
        let err = chunk_array(&mut session, &numbered(3), "op", 0).unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
    }

    #[test]
    fn forty_five_items_in_pages_of_twenty() {
        let mut session = SessionState::new();
        let items = numbered(45);

        let first = chunk_array(&mut session, &items, "op", 20)
            .unwrap()
            .unwrap();
        assert_eq!(first.items.len(), 20);
        assert_eq!(first.page_index, 1);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.total_items, 45);

        let second = resume_pagination(&mut session, "op").unwrap();
        assert_eq!(second.items, numbered(40)[20..].to_vec());
        let third = resume_pagination(&mut session, "op").unwrap();
        assert_eq!(third.items, items[40..].to_vec());
        assert!(!third.has_more);

        assert!(!session.has_pending_chunks("op"));
        assert!(resume_pagination(&mut session, "op").is_none());
    }

    #[test]
    fn chunking_is_a_lossless_partition() {
        for (len, size) in [(21, 20), (100, 7), (13, 1), (64, 16)] {
            let mut session = SessionState::new();
            let items = numbered(len);
            let first = chunk_array(&mut session, &items, "op", size)
                .unwrap()
                .unwrap();

            let mut pages = vec![first.items];
            while let Some(page) = resume_pagination(&mut session, "op") {
                pages.push(page.items);
            }

            assert_eq!(pages.len(), first.total_pages);
            let (last, full) = pages.split_last().unwrap();
            assert!(full.iter().all(|p| p.len() == size));
            assert!(!last.is_empty() && last.len() <= size);
            assert_eq!(pages.concat(), items, "len={len} size={size}");
        }
    }

    #[test]
    fn paginate_follows_the_continue_flag() {
        let mut session = SessionState::new();

        let Paged::Page(first) = paginate(&mut session, "op", numbered(25), false, 10).unwrap()
        else {
            panic!("expected a first page");
        };
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.total_items, Some(25));

        // Items are ignored on resume.
        let Paged::Page(second) = paginate(&mut session, "op", numbered(3), true, 10).unwrap()
        else {
            panic!("expected a second page");
        };
        assert_eq!(second.items[0], json!(11));
        assert_eq!(second.page_index, 2);

        paginate(&mut session, "op", Vec::new(), true, 10).unwrap();
        assert_eq!(
            paginate(&mut session, "op", Vec::new(), true, 10).unwrap(),
            Paged::Exhausted
        );
    }

    #[test]
    fn paginate_returns_small_results_whole() {
        let mut session = SessionState::new();
        let Paged::Page(view) = paginate(&mut session, "op", numbered(4), false, 10).unwrap()
        else {
            panic!("expected the whole list");
        };
        assert_eq!(view.items.len(), 4);
        assert!(!view.has_more);
        assert_eq!(
            paginate(&mut session, "op", Vec::new(), true, 10).unwrap(),
            Paged::Exhausted
        );
    }

    #[test]
    fn start_pagination_replaces_stale_pages() {
        let mut session = SessionState::new();
        start_pagination(&mut session, "op", numbered(50), 10).unwrap();
        assert!(session.has_pending_chunks("op"));

        let view = start_pagination(&mut session, "op", numbered(5), 10).unwrap();
        assert_eq!(view.items.len(), 5);
        assert!(!view.has_more);
        assert_eq!(view.progress_line(), "Page 1 of 1 (5 items total)");
        assert!(!session.has_pending_chunks("op"));
    }

    #[test]
    fn operation_id_is_stable_and_parameter_sensitive() {
        let a = operation_id("list_frames", &[("file", "abc"), ("page", "Home")]);
        let b = operation_id("list_frames", &[("file", "abc"), ("page", "Home")]);
        let c = operation_id("list_frames", &[("file", "abc"), ("page", "Cover")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("list_frames:"));
        // Concatenation ambiguity is avoided by the separator.
        assert_ne!(
            operation_id("k", &[("a", "bc")]),
            operation_id("k", &[("ab", "c")])
        );
    }

    #[test]
    fn envelope_without_progress_has_no_navigation() {
        let mut session = SessionState::new();
        let env = wrap_response(
            &mut session,
            &TokenEstimator::new(),
            json!([1, 2]),
            WrapOptions::new()
                .with_step("ignored without progress")
                .with_guidance("Pick a frame"),
        );
        assert!(env.navigation.is_none());
        let value = env.to_value();
        assert!(value.get("_navigation").is_none());
        assert_eq!(value["_guidance"], "Pick a frame");
    }

    #[test]
    fn continuation_flag_alone_adds_navigation() {
        let mut session = SessionState::new();
        let env = wrap_response(
            &mut session,
            &TokenEstimator::new(),
            json!([]),
            WrapOptions::new().with_can_continue(false),
        );
        assert_eq!(env.to_value()["_navigation"], json!({"canContinue": false}));
    }

    #[test]
    fn token_estimate_excludes_itself() {
        let mut session = SessionState::new();
        let estimator = TokenEstimator::new();
        let env = wrap_response(
            &mut session,
            &estimator,
            json!({"items": ["a", "b", "c"]}),
            WrapOptions::new()
                .with_progress("Page 1 of 2")
                .with_can_continue(true)
                .with_next_step("call again with continue=true")
                .with_token_estimate(true),
        );

        let tokens = env.navigation.as_ref().unwrap().tokens_this_response.unwrap();
        let mut without = env.clone();
        without.navigation.as_mut().unwrap().tokens_this_response = None;
        assert_eq!(tokens, estimator.estimate(&without));
    }

    #[test]
    fn wrap_records_last_response() {
        let mut session = SessionState::new();
        let env = wrap_response(
            &mut session,
            &TokenEstimator::new(),
            json!({"pages": 3}),
            WrapOptions::new().with_progress_detail(json!({"explored": 1})),
        );
        assert_eq!(session.last_response(), Some(&env.to_value()));
        assert_eq!(env.to_value()["_progress"]["explored"], 1);
    }
}
