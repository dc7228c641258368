//! Session-scoped exploration state and pagination.
//!
//! One [`SessionState`] exists per active agent session. It remembers which
//! file is being explored, which pages and frames have been visited, the last
//! envelope returned, and every paginated operation that still has pages to
//! deliver. All of it is scoped to the current file: switching files drops
//! the exploration sets and any pending pages.
//!
//! Pagination is driven by operation ids. [`SessionState::store_pending_chunks`]
//! registers the pages of a result whose first page has already been
//! returned; [`SessionState::next_chunk`] hands out the rest one at a time
//! and forgets the operation as soon as its last page is delivered.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Undelivered pages of one paginated result.
#[derive(Debug, Clone)]
struct PendingOperation {
    pages: Vec<Vec<Value>>,
    /// Index of the next page to deliver. Always in `1..pages.len()`.
    current_index: usize,
}

impl PendingOperation {
    fn total_pages(&self) -> usize {
        self.pages.len()
    }
}

/// One page handed out by [`SessionState::next_chunk`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPage {
    pub items: Vec<Value>,
    /// 1-based position of this page.
    pub page_index: usize,
    pub total_pages: usize,
    /// Whether further pages remain after this one.
    pub has_more: bool,
}

/// Outcome of asking for the next page of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum NextChunk {
    Page(ChunkPage),
    /// The operation is unknown or already exhausted.
    NoMoreData,
}

/// Diagnostic view of a pending operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSummary {
    pub operation_id: String,
    pub current_index: usize,
    pub total_pages: usize,
}

/// Read-only snapshot returned by [`SessionState::snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub current_file: Option<String>,
    pub explored_pages: Vec<String>,
    pub explored_frames: Vec<String>,
    pub pending_operations: Vec<PendingSummary>,
    pub has_last_response: bool,
    /// RFC 3339 timestamp of the last mutation.
    pub last_updated: String,
}

/// Mutable exploration and pagination state for one session.
#[derive(Debug, Clone)]
pub struct SessionState {
    current_file: Option<String>,
    explored_pages: BTreeSet<String>,
    explored_frames: BTreeSet<String>,
    pending: HashMap<String, PendingOperation>,
    last_response: Option<Value>,
    last_updated: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            current_file: None,
            explored_pages: BTreeSet::new(),
            explored_frames: BTreeSet::new(),
            pending: HashMap::new(),
            last_response: None,
            last_updated: Utc::now(),
        }
    }

    // ── Current file ───────────────────────────────────────────────

    /// Switch the active file. A different id drops explored pages, explored
    /// frames, and pending operations; the same id leaves them alone.
    pub fn set_current_file(&mut self, file_id: &str) {
        if self.current_file.as_deref() != Some(file_id) {
            debug!(
                "Session file {:?} -> {file_id}: dropping {} pending operation(s)",
                self.current_file,
                self.pending.len()
            );
            self.explored_pages.clear();
            self.explored_frames.clear();
            self.pending.clear();
            self.current_file = Some(file_id.to_string());
        }
        self.touch();
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current_file.as_deref()
    }

    // ── Exploration progress ───────────────────────────────────────

    pub fn mark_page_explored(&mut self, page_id: &str) {
        self.explored_pages.insert(page_id.to_string());
        self.touch();
    }

    pub fn mark_frame_explored(&mut self, frame_id: &str) {
        self.explored_frames.insert(frame_id.to_string());
        self.touch();
    }

    pub fn is_page_explored(&self, page_id: &str) -> bool {
        self.explored_pages.contains(page_id)
    }

    pub fn is_frame_explored(&self, frame_id: &str) -> bool {
        self.explored_frames.contains(frame_id)
    }

    pub fn explored_page_count(&self) -> usize {
        self.explored_pages.len()
    }

    pub fn explored_frame_count(&self) -> usize {
        self.explored_frames.len()
    }

    // ── Last response ──────────────────────────────────────────────

    /// Remember `response` as the last envelope, replacing any earlier one.
    pub fn store_last_response(&mut self, response: Value) {
        self.last_response = Some(response);
        self.touch();
    }

    pub fn last_response(&self) -> Option<&Value> {
        self.last_response.as_ref()
    }

    // ── Pagination ─────────────────────────────────────────────────

    /// Register the pages of a result whose first page was already returned.
    ///
    /// Delivery resumes at the second page. A result with fewer than two
    /// pages has nothing left to deliver, so it is not stored (and any older
    /// operation under the same id is dropped).
    pub fn store_pending_chunks(&mut self, operation_id: &str, pages: Vec<Vec<Value>>) {
        if pages.len() < 2 {
            self.pending.remove(operation_id);
        } else {
            debug!(
                "Registered operation {operation_id}: {} page(s) pending",
                pages.len() - 1
            );
            self.pending.insert(
                operation_id.to_string(),
                PendingOperation {
                    pages,
                    current_index: 1,
                },
            );
        }
        self.touch();
    }

    /// Deliver the next page of `operation_id`, forgetting the operation
    /// once its last page has been handed out.
    pub fn next_chunk(&mut self, operation_id: &str) -> NextChunk {
        let Some(op) = self.pending.get_mut(operation_id) else {
            return NextChunk::NoMoreData;
        };

        let total_pages = op.total_pages();
        let page_index = op.current_index + 1;
        let items = std::mem::take(&mut op.pages[op.current_index]);
        op.current_index += 1;
        let has_more = op.current_index < total_pages;

        if !has_more {
            self.pending.remove(operation_id);
            debug!("Operation {operation_id} exhausted");
        }
        self.touch();

        NextChunk::Page(ChunkPage {
            items,
            page_index,
            total_pages,
            has_more,
        })
    }

    /// Drop any undelivered pages of `operation_id`.
    pub fn cancel_pending(&mut self, operation_id: &str) {
        if self.pending.remove(operation_id).is_some() {
            self.touch();
        }
    }

    /// Whether `operation_id` still has undelivered pages.
    pub fn has_pending_chunks(&self, operation_id: &str) -> bool {
        self.pending.contains_key(operation_id)
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Diagnostic snapshot: sets in sorted order, timestamp as RFC 3339.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut pending_operations: Vec<PendingSummary> = self
            .pending
            .iter()
            .map(|(id, op)| PendingSummary {
                operation_id: id.clone(),
                current_index: op.current_index,
                total_pages: op.total_pages(),
            })
            .collect();
        pending_operations.sort_by(|a, b| a.operation_id.cmp(&b.operation_id));

        SessionSnapshot {
            current_file: self.current_file.clone(),
            explored_pages: self.explored_pages.iter().cloned().collect(),
            explored_frames: self.explored_frames.iter().cloned().collect(),
            pending_operations,
            has_last_response: self.last_response.is_some(),
            last_updated: self
                .last_updated
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn touch(&mut self) {
        self.last_updated = Utc::now();
    }
}
