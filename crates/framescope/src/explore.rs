//! Exploration handlers: the per-session context object and the tool
//! operations an agent calls.
//!
//! [`Explorer`] owns one [`CachingGateway`], one [`SessionState`], and one
//! [`TokenEstimator`]. It is constructed once per session and passed by
//! reference to whatever hosts the tools (the CLI in this crate). Every
//! handler follows the same shape: fetch through the gateway, derive a
//! result list, page it through the session, wrap it in an [`Envelope`].
//!
//! The session lock is never held across an `.await`.

use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::api::gateway::{CachingGateway, ImageFormat, find_frame_by_name, find_page_by_name};
use crate::config::ExplorerConfig;
use crate::document::{Node, NodeKind, Rect};
use crate::envelope::chunker::{Envelope, Paged, WrapOptions, operation_id, paginate, wrap_response};
use crate::envelope::tokens::{TokenBudget, TokenEstimator};
use crate::error::GatewayError;
use crate::session::{SessionSnapshot, SessionState};

/// A tool call as received from the host, e.g.
/// `{"tool": "list_frames", "fileId": "abc", "pageName": "Home", "continue": true}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ToolRequest {
    ListPages {
        file_id: String,
    },
    ListFrames {
        file_id: String,
        page_name: String,
        #[serde(rename = "continue", default)]
        resume: bool,
    },
    SearchNodes {
        file_id: String,
        query: String,
        #[serde(rename = "continue", default)]
        resume: bool,
    },
    FrameDetails {
        file_id: String,
        page_name: String,
        frame_name: String,
    },
    ListStyles {
        file_id: String,
        #[serde(rename = "continue", default)]
        resume: bool,
    },
    RenderImages {
        file_id: String,
        node_ids: Vec<String>,
        #[serde(default)]
        format: ImageFormat,
        #[serde(default = "default_scale")]
        scale: f32,
    },
    SessionState,
    ResetSession,
    ClearCache,
}

fn default_scale() -> f32 {
    1.0
}

impl ToolRequest {
    pub fn name(&self) -> &'static str {
        match self {
            ToolRequest::ListPages { .. } => "list_pages",
            ToolRequest::ListFrames { .. } => "list_frames",
            ToolRequest::SearchNodes { .. } => "search_nodes",
            ToolRequest::FrameDetails { .. } => "frame_details",
            ToolRequest::ListStyles { .. } => "list_styles",
            ToolRequest::RenderImages { .. } => "render_images",
            ToolRequest::SessionState => "session_state",
            ToolRequest::ResetSession => "reset_session",
            ToolRequest::ClearCache => "clear_cache",
        }
    }
}

/// Compact description of a node for listings.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NodeSummary<'a> {
    id: &'a str,
    name: &'a str,
    #[serde(rename = "type")]
    kind: NodeKind,
    child_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    bounds: Option<Rect>,
}

fn summarize(node: &Node) -> Result<Value, GatewayError> {
    Ok(serde_json::to_value(NodeSummary {
        id: &node.id,
        name: &node.name,
        kind: node.kind,
        child_count: node.children.len(),
        bounds: node.bounds,
    })?)
}

/// Per-session context: gateway, session state, and response shaping.
pub struct Explorer {
    gateway: CachingGateway,
    session: Mutex<SessionState>,
    estimator: TokenEstimator,
    config: ExplorerConfig,
}

impl Explorer {
    pub fn new(gateway: CachingGateway, config: ExplorerConfig) -> Self {
        Self {
            gateway,
            session: Mutex::new(SessionState::new()),
            estimator: TokenEstimator::with_calibration(config.chars_per_token),
            config,
        }
    }

    pub fn gateway(&self) -> &CachingGateway {
        &self.gateway
    }

    /// Lock the session state. Do not hold the guard across an `.await`.
    pub fn session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Dispatch one tool call.
    pub async fn handle(&self, request: ToolRequest) -> Result<Envelope, GatewayError> {
        info!("Tool call: {}", request.name());
        match request {
            ToolRequest::ListPages { file_id } => self.list_pages(&file_id).await,
            ToolRequest::ListFrames {
                file_id,
                page_name,
                resume,
            } => self.list_frames(&file_id, &page_name, resume).await,
            ToolRequest::SearchNodes {
                file_id,
                query,
                resume,
            } => self.search_nodes(&file_id, &query, resume).await,
            ToolRequest::FrameDetails {
                file_id,
                page_name,
                frame_name,
            } => self.frame_details(&file_id, &page_name, &frame_name).await,
            ToolRequest::ListStyles { file_id, resume } => self.list_styles(&file_id, resume).await,
            ToolRequest::RenderImages {
                file_id,
                node_ids,
                format,
                scale,
            } => self.render_images(&file_id, &node_ids, format, scale).await,
            ToolRequest::SessionState => Ok(self.session_state()),
            ToolRequest::ResetSession => Ok(self.reset_session()),
            ToolRequest::ClearCache => Ok(self.clear_cache()),
        }
    }

    /// Top-level pages of a file. Also makes it the session's current file.
    pub async fn list_pages(&self, file_id: &str) -> Result<Envelope, GatewayError> {
        let file = self.gateway.fetch_visible_document(file_id, Some(1)).await?;

        let mut session = self.session();
        session.set_current_file(file_id);
        let pages: Vec<Value> = file
            .document
            .children
            .iter()
            .map(|page| {
                json!({
                    "id": page.id,
                    "name": page.name,
                    "explored": session.is_page_explored(&page.id),
                })
            })
            .collect();

        let options = WrapOptions::new()
            .with_progress(format!("{} page(s) in '{}'", pages.len(), file.name))
            .with_step("Pages")
            .with_next_step("Call list_frames with one of these page names")
            .with_progress_detail(progress_detail(&session));
        let data = json!({"file": file.name, "pages": pages});
        Ok(self.wrap(&mut session, data, options))
    }

    /// Container nodes directly under a page, paginated.
    pub async fn list_frames(
        &self,
        file_id: &str,
        page_name: &str,
        resume: bool,
    ) -> Result<Envelope, GatewayError> {
        let op = operation_id("list_frames", &[("fileId", file_id), ("page", page_name)]);
        if resume {
            return self.resume(&op);
        }

        let file = self
            .gateway
            .fetch_visible_document(file_id, self.config.outline_depth)
            .await?;
        let page = find_page_by_name(&file.document, page_name)?;
        let frames = page
            .children
            .iter()
            .filter(|node| node.kind.is_container())
            .map(summarize)
            .collect::<Result<Vec<_>, _>>()?;

        let mut session = self.session();
        session.set_current_file(file_id);
        session.mark_page_explored(&page.id);
        let mut context = Map::new();
        context.insert("page".into(), json!({"id": page.id, "name": page.name}));
        let step = format!("Frames in '{}'", page.name);
        self.paged(&mut session, &op, frames, context, Some(step))
    }

    /// Every node whose name contains `query`, paginated.
    pub async fn search_nodes(
        &self,
        file_id: &str,
        query: &str,
        resume: bool,
    ) -> Result<Envelope, GatewayError> {
        if query.trim().is_empty() {
            return Err(GatewayError::validation("search query is empty"));
        }
        let op = operation_id("search_nodes", &[("fileId", file_id), ("query", query)]);
        if resume {
            return self.resume(&op);
        }

        let file = self.gateway.fetch_visible_document(file_id, None).await?;
        let hits = file
            .document
            .search(query)
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;
        debug!("search '{query}' matched {} node(s)", hits.len());

        let mut session = self.session();
        session.set_current_file(file_id);
        let mut context = Map::new();
        context.insert("query".into(), json!(query));
        let step = format!("Search results for '{query}'");
        self.paged(&mut session, &op, hits, context, Some(step))
    }

    /// A single frame with its direct children.
    pub async fn frame_details(
        &self,
        file_id: &str,
        page_name: &str,
        frame_name: &str,
    ) -> Result<Envelope, GatewayError> {
        let file = self
            .gateway
            .fetch_visible_document(file_id, self.config.outline_depth)
            .await?;
        let page = find_page_by_name(&file.document, page_name)?;
        let frame_id = find_frame_by_name(page, frame_name)?.id.clone();
        let page_id = page.id.clone();

        // The outline may be depth-limited; fetch the frame's full subtree.
        let frame = self
            .gateway
            .fetch_node(file_id, &frame_id)
            .await?
            .prune_invisible()
            .ok_or_else(|| GatewayError::not_found(format!("visible frame '{frame_name}'")))?;

        let children = frame
            .children
            .iter()
            .map(summarize)
            .collect::<Result<Vec<_>, _>>()?;
        let data = json!({
            "frame": summarize(&frame)?,
            "descendantCount": frame.subtree_len() - 1,
            "children": children,
        });

        let mut session = self.session();
        session.set_current_file(file_id);
        session.mark_page_explored(&page_id);
        session.mark_frame_explored(&frame_id);

        let mut options = WrapOptions::new()
            .with_progress(format!(
                "{} frame(s) explored in this file",
                session.explored_frame_count()
            ))
            .with_step(format!("Details of '{}'", frame.name))
            .with_progress_detail(progress_detail(&session));
        if self.estimator.will_exceed(&data, TokenBudget::Default) {
            options = options.with_guidance(
                "This frame is large; use search_nodes to target specific layers instead of \
                 reading it whole.",
            );
        }
        Ok(self.wrap(&mut session, data, options))
    }

    /// Published styles of a file, paginated.
    pub async fn list_styles(&self, file_id: &str, resume: bool) -> Result<Envelope, GatewayError> {
        let op = operation_id("list_styles", &[("fileId", file_id)]);
        if resume {
            return self.resume(&op);
        }

        let styles = self
            .gateway
            .fetch_styles(file_id)
            .await?
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()?;

        let mut session = self.session();
        session.set_current_file(file_id);
        self.paged(&mut session, &op, styles, Map::new(), Some("Styles".into()))
    }

    /// Render nodes and return their image URLs.
    pub async fn render_images(
        &self,
        file_id: &str,
        node_ids: &[String],
        format: ImageFormat,
        scale: f32,
    ) -> Result<Envelope, GatewayError> {
        let images = self
            .gateway
            .fetch_image(file_id, node_ids, format, scale)
            .await?;
        let mut session = self.session();
        Ok(self.wrap(
            &mut session,
            json!({"format": format, "scale": scale, "images": images}),
            WrapOptions::new(),
        ))
    }

    pub fn session_state(&self) -> Envelope {
        let mut session = self.session();
        let snapshot: SessionSnapshot = session.snapshot();
        let data = serde_json::to_value(snapshot).unwrap_or(Value::Null);
        self.wrap(&mut session, data, WrapOptions::new())
    }

    pub fn reset_session(&self) -> Envelope {
        let mut session = self.session();
        session.reset();
        self.wrap(&mut session, json!({"reset": true}), WrapOptions::new())
    }

    pub fn clear_cache(&self) -> Envelope {
        self.gateway.clear_cache();
        let mut session = self.session();
        self.wrap(&mut session, json!({"cacheCleared": true}), WrapOptions::new())
    }

    /// Continue a paginated query by operation id.
    fn resume(&self, op: &str) -> Result<Envelope, GatewayError> {
        let mut session = self.session();
        self.page_step(&mut session, op, Vec::new(), true, Map::new(), None)
    }

    /// Start a paginated query from `items`.
    fn paged(
        &self,
        session: &mut SessionState,
        op: &str,
        items: Vec<Value>,
        context: Map<String, Value>,
        step: Option<String>,
    ) -> Result<Envelope, GatewayError> {
        self.page_step(session, op, items, false, context, step)
    }

    /// One pagination step wrapped in an envelope. `context` carries the
    /// handler's extra data fields.
    fn page_step(
        &self,
        session: &mut SessionState,
        op: &str,
        items: Vec<Value>,
        resume: bool,
        mut context: Map<String, Value>,
        step: Option<String>,
    ) -> Result<Envelope, GatewayError> {
        context.insert("operationId".into(), json!(op));
        let mut options = match paginate(session, op, items, resume, self.config.page_size)? {
            Paged::Page(view) => {
                let next = if view.has_more {
                    "Call again with the same arguments and continue=true for the next page"
                } else {
                    "All results delivered"
                };
                let options = WrapOptions::for_page(&view).with_next_step(next);
                context.insert("items".into(), Value::Array(view.items));
                options
            }
            Paged::Exhausted => {
                context.insert("items".into(), Value::Array(Vec::new()));
                WrapOptions::new()
                    .with_progress("No more data")
                    .with_can_continue(false)
                    .with_guidance(
                        "Nothing is pending for this query. Run it again without continue to \
                         start over.",
                    )
            }
        };
        if let Some(step) = step {
            options = options.with_step(step);
        }
        let options = options.with_progress_detail(progress_detail(session));
        Ok(self.wrap(session, Value::Object(context), options))
    }

    fn wrap(&self, session: &mut SessionState, data: Value, options: WrapOptions) -> Envelope {
        let options = options.with_token_estimate(self.config.token_estimates);
        wrap_response(session, &self.estimator, data, options)
    }
}

fn progress_detail(session: &SessionState) -> Value {
    json!({
        "currentFile": session.current_file(),
        "exploredPages": session.explored_page_count(),
        "exploredFrames": session.explored_frame_count(),
    })
}
