//! Design document tree and the pure operations the gateway layers on it.
//!
//! A fetched file is a tree of [`Node`]s: the root `DOCUMENT` holds one
//! `CANVAS` per page, pages hold frames, frames hold layers. Pruning and
//! lookups here are plain recursive functions with no network or caching
//! concerns.

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// Kind tag of a document node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Document,
    Canvas,
    Frame,
    Group,
    Section,
    Component,
    ComponentSet,
    Instance,
    Text,
    Vector,
    Rectangle,
    Ellipse,
    Line,
    BooleanOperation,
    Slice,
    #[serde(other)]
    Other,
}

impl NodeKind {
    /// Container-like kinds considered by frame/component lookup.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Frame
                | NodeKind::Group
                | NodeKind::Section
                | NodeKind::Component
                | NodeKind::ComponentSet
                | NodeKind::Instance
        )
    }
}

/// Absolute bounding box of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// One node of a design document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default = "default_visible", skip_serializing_if = "is_true")]
    pub visible: bool,
    #[serde(
        rename = "absoluteBoundingBox",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub bounds: Option<Rect>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
}

fn default_visible() -> bool {
    true
}

fn is_true(v: &bool) -> bool {
    *v
}

/// Response of the whole-file endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDocument {
    pub name: String,
    #[serde(default)]
    pub last_modified: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    pub document: Node,
}

/// A search hit together with the names of its ancestors.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMatch {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Ancestor names from the search root (exclusive) down to the parent.
    pub path: Vec<String>,
}

impl Node {
    /// Remove every hidden node and its subtree.
    ///
    /// Returns `None` when the node itself is hidden.
    pub fn prune_invisible(self) -> Option<Node> {
        if !self.visible {
            return None;
        }
        let children = self
            .children
            .into_iter()
            .filter_map(Node::prune_invisible)
            .collect();
        Some(Node { children, ..self })
    }

    /// Number of nodes in this subtree, the node itself included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Node::subtree_len).sum::<usize>()
    }

    /// Pre-order search of descendants whose name contains `query`
    /// (case-insensitive).
    pub fn search(&self, query: &str) -> Vec<NodeMatch> {
        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        let mut path = Vec::new();
        for child in &self.children {
            collect_matches(child, &needle, &mut path, &mut hits);
        }
        hits
    }
}

fn collect_matches(node: &Node, needle: &str, path: &mut Vec<String>, hits: &mut Vec<NodeMatch>) {
    if node.name.to_lowercase().contains(needle) {
        hits.push(NodeMatch {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            path: path.clone(),
        });
    }
    path.push(node.name.clone());
    for child in &node.children {
        collect_matches(child, needle, path, hits);
    }
    path.pop();
}

/// First top-level child of `document` whose name contains `name`
/// (case-insensitive), in document order.
pub fn find_page_by_name<'a>(document: &'a Node, name: &str) -> Result<&'a Node, GatewayError> {
    let needle = name.to_lowercase();
    document
        .children
        .iter()
        .find(|page| page.name.to_lowercase().contains(&needle))
        .ok_or_else(|| GatewayError::not_found(format!("page matching '{name}'")))
}

/// First container node under `page` whose name contains `name`
/// (case-insensitive), depth-first in document order. The page itself is
/// not a candidate.
pub fn find_frame_by_name<'a>(page: &'a Node, name: &str) -> Result<&'a Node, GatewayError> {
    let needle = name.to_lowercase();
    page.children
        .iter()
        .find_map(|child| find_container(child, &needle))
        .ok_or_else(|| {
            GatewayError::not_found(format!("frame matching '{name}' in page '{}'", page.name))
        })
}

fn find_container<'a>(node: &'a Node, needle: &str) -> Option<&'a Node> {
    if node.kind.is_container() && node.name.to_lowercase().contains(needle) {
        return Some(node);
    }
    node.children
        .iter()
        .find_map(|child| find_container(child, needle))
}
