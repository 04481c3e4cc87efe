//! Wire format of the in-page snapshot script and its conversion into a
//! [`RawNode`] tree.
//!
//! The script returns a flat, pre-ordered node list with parent indices so
//! that deep documents never hit JSON nesting limits on either side.

use std::collections::BTreeMap;

use perceiver_structural::{FrameDocument, RawNode, StyleInfo};
use serde::Deserialize;
use webpilot_core_types::{Rect, Viewport};

use crate::errors::{AdapterError, AdapterErrorKind};

pub(crate) const SNAPSHOT_JS: &str = include_str!("js/snapshot.js");

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPayload {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub viewport: ViewportPayload,
    pub nodes: Vec<FlatNode>,
    #[serde(default)]
    pub truncated: bool,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ViewportPayload {
    pub width: f64,
    pub height: f64,
    pub scroll_x: f64,
    pub scroll_y: f64,
    pub document_height: f64,
}

impl From<ViewportPayload> for Viewport {
    fn from(v: ViewportPayload) -> Self {
        Viewport {
            width: v.width,
            height: v.height,
            scroll_x: v.scroll_x,
            scroll_y: v.scroll_y,
            document_height: v.document_height,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrameInfo {
    pub url: String,
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatNode {
    /// Index of the parent entry, `-1` for the document root.
    pub parent: i64,
    /// True for the root element of the parent's content document.
    #[serde(default)]
    pub doc_root: bool,
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounds: Option<[f64; 4]>,
    #[serde(default)]
    pub style: StyleInfo,
    #[serde(default)]
    pub clickable: bool,
    #[serde(default)]
    pub frame: Option<FrameInfo>,
}

impl FlatNode {
    fn into_raw(self) -> (RawNode, Option<FrameInfo>) {
        let node = RawNode {
            tag: self.tag.to_ascii_lowercase(),
            attributes: self.attributes,
            text: self.text,
            bounds: self
                .bounds
                .filter(|b| b.iter().all(|v| v.is_finite()))
                .map(|[x, y, w, h]| Rect::new(x, y, w, h)),
            style: self.style,
            has_click_handler: self.clickable,
            backend_node_id: None,
            content_document: None,
            children: Vec::new(),
        };
        (node, self.frame)
    }
}

/// Rebuild the element tree. Entries must be in pre-order: every parent
/// precedes its children.
pub fn build_tree(nodes: Vec<FlatNode>) -> Result<RawNode, AdapterError> {
    if nodes.is_empty() {
        return Err(malformed("snapshot contained no nodes"));
    }

    let mut parents = Vec::with_capacity(nodes.len());
    let mut doc_roots = Vec::with_capacity(nodes.len());
    let mut slots: Vec<Option<RawNode>> = Vec::with_capacity(nodes.len());
    let mut frames: Vec<Option<FrameInfo>> = Vec::with_capacity(nodes.len());

    for (index, flat) in nodes.into_iter().enumerate() {
        let parent = match (index, flat.parent) {
            (0, -1) => None,
            (0, _) => return Err(malformed("first entry must be the document root")),
            (_, p) if p >= 0 && (p as usize) < index => Some(p as usize),
            (_, p) => {
                return Err(malformed(format!(
                    "entry {} has parent {} out of pre-order",
                    index, p
                )))
            }
        };
        parents.push(parent);
        doc_roots.push(flat.doc_root);
        let (node, frame) = flat.into_raw();
        slots.push(Some(node));
        frames.push(frame);
    }

    // Children collected back to front; reversed once their parent is final.
    let mut pending: Vec<Vec<RawNode>> = vec![Vec::new(); slots.len()];
    for index in (0..slots.len()).rev() {
        let mut node = slots[index]
            .take()
            .ok_or_else(|| malformed("node visited twice"))?;
        let mut children = std::mem::take(&mut pending[index]);
        children.reverse();
        node.children = children;

        let Some(parent) = parents[index] else {
            return Ok(node);
        };
        if doc_roots[index] {
            let info = frames[parent].take().ok_or_else(|| {
                malformed(format!("entry {} claims a frame document its parent lacks", index))
            })?;
            let owner = slots[parent]
                .as_mut()
                .ok_or_else(|| malformed("frame owner already consumed"))?;
            owner.content_document = Some(Box::new(FrameDocument {
                url: info.url,
                origin: info.origin,
                root: node,
            }));
        } else {
            pending[parent].push(node);
        }
    }

    Err(malformed("snapshot had no root"))
}

fn malformed(detail: impl Into<String>) -> AdapterError {
    AdapterError::new(AdapterErrorKind::Malformed).with_hint(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Vec<FlatNode> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn rebuilds_nesting_and_sibling_order() {
        let nodes = parse(json!([
            {"parent": -1, "tag": "HTML"},
            {"parent": 0, "tag": "body", "bounds": [0, 0, 100, 100]},
            {"parent": 1, "tag": "a", "text": "first", "attributes": {"href": "/a"}},
            {"parent": 2, "tag": "span", "text": "inner"},
            {"parent": 1, "tag": "button", "text": "second", "clickable": true},
        ]));
        let root = build_tree(nodes).unwrap();
        assert_eq!(root.tag, "html");
        let body = &root.children[0];
        assert_eq!(body.bounds, Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
        let tags: Vec<&str> = body.children.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["a", "button"]);
        assert_eq!(body.children[0].children[0].text, "inner");
        assert!(body.children[1].has_click_handler);
        assert_eq!(root.node_count(), 5);
    }

    #[test]
    fn frame_documents_attach_to_their_owner() {
        let nodes = parse(json!([
            {"parent": -1, "tag": "html"},
            {"parent": 0, "tag": "iframe",
             "frame": {"url": "https://pay.test/x", "origin": "https://pay.test"}},
            {"parent": 1, "docRoot": true, "tag": "html"},
            {"parent": 2, "tag": "button", "text": "Pay"},
        ]));
        let root = build_tree(nodes).unwrap();
        let iframe = &root.children[0];
        assert!(iframe.children.is_empty());
        let doc = iframe.content_document.as_ref().unwrap();
        assert_eq!(doc.origin, "https://pay.test");
        assert_eq!(doc.root.children[0].text, "Pay");
    }

    #[test]
    fn rejects_out_of_order_parents() {
        let nodes = parse(json!([
            {"parent": -1, "tag": "html"},
            {"parent": 2, "tag": "body"},
            {"parent": 0, "tag": "div"},
        ]));
        let err = build_tree(nodes).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Malformed);
        assert!(build_tree(Vec::new()).is_err());
    }

    #[test]
    fn non_finite_bounds_are_dropped() {
        let mut nodes = parse(json!([{"parent": -1, "tag": "html"}]));
        nodes[0].bounds = Some([f64::NAN, 0.0, 1.0, 1.0]);
        assert_eq!(build_tree(nodes).unwrap().bounds, None);
    }

    #[test]
    fn payload_parses_viewport() {
        let payload: SnapshotPayload = serde_json::from_value(json!({
            "url": "https://a.test/",
            "title": "A",
            "viewport": {"width": 800, "height": 600, "scrollX": 0, "scrollY": 120, "documentHeight": 3000},
            "nodes": [{"parent": -1, "tag": "html"}],
            "truncated": false
        }))
        .unwrap();
        let viewport = Viewport::from(payload.viewport);
        assert_eq!(viewport.scroll_y, 120.0);
        assert_eq!(viewport.document_height, 3000.0);
    }
}
