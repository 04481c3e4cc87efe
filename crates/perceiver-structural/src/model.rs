use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webpilot_core_types::{Rect, TabInfo, Viewport};

/// Computed style facts the snapshot backend reports for a node.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleInfo {
    #[serde(default)]
    pub display: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub opacity: Option<f32>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// A document embedded through an `<iframe>`/`<frame>` owner node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameDocument {
    pub url: String,
    pub origin: String,
    pub root: RawNode,
}

/// One element of the unprocessed page structure.
///
/// Rebuilt from the live page on every capture and dropped once indexed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    /// Lowercase tag name.
    pub tag: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Text owned directly by this node (not by its element children).
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub bounds: Option<Rect>,
    #[serde(default)]
    pub style: StyleInfo,
    #[serde(default)]
    pub has_click_handler: bool,
    #[serde(default)]
    pub backend_node_id: Option<i64>,
    #[serde(default)]
    pub content_document: Option<Box<FrameDocument>>,
    #[serde(default)]
    pub children: Vec<RawNode>,
}

impl RawNode {
    pub fn element(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn bounds(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bounds = Some(Rect::new(x, y, width, height));
        self
    }

    pub fn style(mut self, style: StyleInfo) -> Self {
        self.style = style;
        self
    }

    pub fn clickable(mut self) -> Self {
        self.has_click_handler = true;
        self
    }

    pub fn child(mut self, child: RawNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = RawNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn frame(mut self, url: impl Into<String>, origin: impl Into<String>, root: RawNode) -> Self {
        self.content_document = Some(Box::new(FrameDocument {
            url: url.into(),
            origin: origin.into(),
            root,
        }));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn role(&self) -> Option<&str> {
        self.attribute("role")
    }

    /// Element children followed by the embedded document root, if any.
    /// [`NodePath`] segments index into this sequence.
    pub fn child_nodes(&self) -> impl Iterator<Item = &RawNode> {
        self.children
            .iter()
            .chain(self.content_document.iter().map(|doc| &doc.root))
    }

    pub fn child_at(&self, position: usize) -> Option<&RawNode> {
        if position < self.children.len() {
            return self.children.get(position);
        }
        match &self.content_document {
            Some(doc) if position == self.children.len() => Some(&doc.root),
            _ => None,
        }
    }

    /// Total node count including embedded documents.
    pub fn node_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.child_nodes());
        }
        count
    }

    /// Deepest nesting level below this node (this node is depth 0).
    pub fn max_depth(&self) -> u32 {
        let mut deepest = 0;
        let mut stack = vec![(self, 0u32)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.child_nodes().map(|child| (child, depth + 1)));
        }
        deepest
    }

    pub fn resolve(&self, path: &NodePath) -> Option<&RawNode> {
        path.0
            .iter()
            .try_fold(self, |node, segment| node.child_at(*segment as usize))
    }
}

/// Child-position path from the snapshot root to a node.
///
/// This is how an indexed element points back at its raw node without
/// borrowing the raw tree, which is discarded after indexing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodePath(pub Vec<u32>);

impl NodePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn join(&self, segment: u32) -> Self {
        let mut next = self.0.clone();
        next.push(segment);
        Self(next)
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// Everything one capture of a live page produced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawPageSnapshot {
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub tabs: Vec<TabInfo>,
    #[serde(default)]
    pub viewport: Viewport,
    pub root: RawNode,
    /// Base64-encoded PNG.
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,
}

impl RawPageSnapshot {
    pub fn new(url: impl Into<String>, title: impl Into<String>, root: RawNode) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            tabs: Vec::new(),
            viewport: Viewport::default(),
            root,
            screenshot: None,
            captured_at: Utc::now(),
        }
    }

    pub fn with_tabs(mut self, tabs: Vec<TabInfo>) -> Self {
        self.tabs = tabs;
        self
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_screenshot(mut self, screenshot: impl Into<String>) -> Self {
        self.screenshot = Some(screenshot.into());
        self
    }
}
