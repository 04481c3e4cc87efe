use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webpilot_core_types::{FrameTag, ObservationId, Rect, TabInfo, Viewport};

use crate::hash::ContentHash;
use crate::model::NodePath;

/// Attributes shown to the decision engine when rendering an element.
const RENDERED_ATTRIBUTES: &[&str] = &[
    "id",
    "class",
    "type",
    "name",
    "value",
    "placeholder",
    "href",
    "title",
    "aria-label",
    "role",
];

const RENDERED_ATTRIBUTE_LEN: usize = 60;

/// How to find an indexed element in the live page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementLocator {
    /// XPath inside the element's own document.
    pub xpath: String,
    /// XPaths of the frame owner elements leading from the top document to
    /// the element's document. Empty for the main document.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frame_xpaths: Vec<String>,
    pub css_selector: Option<String>,
    pub backend_node_id: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedElement {
    pub index: u32,
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    /// Whitespace-normalized, truncated text of the element and its
    /// non-interactive descendants.
    pub text: String,
    pub content_hash: ContentHash,
    pub frame: FrameTag,
    pub locator: ElementLocator,
    /// Back-reference into the raw snapshot this element was indexed from.
    pub node_path: NodePath,
    pub bounds: Option<Rect>,
    pub depth: u32,
    /// Hash absent from the previous step's map.
    pub is_new: bool,
    pub in_viewport: bool,
}

impl IndexedElement {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Single-line HTML-ish rendering, e.g. `<button type="submit">Send</button>`.
    pub fn html_repr(&self) -> String {
        let mut out = format!("<{}", self.tag);
        for attr in RENDERED_ATTRIBUTES {
            if let Some(value) = self.attributes.get(*attr) {
                let value = truncate_chars(value.trim(), RENDERED_ATTRIBUTE_LEN);
                if !value.is_empty() {
                    let _ = write!(out, " {}=\"{}\"", attr, escape_html(&value));
                }
            }
        }
        out.push('>');
        out.push_str(&escape_html(&self.text));
        let _ = write!(out, "</{}>", self.tag);
        out
    }
}

/// Index → element lookup for exactly one observation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectorMap(BTreeMap<u32, IndexedElement>);

impl SelectorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the displaced element if `index` was already taken.
    pub(crate) fn insert(&mut self, element: IndexedElement) -> Option<IndexedElement> {
        self.0.insert(element.index, element)
    }

    pub(crate) fn mark_new(&mut self, index: u32) {
        if let Some(element) = self.0.get_mut(&index) {
            element.is_new = true;
        }
    }

    pub fn get(&self, index: u32) -> Option<&IndexedElement> {
        self.0.get(&index)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.0.contains_key(&index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.keys().copied()
    }

    pub fn elements(&self) -> impl Iterator<Item = &IndexedElement> {
        self.0.values()
    }

    pub fn hashes(&self) -> HashSet<&ContentHash> {
        self.0.values().map(|el| &el.content_hash).collect()
    }
}

/// Pruned view of the page: interactive elements plus the free text around them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PrunedNode {
    Element {
        index: u32,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        children: Vec<PrunedNode>,
    },
    Text {
        text: String,
    },
}

/// Surfaced when the node ceiling or depth cap cut the page short.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TruncationWarning {
    pub node_limit: usize,
    pub total_nodes: usize,
    pub dropped_nodes: usize,
}

/// Immutable per-step snapshot of page state and its element index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: ObservationId,
    pub url: String,
    pub title: String,
    pub tabs: Vec<TabInfo>,
    pub viewport: Viewport,
    pub tree: Vec<PrunedNode>,
    pub selector_map: SelectorMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub new_indices: BTreeSet<u32>,
    #[serde(default)]
    pub truncated: Option<TruncationWarning>,
    pub captured_at: DateTime<Utc>,
}

impl Observation {
    pub fn element(&self, index: u32) -> Option<&IndexedElement> {
        self.selector_map.get(index)
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated.is_some()
    }

    pub fn new_elements(&self) -> impl Iterator<Item = &IndexedElement> {
        self.new_indices
            .iter()
            .filter_map(|index| self.selector_map.get(*index))
    }

    /// Indexed text rendering handed to decision engines.
    ///
    /// `*[3]` marks an element that was not on the page last step.
    pub fn render_tree(&self) -> String {
        let mut out = String::new();
        for node in &self.tree {
            self.render_node(node, 0, &mut out);
        }
        if let Some(warning) = &self.truncated {
            let _ = writeln!(
                out,
                "[page truncated: indexed {} of {} nodes]",
                warning.total_nodes - warning.dropped_nodes,
                warning.total_nodes
            );
        }
        out
    }

    fn render_node(&self, node: &PrunedNode, level: usize, out: &mut String) {
        let indent = "\t".repeat(level);
        match node {
            PrunedNode::Text { text } => {
                let _ = writeln!(out, "{indent}{text}");
            }
            PrunedNode::Element { index, children } => {
                if let Some(element) = self.selector_map.get(*index) {
                    let marker = if element.is_new { "*" } else { "" };
                    let _ = write!(out, "{indent}{marker}[{index}]{}", element.html_repr());
                    if let Some(origin) = element.frame.origin() {
                        let _ = write!(out, " (frame {origin})");
                    }
                    out.push('\n');
                }
                for child in children {
                    self.render_node(child, level + 1, out);
                }
            }
        }
    }
}

/// Character-based truncation with a trailing ellipsis.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
