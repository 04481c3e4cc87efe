//! Raw page tree → pruned, indexed observation.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, warn};
use webpilot_core_types::{FrameTag, ObservationId, Rect, Viewport};

use crate::differ;
use crate::hash::HashInput;
use crate::judges;
use crate::model::{NodePath, RawNode, RawPageSnapshot};
use crate::observation::{
    truncate_chars, ElementLocator, IndexedElement, Observation, PrunedNode, SelectorMap,
};
use crate::policy::IndexerConfig;
use crate::truncate::{self, Admission};

/// Turns raw snapshots into observations.
///
/// Indices restart at 0 for every observation. Across steps an element is
/// only "the same" when its content hash matches.
#[derive(Clone, Debug, Default)]
pub struct DomIndexer {
    config: IndexerConfig,
}

impl DomIndexer {
    pub fn new(config: IndexerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Index `raw`. `previous` is the map of the prior step, `None` on the
    /// first step; with no baseline nothing is flagged as new.
    pub fn index(&self, raw: RawPageSnapshot, previous: Option<&SelectorMap>) -> Observation {
        let (admission, truncated) = truncate::plan(&raw.root, raw.viewport.scroll_y, &self.config);
        if let Some(warning) = &truncated {
            warn!(
                url = %raw.url,
                node_limit = warning.node_limit,
                total_nodes = warning.total_nodes,
                dropped_nodes = warning.dropped_nodes,
                "page exceeds node ceiling, truncating"
            );
        }

        let mut walk = Walk {
            config: &self.config,
            admission: &admission,
            viewport: raw.viewport,
            selector_map: SelectorMap::new(),
            next_index: 0,
            ancestors: Vec::new(),
        };
        let root_position = Position {
            path: NodePath::root(),
            frame: FrameTag::MainDocument,
            frame_xpaths: Vec::new(),
            xpath: format!("/{}[1]", raw.root.tag),
            depth: 0,
            parent_pointer: false,
            inside_element: false,
        };
        let tree = walk.visit(&raw.root, &root_position);
        let mut selector_map = walk.selector_map;

        let new_indices = match previous {
            Some(previous) => {
                let diff = differ::diff(previous, &selector_map);
                for index in &diff.appeared {
                    selector_map.mark_new(*index);
                }
                if !diff.is_unchanged() {
                    debug!(
                        appeared = diff.appeared.len(),
                        vanished = diff.vanished,
                        "element churn since previous step"
                    );
                }
                diff.appeared
            }
            None => BTreeSet::new(),
        };

        debug!(
            url = %raw.url,
            elements = selector_map.len(),
            new = new_indices.len(),
            "indexed page"
        );

        Observation {
            id: ObservationId::new(),
            url: raw.url,
            title: raw.title,
            tabs: raw.tabs,
            viewport: raw.viewport,
            tree,
            selector_map,
            screenshot: raw.screenshot,
            new_indices,
            truncated,
            captured_at: raw.captured_at,
        }
    }
}

/// Where a node sits while being visited.
struct Position {
    path: NodePath,
    frame: FrameTag,
    frame_xpaths: Vec<String>,
    xpath: String,
    depth: u32,
    parent_pointer: bool,
    inside_element: bool,
}

impl Position {
    fn qualified_xpath(&self) -> String {
        if self.frame_xpaths.is_empty() {
            return self.xpath.clone();
        }
        format!("{}|{}", self.frame_xpaths.join("|"), self.xpath)
    }
}

struct Walk<'a> {
    config: &'a IndexerConfig,
    admission: &'a Admission,
    viewport: Viewport,
    selector_map: SelectorMap,
    next_index: u32,
    ancestors: Vec<String>,
}

impl Walk<'_> {
    /// Visit `node` and return what it contributes to its parent's pruned
    /// children. Non-indexed wrappers contribute their children directly.
    fn visit(&mut self, node: &RawNode, pos: &Position) -> Vec<PrunedNode> {
        if !self.admission.admits(&pos.path) || judges::is_hidden(node) {
            return Vec::new();
        }

        let pointer = judges::has_pointer_cursor(node);
        let own_index = if judges::is_visible(node) && judges::is_interactive(node, pos.parent_pointer)
        {
            Some(self.register(node, pos))
        } else {
            None
        };

        self.ancestors.push(node.tag.clone());
        let mut children = Vec::new();
        let mut ordinals: HashMap<&str, u32> = HashMap::new();
        for (position, child) in node.children.iter().enumerate() {
            let ordinal = ordinals.entry(child.tag.as_str()).or_insert(0);
            *ordinal += 1;
            let child_pos = Position {
                path: pos.path.join(position as u32),
                frame: pos.frame.clone(),
                frame_xpaths: pos.frame_xpaths.clone(),
                xpath: format!("{}/{}[{}]", pos.xpath, child.tag, ordinal),
                depth: pos.depth + 1,
                parent_pointer: pointer,
                inside_element: pos.inside_element || own_index.is_some(),
            };
            children.extend(self.visit(child, &child_pos));
        }
        if let Some(doc) = &node.content_document {
            match FrameTag::frame(doc.origin.as_str()).or_else(|_| FrameTag::frame(doc.url.as_str())) {
                Ok(frame) => {
                    let mut frame_xpaths = pos.frame_xpaths.clone();
                    frame_xpaths.push(pos.xpath.clone());
                    let doc_pos = Position {
                        path: pos.path.join(node.children.len() as u32),
                        frame,
                        frame_xpaths,
                        xpath: format!("/{}[1]", doc.root.tag),
                        depth: pos.depth + 1,
                        parent_pointer: false,
                        inside_element: false,
                    };
                    children.extend(self.visit(&doc.root, &doc_pos));
                }
                Err(err) => {
                    debug!(url = %doc.url, error = %err, "skipping frame without usable origin");
                }
            }
        }
        self.ancestors.pop();

        if let Some(index) = own_index {
            return vec![PrunedNode::Element { index, children }];
        }

        let text = normalize_whitespace(&node.text);
        if self.config.include_text_nodes
            && !pos.inside_element
            && !text.is_empty()
            && judges::is_visible(node)
        {
            let mut out = Vec::with_capacity(children.len() + 1);
            out.push(PrunedNode::Text {
                text: truncate_chars(&text, self.config.max_text_length),
            });
            out.extend(children);
            return out;
        }
        children
    }

    fn register(&mut self, node: &RawNode, pos: &Position) -> u32 {
        let index = self.next_index;
        self.next_index += 1;

        let mut fragments = Vec::new();
        self.collect_text(node, &pos.path, &mut fragments);
        let full_text = normalize_whitespace(&fragments.join(" "));

        let content_hash = self.config.hash.hash(&HashInput {
            frame: &pos.frame,
            tag: &node.tag,
            attributes: &node.attributes,
            text: &full_text,
            ancestor_tags: &self.ancestors,
            xpath: &pos.qualified_xpath(),
        });

        let element = IndexedElement {
            index,
            tag: node.tag.clone(),
            attributes: node.attributes.clone(),
            text: truncate_chars(&full_text, self.config.max_text_length),
            content_hash,
            frame: pos.frame.clone(),
            locator: ElementLocator {
                xpath: pos.xpath.clone(),
                frame_xpaths: pos.frame_xpaths.clone(),
                css_selector: css_selector(&node.tag, &node.attributes),
                backend_node_id: node.backend_node_id,
            },
            node_path: pos.path.clone(),
            bounds: node.bounds,
            depth: pos.depth,
            is_new: false,
            in_viewport: node
                .bounds
                .map(|bounds| intersects_viewport(&bounds, &self.viewport))
                .unwrap_or(false),
        };
        self.selector_map.insert(element);
        index
    }

    /// Own text plus text of visible, non-interactive descendants. Nested
    /// interactive elements keep their text to themselves.
    fn collect_text(&self, node: &RawNode, path: &NodePath, out: &mut Vec<String>) {
        if !node.text.trim().is_empty() {
            out.push(node.text.clone());
        }
        let pointer = judges::has_pointer_cursor(node);
        for (position, child) in node.children.iter().enumerate() {
            let child_path = path.join(position as u32);
            if !self.admission.admits(&child_path) || judges::is_hidden(child) {
                continue;
            }
            if judges::is_visible(child) && judges::is_interactive(child, pointer) {
                continue;
            }
            self.collect_text(child, &child_path, out);
        }
    }
}

fn intersects_viewport(bounds: &Rect, viewport: &Viewport) -> bool {
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
        return true;
    }
    let top = viewport.scroll_y;
    let left = viewport.scroll_x;
    bounds.y + bounds.height > top
        && bounds.y < top + viewport.height
        && bounds.x + bounds.width > left
        && bounds.x < left + viewport.width
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best-effort CSS selector: `#id` when usable, else tag plus name or first class.
fn css_selector(tag: &str, attrs: &BTreeMap<String, String>) -> Option<String> {
    if let Some(id) = attrs.get("id") {
        if !id.is_empty() && !id.contains(char::is_whitespace) {
            return Some(format!("#{id}"));
        }
    }

    let mut selector = tag.to_string();
    if let Some(name) = attrs.get("name").filter(|name| !name.is_empty()) {
        selector.push_str(&format!("[name=\"{name}\"]"));
    } else if let Some(class) = attrs.get("class").and_then(|c| c.split_whitespace().next()) {
        selector.push('.');
        selector.push_str(class);
    }
    if let Some(kind) = attrs.get("type") {
        selector.push_str(&format!("[type=\"{kind}\"]"));
    }
    Some(selector)
}
