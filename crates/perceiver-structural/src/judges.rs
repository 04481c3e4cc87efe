//! Visibility and interactivity predicates over raw nodes.
//!
//! Both judgements are pure functions of a node and (for cursor inheritance)
//! its parent, so the same page always classifies the same way.

use crate::model::RawNode;

/// Tags that are interactive on their own.
pub const INTERACTIVE_TAGS: &[&str] = &[
    "a", "button", "input", "select", "textarea", "option", "label", "summary", "details",
];

/// Tags that become interactive through attributes or styling hints.
pub const POTENTIALLY_INTERACTIVE_TAGS: &[&str] =
    &["div", "span", "li", "tr", "td", "th", "img", "svg", "path"];

/// Attributes that indicate interactivity on any tag.
pub const INTERACTIVE_ATTRIBUTES: &[&str] = &[
    "onclick",
    "onmousedown",
    "onmouseup",
    "ontouchstart",
    "tabindex",
    "contenteditable",
    "draggable",
];

pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "checkbox",
    "radio",
    "textbox",
    "combobox",
    "listbox",
    "option",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "tab",
    "switch",
    "slider",
    "spinbutton",
    "searchbox",
    "gridcell",
    "treeitem",
];

/// Smaller than this many square pixels counts as no rendered area.
pub const MIN_VISIBLE_AREA: f64 = 1.0;

#[derive(Debug, Default, Clone, PartialEq)]
struct StyleHints {
    hides: bool,
    zero_opacity: bool,
    pointer: bool,
}

impl StyleHints {
    fn merge(&mut self, other: StyleHints) {
        self.hides |= other.hides;
        self.zero_opacity |= other.zero_opacity;
        self.pointer |= other.pointer;
    }
}

fn inspect_inline_style(style: &str) -> StyleHints {
    let mut hints = StyleHints::default();
    for chunk in style.to_ascii_lowercase().split(';') {
        let entry: String = chunk.chars().filter(|c| !c.is_whitespace()).collect();
        if entry.is_empty() {
            continue;
        }
        if entry == "display:none" || entry == "visibility:hidden" || entry == "visibility:collapse" {
            hints.hides = true;
        }
        if entry == "cursor:pointer" {
            hints.pointer = true;
        }
        if let Some(rest) = entry.strip_prefix("opacity:") {
            if rest.parse::<f32>().map(|v| v <= 0.0).unwrap_or(false) {
                hints.zero_opacity = true;
            }
        }
    }
    hints
}

fn style_hints(node: &RawNode) -> StyleHints {
    let mut hints = StyleHints::default();
    let computed = &node.style;
    if computed.display.as_deref() == Some("none") {
        hints.hides = true;
    }
    if matches!(computed.visibility.as_deref(), Some("hidden" | "collapse")) {
        hints.hides = true;
    }
    if computed.opacity.map(|v| v <= 0.0).unwrap_or(false) {
        hints.zero_opacity = true;
    }
    if computed.cursor.as_deref() == Some("pointer") {
        hints.pointer = true;
    }
    if let Some(inline) = node.attribute("style") {
        hints.merge(inspect_inline_style(inline));
    }
    hints
}

fn attr_flag_true(node: &RawNode, key: &str) -> bool {
    node.attribute(key).map_or(false, |value| {
        let normalized = value.trim().to_ascii_lowercase();
        normalized.is_empty() || matches!(normalized.as_str(), "true" | "1" | "yes" | "on")
    })
}

/// Hidden by markup or style. Everything below a hidden node is hidden too,
/// so callers prune the whole subtree.
pub fn is_hidden(node: &RawNode) -> bool {
    if node.attributes.contains_key("hidden") {
        return true;
    }
    if node.tag == "input" && node.attribute("type").map(str::to_ascii_lowercase).as_deref() == Some("hidden") {
        return true;
    }
    if matches!(node.tag.as_str(), "script" | "style" | "noscript" | "template" | "head" | "meta") {
        return true;
    }
    let hints = style_hints(node);
    hints.hides || hints.zero_opacity
}

pub fn has_rendered_area(node: &RawNode) -> bool {
    node.bounds
        .map(|bounds| bounds.area() > MIN_VISIBLE_AREA)
        .unwrap_or(false)
}

/// Not hidden and occupying space on screen.
pub fn is_visible(node: &RawNode) -> bool {
    !is_hidden(node) && has_rendered_area(node)
}

pub fn has_pointer_cursor(node: &RawNode) -> bool {
    style_hints(node).pointer
}

/// Deterministic interactivity predicate.
///
/// Ambiguous signals (pointer cursor, click listeners, `btn`-ish classes)
/// classify as interactive. `parent_pointer` suppresses the cursor signal
/// for descendants that only inherit it.
pub fn is_interactive(node: &RawNode, parent_pointer: bool) -> bool {
    let tag = node.tag.as_str();
    if INTERACTIVE_TAGS.contains(&tag) {
        return true;
    }

    for attr in INTERACTIVE_ATTRIBUTES {
        let Some(value) = node.attribute(attr) else {
            continue;
        };
        let value = value.trim().to_ascii_lowercase();
        let counts = match *attr {
            "tabindex" => value.parse::<i32>().map(|v| v >= 0).unwrap_or(false),
            "contenteditable" => value != "false",
            "draggable" => value == "true",
            _ => true,
        };
        if counts {
            return true;
        }
    }

    if let Some(role) = node.role() {
        if INTERACTIVE_ROLES.contains(&role.trim().to_ascii_lowercase().as_str()) {
            return true;
        }
    }

    if node.has_click_handler {
        return true;
    }

    if has_pointer_cursor(node) && !parent_pointer {
        return true;
    }

    if POTENTIALLY_INTERACTIVE_TAGS.contains(&tag) {
        let classy = node
            .attribute("class")
            .map(|c| c.split_whitespace().any(|class| class.contains("btn") || class.contains("button")))
            .unwrap_or(false);
        if classy || node.attributes.contains_key("data-action") || attr_flag_true(node, "aria-haspopup") {
            return true;
        }
    }

    false
}
