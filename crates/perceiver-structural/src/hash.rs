//! Content hashing used to recognise the same element across steps.

use std::collections::BTreeMap;
use std::fmt;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use webpilot_core_types::FrameTag;

const HASH_PREFIX: &str = "el";

/// Attributes that describe what an element is rather than its transient
/// state. `class`, `style` and `value` churn on hover, focus and typing.
pub const IDENTITY_ATTRIBUTES: &[&str] = &[
    "id",
    "name",
    "type",
    "role",
    "href",
    "src",
    "alt",
    "for",
    "action",
    "placeholder",
    "title",
    "aria-label",
    "data-testid",
];

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(pub String);

impl ContentHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How much of an element's location feeds into its hash.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSensitivity {
    /// Location is ignored; identical elements anywhere collide.
    Ignore,
    /// Chain of ancestor tag names. Reordering siblings keeps the hash.
    #[default]
    AncestorTags,
    /// Full XPath with sibling ordinals. Reordering changes the hash.
    FullPath,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashPolicy {
    pub position: PositionSensitivity,
    /// Rendered text participates, so a relabelled button reads as new.
    pub include_text: bool,
}

impl Default for HashPolicy {
    fn default() -> Self {
        Self {
            position: PositionSensitivity::AncestorTags,
            include_text: true,
        }
    }
}

/// Inputs for one element's hash. Borrowed from the traversal state.
pub struct HashInput<'a> {
    pub frame: &'a FrameTag,
    pub tag: &'a str,
    pub attributes: &'a BTreeMap<String, String>,
    pub text: &'a str,
    pub ancestor_tags: &'a [String],
    pub xpath: &'a str,
}

impl HashPolicy {
    pub fn hash(&self, input: &HashInput<'_>) -> ContentHash {
        let mut hasher = Hasher::new();
        field(&mut hasher, "frame", input.frame.to_string().as_bytes());
        field(&mut hasher, "tag", input.tag.as_bytes());
        for (key, value) in input.attributes {
            if IDENTITY_ATTRIBUTES.contains(&key.as_str()) {
                field(&mut hasher, key, value.trim().as_bytes());
            }
        }
        if self.include_text {
            field(&mut hasher, "text", input.text.as_bytes());
        }
        match self.position {
            PositionSensitivity::Ignore => {}
            PositionSensitivity::AncestorTags => {
                field(&mut hasher, "ancestors", input.ancestor_tags.join(">").as_bytes());
            }
            PositionSensitivity::FullPath => {
                field(&mut hasher, "xpath", input.xpath.as_bytes());
            }
        }
        ContentHash(format!("{}_{}", HASH_PREFIX, hasher.finalize().to_hex()))
    }
}

// Length-prefixed so adjacent fields cannot run together.
fn field(hasher: &mut Hasher, name: &str, bytes: &[u8]) {
    hasher.update(&(name.len() as u64).to_le_bytes());
    hasher.update(name.as_bytes());
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
