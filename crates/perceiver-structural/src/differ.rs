use std::collections::BTreeSet;

use crate::observation::SelectorMap;

/// Element churn between two consecutive selector maps, by content hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SelectorDiff {
    /// Indices in the current map whose hash the previous map lacked.
    pub appeared: BTreeSet<u32>,
    /// Number of previous hashes no longer present.
    pub vanished: usize,
}

impl SelectorDiff {
    pub fn is_unchanged(&self) -> bool {
        self.appeared.is_empty() && self.vanished == 0
    }
}

/// Compare by hash only. Index equality across maps means nothing.
pub fn diff(previous: &SelectorMap, current: &SelectorMap) -> SelectorDiff {
    let before = previous.hashes();
    let after = current.hashes();
    let appeared = current
        .elements()
        .filter(|el| !before.contains(&el.content_hash))
        .map(|el| el.index)
        .collect();
    let vanished = before.iter().filter(|hash| !after.contains(*hash)).count();
    SelectorDiff { appeared, vanished }
}
