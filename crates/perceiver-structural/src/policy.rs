use serde::{Deserialize, Serialize};

use crate::errors::PerceiverError;
use crate::hash::HashPolicy;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Node ceiling. Larger pages are truncated and the observation says so.
    pub max_nodes: usize,
    /// Nodes nested deeper than this are dropped like nodes over the ceiling.
    pub max_depth: u32,
    /// Characters of element text kept for rendering.
    pub max_text_length: usize,
    /// Keep visible free-standing text in the pruned tree for context.
    pub include_text_nodes: bool,
    pub hash: HashPolicy,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            max_nodes: 5_000,
            max_depth: 256,
            max_text_length: 100,
            include_text_nodes: true,
            hash: HashPolicy::default(),
        }
    }
}

impl IndexerConfig {
    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = max_nodes;
        self
    }

    pub fn with_max_text_length(mut self, len: usize) -> Self {
        self.max_text_length = len;
        self
    }

    pub fn with_hash_policy(mut self, policy: HashPolicy) -> Self {
        self.hash = policy;
        self
    }

    pub fn validate(&self) -> Result<(), PerceiverError> {
        if self.max_nodes == 0 {
            return Err(PerceiverError::InvalidConfig("max_nodes must be positive".into()));
        }
        if self.max_depth == 0 {
            return Err(PerceiverError::InvalidConfig("max_depth must be positive".into()));
        }
        if self.max_text_length < 4 {
            return Err(PerceiverError::InvalidConfig(
                "max_text_length must leave room for an ellipsis".into(),
            ));
        }
        Ok(())
    }
}
