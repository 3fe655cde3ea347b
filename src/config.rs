//! Node and session configuration.

use crate::core::{NodeId, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of a roster node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of this node in the roster
    pub node_id: NodeId,
    /// Floor applied to a committed document's threshold
    pub min_threshold: u32,
}

impl NodeConfig {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId::new("node-0"),
            min_threshold: 1,
        }
    }
}

/// Configuration of a client session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on one node's reply during create/submit fan-out
    pub fanout_timeout_ms: u64,
    /// Node used for reads and votes; first reachable roster node if unset
    pub preferred_node: Option<NodeId>,
}

impl SessionConfig {
    pub fn fanout_timeout(&self) -> Duration {
        Duration::from_millis(self.fanout_timeout_ms)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fanout_timeout_ms: 5_000,
            preferred_node: None,
        }
    }
}
