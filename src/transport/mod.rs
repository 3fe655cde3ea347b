//! Point-to-point request/response to roster nodes.
//!
//! Real deployments plug their network stack in behind [`Transport`].
//! [`LocalTransport`] connects in-process engines and pushes every message
//! through the wire encoding, so it behaves like a network that can lose
//! nodes.

use crate::consensus::{ConsensusEngine, Request, Response};
use crate::core::{Error, NodeId, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::trace;

/// Sends a request to one node and waits for its reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, node: &NodeId, request: Request) -> Result<Response>;
}

/// Wire encoding of a request.
pub fn encode_request(request: &Request) -> Result<Vec<u8>> {
    Ok(bincode::serialize(request)?)
}

pub fn decode_request(bytes: &[u8]) -> Result<Request> {
    Ok(bincode::deserialize(bytes)?)
}

/// Wire encoding of a reply, errors included.
pub fn encode_reply(reply: &Result<Response>) -> Result<Vec<u8>> {
    Ok(bincode::serialize(reply)?)
}

pub fn decode_reply(bytes: &[u8]) -> Result<Result<Response>> {
    Ok(bincode::deserialize(bytes)?)
}

/// In-process transport between engines.
#[derive(Default)]
pub struct LocalTransport {
    nodes: RwLock<HashMap<NodeId, Arc<ConsensusEngine>>>,
    offline: RwLock<HashSet<NodeId>>,
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, engine: Arc<ConsensusEngine>) {
        self.nodes
            .write()
            .await
            .insert(engine.node_id().clone(), engine);
    }

    pub async fn engine(&self, node: &NodeId) -> Option<Arc<ConsensusEngine>> {
        self.nodes.read().await.get(node).cloned()
    }

    /// Make a node unreachable (or reachable again).
    pub async fn set_online(&self, node: &NodeId, online: bool) {
        let mut offline = self.offline.write().await;
        if online {
            offline.remove(node);
        } else {
            offline.insert(node.clone());
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn send(&self, node: &NodeId, request: Request) -> Result<Response> {
        if self.offline.read().await.contains(node) {
            return Err(Error::NodeUnreachable(node.clone()));
        }
        let engine = self
            .engine(node)
            .await
            .ok_or_else(|| Error::NodeUnreachable(node.clone()))?;

        let request_bytes = encode_request(&request)?;
        trace!(node = %node, request = request.name(), bytes = request_bytes.len(), "Sending");
        let reply = engine.dispatch(decode_request(&request_bytes)?).await;
        let reply_bytes = encode_reply(&reply)?;
        decode_reply(&reply_bytes)?
    }
}
