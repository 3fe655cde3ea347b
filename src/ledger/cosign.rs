//! Collective signing over a roster.
//!
//! The aggregate-signature protocol itself runs elsewhere; the ledger only
//! needs `sign(bytes, roster) -> signature`. [`LocalCosigner`] stands in for
//! it with one Ed25519 signature per roster member.

use crate::core::{Error, NodeId, Result, Roster};
use crate::identity::crypto::{verify, DeviceKeyPair};
use crate::identity::DevicePublicKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Signature produced by a roster over one message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectiveSignature {
    /// Per-node signatures in roster order
    pub signatures: Vec<(NodeId, Vec<u8>)>,
}

/// Produces and checks collective signatures for a roster.
#[async_trait]
pub trait CollectiveSigner: Send + Sync {
    async fn sign(&self, message: &[u8], roster: &Roster) -> Result<CollectiveSignature>;

    /// Check that every member of `roster` signed `message`.
    fn verify(&self, message: &[u8], roster: &Roster, signature: &CollectiveSignature)
        -> Result<()>;
}

/// In-process signer holding every roster member's key.
pub struct LocalCosigner {
    keys: HashMap<NodeId, DeviceKeyPair>,
}

impl LocalCosigner {
    /// Generate a key for each roster member.
    pub fn for_roster(roster: &Roster) -> Self {
        let keys = roster
            .nodes()
            .iter()
            .map(|node| (node.clone(), DeviceKeyPair::generate()))
            .collect();
        Self { keys }
    }

    pub fn public_key(&self, node: &NodeId) -> Option<DevicePublicKey> {
        self.keys.get(node).map(DeviceKeyPair::public_key)
    }
}

#[async_trait]
impl CollectiveSigner for LocalCosigner {
    async fn sign(&self, message: &[u8], roster: &Roster) -> Result<CollectiveSignature> {
        let mut signatures = Vec::with_capacity(roster.len());
        for node in roster.nodes() {
            let keys = self.keys.get(node).ok_or_else(|| {
                Error::LedgerUnavailable(format!("no cosigning key for {}", node))
            })?;
            signatures.push((node.clone(), keys.sign(message)));
        }
        Ok(CollectiveSignature { signatures })
    }

    fn verify(
        &self,
        message: &[u8],
        roster: &Roster,
        signature: &CollectiveSignature,
    ) -> Result<()> {
        for node in roster.nodes() {
            let (_, sig) = signature
                .signatures
                .iter()
                .find(|(signer, _)| signer == node)
                .ok_or_else(|| Error::InvalidProof(format!("missing signature from {}", node)))?;
            let key = self
                .public_key(node)
                .ok_or_else(|| Error::InvalidProof(format!("unknown roster member {}", node)))?;
            verify(&key, message, sig)?;
        }
        Ok(())
    }
}
