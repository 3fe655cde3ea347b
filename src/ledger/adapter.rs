//! Ledger adapter used by the store at commit time.

use crate::core::{Error, IdentityId, Result, Roster};
use crate::identity::Document;
use crate::ledger::block::{BlockRef, IdentityBlock};
use crate::ledger::chain::{ChainVerification, IdentityChain};
use crate::ledger::cosign::CollectiveSigner;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Records committed documents as linked, collectively signed blocks.
///
/// Called exactly once per commit. An error means nothing was recorded and
/// the caller must not advance its committed state.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    async fn link_and_sign(&self, identity: &IdentityId, document: &Document) -> Result<BlockRef>;
}

/// Skipchain-style ledger: one hash-linked chain per identity, each block
/// signed by the roster.
pub struct SkipchainLedger {
    roster: Roster,
    signer: Arc<dyn CollectiveSigner>,
    chains: RwLock<HashMap<IdentityId, IdentityChain>>,
}

impl SkipchainLedger {
    pub fn new(roster: Roster, signer: Arc<dyn CollectiveSigner>) -> Self {
        Self {
            roster,
            signer,
            chains: RwLock::new(HashMap::new()),
        }
    }

    /// All blocks recorded for an identity, oldest first.
    pub async fn history(&self, identity: &IdentityId) -> Vec<IdentityBlock> {
        self.chains
            .read()
            .await
            .get(identity)
            .map(|chain| chain.all_blocks().to_vec())
            .unwrap_or_default()
    }

    /// Latest block of an identity.
    pub async fn head(&self, identity: &IdentityId) -> Option<IdentityBlock> {
        self.chains
            .read()
            .await
            .get(identity)
            .and_then(|chain| chain.head().cloned())
    }

    /// Check hash links, document links and every block's roster
    /// signature.
    pub async fn verify(&self, identity: &IdentityId) -> Result<ChainVerification> {
        let chains = self.chains.read().await;
        let chain = chains
            .get(identity)
            .ok_or_else(|| Error::NotFound(format!("no chain for identity {}", identity)))?;
        let mut verification = chain.verify_chain()?;
        if !verification.valid {
            return Ok(verification);
        }

        for block in chain.all_blocks() {
            let signed = match &block.signature {
                Some(signature) => self
                    .signer
                    .verify(block.block_hash.as_bytes(), &self.roster, signature)
                    .is_ok(),
                None => false,
            };
            if !signed {
                warn!(identity = %identity, height = block.height, "Block signature invalid");
                verification.valid = false;
                verification.tamper_detected = true;
                verification.first_invalid_height = Some(block.height);
                verification.blocks_verified = block.height;
                break;
            }
        }
        Ok(verification)
    }
}

#[async_trait]
impl LedgerAdapter for SkipchainLedger {
    async fn link_and_sign(&self, identity: &IdentityId, document: &Document) -> Result<BlockRef> {
        // held until the block is appended, so concurrent commits for one
        // identity link one after the other
        let mut chains = self.chains.write().await;
        let mut block = match chains.get(identity) {
            Some(chain) => chain.next_block(document.clone())?,
            None => IdentityChain::new(*identity).next_block(document.clone())?,
        };

        let signature = self
            .signer
            .sign(block.block_hash.as_bytes(), &self.roster)
            .await
            .map_err(|e| {
                warn!(identity = %identity, error = %e, "Collective signing failed");
                Error::LedgerUnavailable(e.to_string())
            })?;
        block.signature = Some(signature);

        let reference = block.reference();
        chains
            .entry(*identity)
            .or_insert_with(|| IdentityChain::new(*identity))
            .append_block(block)
            .map_err(|e| Error::LedgerUnavailable(e.to_string()))?;

        debug!(identity = %identity, height = reference.height, "Linked block");
        Ok(reference)
    }
}
