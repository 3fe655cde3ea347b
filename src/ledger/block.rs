//! Identity block structure.
//!
//! Content-addressed, immutable blocks holding one committed document each.

use crate::core::{now, Hash256, IdentityId, Result, Timestamp};
use crate::identity::crypto::sha3_256_multi;
use crate::identity::Document;
use crate::ledger::cosign::CollectiveSignature;
use serde::{Deserialize, Serialize};

/// Reference to a block, returned to the committer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub identity: IdentityId,
    pub height: u64,
    pub block_hash: Hash256,
}

/// A committed document linked into its identity's chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityBlock {
    /// Block height in the identity's chain
    pub height: u64,
    /// Block creation timestamp
    pub timestamp: Timestamp,
    /// Hash of the previous block, zero for the first one
    pub parent_hash: Hash256,
    /// Identity this block belongs to
    pub identity: IdentityId,
    /// The committed document
    pub document: Document,
    /// Content hash of `document`
    pub document_hash: Hash256,
    /// Roster signature over `block_hash`
    pub signature: Option<CollectiveSignature>,
    /// Content hash of the block
    pub block_hash: Hash256,
}

impl IdentityBlock {
    /// Create a new, unsigned block.
    pub fn new(
        height: u64,
        identity: IdentityId,
        document: Document,
        parent_hash: Hash256,
    ) -> Result<Self> {
        let document_hash = document.hash();
        let mut block = Self {
            height,
            timestamp: now(),
            parent_hash,
            identity,
            document,
            document_hash,
            signature: None,
            block_hash: Hash256::zero(),
        };
        block.block_hash = block.compute_hash()?;
        Ok(block)
    }

    /// Hash over every field except the signature and the hash itself.
    pub fn compute_hash(&self) -> Result<Hash256> {
        let height_bytes = self.height.to_le_bytes();
        let timestamp_str = self.timestamp.to_rfc3339();
        let document_bytes = self.document.canonical_bytes()?;
        // the document hash leaves `parent` out, the block must not
        let document_parent = self.document.parent.clone().unwrap_or_default();

        Ok(sha3_256_multi(&[
            &height_bytes,
            timestamp_str.as_bytes(),
            self.parent_hash.as_bytes(),
            self.identity.as_bytes(),
            &document_bytes,
            self.document_hash.as_bytes(),
            document_parent.as_bytes(),
        ]))
    }

    /// Verify integrity and the link to `parent`. The first block must hold
    /// a genesis document, every later one a document derived from its
    /// parent block's document.
    pub fn verify(&self, parent: Option<&IdentityBlock>) -> Result<BlockVerification> {
        let mut verification = BlockVerification {
            valid: true,
            tamper_detected: false,
        };

        if self.compute_hash()? != self.block_hash || self.document.hash() != self.document_hash
        {
            verification.valid = false;
            verification.tamper_detected = true;
            return Ok(verification);
        }

        // block links and document links must agree
        match parent {
            Some(parent_block) => {
                if self.parent_hash != parent_block.block_hash
                    || self.height != parent_block.height + 1
                    || self.identity != parent_block.identity
                    || self.document.parent.as_ref() != Some(&parent_block.document_hash)
                {
                    verification.valid = false;
                }
            }
            None => {
                if self.height != 0
                    || self.parent_hash != Hash256::zero()
                    || self.document.parent.is_some()
                {
                    verification.valid = false;
                }
            }
        }

        Ok(verification)
    }

    pub fn reference(&self) -> BlockRef {
        BlockRef {
            identity: self.identity,
            height: self.height,
            block_hash: self.block_hash.clone(),
        }
    }
}

/// Result of block verification.
#[derive(Clone, Debug)]
pub struct BlockVerification {
    /// Whether the block is valid
    pub valid: bool,
    /// Whether tampering was detected
    pub tamper_detected: bool,
}
