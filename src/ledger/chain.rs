//! Hash-linked chain of one identity's committed documents.

use crate::core::{Error, Hash256, IdentityId, Result};
use crate::identity::Document;
use crate::ledger::block::IdentityBlock;

/// Result of chain verification.
#[derive(Clone, Debug)]
pub struct ChainVerification {
    /// Whether the chain is valid
    pub valid: bool,
    /// Number of blocks verified
    pub blocks_verified: u64,
    /// Whether tampering was detected
    pub tamper_detected: bool,
    /// Height of first invalid block (if any)
    pub first_invalid_height: Option<u64>,
}

/// Chain of blocks for a single identity.
#[derive(Clone, Debug)]
pub struct IdentityChain {
    identity: IdentityId,
    blocks: Vec<IdentityBlock>,
}

impl IdentityChain {
    /// Create an empty chain.
    pub fn new(identity: IdentityId) -> Self {
        Self {
            identity,
            blocks: Vec::new(),
        }
    }

    pub fn identity(&self) -> IdentityId {
        self.identity
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn head(&self) -> Option<&IdentityBlock> {
        self.blocks.last()
    }

    /// Unsigned block that would extend the current head. The document's
    /// `parent` is pointed at the head's document, which leaves its content
    /// hash unchanged.
    pub fn next_block(&self, mut document: Document) -> Result<IdentityBlock> {
        let (height, parent_hash) = match self.head() {
            Some(head) => {
                document.parent = Some(head.document_hash.clone());
                (head.height + 1, head.block_hash.clone())
            }
            None => {
                document.parent = None;
                (0, Hash256::zero())
            }
        };
        IdentityBlock::new(height, self.identity, document, parent_hash)
    }

    /// Append a block that links to the current head.
    pub fn append_block(&mut self, block: IdentityBlock) -> Result<Hash256> {
        if block.identity != self.identity {
            return Err(Error::Internal(format!(
                "block for {} appended to chain of {}",
                block.identity, self.identity
            )));
        }

        let verification = block.verify(self.head())?;
        if !verification.valid {
            return Err(Error::Internal(format!(
                "block at height {} does not extend the chain (tampered: {})",
                block.height, verification.tamper_detected
            )));
        }

        let hash = block.block_hash.clone();
        self.blocks.push(block);
        Ok(hash)
    }

    pub fn all_blocks(&self) -> &[IdentityBlock] {
        &self.blocks
    }

    /// Verify entire chain integrity.
    pub fn verify_chain(&self) -> Result<ChainVerification> {
        let mut verification = ChainVerification {
            valid: true,
            blocks_verified: 0,
            tamper_detected: false,
            first_invalid_height: None,
        };

        for (i, block) in self.blocks.iter().enumerate() {
            let parent = if i > 0 { Some(&self.blocks[i - 1]) } else { None };
            let block_verification = block.verify(parent)?;

            if !block_verification.valid {
                verification.valid = false;
                verification.tamper_detected = block_verification.tamper_detected;
                verification.first_invalid_height = Some(block.height);
                break;
            }

            verification.blocks_verified += 1;
        }

        Ok(verification)
    }
}
