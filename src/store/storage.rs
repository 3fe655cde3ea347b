//! Per-identity storage record.

use crate::core::IdentityId;
use crate::identity::{Document, Proposal};
use crate::ledger::BlockRef;
use serde::{Deserialize, Serialize};

/// What one node holds for one identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IdentityStorage {
    /// Identity this record belongs to
    pub id: IdentityId,
    /// Last committed document
    pub committed: Document,
    /// Candidate collecting votes, if any
    pub pending: Option<Proposal>,
    /// Block of the last commit, the genesis block until the first one
    pub latest_block: BlockRef,
    /// Last round marker handed out
    last_round: u64,
}

impl IdentityStorage {
    pub fn new(id: IdentityId, genesis: Document, genesis_block: BlockRef) -> Self {
        Self {
            id,
            committed: genesis,
            pending: None,
            latest_block: genesis_block,
            last_round: 0,
        }
    }

    /// Replace the pending proposal with a fresh one over `target`.
    /// Round markers are never reused, not even across commits.
    pub fn replace_pending(&mut self, target: Document) -> u64 {
        self.last_round += 1;
        self.pending = Some(Proposal::new(self.last_round, target));
        self.last_round
    }

    /// Promote the pending proposal to committed.
    pub fn commit(&mut self, target: Document, block: BlockRef) {
        self.committed = target;
        self.pending = None;
        self.latest_block = block;
    }

    pub fn last_round(&self) -> u64 {
        self.last_round
    }
}
