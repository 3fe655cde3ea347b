//! Proposal lifecycle as seen from a client.
//!
//! `NoProposal -> Proposed -> {Committed | Superseded}`. A superseded
//! proposal leaves the identity in `Proposed` for the newer candidate; a
//! commit leaves it in `NoProposal` until the next submission.

use crate::core::Hash256;
use crate::identity::{Document, Proposal};
use serde::{Deserialize, Serialize};

/// The proposal a client is following.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProposal {
    pub round: u64,
    pub target_hash: Hash256,
    /// Hash of the committed document the candidate was drafted from
    pub base_hash: Option<Hash256>,
}

impl TrackedProposal {
    /// A candidate that leaves the document content unchanged.
    pub fn is_noop(&self) -> bool {
        self.base_hash.as_ref() == Some(&self.target_hash)
    }
}

impl From<&Proposal> for TrackedProposal {
    fn from(proposal: &Proposal) -> Self {
        Self {
            round: proposal.round,
            target_hash: proposal.target.hash(),
            base_hash: proposal.target.parent.clone(),
        }
    }
}

/// Lifecycle state of an identity's proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    /// Nothing pending
    NoProposal,
    /// A candidate is collecting votes
    Proposed {
        round: u64,
        accept_votes: usize,
        reject_votes: usize,
    },
    /// The tracked candidate became the committed document
    Committed,
    /// The tracked candidate was replaced before reaching the threshold.
    /// `by_round` is the replacing round, `None` if a different candidate
    /// already committed.
    Superseded { by_round: Option<u64> },
}

impl ProposalState {
    /// Derive the state from a node's `committed`/`pending` pair.
    pub fn observe(
        tracked: Option<&TrackedProposal>,
        committed: &Document,
        pending: Option<&Proposal>,
    ) -> Self {
        let proposed = |p: &Proposal| ProposalState::Proposed {
            round: p.round,
            accept_votes: p.accept_count(),
            reject_votes: p.reject_count(),
        };

        let tracked = match tracked {
            None => return pending.map(proposed).unwrap_or(ProposalState::NoProposal),
            Some(t) => t,
        };

        // a no-op candidate matches the committed content before and after
        // it commits, so only a cleared pending slot tells the two apart
        let reached = committed.hash() == tracked.target_hash;
        match pending {
            Some(p) if p.round == tracked.round => proposed(p),
            Some(_) if reached && !tracked.is_noop() => ProposalState::Committed,
            Some(p) => ProposalState::Superseded {
                by_round: Some(p.round),
            },
            None if reached => ProposalState::Committed,
            None => ProposalState::Superseded { by_round: None },
        }
    }
}
