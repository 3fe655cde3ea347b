//! Threshold voting rules.
//!
//! Authority always comes from the last committed document: a device may
//! vote only while it is listed there, and the commit threshold is the
//! committed document's, never the candidate's.

use crate::core::{Error, IdentityId, Result};
use crate::identity::crypto::verify;
use crate::identity::{Ballot, DevicePublicKey, Document, Proposal};
use serde::{Deserialize, Serialize};

/// Result of counting a proposal's votes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TallyResult {
    /// Accept votes from committed devices
    pub accept_votes: usize,
    /// Reject votes from committed devices
    pub reject_votes: usize,
    /// Accept votes needed
    pub threshold: usize,
    /// Whether the proposal may commit
    pub reached: bool,
    /// Voting round
    pub round: u64,
}

/// Look up a device in the committed document.
pub fn authorize<'a>(committed: &'a Document, device: &str) -> Result<&'a DevicePublicKey> {
    committed.device_key(device).ok_or_else(|| {
        Error::Unauthorized(format!("device '{}' is not in the committed document", device))
    })
}

/// Check that `ballot` is a committed device's signature over this round
/// and candidate.
pub fn verify_ballot(
    id: &IdentityId,
    committed: &Document,
    proposal: &Proposal,
    ballot: &Ballot,
) -> Result<()> {
    let key = authorize(committed, &ballot.device)?;
    let message = Ballot::message(id, proposal.round, &proposal.target.hash(), ballot.vote)?;
    verify(key, &message, &ballot.signature).map_err(|_| {
        Error::InvalidProof(format!(
            "ballot from '{}' does not match round {} of {}",
            ballot.device, proposal.round, id
        ))
    })
}

/// Threshold actually applied: never below `min_threshold`.
pub fn effective_threshold(committed: &Document, min_threshold: u32) -> usize {
    committed.threshold.max(min_threshold) as usize
}

/// Count votes. Rejects are reported but never subtract from accepts.
pub fn tally(committed: &Document, proposal: &Proposal, min_threshold: u32) -> TallyResult {
    let mut accept_votes = 0;
    let mut reject_votes = 0;
    for (device, vote) in &proposal.votes {
        if !committed.has_device(device) {
            continue;
        }
        if vote.is_accept() {
            accept_votes += 1;
        } else {
            reject_votes += 1;
        }
    }

    let threshold = effective_threshold(committed, min_threshold);
    TallyResult {
        accept_votes,
        reject_votes,
        threshold,
        reached: accept_votes >= threshold,
        round: proposal.round,
    }
}
