//! Proposals and signed ballots.

use crate::core::{Hash256, IdentityId, Result};
use crate::identity::crypto::DeviceKeyPair;
use crate::identity::document::Document;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type of vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteType {
    /// Approve the candidate
    Accept,
    /// Recorded for audit, never blocks a commit
    Reject,
}

impl VoteType {
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            VoteType::Accept
        } else {
            VoteType::Reject
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, VoteType::Accept)
    }
}

/// A candidate next document with its vote tally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    /// Round marker assigned by the node that holds this proposal
    pub round: u64,
    /// Candidate document
    pub target: Document,
    /// At most one vote per device
    pub votes: BTreeMap<String, VoteType>,
}

impl Proposal {
    /// Fresh proposal with an empty tally.
    pub fn new(round: u64, target: Document) -> Self {
        Self {
            round,
            target,
            votes: BTreeMap::new(),
        }
    }

    /// Record a device's vote, replacing any earlier one from that device.
    /// Returns the replaced vote.
    pub fn record(&mut self, device: &str, vote: VoteType) -> Option<VoteType> {
        self.votes.insert(device.to_string(), vote)
    }

    pub fn accept_count(&self) -> usize {
        self.votes.values().filter(|v| v.is_accept()).count()
    }

    pub fn reject_count(&self) -> usize {
        self.votes.len() - self.accept_count()
    }
}

/// A device's signed vote on one round of one identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    pub device: String,
    pub vote: VoteType,
    /// Ed25519 signature over [`Ballot::message`]
    pub signature: Vec<u8>,
}

impl Ballot {
    /// Canonical bytes a device signs. Binding the round stops a signature
    /// from approving a later candidate, binding the target hash stops it
    /// from approving a different one.
    pub fn message(
        id: &IdentityId,
        round: u64,
        target_hash: &Hash256,
        vote: VoteType,
    ) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(
            id.as_bytes(),
            round,
            target_hash.as_bytes(),
            vote,
        ))?)
    }

    /// Sign a vote on `proposal` as `device`.
    pub fn sign(
        keys: &DeviceKeyPair,
        device: &str,
        id: &IdentityId,
        proposal: &Proposal,
        vote: VoteType,
    ) -> Result<Self> {
        let message = Self::message(id, proposal.round, &proposal.target.hash(), vote)?;
        Ok(Self {
            device: device.to_string(),
            vote,
            signature: keys.sign(&message),
        })
    }
}
