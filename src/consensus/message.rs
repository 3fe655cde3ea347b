//! Requests a node accepts and the responses it returns.

use crate::core::IdentityId;
use crate::identity::{Ballot, Document, Proposal};
use crate::store::VoteOutcome;
use serde::{Deserialize, Serialize};

/// Request to a roster node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Create { id: IdentityId, genesis: Document },
    GetCommitted { id: IdentityId },
    GetPending { id: IdentityId },
    SubmitProposal { id: IdentityId, target: Document },
    CastVote { id: IdentityId, ballot: Ballot },
}

impl Request {
    pub fn identity(&self) -> &IdentityId {
        match self {
            Request::Create { id, .. }
            | Request::GetCommitted { id }
            | Request::GetPending { id }
            | Request::SubmitProposal { id, .. }
            | Request::CastVote { id, .. } => id,
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::GetCommitted { .. } => "get_committed",
            Request::GetPending { .. } => "get_pending",
            Request::SubmitProposal { .. } => "submit_proposal",
            Request::CastVote { .. } => "cast_vote",
        }
    }
}

/// Successful reply from a roster node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Created,
    Committed(Document),
    Pending(Option<Proposal>),
    Submitted { round: u64 },
    Voted(VoteOutcome),
}
