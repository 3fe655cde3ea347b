//! Consensus Module
//!
//! Threshold approval of identity documents:
//! - Voting rules: authority from the committed document, accept-count threshold
//! - Request dispatch for a roster node
//! - Client-side proposal lifecycle

pub mod engine;
pub mod message;
pub mod state;
pub mod voting;

pub use engine::{ConsensusEngine, EngineMetrics};
pub use message::{Request, Response};
pub use state::{ProposalState, TrackedProposal};
pub use voting::TallyResult;
