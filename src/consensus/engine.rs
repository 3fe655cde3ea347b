//! Per-node consensus engine.
//!
//! Routes the closed set of [`Request`] variants to the node's
//! [`IdentityStore`] and keeps request counters.

use crate::config::NodeConfig;
use crate::consensus::message::{Request, Response};
use crate::consensus::state::{ProposalState, TrackedProposal};
use crate::core::{Error, IdentityId, NodeId, Result};
use crate::ledger::LedgerAdapter;
use crate::store::IdentityStore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Snapshot of a node's counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub requests: u64,
    pub identities_created: u64,
    pub proposals_submitted: u64,
    pub votes_recorded: u64,
    pub votes_refused: u64,
    pub commits: u64,
    pub ledger_failures: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    identities_created: AtomicU64,
    proposals_submitted: AtomicU64,
    votes_recorded: AtomicU64,
    votes_refused: AtomicU64,
    commits: AtomicU64,
    ledger_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EngineMetrics {
        EngineMetrics {
            requests: self.requests.load(Ordering::Relaxed),
            identities_created: self.identities_created.load(Ordering::Relaxed),
            proposals_submitted: self.proposals_submitted.load(Ordering::Relaxed),
            votes_recorded: self.votes_recorded.load(Ordering::Relaxed),
            votes_refused: self.votes_refused.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            ledger_failures: self.ledger_failures.load(Ordering::Relaxed),
        }
    }
}

/// A roster node: its identity store plus request dispatch.
pub struct ConsensusEngine {
    config: NodeConfig,
    store: Arc<IdentityStore>,
    counters: Counters,
}

impl ConsensusEngine {
    /// Create a node with an empty store committing through `ledger`.
    pub fn new(config: NodeConfig, ledger: Arc<dyn LedgerAdapter>) -> Self {
        let store = Arc::new(IdentityStore::new(ledger, config.min_threshold));
        Self::with_store(config, store)
    }

    pub fn with_store(config: NodeConfig, store: Arc<IdentityStore>) -> Self {
        Self {
            config,
            store,
            counters: Counters::default(),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        &self.config.node_id
    }

    pub fn store(&self) -> &Arc<IdentityStore> {
        &self.store
    }

    pub fn metrics(&self) -> EngineMetrics {
        self.counters.snapshot()
    }

    /// Handle one request.
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        Counters::bump(&self.counters.requests);
        debug!(node = %self.config.node_id, request = request.name(), identity = %request.identity(), "Dispatching");

        match request {
            Request::Create { id, genesis } => {
                self.store.create(id, genesis).await?;
                Counters::bump(&self.counters.identities_created);
                Ok(Response::Created)
            }
            Request::GetCommitted { id } => {
                Ok(Response::Committed(self.store.get_committed(&id).await?))
            }
            Request::GetPending { id } => Ok(Response::Pending(self.store.get_pending(&id).await?)),
            Request::SubmitProposal { id, target } => {
                let round = self.store.submit_proposal(&id, target).await?;
                Counters::bump(&self.counters.proposals_submitted);
                Ok(Response::Submitted { round })
            }
            Request::CastVote { id, ballot } => match self.store.cast_vote(&id, ballot).await {
                Ok(outcome) => {
                    Counters::bump(&self.counters.votes_recorded);
                    if outcome.committed {
                        Counters::bump(&self.counters.commits);
                    }
                    Ok(Response::Voted(outcome))
                }
                Err(e) => {
                    match e {
                        // the vote itself was kept
                        Error::LedgerUnavailable(_) => {
                            Counters::bump(&self.counters.votes_recorded);
                            Counters::bump(&self.counters.ledger_failures);
                        }
                        _ => Counters::bump(&self.counters.votes_refused),
                    }
                    Err(e)
                }
            },
        }
    }

    /// Lifecycle state of `tracked` against this node's view.
    pub async fn proposal_state(
        &self,
        id: &IdentityId,
        tracked: Option<&TrackedProposal>,
    ) -> Result<ProposalState> {
        let committed = self.store.get_committed(id).await?;
        let pending = self.store.get_pending(id).await?;
        Ok(ProposalState::observe(tracked, &committed, pending.as_ref()))
    }
}
