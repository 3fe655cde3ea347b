//! Node-local identity store.
//!
//! Each identity record sits behind its own lock, so work on different
//! identities never blocks. Proposal submission, vote recording and the
//! commit a vote may trigger all run under that one lock.

use crate::consensus::voting::{self, TallyResult};
use crate::core::{Error, IdentityId, Result};
use crate::identity::{Ballot, Document, Proposal};
use crate::ledger::{BlockRef, LedgerAdapter};
use crate::store::storage::IdentityStorage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Outcome of a recorded vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteOutcome {
    /// Whether this vote committed the proposal
    pub committed: bool,
    /// Tally after recording the vote
    pub tally: TallyResult,
    /// Ledger block of the commit
    pub block: Option<BlockRef>,
}

/// Identity records held by one node.
pub struct IdentityStore {
    identities: RwLock<HashMap<IdentityId, Arc<Mutex<IdentityStorage>>>>,
    ledger: Arc<dyn LedgerAdapter>,
    min_threshold: u32,
}

impl IdentityStore {
    pub fn new(ledger: Arc<dyn LedgerAdapter>, min_threshold: u32) -> Self {
        Self {
            identities: RwLock::new(HashMap::new()),
            ledger,
            min_threshold,
        }
    }

    async fn entry(&self, id: &IdentityId) -> Result<Arc<Mutex<IdentityStorage>>> {
        self.identities
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("identity {}", id)))
    }

    /// Register a new identity and link its genesis document as the first
    /// block of its history. Nothing is registered if the ledger fails.
    pub async fn create(&self, id: IdentityId, mut genesis: Document) -> Result<()> {
        let mut identities = self.identities.write().await;
        if identities.contains_key(&id) {
            return Err(Error::AlreadyExists(id));
        }

        genesis.parent = None;
        let block = self.ledger.link_and_sign(&id, &genesis).await.map_err(|e| {
            warn!(identity = %id, error = %e, "Create refused, ledger failed");
            into_ledger_error(e)
        })?;
        identities.insert(
            id,
            Arc::new(Mutex::new(IdentityStorage::new(id, genesis, block))),
        );
        info!(identity = %id, "Created identity");
        Ok(())
    }

    pub async fn contains(&self, id: &IdentityId) -> bool {
        self.identities.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }

    pub async fn get_committed(&self, id: &IdentityId) -> Result<Document> {
        let entry = self.entry(id).await?;
        let storage = entry.lock().await;
        Ok(storage.committed.clone())
    }

    pub async fn get_pending(&self, id: &IdentityId) -> Result<Option<Proposal>> {
        let entry = self.entry(id).await?;
        let storage = entry.lock().await;
        Ok(storage.pending.clone())
    }

    /// Block of the most recent commit on this node.
    pub async fn latest_block(&self, id: &IdentityId) -> Result<BlockRef> {
        let entry = self.entry(id).await?;
        let storage = entry.lock().await;
        Ok(storage.latest_block.clone())
    }

    /// Replace the pending proposal, discarding its votes. Anyone holding the
    /// id may submit; only committed devices can vote it through.
    /// Returns the new round marker.
    pub async fn submit_proposal(&self, id: &IdentityId, target: Document) -> Result<u64> {
        let entry = self.entry(id).await?;
        let mut storage = entry.lock().await;
        let superseded = storage.pending.as_ref().map(|p| p.round);
        let round = storage.replace_pending(target);
        debug!(identity = %id, round, ?superseded, "Proposal submitted");
        Ok(round)
    }

    /// Record a ballot and commit if the committed threshold is reached.
    ///
    /// On a ledger failure the vote stays recorded and the committed and
    /// pending state are untouched, so repeating the vote retries the commit.
    pub async fn cast_vote(&self, id: &IdentityId, ballot: Ballot) -> Result<VoteOutcome> {
        let entry = self.entry(id).await?;
        let mut guard = entry.lock().await;
        let storage = &mut *guard;

        let proposal = storage
            .pending
            .as_mut()
            .ok_or_else(|| Error::NotFound(format!("no pending proposal for identity {}", id)))?;

        if let Err(e) = voting::verify_ballot(id, &storage.committed, proposal, &ballot) {
            warn!(identity = %id, device = %ballot.device, error = %e, "Vote refused");
            return Err(e);
        }

        proposal.record(&ballot.device, ballot.vote);
        let tally = voting::tally(&storage.committed, proposal, self.min_threshold);
        debug!(
            identity = %id,
            device = %ballot.device,
            vote = ?ballot.vote,
            accepts = tally.accept_votes,
            threshold = tally.threshold,
            "Vote recorded"
        );

        if !tally.reached {
            return Ok(VoteOutcome {
                committed: false,
                tally,
                block: None,
            });
        }

        // the candidate may have been drafted from an older document
        let mut target = proposal.target.clone();
        target.parent = Some(storage.committed.hash());
        let block = self.ledger.link_and_sign(id, &target).await.map_err(|e| {
            warn!(identity = %id, round = tally.round, error = %e, "Commit deferred, ledger failed");
            into_ledger_error(e)
        })?;

        storage.commit(target, block.clone());
        info!(identity = %id, round = tally.round, height = block.height, "Proposal committed");

        Ok(VoteOutcome {
            committed: true,
            tally,
            block: Some(block),
        })
    }
}

fn into_ledger_error(e: Error) -> Error {
    match e {
        Error::LedgerUnavailable(_) => e,
        other => Error::LedgerUnavailable(other.to_string()),
    }
}
