//! Device-side view of an identity.
//!
//! A session holds one device's key pair plus the last committed document
//! and pending proposal it has seen. Writes (`create`, `submit`) fan out to
//! every roster node. Reads and votes go to a single home node: the node
//! that assigned the round a device signs is the node that must check it.

use crate::config::SessionConfig;
use crate::consensus::{ProposalState, Request, Response, TrackedProposal};
use crate::core::{Error, ErrorKind, IdentityId, NodeId, Result, Roster};
use crate::identity::{Ballot, DeviceKeyPair, DevicePublicKey, Document, Proposal, VoteType};
use crate::transport::Transport;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A device's session against a roster.
pub struct ClientSession {
    config: SessionConfig,
    roster: Roster,
    transport: Arc<dyn Transport>,
    device_name: String,
    keys: DeviceKeyPair,
    id: Option<IdentityId>,
    committed: Option<Document>,
    pending: Option<Proposal>,
    tracked: Option<TrackedProposal>,
    home: Option<NodeId>,
}

impl ClientSession {
    /// New device with a fresh key pair, not yet part of any identity.
    pub fn new(
        device_name: &str,
        roster: Roster,
        transport: Arc<dyn Transport>,
        config: SessionConfig,
    ) -> Self {
        Self {
            config,
            roster,
            transport,
            device_name: device_name.to_string(),
            keys: DeviceKeyPair::generate(),
            id: None,
            committed: None,
            pending: None,
            tracked: None,
            home: None,
        }
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn public_key(&self) -> DevicePublicKey {
        self.keys.public_key()
    }

    pub fn id(&self) -> Option<IdentityId> {
        self.id
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Last committed document this session has seen.
    pub fn committed(&self) -> Option<&Document> {
        self.committed.as_ref()
    }

    /// Last pending proposal this session has seen.
    pub fn pending(&self) -> Option<&Proposal> {
        self.pending.as_ref()
    }

    /// Node used for reads and votes.
    pub fn home(&self) -> Option<&NodeId> {
        self.home
            .as_ref()
            .or(self.config.preferred_node.as_ref())
            .or_else(|| self.roster.nodes().first())
    }

    fn identity(&self) -> Result<IdentityId> {
        self.id
            .ok_or_else(|| Error::NotFound("session is not attached to an identity".into()))
    }

    fn committed_or_err(&self) -> Result<&Document> {
        self.committed
            .as_ref()
            .ok_or_else(|| Error::NotFound("no committed document known".into()))
    }

    /// Create a new identity with this device as its only member and
    /// register it on every roster node.
    ///
    /// On `PartialFailure` the session keeps the new identity;
    /// [`ClientSession::replicate_create`] retries the nodes that failed.
    pub async fn create_identity(&mut self, threshold: u32) -> Result<IdentityId> {
        let id = IdentityId::new();
        let genesis = Document::genesis(threshold, &self.device_name, self.keys.public_key());
        self.id = Some(id);
        self.committed = Some(genesis);
        self.pending = None;
        self.tracked = None;

        let nodes = self.roster.nodes().to_vec();
        match self.replicate_create(&nodes).await {
            Ok(()) => {
                info!(identity = %id, device = %self.device_name, "Identity created");
                Ok(id)
            }
            Err(e @ Error::PartialFailure { .. }) => Err(e),
            Err(e) => {
                self.id = None;
                self.committed = None;
                Err(e)
            }
        }
    }

    /// Send this session's genesis document to `nodes`. Never retry a node
    /// that already accepted it: it answers `AlreadyExists`.
    pub async fn replicate_create(&self, nodes: &[NodeId]) -> Result<()> {
        let id = self.identity()?;
        let genesis = self.committed_or_err()?.clone();
        self.fan_out(nodes, Request::Create { id, genesis }).await?;
        Ok(())
    }

    /// Join an existing identity: fetch its committed document and propose
    /// adding this device to it on every node.
    pub async fn attach_to_identity(&mut self, id: IdentityId) -> Result<()> {
        self.follow(id).await?;
        let name = self.device_name.clone();
        let key = self.keys.public_key();
        self.propose(|doc| doc.add_device(&name, key)).await
    }

    /// Track an identity read-only.
    pub async fn follow(&mut self, id: IdentityId) -> Result<()> {
        self.id = Some(id);
        self.home = None;
        self.tracked = None;
        if let Err(e) = self.refresh().await {
            self.id = None;
            return Err(e);
        }
        Ok(())
    }

    /// Base for the next edit: the pending candidate if one is known,
    /// otherwise a fresh copy of the committed document.
    pub fn draft(&self) -> Result<Document> {
        match &self.pending {
            Some(p) => Ok(p.target.clone()),
            None => Ok(self.committed_or_err()?.clone_for_edit()),
        }
    }

    /// Apply `edit` to a copy of the committed document and submit it.
    pub async fn propose<F>(&mut self, edit: F) -> Result<()>
    where
        F: FnOnce(&mut Document),
    {
        let mut target = self.committed_or_err()?.clone_for_edit();
        edit(&mut target);
        self.submit(target).await
    }

    /// Submit `target` to every roster node, replacing whatever is pending.
    pub async fn submit(&mut self, target: Document) -> Result<()> {
        let nodes = self.roster.nodes().to_vec();
        let sent = self.submit_to(&nodes, target).await;
        // track whatever the home node now holds, even after a partial fan-out
        let refreshed = self.refresh_pending().await;
        if let Some(p) = &self.pending {
            self.tracked = Some(TrackedProposal::from(p));
        }
        sent.and(refreshed)
    }

    /// Submit `target` to a subset of nodes, e.g. those a `PartialFailure`
    /// listed.
    pub async fn submit_to(&self, nodes: &[NodeId], target: Document) -> Result<()> {
        let id = self.identity()?;
        let replies = self
            .fan_out(nodes, Request::SubmitProposal { id, target })
            .await?;
        for (node, reply) in replies {
            if let Response::Submitted { round } = reply {
                debug!(identity = %id, node = %node, round, "Proposal accepted");
            }
        }
        Ok(())
    }

    /// Vote on the pending proposal this session last saw, at its home node.
    /// Returns whether the vote committed the proposal.
    pub async fn vote(&mut self, accept: bool) -> Result<bool> {
        let id = self.identity()?;
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| Error::NotFound(format!("no known pending proposal for {}", id)))?;
        let ballot = Ballot::sign(
            &self.keys,
            &self.device_name,
            &id,
            pending,
            VoteType::from_accept(accept),
        )?;
        let node = self
            .home()
            .cloned()
            .ok_or_else(|| Error::Internal("roster is empty".into()))?;

        let outcome = match self.transport.send(&node, Request::CastVote { id, ballot }).await? {
            Response::Voted(outcome) => outcome,
            _ => return Err(Error::UnexpectedResponse(node)),
        };
        self.tracked = Some(TrackedProposal::from(pending));
        debug!(
            identity = %id,
            device = %self.device_name,
            accept,
            accepts = outcome.tally.accept_votes,
            committed = outcome.committed,
            "Vote cast"
        );

        if outcome.committed {
            self.refresh().await?;
        }
        Ok(outcome.committed)
    }

    /// Submit an edit, vote for it and pull the result.
    pub async fn propose_and_vote<F>(&mut self, edit: F) -> Result<bool>
    where
        F: FnOnce(&mut Document),
    {
        self.propose(edit).await?;
        let committed = self.vote(true).await?;
        if !committed {
            self.refresh().await?;
        }
        Ok(committed)
    }

    /// Pull committed and pending state from one node.
    pub async fn refresh(&mut self) -> Result<()> {
        let id = self.identity()?;
        let (node, reply) = self.read(Request::GetCommitted { id }).await?;
        match reply {
            Response::Committed(doc) => self.committed = Some(doc),
            _ => return Err(Error::UnexpectedResponse(node)),
        }
        self.home = Some(node);
        self.refresh_pending().await
    }

    /// Pull only the pending proposal from the home node.
    pub async fn refresh_pending(&mut self) -> Result<()> {
        let id = self.identity()?;
        let (node, reply) = self.read(Request::GetPending { id }).await?;
        match reply {
            Response::Pending(pending) => self.pending = pending,
            _ => return Err(Error::UnexpectedResponse(node)),
        }
        self.home = Some(node);
        Ok(())
    }

    /// Lifecycle of the proposal this session last submitted or voted on,
    /// as of its last refresh.
    pub fn proposal_state(&self) -> Result<ProposalState> {
        let committed = self.committed_or_err()?;
        Ok(ProposalState::observe(
            self.tracked.as_ref(),
            committed,
            self.pending.as_ref(),
        ))
    }

    /// Send to the home node, falling through to the rest of the roster
    /// only while nodes are unreachable.
    async fn read(&self, request: Request) -> Result<(NodeId, Response)> {
        let mut order: Vec<NodeId> = self.home().into_iter().cloned().collect();
        let rest: Vec<NodeId> = self
            .roster
            .nodes()
            .iter()
            .filter(|n| !order.contains(*n))
            .cloned()
            .collect();
        order.extend(rest);

        let mut last_error = Error::Internal("roster is empty".into());
        for node in order {
            match self.transport.send(&node, request.clone()).await {
                Ok(reply) => return Ok((node, reply)),
                Err(e) if e.kind() == ErrorKind::Transport => {
                    warn!(node = %node, error = %e, "Node unreachable, trying next");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }

    /// Send `request` to every node in `nodes`, each bounded by the fan-out
    /// timeout.
    async fn fan_out(&self, nodes: &[NodeId], request: Request) -> Result<Vec<(NodeId, Response)>> {
        if nodes.is_empty() {
            return Err(Error::Internal("no nodes to contact".into()));
        }

        let timeout = self.config.fanout_timeout();
        let calls = nodes.iter().map(|node| {
            let request = request.clone();
            async move {
                let reply = match tokio::time::timeout(timeout, self.transport.send(node, request)).await {
                    Ok(reply) => reply,
                    Err(_) => Err(Error::Timeout(node.clone())),
                };
                (node.clone(), reply)
            }
        });

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        let mut responses = Vec::new();
        for (node, reply) in join_all(calls).await {
            match reply {
                Ok(response) => {
                    succeeded.push(node.clone());
                    responses.push((node, response));
                }
                Err(e) => {
                    warn!(node = %node, request = request.name(), error = %e, "Fan-out request failed");
                    failed.push((node, e));
                }
            }
        }

        if failed.is_empty() {
            return Ok(responses);
        }
        if succeeded.is_empty() {
            // every node refused: report the first reason as is
            let (_, first) = failed.swap_remove(0);
            return Err(first);
        }
        Err(Error::PartialFailure { succeeded, failed })
    }
}

impl std::fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSession")
            .field("device_name", &self.device_name)
            .field("id", &self.id)
            .field("home", &self.home)
            .field("pending_round", &self.pending.as_ref().map(|p| p.round))
            .finish_non_exhaustive()
    }
}
