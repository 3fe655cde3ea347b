//! Multi-device scenarios over an in-process roster.

use super::ClientSession;
use crate::config::{NodeConfig, SessionConfig};
use crate::consensus::{ConsensusEngine, ProposalState, Request, Response};
use crate::core::{Error, IdentityId, NodeId, Result, Roster};
use crate::ledger::{LocalCosigner, SkipchainLedger};
use crate::transport::{LocalTransport, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

struct Network {
    roster: Roster,
    transport: Arc<LocalTransport>,
    ledgers: HashMap<NodeId, Arc<SkipchainLedger>>,
}

impl Network {
    async fn new(size: usize) -> Self {
        let roster = Roster::with_size(size);
        let transport = Arc::new(LocalTransport::new());
        let signer = Arc::new(LocalCosigner::for_roster(&roster));
        let mut ledgers = HashMap::new();
        for node in roster.nodes() {
            let ledger = Arc::new(SkipchainLedger::new(roster.clone(), signer.clone()));
            let engine = ConsensusEngine::new(NodeConfig::new(node.clone()), ledger.clone());
            transport.register(Arc::new(engine)).await;
            ledgers.insert(node.clone(), ledger);
        }
        Self {
            roster,
            transport,
            ledgers,
        }
    }

    fn session(&self, name: &str) -> ClientSession {
        ClientSession::new(
            name,
            self.roster.clone(),
            self.transport.clone(),
            SessionConfig::default(),
        )
    }

    fn node(&self, index: usize) -> NodeId {
        self.roster.nodes()[index].clone()
    }

    async fn engine(&self, index: usize) -> Arc<ConsensusEngine> {
        self.transport.engine(&self.node(index)).await.unwrap()
    }

    /// Identity whose committed document holds every name in `names`, each
    /// device added through a regular attach and vote.
    async fn identity_with(&self, names: &[&str], threshold: u32) -> Vec<ClientSession> {
        let mut sessions: Vec<ClientSession> = names.iter().map(|n| self.session(n)).collect();
        let id = sessions[0].create_identity(1).await.unwrap();

        for i in 1..sessions.len() {
            sessions[i].attach_to_identity(id).await.unwrap();
            sessions[0].refresh().await.unwrap();
            assert!(sessions[0].vote(true).await.unwrap());
        }
        if threshold != 1 {
            let committed = sessions[0]
                .propose_and_vote(|doc| doc.threshold = threshold)
                .await
                .unwrap();
            assert!(committed);
        }
        for session in sessions.iter_mut() {
            session.refresh().await.unwrap();
        }
        sessions
    }
}

#[tokio::test]
async fn create_identity_reaches_every_node() {
    let net = Network::new(3).await;
    let mut one = net.session("one");
    let id = one.create_identity(2).await.unwrap();

    for i in 0..3 {
        let committed = net.engine(i).await.store().get_committed(&id).await.unwrap();
        assert_eq!(committed.threshold, 2);
        assert_eq!(committed.device_key("one"), Some(&one.public_key()));
    }
    assert_eq!(one.committed().unwrap().devices.len(), 1);
    assert!(one.pending().is_none());
}

#[tokio::test]
async fn attach_proposes_on_every_node() {
    let net = Network::new(5).await;
    let mut one = net.session("one");
    let id = one.create_identity(2).await.unwrap();

    let mut two = net.session("two");
    two.attach_to_identity(id).await.unwrap();

    for i in 0..5 {
        let pending = net.engine(i).await.store().get_pending(&id).await.unwrap().unwrap();
        assert_eq!(pending.target.devices.len(), 2);
        assert_eq!(pending.target.device_key("two"), Some(&two.public_key()));
        assert!(pending.votes.is_empty());
    }
    assert_eq!(two.committed().unwrap().devices.len(), 1);
    assert!(two.pending().is_some());
}

#[tokio::test]
async fn follow_pulls_committed_document() {
    let net = Network::new(5).await;
    let mut one = net.session("one");
    let id = one.create_identity(1).await.unwrap();

    let mut watcher = net.session("two");
    watcher.follow(id).await.unwrap();
    assert_eq!(watcher.id(), Some(id));
    assert_eq!(
        watcher.committed().unwrap().device_key("one"),
        Some(&one.public_key())
    );

    let mut stranger = net.session("three");
    assert!(matches!(
        stranger.follow(IdentityId::new()).await,
        Err(Error::NotFound(_))
    ));
    assert!(stranger.id().is_none());
}

#[tokio::test]
async fn single_device_commit_links_block() {
    let net = Network::new(3).await;
    let mut one = net.session("one");
    let id = one.create_identity(1).await.unwrap();
    let genesis = one.committed().unwrap().clone();

    let committed = one
        .propose_and_vote(|doc| {
            doc.storage
                .insert("ssh:one:example.org".into(), "ssh-ed25519 AAA".into());
        })
        .await
        .unwrap();
    assert!(committed);
    assert_eq!(
        one.committed().unwrap().value(&["ssh", "one", "example.org"]),
        Some("ssh-ed25519 AAA")
    );
    assert!(one.pending().is_none());
    assert_eq!(one.proposal_state().unwrap(), ProposalState::Committed);

    // history starts at the genesis document and links each commit to it
    let ledger = &net.ledgers[&net.node(0)];
    let history = ledger.history(&id).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].document, genesis);
    assert!(history[0].document.parent.is_none());
    assert_eq!(&history[1].document, one.committed().unwrap());
    assert_eq!(history[1].document.parent, Some(genesis.hash()));
    assert!(ledger.verify(&id).await.unwrap().valid);

    // every node linked the genesis document on create
    for i in 1..3 {
        assert_eq!(net.ledgers[&net.node(i)].history(&id).await.len(), 1);
    }
}

#[tokio::test]
async fn reproposal_resets_votes() {
    let net = Network::new(3).await;
    let mut s = net.identity_with(&["one", "two", "three"], 3).await;
    let id = s[0].id().unwrap();

    s[0].propose(|doc| {
        doc.storage.insert("k".into(), "first".into());
    })
    .await
    .unwrap();
    assert!(!s[0].vote(true).await.unwrap());
    s[1].refresh().await.unwrap();
    assert!(!s[1].vote(true).await.unwrap());
    s[0].refresh().await.unwrap();
    assert_eq!(s[0].pending().unwrap().accept_count(), 2);

    s[2].propose(|doc| {
        doc.storage.insert("k".into(), "second".into());
    })
    .await
    .unwrap();

    let pending = net.engine(0).await.store().get_pending(&id).await.unwrap().unwrap();
    assert!(pending.votes.is_empty());
    assert_eq!(pending.target.value(&["k"]), Some("second"));

    s[0].refresh().await.unwrap();
    assert!(matches!(
        s[0].proposal_state().unwrap(),
        ProposalState::Superseded { by_round: Some(_) }
    ));
}

#[tokio::test]
async fn noop_proposal_is_superseded_not_committed() {
    let net = Network::new(3).await;
    let mut one = net.session("one");
    let id = one.create_identity(2).await.unwrap();
    let genesis = one.committed().unwrap().clone();

    one.propose(|_| {}).await.unwrap();
    assert!(matches!(
        one.proposal_state().unwrap(),
        ProposalState::Proposed { .. }
    ));

    let mut other = net.session("two");
    other.follow(id).await.unwrap();
    other
        .propose(|doc| {
            doc.storage.insert("k".into(), "v".into());
        })
        .await
        .unwrap();

    one.refresh().await.unwrap();
    assert_eq!(one.committed().unwrap(), &genesis);
    assert!(matches!(
        one.proposal_state().unwrap(),
        ProposalState::Superseded { by_round: Some(_) }
    ));
}

#[tokio::test]
async fn threshold_is_exact() {
    let net = Network::new(3).await;
    let mut s = net.identity_with(&["a", "b", "c"], 2).await;
    let id = s[0].id().unwrap();

    s[0].propose(|doc| {
        doc.storage.insert("k".into(), "v".into());
    })
    .await
    .unwrap();
    s[2].refresh().await.unwrap();

    assert!(!s[0].vote(true).await.unwrap());
    s[1].refresh().await.unwrap();
    assert!(s[1].vote(true).await.unwrap());

    // "c" still holds the old pending proposal
    assert!(matches!(s[2].vote(true).await, Err(Error::NotFound(_))));

    let history = net.ledgers[&net.node(0)].history(&id).await;
    let committed = net.engine(0).await.store().get_committed(&id).await.unwrap();
    assert_eq!(history.last().unwrap().document, committed);
    assert_eq!(committed.value(&["k"]), Some("v"));
}

#[tokio::test]
async fn new_device_cannot_vote_itself_in() {
    let net = Network::new(5).await;
    let mut one = net.session("one");
    let id = one.create_identity(2).await.unwrap();
    assert_eq!(one.committed().unwrap().threshold, 2);

    let mut two = net.session("two");
    two.attach_to_identity(id).await.unwrap();
    for i in 0..5 {
        let pending = net.engine(i).await.store().get_pending(&id).await.unwrap().unwrap();
        assert!(pending.target.has_device("one") && pending.target.has_device("two"));
    }

    one.refresh().await.unwrap();
    assert!(!one.vote(true).await.unwrap());
    one.refresh().await.unwrap();
    assert_eq!(one.pending().unwrap().accept_count(), 1);

    assert!(matches!(two.vote(true).await, Err(Error::Unauthorized(_))));

    let committed = net.engine(0).await.store().get_committed(&id).await.unwrap();
    assert_eq!(committed.devices.len(), 1);
    assert_eq!(one.proposal_state().unwrap(), ProposalState::Proposed {
        round: one.pending().unwrap().round,
        accept_votes: 1,
        reject_votes: 0,
    });
}

#[tokio::test]
async fn revoked_device_loses_authority() {
    let net = Network::new(5).await;
    let mut s = net.identity_with(&["one", "two", "three"], 2).await;
    let id = s[0].id().unwrap();

    s[0].propose(|doc| {
        doc.revoke_device("three");
    })
    .await
    .unwrap();
    assert!(!s[0].vote(true).await.unwrap());
    s[1].refresh().await.unwrap();
    assert!(s[1].vote(true).await.unwrap());
    assert!(!s[1].committed().unwrap().has_device("three"));

    // "three" never refreshed and still believes it is a member
    let three = &mut s[2];
    assert!(three.committed().unwrap().has_device("three"));
    let stale = three.draft().unwrap();
    assert_ok!(three.submit(stale).await);
    assert!(matches!(three.vote(true).await, Err(Error::Unauthorized(_))));

    // its candidate sits pending but can never gain its vote
    let store = net.engine(0).await.store().clone();
    let pending = store.get_pending(&id).await.unwrap().unwrap();
    assert!(pending.target.has_device("three"));
    assert!(pending.votes.is_empty());
    assert!(!store.get_committed(&id).await.unwrap().has_device("three"));

    // refreshing does not help either
    three.refresh().await.unwrap();
    assert!(!three.committed().unwrap().has_device("three"));
    assert!(matches!(three.vote(true).await, Err(Error::Unauthorized(_))));
}

#[tokio::test]
async fn duplicate_create_is_rejected_everywhere() {
    let net = Network::new(3).await;
    let mut one = net.session("one");
    let id = one.create_identity(1).await.unwrap();
    let genesis = one.committed().unwrap().clone();

    let err = one.replicate_create(net.roster.nodes()).await.unwrap_err();
    assert_eq!(err, Error::AlreadyExists(id));
    for i in 0..3 {
        let committed = net.engine(i).await.store().get_committed(&id).await.unwrap();
        assert_eq!(committed, genesis);
    }
}

#[tokio::test]
async fn partial_create_retries_failed_nodes() {
    let net = Network::new(3).await;
    let down = net.node(2);
    net.transport.set_online(&down, false).await;

    let mut one = net.session("one");
    let err = one.create_identity(1).await.unwrap_err();
    assert!(matches!(err, Error::PartialFailure { .. }));
    assert!(err.is_retryable());
    let failed = err.failed_nodes();
    assert_eq!(failed, vec![down.clone()]);
    let id = one.id().unwrap();

    net.transport.set_online(&down, true).await;
    assert_ok!(one.replicate_create(&failed).await);
    assert!(net.engine(2).await.store().contains(&id).await);
}

#[tokio::test]
async fn create_with_every_node_down_keeps_nothing() {
    let net = Network::new(2).await;
    for i in 0..2 {
        net.transport.set_online(&net.node(i), false).await;
    }
    let mut one = net.session("one");
    assert!(matches!(
        one.create_identity(1).await,
        Err(Error::NodeUnreachable(_))
    ));
    assert!(one.id().is_none());
    assert!(one.committed().is_none());
}

#[tokio::test]
async fn partial_submit_retries_failed_nodes() {
    let net = Network::new(3).await;
    let mut one = net.session("one");
    let id = one.create_identity(1).await.unwrap();

    let down = net.node(1);
    net.transport.set_online(&down, false).await;
    let mut target = one.draft().unwrap();
    target.storage.insert("k".into(), "v".into());
    let err = one.submit(target.clone()).await.unwrap_err();
    assert_eq!(err.failed_nodes(), vec![down.clone()]);
    // the home node took it, so the session can still vote
    assert!(one.pending().is_some());

    net.transport.set_online(&down, true).await;
    assert_ok!(one.submit_to(&[down.clone()], target).await);
    let pending = net.engine(1).await.store().get_pending(&id).await.unwrap();
    assert_eq!(pending.unwrap().target.value(&["k"]), Some("v"));
}

#[tokio::test]
async fn reads_fall_through_unreachable_nodes() {
    let net = Network::new(3).await;
    let mut one = net.session("one");
    let id = one.create_identity(1).await.unwrap();

    net.transport.set_online(&net.node(0), false).await;
    let mut two = net.session("two");
    two.follow(id).await.unwrap();
    assert_eq!(two.home(), Some(&net.node(1)));
}

#[tokio::test]
async fn siblings_only_see_what_was_sent_to_them() {
    let net = Network::new(3).await;
    let mut one = net.session("one");
    let id = one.create_identity(1).await.unwrap();
    let genesis = one.committed().unwrap().clone();

    assert!(one
        .propose_and_vote(|doc| {
            doc.storage.insert("k".into(), "v".into());
        })
        .await
        .unwrap());

    // the commit happened at the home node only
    let home = net.engine(0).await.store().get_committed(&id).await.unwrap();
    let sibling = net.engine(1).await.store().get_committed(&id).await.unwrap();
    assert_eq!(home.value(&["k"]), Some("v"));
    assert_eq!(sibling, genesis);
    assert!(net.engine(1).await.store().get_pending(&id).await.unwrap().is_some());
}

/// Transport that never answers for one node.
struct StalledTransport {
    inner: Arc<LocalTransport>,
    stalled: NodeId,
}

#[async_trait]
impl Transport for StalledTransport {
    async fn send(&self, node: &NodeId, request: Request) -> Result<Response> {
        if node == &self.stalled {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        self.inner.send(node, request).await
    }
}

#[tokio::test]
async fn fan_out_is_bounded_by_timeout() {
    let net = Network::new(3).await;
    let transport = Arc::new(StalledTransport {
        inner: net.transport.clone(),
        stalled: net.node(2),
    });
    let config = SessionConfig {
        fanout_timeout_ms: 50,
        preferred_node: None,
    };
    let mut one = ClientSession::new("one", net.roster.clone(), transport, config);

    let err = one.create_identity(1).await.unwrap_err();
    match &err {
        Error::PartialFailure { succeeded, failed } => {
            assert_eq!(succeeded.len(), 2);
            assert_eq!(failed, &vec![(net.node(2), Error::Timeout(net.node(2)))]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn vote_without_pending_fails_locally() {
    let net = Network::new(1).await;
    let mut one = net.session("one");
    one.create_identity(1).await.unwrap();
    assert_err!(one.vote(true).await);
    assert_eq!(net.engine(0).await.metrics().votes_refused, 0);
}
