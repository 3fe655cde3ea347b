//! # idchain - threshold-governed device identities
//!
//! An identity is a document listing a user's devices (by public key), a
//! free-form key/value storage and an approval threshold. Roster nodes each
//! keep the committed document and at most one pending proposal per
//! identity; a proposal commits once enough devices of the *committed*
//! document sign an accept vote.
//!
//! - **identity**: documents, proposals, device keys and signed ballots
//! - **store / consensus**: per-node storage and request dispatch
//! - **ledger**: hash-linked, collectively signed history of commits
//! - **session**: a device's client driving the roster
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use idchain::config::{NodeConfig, SessionConfig};
//! use idchain::consensus::ConsensusEngine;
//! use idchain::core::Roster;
//! use idchain::ledger::{LocalCosigner, SkipchainLedger};
//! use idchain::session::ClientSession;
//! use idchain::transport::LocalTransport;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> idchain::Result<()> {
//!     let roster = Roster::with_size(3);
//!     let signer = Arc::new(LocalCosigner::for_roster(&roster));
//!     let transport = Arc::new(LocalTransport::new());
//!     for node in roster.nodes() {
//!         let ledger = Arc::new(SkipchainLedger::new(roster.clone(), signer.clone()));
//!         let engine = ConsensusEngine::new(NodeConfig::new(node.clone()), ledger);
//!         transport.register(Arc::new(engine)).await;
//!     }
//!
//!     let mut laptop = ClientSession::new("laptop", roster.clone(), transport.clone(), SessionConfig::default());
//!     let id = laptop.create_identity(1).await?;
//!
//!     let mut phone = ClientSession::new("phone", roster, transport, SessionConfig::default());
//!     phone.attach_to_identity(id).await?;
//!
//!     laptop.refresh().await?;
//!     assert!(laptop.vote(true).await?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consensus;
pub mod core;
pub mod identity;
pub mod ledger;
pub mod monitoring;
pub mod session;
pub mod store;
pub mod transport;

pub use core::error::{Error, Result};
pub use core::{IdentityId, NodeId, Roster};
pub use identity::{Document, Proposal};
pub use session::ClientSession;
