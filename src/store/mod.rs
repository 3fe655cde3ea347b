//! Per-node replicated identity storage.

pub mod identity_store;
pub mod storage;

pub use identity_store::{IdentityStore, VoteOutcome};
pub use storage::IdentityStorage;
