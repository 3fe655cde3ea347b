//! Identity documents, proposals and device keys.

pub mod crypto;
pub mod document;
pub mod proposal;

pub use crypto::{sha3_256, verify, DeviceKeyPair};
pub use document::{DevicePublicKey, Document, DocumentDiff};
pub use proposal::{Ballot, Proposal, VoteType};
