//! Ledger of committed identity documents.
//!
//! Every commit becomes a block in a per-identity hash-linked chain:
//! - `block`: content-addressed identity blocks
//! - `chain`: per-identity chain with integrity verification
//! - `cosign`: collective signing seam
//! - `adapter`: the `LedgerAdapter` the store calls at commit time

pub mod adapter;
pub mod block;
pub mod chain;
pub mod cosign;

pub use adapter::{LedgerAdapter, SkipchainLedger};
pub use block::{BlockRef, IdentityBlock};
pub use chain::{ChainVerification, IdentityChain};
pub use cosign::{CollectiveSignature, CollectiveSigner, LocalCosigner};
