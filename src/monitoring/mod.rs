//! Monitoring Module
//!
//! Observability for identity nodes and sessions. Per-node counters live on
//! [`crate::consensus::ConsensusEngine::metrics`]; this module wires up the
//! `tracing` output.

pub mod logging;

pub use logging::{init_logging, LogLevel, LoggingConfig};
