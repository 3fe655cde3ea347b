//! Client sessions driving identities across a roster.

pub mod client;

#[cfg(test)]
mod scenarios;

pub use client::ClientSession;
