//! Chain integration module for the staking contract
//!
//! This module provides the event source abstraction the sync engine consumes, the
//! JSON-RPC client implementing it, and the ABI decoding that turns contract logs into
//! raw staking events.

/// ABI decoding of staking contract logs
mod abi;
/// JSON-RPC client for historical queries and live subscriptions
mod client;
/// Capability trait consumed by the sync engine
mod source;
/// Type definitions for raw events and errors
mod types;

pub use client::StakingContractClient;
pub use source::{EventSource, EventStream};
pub use types::*;
