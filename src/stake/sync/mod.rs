//! Stake Synchronization Module
//!
//! This module provides the logic and services for mirroring the staking contract's event
//! history into a stake store. It is composed of several submodules:
//!
//! - `orchestrator`: The sync engine. Wires the event source, store and strategies together.
//! - `events`: Normalization of raw contract events into stake operations.
//! - `transition`: Idempotent application of operations to the store.
//! - `repositories`: Storage traits and the in-memory and file-backed implementations.
//! - `progress_tracker`: The backfill cursor plus counters for logging and statistics.
//! - `state_persistence`: Saving and restoring the backfill cursor between runs.
//! - `strategies`: Batched backfill and per-kind live subscription sync.

/// Raw event normalization
pub mod events;
/// Main coordinator for the stake sync process
pub mod orchestrator;
/// Tracks synchronization progress and statistics
pub mod progress_tracker;
/// Stake store and cursor storage
pub mod repositories;
/// Cursor persistence service
pub mod state_persistence;
/// Backfill and live synchronization strategies
pub mod strategies;
/// Stake state transitions
pub mod transition;

pub use orchestrator::*;
