use crate::chain::{ChainError, EventKind};

use serde::{Deserialize, Serialize};

/// Lifecycle state of a stake
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum StakeStatus {
	Active,
	Unstaked,
}

/// Identity of one stake lifecycle: (user, pool, start block)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StakeKey {
	pub user: String,
	pub pool_id: u64,
	pub start_block: u64,
}

/// Stake as mirrored in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeRecord {
	pub user: String,
	pub pool_id: u64,
	/// Decimal string, uint256 on chain
	pub amount: String,
	pub start_block: u64,
	pub status: StakeStatus,
}

impl StakeRecord {
	pub fn key(&self) -> StakeKey {
		StakeKey {
			user: self.user.clone(),
			pool_id: self.pool_id,
			start_block: self.start_block,
		}
	}
}

/// Match fields for a conditional update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StakeMatch {
	pub user: String,
	pub pool_id: u64,
	pub amount: String,
	pub status: StakeStatus,
}

impl StakeMatch {
	pub fn matches(&self, record: &StakeRecord) -> bool {
		record.user == self.user
			&& record.pool_id == self.pool_id
			&& record.amount == self.amount
			&& record.status == self.status
	}
}

/// Errors raised by stake store implementations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
	#[error("IO error: {0}")]
	IoError(#[from] std::io::Error),

	#[error("Serialization error: {0}")]
	SerializationError(#[from] serde_json::Error),
}

/// Error types for stake synchronization
#[derive(Debug, thiserror::Error)]
pub enum StakeSyncError {
	#[error("Query for {kind} events in blocks {from_block}-{to_block} failed: {source}")]
	SourceQueryFailure {
		kind: EventKind,
		from_block: u64,
		to_block: u64,
		source: ChainError,
	},

	#[error("Failed to read current chain height: {0}")]
	HeightQueryFailure(ChainError),

	#[error("{kind} subscription failed: {reason}")]
	SourceSubscriptionFailure { kind: EventKind, reason: String },

	#[error("Store write failed: {0}")]
	StoreWriteFailure(#[from] StoreError),

	#[error("Malformed {kind} event: {reason}")]
	MalformedEvent { kind: EventKind, reason: String },

	#[error("Persistence error: {0}")]
	PersistenceError(String),

	#[error("Sync task failed: {0}")]
	TaskFailure(String),
}
