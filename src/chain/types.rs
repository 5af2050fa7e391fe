//! Types for the staking contract event source

use serde::{Deserialize, Serialize};
use std::fmt;

/// Staking contract events mirrored into the store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// `Staked(address indexed user, uint256 indexed poolId, uint256 amount)`
    Staked,
    /// `Unstaked(address indexed user, uint256 indexed poolId, uint256 amount, uint256 reward)`
    Unstaked,
    /// `UnstakedEarly(address indexed user, uint256 indexed poolId, uint256 amount)`
    UnstakedEarly,
}

impl EventKind {
    /// Every kind, in the order backfill queries and applies them.
    pub const ALL: [EventKind; 3] = [
        EventKind::Staked,
        EventKind::Unstaked,
        EventKind::UnstakedEarly,
    ];

    /// Event name as declared by the contract
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::Staked => "Staked",
            EventKind::Unstaked => "Unstaked",
            EventKind::UnstakedEarly => "UnstakedEarly",
        }
    }

    /// Canonical ABI signature used to derive topic0
    pub fn signature(&self) -> &'static str {
        match self {
            EventKind::Staked => "Staked(address,uint256,uint256)",
            EventKind::Unstaked => "Unstaked(address,uint256,uint256,uint256)",
            EventKind::UnstakedEarly => "UnstakedEarly(address,uint256,uint256)",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Staking event as delivered by the source.
///
/// Every field besides `kind` is optional: a log with missing topics or truncated data
/// still produces a `RawEvent`, which normalization then rejects as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Which contract event this is.
    pub kind: EventKind,
    /// Block the log was emitted in.
    pub block_number: Option<u64>,
    /// Staker address.
    pub user: Option<String>,
    /// Pool identifier as a decimal string (uint256 on chain).
    pub pool_id: Option<String>,
    /// Staked amount as a decimal string (uint256 on chain).
    pub amount: Option<String>,
    /// Reward paid out, only present on `Unstaked`.
    pub reward: Option<String>,
}

impl RawEvent {
    /// An event with no decoded fields.
    pub fn empty(kind: EventKind) -> Self {
        Self {
            kind,
            block_number: None,
            user: None,
            pool_id: None,
            amount: None,
            reward: None,
        }
    }
}

/// Error types for event source operations
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("JSON-RPC error {code}: {message}")]
    RpcError { code: i64, message: String },

    #[error("No data returned")]
    NoData,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    #[error("Invalid contract address {0}")]
    InvalidAddress(String),
}
