//! Normalization of raw chain events into store operations.
//!
//! The sync engine never mutates the store from a `RawEvent` directly: every event is
//! first turned into a `NormalizedOperation`, which validates the fields the store
//! transition needs and canonicalizes amounts. Events that cannot be normalized are
//! reported as `MalformedEvent` and skipped by the caller.

use crate::chain::{EventKind, RawEvent};
use crate::stake::StakeSyncError;

use alloy_primitives::U256;

/// Store operation derived from a chain event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedOperation {
    /// A new stake began at `start_block`
    Stake {
        user: String,
        pool_id: u64,
        amount: String,
        start_block: u64,
    },
    /// Stake withdrawn after its lock period
    Unstake {
        user: String,
        pool_id: u64,
        amount: String,
    },
    /// Stake withdrawn before its lock period ended
    UnstakeEarly {
        user: String,
        pool_id: u64,
        amount: String,
    },
}

impl NormalizedOperation {
    pub fn kind(&self) -> EventKind {
        match self {
            NormalizedOperation::Stake { .. } => EventKind::Staked,
            NormalizedOperation::Unstake { .. } => EventKind::Unstaked,
            NormalizedOperation::UnstakeEarly { .. } => EventKind::UnstakedEarly,
        }
    }

    pub fn user(&self) -> &str {
        match self {
            NormalizedOperation::Stake { user, .. }
            | NormalizedOperation::Unstake { user, .. }
            | NormalizedOperation::UnstakeEarly { user, .. } => user,
        }
    }
}

fn malformed(kind: EventKind, reason: impl Into<String>) -> StakeSyncError {
    StakeSyncError::MalformedEvent {
        kind,
        reason: reason.into(),
    }
}

/// Parse a decimal uint256 string into its canonical form (no leading zeros).
fn canonical_uint(
    kind: EventKind,
    field: &str,
    value: Option<&str>,
) -> Result<String, StakeSyncError> {
    let value = value.ok_or_else(|| malformed(kind, format!("missing {}", field)))?;
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed(
            kind,
            format!("{} {:?} is not a decimal integer", field, value),
        ));
    }
    let parsed = U256::from_str_radix(value, 10)
        .map_err(|e| malformed(kind, format!("invalid {} {:?}: {}", field, value, e)))?;
    Ok(parsed.to_string())
}

fn pool_id(kind: EventKind, value: Option<&str>) -> Result<u64, StakeSyncError> {
    let value = value.ok_or_else(|| malformed(kind, "missing poolId"))?;
    value
        .parse::<u64>()
        .map_err(|_| malformed(kind, format!("poolId {:?} does not fit in u64", value)))
}

fn user(kind: EventKind, value: Option<&str>) -> Result<String, StakeSyncError> {
    match value.map(str::trim) {
        Some(user) if !user.is_empty() => Ok(user.to_string()),
        _ => Err(malformed(kind, "missing user")),
    }
}

/// Convert a raw event into a store operation.
///
/// `Staked` needs a block number (it becomes the identity key's start block); unstake
/// kinds only need (user, poolId, amount). `Unstaked` must carry a valid reward, which is
/// checked but not mirrored.
pub fn normalize(event: &RawEvent) -> Result<NormalizedOperation, StakeSyncError> {
    let kind = event.kind;
    let user = user(kind, event.user.as_deref())?;
    let pool_id = pool_id(kind, event.pool_id.as_deref())?;
    let amount = canonical_uint(kind, "amount", event.amount.as_deref())?;

    let operation = match kind {
        EventKind::Staked => NormalizedOperation::Stake {
            user,
            pool_id,
            amount,
            start_block: event
                .block_number
                .ok_or_else(|| malformed(kind, "missing block number"))?,
        },
        EventKind::Unstaked => {
            canonical_uint(kind, "reward", event.reward.as_deref())?;
            NormalizedOperation::Unstake {
                user,
                pool_id,
                amount,
            }
        }
        EventKind::UnstakedEarly => NormalizedOperation::UnstakeEarly {
            user,
            pool_id,
            amount,
        },
    };

    Ok(operation)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: EventKind) -> RawEvent {
        RawEvent {
            kind,
            block_number: Some(10),
            user: Some("0xUserA".to_string()),
            pool_id: Some("1".to_string()),
            amount: Some("1000".to_string()),
            reward: None,
        }
    }

    #[test]
    fn test_normalize_staked() {
        let op = normalize(&raw(EventKind::Staked)).unwrap();
        assert_eq!(
            op,
            NormalizedOperation::Stake {
                user: "0xUserA".to_string(),
                pool_id: 1,
                amount: "1000".to_string(),
                start_block: 10,
            }
        );
        assert_eq!(op.kind(), EventKind::Staked);
        assert_eq!(op.user(), "0xUserA");
    }

    #[test]
    fn test_normalize_unstake_kinds() {
        let mut unstaked = raw(EventKind::Unstaked);
        unstaked.reward = Some("50".to_string());
        unstaked.block_number = Some(20);

        assert_eq!(
            normalize(&unstaked).unwrap(),
            NormalizedOperation::Unstake {
                user: "0xUserA".to_string(),
                pool_id: 1,
                amount: "1000".to_string(),
            }
        );
        assert!(matches!(
            normalize(&raw(EventKind::UnstakedEarly)).unwrap(),
            NormalizedOperation::UnstakeEarly { pool_id: 1, .. }
        ));
    }

    #[test]
    fn test_unstake_does_not_need_block_number() {
        let mut event = raw(EventKind::UnstakedEarly);
        event.block_number = None;
        assert!(normalize(&event).is_ok());

        let mut event = raw(EventKind::Staked);
        event.block_number = None;
        assert!(matches!(
            normalize(&event),
            Err(StakeSyncError::MalformedEvent { kind: EventKind::Staked, .. })
        ));
    }

    #[test]
    fn test_amount_is_canonicalized() {
        let mut event = raw(EventKind::Staked);
        event.amount = Some("0001000".to_string());
        match normalize(&event).unwrap() {
            NormalizedOperation::Stake { amount, .. } => assert_eq!(amount, "1000"),
            other => panic!("unexpected operation {:?}", other),
        }
    }

    #[test]
    fn test_unstaked_requires_reward() {
        let missing = raw(EventKind::Unstaked);
        assert!(matches!(
            normalize(&missing),
            Err(StakeSyncError::MalformedEvent { kind: EventKind::Unstaked, .. })
        ));

        let mut bad = raw(EventKind::Unstaked);
        bad.reward = Some("-5".to_string());
        assert!(normalize(&bad).is_err());

        // early unstakes carry no reward
        assert!(normalize(&raw(EventKind::UnstakedEarly)).is_ok());
    }

    #[test]
    fn test_malformed_events() {
        let mut missing_user = raw(EventKind::Staked);
        missing_user.user = Some("  ".to_string());
        assert!(normalize(&missing_user).is_err());

        let mut bad_amount = raw(EventKind::Unstaked);
        bad_amount.amount = Some("1.5".to_string());
        assert!(normalize(&bad_amount).is_err());

        let mut huge_pool = raw(EventKind::Staked);
        huge_pool.pool_id = Some("18446744073709551616".to_string());
        assert!(normalize(&huge_pool).is_err());

        assert!(normalize(&RawEvent::empty(EventKind::UnstakedEarly)).is_err());
    }
}
