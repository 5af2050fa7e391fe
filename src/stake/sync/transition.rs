use crate::stake::sync::events::NormalizedOperation;
use crate::stake::sync::repositories::StakeStore;
use crate::stake::{StakeMatch, StakeRecord, StakeStatus, StakeSyncError};
use crate::utils::{RetryConfig, retry_with_max_elapsed_time};

use std::sync::Arc;
use tracing::{debug, info};

/// Result of applying one operation to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
	/// A stake record was inserted or overwritten
	Upserted,
	/// An active stake was marked unstaked
	Unstaked,
	/// No active stake matched the unstake; nothing changed
	NoMatch,
	/// The stake was already unstaked; a replayed stake leaves it closed
	AlreadyUnstaked,
}

/// Service applying normalized operations to the stake store.
///
/// Every transition is idempotent: re-applying an operation any number of times leaves
/// the store as applying it once did. Store write failures are retried per operation.
#[derive(Clone)]
pub struct StakeTransitionService {
	store: Arc<dyn StakeStore>,
	retry: RetryConfig,
}

impl StakeTransitionService {
	pub fn new(store: Arc<dyn StakeStore>, retry: RetryConfig) -> Self {
		Self { store, retry }
	}

	/// Upsert an active record at (user, pool_id, start_block).
	///
	/// A record already unstaked at that key stays unstaked, so a replayed stake seen after
	/// its unstake is a no-op.
	pub async fn apply_stake(
		&self,
		user: &str,
		pool_id: u64,
		amount: &str,
		start_block: u64,
	) -> Result<ApplyOutcome, StakeSyncError> {
		let record = StakeRecord {
			user: user.to_string(),
			pool_id,
			amount: amount.to_string(),
			start_block,
			status: StakeStatus::Active,
		};

		let store = &self.store;
		let written = retry_with_max_elapsed_time(&self.retry, "stake upsert", || {
			store.upsert(record.clone())
		})
		.await?;

		if !written {
			debug!(
				"Stake {} pool {} at block {} already unstaked, replay ignored",
				user, pool_id, start_block
			);
			return Ok(ApplyOutcome::AlreadyUnstaked);
		}

		info!("Staked: {} pool {} amount {}", user, pool_id, amount);
		Ok(ApplyOutcome::Upserted)
	}

	/// Mark the active record matching (user, pool_id, amount) as unstaked.
	///
	/// No match (already unstaked, or its stake not applied yet) is a no-op.
	pub async fn apply_unstake(
		&self,
		user: &str,
		pool_id: u64,
		amount: &str,
	) -> Result<ApplyOutcome, StakeSyncError> {
		let matching = StakeMatch {
			user: user.to_string(),
			pool_id,
			amount: amount.to_string(),
			status: StakeStatus::Active,
		};

		let store = &self.store;
		let matching = &matching;
		let matched = retry_with_max_elapsed_time(&self.retry, "unstake update", || {
			store.conditional_update(matching, StakeStatus::Unstaked)
		})
		.await?;

		if matched == 0 {
			debug!(
				"No active stake for {} pool {} amount {}, unstake is a no-op",
				user, pool_id, amount
			);
			return Ok(ApplyOutcome::NoMatch);
		}

		info!("Unstaked: {} pool {} amount {}", user, pool_id, amount);
		Ok(ApplyOutcome::Unstaked)
	}

	pub async fn apply(
		&self,
		operation: &NormalizedOperation,
	) -> Result<ApplyOutcome, StakeSyncError> {
		match operation {
			NormalizedOperation::Stake {
				user,
				pool_id,
				amount,
				start_block,
			} => self.apply_stake(user, *pool_id, amount, *start_block).await,
			NormalizedOperation::Unstake {
				user,
				pool_id,
				amount,
			}
			| NormalizedOperation::UnstakeEarly {
				user,
				pool_id,
				amount,
			} => self.apply_unstake(user, *pool_id, amount).await,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stake::active_stakes;
	use crate::stake::sync::repositories::InMemoryStakeStore;
	use crate::test_utils::{FlakyStore, fast_retry};

	fn service() -> (Arc<InMemoryStakeStore>, StakeTransitionService) {
		let store = Arc::new(InMemoryStakeStore::new());
		let service = StakeTransitionService::new(store.clone(), fast_retry());
		(store, service)
	}

	fn stake(user: &str, pool_id: u64, amount: &str, start_block: u64) -> NormalizedOperation {
		NormalizedOperation::Stake {
			user: user.to_string(),
			pool_id,
			amount: amount.to_string(),
			start_block,
		}
	}

	fn unstake(user: &str, pool_id: u64, amount: &str) -> NormalizedOperation {
		NormalizedOperation::Unstake {
			user: user.to_string(),
			pool_id,
			amount: amount.to_string(),
		}
	}

	#[tokio::test]
	async fn test_stake_twice_yields_one_record() {
		let (store, service) = service();
		let op = stake("userA", 1, "1000", 10);

		service.apply(&op).await.unwrap();
		let once = store.snapshot().await;
		service.apply(&op).await.unwrap();

		assert_eq!(store.snapshot().await, once);
		assert_eq!(once.len(), 1);
	}

	#[tokio::test]
	async fn test_unstake_twice_transitions_once() {
		let (store, service) = service();
		service.apply(&stake("userA", 1, "1000", 10)).await.unwrap();

		let early = NormalizedOperation::UnstakeEarly {
			user: "userA".to_string(),
			pool_id: 1,
			amount: "1000".to_string(),
		};
		assert_eq!(service.apply(&early).await.unwrap(), ApplyOutcome::Unstaked);
		let after_first = store.snapshot().await;
		assert_eq!(service.apply(&early).await.unwrap(), ApplyOutcome::NoMatch);

		assert_eq!(store.snapshot().await, after_first);
		assert_eq!(after_first[0].status, StakeStatus::Unstaked);
	}

	#[tokio::test]
	async fn test_out_of_order_unstake_converges_after_redelivery() {
		let (store, service) = service();

		// unstake arrives before its stake: documented no-op
		assert_eq!(
			service.apply(&unstake("u", 7, "100")).await.unwrap(),
			ApplyOutcome::NoMatch
		);
		service.apply(&stake("u", 7, "100", 5)).await.unwrap();
		// re-delivered unstake lands
		service.apply(&unstake("u", 7, "100")).await.unwrap();

		let (in_order_store, in_order) = self::service();
		in_order.apply(&stake("u", 7, "100", 5)).await.unwrap();
		in_order.apply(&unstake("u", 7, "100")).await.unwrap();

		assert_eq!(store.snapshot().await, in_order_store.snapshot().await);
		assert_eq!(store.snapshot().await[0].status, StakeStatus::Unstaked);
	}

	#[tokio::test]
	async fn test_replayed_stake_does_not_reopen_unstaked() {
		let (store, service) = service();
		service.apply(&stake("u", 1, "100", 5)).await.unwrap();
		service.apply(&unstake("u", 1, "100")).await.unwrap();

		let outcome = service.apply(&stake("u", 1, "100", 5)).await.unwrap();

		assert_eq!(outcome, ApplyOutcome::AlreadyUnstaked);
		assert!(active_stakes(store.as_ref()).await.unwrap().is_empty());
		assert_eq!(store.snapshot().await[0].status, StakeStatus::Unstaked);
	}

	#[tokio::test]
	async fn test_any_replay_order_converges() {
		// true history: stake at 5, then unstake
		let (expected_store, expected) = service();
		expected.apply(&stake("u", 1, "100", 5)).await.unwrap();
		expected.apply(&unstake("u", 1, "100")).await.unwrap();
		let expected = expected_store.snapshot().await;

		let orders: [&[usize]; 4] = [&[0, 1, 0], &[0, 1, 1, 0], &[1, 0, 1], &[0, 0, 1, 0, 1]];
		for order in orders {
			let (store, service) = service();
			for &index in order {
				let op = if index == 0 {
					stake("u", 1, "100", 5)
				} else {
					unstake("u", 1, "100")
				};
				service.apply(&op).await.unwrap();
			}
			assert_eq!(store.snapshot().await, expected, "order {:?}", order);
		}
	}

	#[tokio::test]
	async fn test_stake_then_unstake_leaves_no_active_stake() {
		let (store, service) = service();
		service.apply(&stake("userA", 1, "1000", 10)).await.unwrap();
		service.apply(&unstake("userA", 1, "1000")).await.unwrap();

		let active = active_stakes(store.as_ref()).await.unwrap();
		assert!(active.is_empty());
	}

	#[tokio::test]
	async fn test_single_stake_is_active() {
		let (store, service) = service();
		service.apply(&stake("userA", 1, "1000", 10)).await.unwrap();

		let active = active_stakes(store.as_ref()).await.unwrap();
		assert_eq!(
			serde_json::to_value(&active).unwrap(),
			serde_json::json!([{
				"user": "userA",
				"poolId": 1,
				"amount": "1000",
				"startBlock": 10,
				"status": "active"
			}])
		);
	}

	#[tokio::test]
	async fn test_unmatched_unstake_mutates_nothing() {
		let (store, service) = service();
		let outcome = service.apply(&unstake("userB", 2, "500")).await.unwrap();

		assert_eq!(outcome, ApplyOutcome::NoMatch);
		assert!(store.snapshot().await.is_empty());
	}

	#[tokio::test]
	async fn test_store_write_is_retried() {
		let inner = Arc::new(InMemoryStakeStore::new());
		let flaky = Arc::new(FlakyStore::new(inner.clone(), 2));
		let service = StakeTransitionService::new(flaky.clone(), fast_retry());

		service.apply(&stake("a", 1, "1", 1)).await.unwrap();
		assert_eq!(flaky.failures_left(), 0);
		assert_eq!(inner.snapshot().await.len(), 1);
	}

	#[tokio::test]
	async fn test_store_write_failure_surfaces_after_budget() {
		let inner = Arc::new(InMemoryStakeStore::new());
		let flaky = Arc::new(FlakyStore::new(inner.clone(), usize::MAX));
		let service = StakeTransitionService::new(flaky, fast_retry());

		let err = service.apply(&stake("a", 1, "1", 1)).await.unwrap_err();
		assert!(matches!(err, StakeSyncError::StoreWriteFailure(_)));
		assert!(inner.snapshot().await.is_empty());
	}
}
