use crate::chain::{ChainError, EventKind, EventSource, EventStream, RawEvent};
use crate::stake::StakeSyncError;
use crate::stake::sync::events::normalize;
use crate::stake::sync::progress_tracker::SyncProgressTracker;
use crate::stake::sync::state_persistence::CursorPersistenceService;
use crate::stake::sync::transition::StakeTransitionService;
use crate::utils::{RetryConfig, retry_with_max_elapsed_time};

use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default number of blocks queried per backfill batch
pub const DEFAULT_BATCH_SIZE: u64 = 1000;

/// Configuration for the sync phases
#[derive(Debug, Clone)]
pub struct SyncConfig {
	/// First block to backfill
	pub start_height: u64,
	/// Blocks per historical query, must be non-zero
	pub batch_size: u64,
	/// Backoff for source queries and store writes
	pub retry: RetryConfig,
}

/// Split the closed range `[from, to]` into consecutive batches of at most `batch_size`
/// blocks.
pub fn batch_ranges(from: u64, to: u64, batch_size: u64) -> Vec<(u64, u64)> {
	let batch_size = batch_size.max(1);
	let mut ranges = Vec::new();
	let mut start = from;
	while start <= to {
		let end = start.saturating_add(batch_size - 1).min(to);
		ranges.push((start, end));
		if end == u64::MAX {
			break;
		}
		start = end + 1;
	}
	ranges
}

/// Apply raw events in order, skipping malformed ones.
async fn apply_events(
	transitions: &StakeTransitionService,
	tracker: &mut SyncProgressTracker,
	events: &[RawEvent],
) -> Result<(), StakeSyncError> {
	for event in events {
		match normalize(event) {
			Ok(operation) => {
				debug!("Applying {} for {}", operation.kind(), operation.user());
				let outcome = transitions.apply(&operation).await?;
				tracker.record_outcome(outcome);
			}
			Err(e) => {
				warn!("Skipping event at block {:?}: {}", event.block_number, e);
				tracker.record_malformed();
			}
		}
	}
	Ok(())
}

/// Historical replay of contract events in fixed-size block batches
pub struct BackfillSync {
	source: Arc<dyn EventSource>,
	transitions: StakeTransitionService,
	persistence: Option<Arc<CursorPersistenceService>>,
	config: SyncConfig,
}

impl BackfillSync {
	pub fn new(
		source: Arc<dyn EventSource>,
		transitions: StakeTransitionService,
		persistence: Option<Arc<CursorPersistenceService>>,
		config: SyncConfig,
	) -> Self {
		Self {
			source,
			transitions,
			persistence,
			config,
		}
	}

	/// Process every block from the tracker's cursor up to `target_height`.
	///
	/// Batches run one after another; the cursor moves to a batch's last block only once
	/// all of its events are applied. Cancellation is honoured between batches.
	pub async fn sync(
		&self,
		target_height: u64,
		progress_tracker: &mut SyncProgressTracker,
		cancel: &CancellationToken,
	) -> Result<(), StakeSyncError> {
		let from = progress_tracker.cursor().next_height();
		if from > target_height {
			info!(
				"Nothing to backfill (next block {} > chain height {})",
				from, target_height
			);
			return Ok(());
		}

		info!("Syncing events from block {} to {}", from, target_height);

		for (from_block, to_block) in batch_ranges(from, target_height, self.config.batch_size) {
			if cancel.is_cancelled() {
				info!("Backfill cancelled before block {}", from_block);
				return Ok(());
			}

			self.sync_batch(from_block, to_block, progress_tracker).await?;
			progress_tracker.record_batch(to_block);

			if let Some(persistence) = &self.persistence {
				if let Err(e) = persistence.save_cursor(to_block).await {
					warn!("Failed to persist cursor at {}: {}", to_block, e);
				}
			}

			info!("Synced blocks {} to {}", from_block, to_block);
			progress_tracker.log_progress(false);
		}

		Ok(())
	}

	async fn sync_batch(
		&self,
		from_block: u64,
		to_block: u64,
		progress_tracker: &mut SyncProgressTracker,
	) -> Result<(), StakeSyncError> {
		let mut batch = Vec::with_capacity(EventKind::ALL.len());
		for kind in EventKind::ALL {
			let events = self.query(kind, from_block, to_block).await?;
			batch.push(events);
		}

		for events in &batch {
			apply_events(&self.transitions, progress_tracker, events).await?;
		}
		Ok(())
	}

	async fn query(
		&self,
		kind: EventKind,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawEvent>, StakeSyncError> {
		let source = &self.source;
		retry_with_max_elapsed_time(&self.config.retry, "range query", || {
			source.query_range(kind, from_block, to_block)
		})
		.await
		.map_err(|source| StakeSyncError::SourceQueryFailure {
			kind,
			from_block,
			to_block,
			source,
		})
	}
}

/// Live application of events from one subscription per event kind
#[derive(Clone)]
pub struct LiveSync {
	transitions: StakeTransitionService,
	progress_tracker: Arc<Mutex<SyncProgressTracker>>,
}

impl LiveSync {
	pub fn new(
		transitions: StakeTransitionService,
		progress_tracker: Arc<Mutex<SyncProgressTracker>>,
	) -> Self {
		Self {
			transitions,
			progress_tracker,
		}
	}

	/// Drain one subscription, applying each event as it arrives.
	///
	/// Returns `Ok` only on cancellation. The stream ending or failing is a
	/// `SourceSubscriptionFailure`. An event being applied when cancellation arrives is
	/// finished first.
	pub async fn sync(
		&self,
		kind: EventKind,
		mut stream: EventStream,
		cancel: CancellationToken,
	) -> Result<(), StakeSyncError> {
		info!("Listening for live {} events", kind);

		loop {
			let next = tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					info!("{} subscription cancelled", kind);
					return Ok(());
				}
				next = stream.next() => next,
			};

			match next {
				Some(Ok(event)) => {
					debug!("Processing live {} event at block {:?}", kind, event.block_number);
					let outcome = match normalize(&event) {
						Ok(operation) => Some(self.transitions.apply(&operation).await?),
						Err(e) => {
							warn!("Skipping live event at block {:?}: {}", event.block_number, e);
							None
						}
					};

					let mut tracker = self.progress_tracker.lock().await;
					tracker.record_live_event();
					match outcome {
						Some(outcome) => tracker.record_outcome(outcome),
						None => tracker.record_malformed(),
					}
				}
				Some(Err(ChainError::JsonError(e))) => {
					warn!("Skipping undecodable {} notification: {}", kind, e);
					self.progress_tracker.lock().await.record_malformed();
				}
				Some(Err(e)) => {
					return Err(StakeSyncError::SourceSubscriptionFailure {
						kind,
						reason: e.to_string(),
					});
				}
				None => {
					return Err(StakeSyncError::SourceSubscriptionFailure {
						kind,
						reason: "stream ended".to_string(),
					});
				}
			}
		}
	}
}
