//! Fakes for exercising the sync engine without a node or a real store.

use crate::chain::{ChainError, EventKind, EventSource, EventStream, RawEvent};
use crate::stake::sync::repositories::StakeStore;
use crate::stake::{StakeMatch, StakeRecord, StakeStatus, StoreError};
use crate::utils::RetryConfig;

use futures::channel::mpsc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Retry budget small enough for tests
pub fn fast_retry() -> RetryConfig {
	RetryConfig {
		initial_interval: Duration::from_millis(1),
		max_interval: Duration::from_millis(5),
		max_elapsed_time: Duration::from_millis(200),
	}
}

fn raw(kind: EventKind, user: &str, pool_id: u64, amount: &str, block: u64) -> RawEvent {
	RawEvent {
		kind,
		block_number: Some(block),
		user: Some(user.to_string()),
		pool_id: Some(pool_id.to_string()),
		amount: Some(amount.to_string()),
		reward: None,
	}
}

pub fn staked(user: &str, pool_id: u64, amount: &str, block: u64) -> RawEvent {
	raw(EventKind::Staked, user, pool_id, amount, block)
}

pub fn unstaked(user: &str, pool_id: u64, amount: &str, block: u64) -> RawEvent {
	let mut event = raw(EventKind::Unstaked, user, pool_id, amount, block);
	event.reward = Some("50".to_string());
	event
}

pub fn unstaked_early(user: &str, pool_id: u64, amount: &str, block: u64) -> RawEvent {
	raw(EventKind::UnstakedEarly, user, pool_id, amount, block)
}

type LiveItem = Result<RawEvent, ChainError>;

/// Event source backed by a fixed list of historical events and in-process live channels.
///
/// Live events can be pushed before or after `subscribe` is called; they are buffered.
pub struct ScriptedSource {
	height: Mutex<u64>,
	height_on_subscribe: Mutex<Option<u64>>,
	events: Mutex<Vec<RawEvent>>,
	queries: Mutex<Vec<(EventKind, u64, u64)>>,
	failures_left: AtomicUsize,
	fail_from: Mutex<Option<u64>>,
	live_senders: Mutex<HashMap<EventKind, mpsc::UnboundedSender<LiveItem>>>,
	live_receivers: Mutex<HashMap<EventKind, mpsc::UnboundedReceiver<LiveItem>>>,
}

impl ScriptedSource {
	pub fn new(height: u64) -> Self {
		let mut live_senders = HashMap::new();
		let mut live_receivers = HashMap::new();
		for kind in EventKind::ALL {
			let (tx, rx) = mpsc::unbounded();
			live_senders.insert(kind, tx);
			live_receivers.insert(kind, rx);
		}

		Self {
			height: Mutex::new(height),
			height_on_subscribe: Mutex::new(None),
			events: Mutex::new(Vec::new()),
			queries: Mutex::new(Vec::new()),
			failures_left: AtomicUsize::new(0),
			fail_from: Mutex::new(None),
			live_senders: Mutex::new(live_senders),
			live_receivers: Mutex::new(live_receivers),
		}
	}

	/// Add a historical event, returned by range queries covering its block.
	pub fn add_event(&self, event: RawEvent) {
		self.events.lock().unwrap().push(event);
	}

	/// Chain height reported once the first subscription is opened.
	pub fn set_height_on_subscribe(&self, height: u64) {
		*self.height_on_subscribe.lock().unwrap() = Some(height);
	}

	/// Fail the next `count` range queries.
	pub fn fail_next_queries(&self, count: usize) {
		self.failures_left.store(count, Ordering::SeqCst);
	}

	/// Fail every range query starting at or after `block`.
	pub fn fail_queries_from(&self, block: u64) {
		*self.fail_from.lock().unwrap() = Some(block);
	}

	pub fn push_live(&self, kind: EventKind, item: LiveItem) {
		if let Some(tx) = self.live_senders.lock().unwrap().get(&kind) {
			let _ = tx.unbounded_send(item);
		}
	}

	/// End the live stream for `kind`, as a node disconnect would.
	pub fn close_live(&self, kind: EventKind) {
		self.live_senders.lock().unwrap().remove(&kind);
	}

	/// Successful and failed range queries for `kind`, in call order.
	pub fn queried_ranges(&self, kind: EventKind) -> Vec<(u64, u64)> {
		self.queries
			.lock()
			.unwrap()
			.iter()
			.filter(|(k, _, _)| *k == kind)
			.map(|(_, from, to)| (*from, *to))
			.collect()
	}
}

#[async_trait::async_trait]
impl EventSource for ScriptedSource {
	async fn query_range(
		&self,
		kind: EventKind,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawEvent>, ChainError> {
		self.queries
			.lock()
			.unwrap()
			.push((kind, from_block, to_block));

		let failing = self.fail_from.lock().unwrap().is_some_and(|b| from_block >= b);
		let transient = self
			.failures_left
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if failing || transient {
			return Err(ChainError::InvalidResponse("scripted failure".to_string()));
		}

		Ok(self
			.events
			.lock()
			.unwrap()
			.iter()
			.filter(|e| {
				e.kind == kind
					&& e.block_number
						.is_some_and(|b| b >= from_block && b <= to_block)
			})
			.cloned()
			.collect())
	}

	async fn subscribe(&self, kind: EventKind) -> Result<EventStream, ChainError> {
		if let Some(height) = self.height_on_subscribe.lock().unwrap().take() {
			*self.height.lock().unwrap() = height;
		}

		let receiver = self
			.live_receivers
			.lock()
			.unwrap()
			.remove(&kind)
			.ok_or_else(|| ChainError::SubscriptionError(format!("{} already subscribed", kind)))?;
		Ok(Box::pin(receiver))
	}

	async fn current_height(&self) -> Result<u64, ChainError> {
		Ok(*self.height.lock().unwrap())
	}
}

/// Store wrapper failing the first `failures` writes and counting write attempts.
pub struct FlakyStore {
	inner: Arc<dyn StakeStore>,
	failures_left: AtomicUsize,
	writes: AtomicUsize,
}

impl FlakyStore {
	pub fn new(inner: Arc<dyn StakeStore>, failures: usize) -> Self {
		Self {
			inner,
			failures_left: AtomicUsize::new(failures),
			writes: AtomicUsize::new(0),
		}
	}

	pub fn failures_left(&self) -> usize {
		self.failures_left.load(Ordering::SeqCst)
	}

	/// Successful writes passed through to the inner store.
	pub fn writes(&self) -> usize {
		self.writes.load(Ordering::SeqCst)
	}

	fn check(&self) -> Result<(), StoreError> {
		match self
			.failures_left
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
		{
			Ok(_) => Err(StoreError::IoError(std::io::Error::other("scripted failure"))),
			Err(_) => Ok(()),
		}
	}
}

#[async_trait::async_trait]
impl StakeStore for FlakyStore {
	async fn upsert(&self, record: StakeRecord) -> Result<bool, StoreError> {
		self.check()?;
		let written = self.inner.upsert(record).await?;
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(written)
	}

	async fn conditional_update(
		&self,
		matching: &StakeMatch,
		new_status: StakeStatus,
	) -> Result<u64, StoreError> {
		self.check()?;
		let matched = self.inner.conditional_update(matching, new_status).await?;
		self.writes.fetch_add(1, Ordering::SeqCst);
		Ok(matched)
	}

	async fn query_by_status(&self, status: StakeStatus) -> Result<Vec<StakeRecord>, StoreError> {
		self.inner.query_by_status(status).await
	}
}
