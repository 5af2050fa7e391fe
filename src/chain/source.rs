//! Capability interface the sync engine uses to read chain events.

use super::types::{ChainError, EventKind, RawEvent};
use std::pin::Pin;

/// Live, pull-based sequence of events for one event kind.
///
/// The stream ends when the underlying connection closes; items are `Err` on transport
/// failures.
pub type EventStream =
	Pin<Box<dyn futures_util::Stream<Item = Result<RawEvent, ChainError>> + Send>>;

/// Source of staking contract events
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
	/// All events of `kind` emitted in the closed block range `[from_block, to_block]`,
	/// in emission order.
	async fn query_range(
		&self,
		kind: EventKind,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawEvent>, ChainError>;

	/// Open a live subscription to new events of `kind`.
	async fn subscribe(&self, kind: EventKind) -> Result<EventStream, ChainError>;

	/// Latest block height known to the source.
	async fn current_height(&self) -> Result<u64, ChainError>;
}
