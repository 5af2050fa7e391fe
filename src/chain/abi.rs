//! Decoding of staking contract logs.
//!
//! Logs arrive as JSON-RPC log objects (`eth_getLogs` results and `eth_subscription`
//! notifications share the same shape). Indexed arguments sit in the topics, the rest
//! in `data` as consecutive 32-byte words.

use super::types::{EventKind, RawEvent};
use alloy_primitives::{Address, B256, Bytes, U64, U256, keccak256};
use serde::Deserialize;
use tracing::{debug, warn};

/// Size of one ABI word in bytes
const WORD_LEN: usize = 32;

/// Log entry as returned by `eth_getLogs` and `logs` subscriptions.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
	/// Contract address that emitted the log
	pub address: Address,
	/// Indexed topics, topic0 being the event signature hash
	pub topics: Vec<B256>,
	/// Non-indexed arguments
	pub data: Bytes,
	/// Block number, absent for pending logs
	pub block_number: Option<U64>,
	/// Whether this log was removed due to a chain reorg
	#[serde(default)]
	pub removed: bool,
}

/// keccak256 of the event signature.
pub fn event_topic(kind: EventKind) -> B256 {
	keccak256(kind.signature())
}

fn word_to_decimal(word: &[u8]) -> Option<String> {
	U256::try_from_be_slice(word).map(|value| value.to_string())
}

/// Decode a typed log into a `RawEvent` of the given kind.
///
/// Decoding is lenient: a log for another event leaves every field `None`, missing
/// topics or data words leave their fields `None`.
pub fn decode_log(kind: EventKind, log: &RpcLog) -> RawEvent {
	let mut event = RawEvent::empty(kind);

	if log.topics.first() != Some(&event_topic(kind)) {
		debug!("Log from {} does not match {} signature", log.address, kind);
		return event;
	}

	event.block_number = log.block_number.map(|b| b.to::<u64>());
	event.user = log
		.topics
		.get(1)
		.map(|topic| Address::from_word(*topic).to_checksum(None));
	event.pool_id = log
		.topics
		.get(2)
		.map(|topic| U256::from_be_bytes(topic.0).to_string());

	let mut words = log.data.chunks_exact(WORD_LEN);
	event.amount = words.next().and_then(word_to_decimal);
	if kind == EventKind::Unstaked {
		event.reward = words.next().and_then(word_to_decimal);
	}

	event
}

/// Turn one JSON log object into an event.
///
/// Returns `None` for logs removed by a reorg. A log that does not deserialize yields an
/// empty event, so normalization reports it as malformed instead of it vanishing.
pub fn event_from_log(kind: EventKind, log: serde_json::Value) -> Option<RawEvent> {
	let log: RpcLog = match serde_json::from_value(log) {
		Ok(log) => log,
		Err(e) => {
			warn!("Undecodable {} log: {}", kind, e);
			return Some(RawEvent::empty(kind));
		}
	};

	if log.removed {
		debug!("Skipping removed {} log", kind);
		return None;
	}

	Some(decode_log(kind, &log))
}
