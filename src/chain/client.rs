//!
//! JSON-RPC client for the staking contract.
//!
//! Historical queries go over HTTP (`eth_blockNumber`, `eth_getLogs`); live events come
//! from `eth_subscribe("logs")` over WebSocket, one connection per event kind. All
//! methods are async and designed for use with Tokio.

use super::abi::{event_from_log, event_topic};
use super::source::{EventSource, EventStream};
use super::types::*;
use alloy_primitives::{Address, U64};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, error, info};

/// JSON-RPC client bound to a single staking contract
pub struct StakingContractClient {
	/// The underlying HTTP client for JSON-RPC calls.
	http_client: Client,
	/// HTTP JSON-RPC endpoint.
	rpc_url: String,
	/// WebSocket JSON-RPC endpoint for subscriptions.
	ws_url: String,
	/// Address of the staking contract.
	contract_address: Address,
	/// Monotonic JSON-RPC request id.
	next_id: AtomicU64,
}

impl StakingContractClient {
	/// Create a new contract client.
	///
	/// # Arguments
	/// * `rpc_url` - The HTTP endpoint for JSON-RPC calls.
	/// * `ws_url` - The WebSocket endpoint for subscriptions.
	/// * `contract_address` - The staking contract to filter logs on.
	pub fn new(
		rpc_url: String,
		ws_url: String,
		contract_address: String,
	) -> Result<Self, ChainError> {
		let contract_address = contract_address
			.parse::<Address>()
			.map_err(|e| ChainError::InvalidAddress(format!("{}: {}", contract_address, e)))?;
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			rpc_url,
			ws_url,
			contract_address,
			next_id: AtomicU64::new(1),
		})
	}

	fn log_filter(&self, kind: EventKind) -> serde_json::Value {
		json!({
			"address": self.contract_address,
			"topics": [event_topic(kind)],
		})
	}

	/// Execute a JSON-RPC call over HTTP and return its `result`.
	pub async fn call(
		&self,
		method: &str,
		params: serde_json::Value,
	) -> Result<serde_json::Value, ChainError> {
		let request_body = json!({
			"jsonrpc": "2.0",
			"id": self.next_id.fetch_add(1, Ordering::Relaxed),
			"method": method,
			"params": params,
		});

		let response = self
			.http_client
			.post(&self.rpc_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(ChainError::InvalidResponse(format!(
				"HTTP status {} for {}",
				response.status(),
				method
			)));
		}

		let response_json: serde_json::Value = response.json().await?;
		extract_result(response_json)
	}
}

/// Pull `result` out of a JSON-RPC response, mapping `error` objects.
fn extract_result(mut response: serde_json::Value) -> Result<serde_json::Value, ChainError> {
	if let Some(err) = response.get("error") {
		return Err(ChainError::RpcError {
			code: err.get("code").and_then(|c| c.as_i64()).unwrap_or_default(),
			message: err
				.get("message")
				.and_then(|m| m.as_str())
				.unwrap_or("Unknown JSON-RPC error")
				.to_string(),
		});
	}

	response
		.get_mut("result")
		.map(serde_json::Value::take)
		.ok_or(ChainError::NoData)
}

/// Interpret one WebSocket text frame of a log subscription.
///
/// Returns `None` for frames that carry no event (other notifications, removed logs).
fn parse_subscription_message(
	kind: EventKind,
	subscription_id: &str,
	text: &str,
) -> Option<Result<RawEvent, ChainError>> {
	let parsed: serde_json::Value = match serde_json::from_str(text) {
		Ok(parsed) => parsed,
		Err(e) => return Some(Err(ChainError::JsonError(e))),
	};

	if let Some(err) = parsed.get("error") {
		let message = err
			.get("message")
			.and_then(|m| m.as_str())
			.unwrap_or("Unknown subscription error");
		return Some(Err(ChainError::SubscriptionError(message.to_string())));
	}

	if parsed.get("method").and_then(|m| m.as_str()) != Some("eth_subscription") {
		debug!("Ignoring non-notification message on {} subscription", kind);
		return None;
	}

	let params = parsed.get("params")?;
	if params.get("subscription").and_then(|s| s.as_str()) != Some(subscription_id) {
		debug!("Ignoring notification for another subscription");
		return None;
	}

	let log = params.get("result")?.clone();
	event_from_log(kind, log).map(Ok)
}

/// Convert an `eth_getLogs` result into events, dropping logs removed by a reorg.
fn decode_logs(kind: EventKind, result: serde_json::Value) -> Result<Vec<RawEvent>, ChainError> {
	let logs: Vec<serde_json::Value> = serde_json::from_value(result)?;
	Ok(logs
		.into_iter()
		.filter_map(|log| event_from_log(kind, log))
		.collect())
}

/// Interpret one frame received while waiting for the `eth_subscribe` reply.
///
/// Returns the subscription id once the reply to `request_id` arrives, `None` for frames
/// to skip.
fn handshake_reply(request_id: u64, message: Message) -> Result<Option<String>, ChainError> {
	match message {
		Message::Text(text) => {
			let parsed: serde_json::Value = serde_json::from_str(&text)?;
			if parsed.get("id").and_then(|id| id.as_u64()) != Some(request_id) {
				return Ok(None);
			}
			let result = extract_result(parsed)?;
			result
				.as_str()
				.map(|id| Some(id.to_string()))
				.ok_or_else(|| ChainError::SubscriptionError("Subscription id is not a string".to_string()))
		}
		Message::Ping(_) | Message::Pong(_) => Ok(None),
		_ => Err(ChainError::SubscriptionError(
			"Unexpected message type during handshake".to_string(),
		)),
	}
}

#[async_trait::async_trait]
impl EventSource for StakingContractClient {
	async fn query_range(
		&self,
		kind: EventKind,
		from_block: u64,
		to_block: u64,
	) -> Result<Vec<RawEvent>, ChainError> {
		let mut filter = self.log_filter(kind);
		filter["fromBlock"] = json!(U64::from(from_block));
		filter["toBlock"] = json!(U64::from(to_block));

		let result = self.call("eth_getLogs", json!([filter])).await?;
		let events = decode_logs(kind, result)?;

		debug!(
			"Fetched {} {} logs in blocks {}-{}",
			events.len(),
			kind,
			from_block,
			to_block
		);
		Ok(events)
	}

	async fn subscribe(&self, kind: EventKind) -> Result<EventStream, ChainError> {
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		let request = self.ws_url.clone().into_client_request()?;
		let (ws_stream, response) = connect_async(request).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let subscribe_message = json!({
			"jsonrpc": "2.0",
			"id": request_id,
			"method": "eth_subscribe",
			"params": ["logs", self.log_filter(kind)],
		});
		ws_sender
			.send(Message::Text(subscribe_message.to_string()))
			.await?;

		// Wait for the subscription id
		let subscription_id = loop {
			let Some(msg) = ws_receiver.next().await else {
				return Err(ChainError::SubscriptionError(
					"Connection closed before subscription was acknowledged".to_string(),
				));
			};
			if let Some(id) = handshake_reply(request_id, msg?)? {
				break id;
			}
		};

		info!("Subscribed to {} logs with id {}", kind, subscription_id);

		let stream = ws_receiver.filter_map(move |msg| {
			let subscription_id = subscription_id.clone();
			async move {
				match msg {
					Ok(Message::Text(text)) => parse_subscription_message(kind, &subscription_id, &text),
					Ok(Message::Close(frame)) => {
						info!("{} subscription closed by node: {:?}", kind, frame);
						None
					}
					Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => None,
					Ok(Message::Binary(_)) => Some(Err(ChainError::SubscriptionError(
						"Unexpected binary message".to_string(),
					))),
					Err(e) => {
						error!("WebSocket error on {} subscription: {}", kind, e);
						Some(Err(ChainError::WebSocketError(e)))
					}
				}
			}
		});

		Ok(Box::pin(stream))
	}

	async fn current_height(&self) -> Result<u64, ChainError> {
		let result = self.call("eth_blockNumber", json!([])).await?;
		let height: U64 = serde_json::from_value(result)?;
		Ok(height.to::<u64>())
	}
}
