//! Service configuration read from environment variables.

use crate::stake::sync::strategies::{DEFAULT_BATCH_SIZE, SyncConfig};
use crate::utils::RetryConfig;

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
	#[error("Missing required environment variable {0}")]
	Missing(&'static str),

	#[error("Invalid value {value:?} for {name}: {reason}")]
	Invalid {
		name: &'static str,
		value: String,
		reason: String,
	},
}

/// Settings for one run of the sync service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
	pub rpc_url: String,
	pub ws_url: String,
	pub contract_address: String,
	pub start_block: u64,
	pub batch_size: u64,
	/// JSON store file; in-memory store when unset
	pub store_path: Option<PathBuf>,
	/// Cursor persistence directory; persistence disabled when unset
	pub data_dir: Option<PathBuf>,
	pub retry_max_elapsed: Duration,
}

fn parse_u64(name: &'static str, value: String) -> Result<u64, ConfigError> {
	let parsed = value.trim().parse::<u64>();
	parsed.map_err(|e| ConfigError::Invalid {
		name,
		value,
		reason: e.to_string(),
	})
}

/// Derive the WebSocket endpoint from an HTTP one (`http` -> `ws`, `https` -> `wss`).
fn derive_ws_url(rpc_url: &str) -> String {
	if let Some(rest) = rpc_url.strip_prefix("https://") {
		format!("wss://{}", rest)
	} else if let Some(rest) = rpc_url.strip_prefix("http://") {
		format!("ws://{}", rest)
	} else {
		rpc_url.to_string()
	}
}

impl SyncSettings {
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Build settings from an arbitrary variable lookup. Empty values count as unset.
	pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
		let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

		let rpc_url = get("RPC_URL").ok_or(ConfigError::Missing("RPC_URL"))?;
		let ws_url = get("WS_URL").unwrap_or_else(|| derive_ws_url(&rpc_url));
		let contract_address =
			get("CONTRACT_ADDRESS").ok_or(ConfigError::Missing("CONTRACT_ADDRESS"))?;

		let start_block = match get("START_BLOCK") {
			Some(value) => parse_u64("START_BLOCK", value)?,
			None => 0,
		};

		let batch_size = match get("BATCH_SIZE") {
			Some(value) => parse_u64("BATCH_SIZE", value)?,
			None => DEFAULT_BATCH_SIZE,
		};
		if batch_size == 0 {
			return Err(ConfigError::Invalid {
				name: "BATCH_SIZE",
				value: "0".to_string(),
				reason: "must be greater than zero".to_string(),
			});
		}

		let retry_max_elapsed = match get("RETRY_MAX_ELAPSED_SECS") {
			Some(value) => Duration::from_secs(parse_u64("RETRY_MAX_ELAPSED_SECS", value)?),
			None => RetryConfig::default().max_elapsed_time,
		};

		Ok(Self {
			rpc_url,
			ws_url,
			contract_address,
			start_block,
			batch_size,
			store_path: get("STORE_PATH").map(PathBuf::from),
			data_dir: get("DATA_DIR").map(PathBuf::from),
			retry_max_elapsed,
		})
	}

	pub fn to_sync_config(&self) -> SyncConfig {
		SyncConfig {
			start_height: self.start_block,
			batch_size: self.batch_size,
			retry: RetryConfig {
				max_elapsed_time: self.retry_max_elapsed,
				..RetryConfig::default()
			},
		}
	}
}
