mod chain;
mod config;
mod stake;
mod utils;

#[cfg(test)]
mod test_utils;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chain::StakingContractClient;
use crate::config::SyncSettings;
use crate::stake::sync::StakeSyncOrchestrator;
use crate::stake::sync::repositories::{FileStakeStore, InMemoryStakeStore, StakeStore};
use crate::stake::sync::state_persistence::CursorPersistenceService;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting stake sync service");

	let settings = match SyncSettings::from_env() {
		Ok(settings) => settings,
		Err(e) => {
			error!("Invalid configuration: {}", e);
			std::process::exit(2);
		}
	};

	let client = match StakingContractClient::new(
		settings.rpc_url.clone(),
		settings.ws_url.clone(),
		settings.contract_address.clone(),
	) {
		Ok(client) => client,
		Err(e) => {
			error!("Failed to create RPC client: {}", e);
			std::process::exit(1);
		}
	};

	info!(
		"Created client for contract {} ({}, {})",
		settings.contract_address, settings.rpc_url, settings.ws_url
	);

	let store: Arc<dyn StakeStore> = match &settings.store_path {
		Some(path) => match FileStakeStore::open(path.clone()).await {
			Ok(store) => {
				info!("Using stake store at {}", path.display());
				Arc::new(store)
			}
			Err(e) => {
				error!("Failed to open stake store {}: {}", path.display(), e);
				std::process::exit(1);
			}
		},
		None => {
			warn!("STORE_PATH not set, stakes are kept in memory only");
			Arc::new(InMemoryStakeStore::new())
		}
	};

	let mut orchestrator =
		StakeSyncOrchestrator::new(Arc::new(client), store.clone(), settings.to_sync_config());
	if let Some(data_dir) = &settings.data_dir {
		orchestrator =
			orchestrator.with_persistence(CursorPersistenceService::new(data_dir.clone()));
	}

	let cancel = CancellationToken::new();
	{
		let cancel = cancel.clone();
		tokio::spawn(async move {
			if let Err(e) = tokio::signal::ctrl_c().await {
				error!("Failed to listen for shutdown signal: {}", e);
				return;
			}
			info!("Shutdown requested");
			cancel.cancel();
		});
	}

	let result = orchestrator.sync(cancel).await;

	match stake::active_stakes(store.as_ref()).await {
		Ok(active) => info!("{} active stakes in store", active.len()),
		Err(e) => warn!("Failed to read active stakes: {}", e),
	}

	match result {
		Ok(stats) => info!("Stopped cleanly: {}", stats.summary()),
		Err(e) => {
			error!("Stake sync failed: {}", e);
			std::process::exit(1);
		}
	}
}
