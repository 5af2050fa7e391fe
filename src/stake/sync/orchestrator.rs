//! Stake sync orchestrator and integration point for all sync services.
//!
//! This module defines the `StakeSyncOrchestrator`, the sync engine. It owns the event
//! source and the stake store (both injected as trait objects), and drives the two
//! phases of synchronization:
//!
//! - Backfill: replay `[start, chain height]` in fixed-size batches (`BackfillSync`)
//! - Live: one subscription per event kind, applied as events arrive (`LiveSync`)
//!
//! Subscriptions are opened before a catch-up backfill up to the height observed after
//! subscribing, so events emitted while switching phases are covered by one or the other
//! (idempotent apply absorbs the overlap).

use crate::chain::{EventKind, EventSource, EventStream};
use crate::stake::StakeSyncError;
use crate::stake::sync::{
    progress_tracker::{SyncProgressTracker, SyncStats},
    repositories::StakeStore,
    state_persistence::CursorPersistenceService,
    strategies::{BackfillSync, LiveSync, SyncConfig},
    transition::StakeTransitionService,
};
use crate::utils::retry_with_max_elapsed_time;

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Main stake sync orchestrator that coordinates all sync components.
pub struct StakeSyncOrchestrator {
    source: Arc<dyn EventSource>,
    transitions: StakeTransitionService,
    persistence: Option<Arc<CursorPersistenceService>>,
    config: SyncConfig,
}

impl StakeSyncOrchestrator {
    pub fn new(
        source: Arc<dyn EventSource>,
        store: Arc<dyn StakeStore>,
        config: SyncConfig,
    ) -> Self {
        let transitions = StakeTransitionService::new(store, config.retry.clone());
        Self {
            source,
            transitions,
            persistence: None,
            config,
        }
    }

    /// Persist the backfill cursor and resume from it on the next start.
    pub fn with_persistence(mut self, persistence: CursorPersistenceService) -> Self {
        self.persistence = Some(Arc::new(persistence));
        self
    }

    async fn current_height(&self) -> Result<u64, StakeSyncError> {
        let source = &self.source;
        retry_with_max_elapsed_time(&self.config.retry, "height query", || {
            source.current_height()
        })
        .await
        .map_err(StakeSyncError::HeightQueryFailure)
    }

    async fn start_height(&self) -> Result<u64, StakeSyncError> {
        match &self.persistence {
            Some(persistence) => persistence.resume_height(self.config.start_height).await,
            None => Ok(self.config.start_height),
        }
    }

    async fn open_subscriptions(&self) -> Result<Vec<(EventKind, EventStream)>, StakeSyncError> {
        let mut streams = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let stream = self.source.subscribe(kind).await.map_err(|e| {
                StakeSyncError::SourceSubscriptionFailure {
                    kind,
                    reason: e.to_string(),
                }
            })?;
            streams.push((kind, stream));
        }
        Ok(streams)
    }

    /// Run the engine until cancelled or until a live subscription fails.
    ///
    /// Returns the final statistics on cancellation; any unrecoverable failure
    /// (exhausted query/write retries, subscription loss) is returned as an error.
    pub async fn sync(&self, cancel: CancellationToken) -> Result<SyncStats, StakeSyncError> {
        let start_height = self.start_height().await?;
        let mut progress_tracker = SyncProgressTracker::new(start_height);

        let backfill = BackfillSync::new(
            self.source.clone(),
            self.transitions.clone(),
            self.persistence.clone(),
            self.config.clone(),
        );

        let chain_height = self.current_height().await?;
        backfill
            .sync(chain_height, &mut progress_tracker, &cancel)
            .await?;

        if cancel.is_cancelled() {
            return Ok(Self::finish(progress_tracker));
        }

        let streams = self.open_subscriptions().await?;

        let chain_height = self.current_height().await?;
        backfill
            .sync(chain_height, &mut progress_tracker, &cancel)
            .await?;
        progress_tracker.log_progress(true);
        info!("Backfill complete: {}", progress_tracker.get_stats().summary());

        if cancel.is_cancelled() {
            return Ok(Self::finish(progress_tracker));
        }

        let progress_tracker = Arc::new(Mutex::new(progress_tracker));
        let live = LiveSync::new(self.transitions.clone(), progress_tracker.clone());
        let result = Self::run_live(live, streams, cancel.child_token()).await;

        let stats = progress_tracker.lock().await.get_stats();
        info!("{}", stats.summary());
        result.map(|_| stats)
    }

    /// Drive all subscriptions concurrently; the first failure stops the others.
    async fn run_live(
        live: LiveSync,
        streams: Vec<(EventKind, EventStream)>,
        cancel: CancellationToken,
    ) -> Result<(), StakeSyncError> {
        let mut tasks = JoinSet::new();
        for (kind, stream) in streams {
            let live = live.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move { live.sync(kind, stream, cancel).await });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(StakeSyncError::TaskFailure(e.to_string())));
            if let Err(e) = result {
                error!("Live sync stopped: {}", e);
                cancel.cancel();
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn finish(progress_tracker: SyncProgressTracker) -> SyncStats {
        let stats = progress_tracker.get_stats();
        info!("Sync stopped: {}", stats.summary());
        stats
    }
}
