//! Progress tracking for stake synchronization.
//!
//! This module provides the `SyncCursor`, which records the last block height fully
//! processed by backfill, and the `SyncProgressTracker`, which wraps the cursor with
//! counters for applied operations so the engine can log progress and summarize a run.

use crate::stake::sync::transition::ApplyOutcome;
use tracing::{info, warn};

/// Number of blocks between periodic progress logs
const LOG_INTERVAL_BLOCKS: u64 = 10_000;

/// Last block height processed by backfill.
///
/// Starts at the configured height with nothing processed; only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    start_height: u64,
    last_processed: Option<u64>,
}

impl SyncCursor {
    pub fn new(start_height: u64) -> Self {
        Self {
            start_height,
            last_processed: None,
        }
    }

    /// Record that every block up to and including `height` has been applied.
    ///
    /// Returns false (and leaves the cursor alone) if `height` would move it backwards.
    pub fn advance(&mut self, height: u64) -> bool {
        match self.last_processed {
            Some(last) if height <= last => false,
            _ => {
                self.last_processed = Some(height);
                true
            }
        }
    }

    pub fn last_processed(&self) -> Option<u64> {
        self.last_processed
    }

    /// First block that still needs processing.
    pub fn next_height(&self) -> u64 {
        self.last_processed
            .map(|last| last.saturating_add(1))
            .unwrap_or(self.start_height)
    }
}

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    cursor: SyncCursor,
    batches_completed: usize,
    stakes_upserted: usize,
    unstakes_applied: usize,
    unstakes_unmatched: usize,
    stakes_already_unstaked: usize,
    malformed_skipped: usize,
    live_events: usize,
    last_logged_height: u64,
}

impl SyncProgressTracker {
    pub fn new(start_height: u64) -> Self {
        Self {
            cursor: SyncCursor::new(start_height),
            batches_completed: 0,
            stakes_upserted: 0,
            unstakes_applied: 0,
            unstakes_unmatched: 0,
            stakes_already_unstaked: 0,
            malformed_skipped: 0,
            live_events: 0,
            last_logged_height: start_height,
        }
    }

    pub fn cursor(&self) -> SyncCursor {
        self.cursor
    }

    /// Record a fully applied backfill batch ending at `to_block`
    pub fn record_batch(&mut self, to_block: u64) {
        if !self.cursor.advance(to_block) {
            warn!(
                "Ignoring cursor regression to {} (at {:?})",
                to_block,
                self.cursor.last_processed()
            );
            return;
        }
        self.batches_completed += 1;
    }

    /// Record the outcome of one applied operation
    pub fn record_outcome(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Upserted => self.stakes_upserted += 1,
            ApplyOutcome::Unstaked => self.unstakes_applied += 1,
            ApplyOutcome::NoMatch => self.unstakes_unmatched += 1,
            ApplyOutcome::AlreadyUnstaked => self.stakes_already_unstaked += 1,
        }
    }

    /// Record an event dropped because it could not be normalized
    pub fn record_malformed(&mut self) {
        self.malformed_skipped += 1;
    }

    /// Record an event received from a live subscription
    pub fn record_live_event(&mut self) {
        self.live_events += 1;
    }

    /// Log progress every `LOG_INTERVAL_BLOCKS` blocks or when forced
    pub fn log_progress(&mut self, force: bool) {
        let Some(height) = self.cursor.last_processed() else {
            return;
        };
        let blocks_since_last_log = height.saturating_sub(self.last_logged_height);
        if force || blocks_since_last_log >= LOG_INTERVAL_BLOCKS {
            info!(
                "Sync progress: {} stakes, {} unstakes ({} unmatched) up to block {}",
                self.stakes_upserted, self.unstakes_applied, self.unstakes_unmatched, height
            );
            self.last_logged_height = height;
        }
    }

    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_height: self.cursor.start_height,
            last_processed: self.cursor.last_processed(),
            batches_completed: self.batches_completed,
            stakes_upserted: self.stakes_upserted,
            unstakes_applied: self.unstakes_applied,
            unstakes_unmatched: self.unstakes_unmatched,
            stakes_already_unstaked: self.stakes_already_unstaked,
            malformed_skipped: self.malformed_skipped,
            live_events: self.live_events,
        }
    }
}

/// Statistics about the sync progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub start_height: u64,
    pub last_processed: Option<u64>,
    pub batches_completed: usize,
    pub stakes_upserted: usize,
    pub unstakes_applied: usize,
    pub unstakes_unmatched: usize,
    /// Replayed stakes ignored because their record was already unstaked
    pub stakes_already_unstaked: usize,
    pub malformed_skipped: usize,
    pub live_events: usize,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "Sync from {} to {}: {} batches, {} stakes, {} unstakes, {} unmatched unstakes, {} replayed stakes ignored, {} live events{}",
            self.start_height,
            self.last_processed
                .map(|h| h.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.batches_completed,
            self.stakes_upserted,
            self.unstakes_applied,
            self.unstakes_unmatched,
            self.stakes_already_unstaked,
            self.live_events,
            if self.malformed_skipped == 0 {
                String::new()
            } else {
                format!(" ({} malformed skipped)", self.malformed_skipped)
            }
        )
    }
}
