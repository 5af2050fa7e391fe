//! Cursor persistence for stake synchronization.
//!
//! Resuming from a saved cursor is an optimization only: apply is idempotent, so losing
//! the cursor just means re-syncing from the configured start height.

use crate::stake::StakeSyncError;
use crate::stake::sync::repositories::{CursorRepository, FileCursorRepository};

use std::path::PathBuf;
use tracing::info;

/// Service for saving and restoring the backfill cursor.
pub struct CursorPersistenceService {
    cursor_repo: Box<dyn CursorRepository + Send + Sync>,
}

impl CursorPersistenceService {
    /// Create a file-backed persistence service in the given data directory.
    pub fn new(data_dir: PathBuf) -> Self {
        Self::with_repository(Box::new(FileCursorRepository::new(data_dir)))
    }

    pub fn with_repository(cursor_repo: Box<dyn CursorRepository + Send + Sync>) -> Self {
        Self { cursor_repo }
    }

    /// Save the last fully processed block height.
    pub async fn save_cursor(&self, height: u64) -> Result<(), StakeSyncError> {
        self.cursor_repo.save(height).await
    }

    /// Height to resume backfill from: the block after the saved cursor, but never
    /// earlier than the configured start.
    pub async fn resume_height(&self, configured_start: u64) -> Result<u64, StakeSyncError> {
        match self.cursor_repo.load().await? {
            Some(saved) => {
                let resume = configured_start.max(saved.saturating_add(1));
                info!(
                    "Restored sync cursor at height {}, resuming from {}",
                    saved, resume
                );
                Ok(resume)
            }
            None => {
                info!("No saved cursor found, starting from block {}", configured_start);
                Ok(configured_start)
            }
        }
    }
}
