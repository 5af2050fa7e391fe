pub mod sync;
pub mod types;

pub use types::*;

use sync::repositories::StakeStore;

/// All stakes currently active, as served to readers of the store.
pub async fn active_stakes(store: &dyn StakeStore) -> Result<Vec<StakeRecord>, StoreError> {
	store.query_by_status(StakeStatus::Active).await
}
