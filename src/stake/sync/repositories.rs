use crate::stake::{StakeKey, StakeMatch, StakeRecord, StakeStatus, StakeSyncError, StoreError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Repository for stake records.
///
/// `upsert` and `conditional_update` must each be atomic per call; the sync engine does
/// not lock around them.
#[async_trait::async_trait]
pub trait StakeStore: Send + Sync {
	/// Insert or overwrite the record at `record.key()`, unless the record already there is
	/// unstaked. Returns whether anything was written.
	async fn upsert(&self, record: StakeRecord) -> Result<bool, StoreError>;

	/// Set `new_status` on the first record (lowest start block) matching `matching`.
	/// Returns the number of records updated, 0 or 1.
	async fn conditional_update(
		&self,
		matching: &StakeMatch,
		new_status: StakeStatus,
	) -> Result<u64, StoreError>;

	/// All records with the given status, ordered by identity key.
	async fn query_by_status(&self, status: StakeStatus) -> Result<Vec<StakeRecord>, StoreError>;
}

/// Repository for the backfill cursor
#[async_trait::async_trait]
pub trait CursorRepository {
	async fn save(&self, height: u64) -> Result<(), StakeSyncError>;
	async fn load(&self) -> Result<Option<u64>, StakeSyncError>;
}

/// Whether a stake may be written at its key: a closed (unstaked) record is never reopened.
fn accepts_stake(records: &BTreeMap<StakeKey, StakeRecord>, record: &StakeRecord) -> bool {
	!records
		.get(&record.key())
		.is_some_and(|existing| existing.status == StakeStatus::Unstaked)
}

/// First record in key order matching `matching`, with `new_status` applied.
fn first_match(
	records: &BTreeMap<StakeKey, StakeRecord>,
	matching: &StakeMatch,
	new_status: StakeStatus,
) -> Option<StakeRecord> {
	records
		.values()
		.find(|record| matching.matches(record))
		.map(|record| StakeRecord {
			status: new_status,
			..record.clone()
		})
}

fn select_by_status(
	records: &BTreeMap<StakeKey, StakeRecord>,
	status: StakeStatus,
) -> Vec<StakeRecord> {
	records
		.values()
		.filter(|record| record.status == status)
		.cloned()
		.collect()
}

/// In-memory implementation of StakeStore
#[derive(Default)]
pub struct InMemoryStakeStore {
	records: RwLock<BTreeMap<StakeKey, StakeRecord>>,
}

impl InMemoryStakeStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every record regardless of status.
	#[cfg(test)]
	pub async fn snapshot(&self) -> Vec<StakeRecord> {
		self.records.read().await.values().cloned().collect()
	}
}

#[async_trait::async_trait]
impl StakeStore for InMemoryStakeStore {
	async fn upsert(&self, record: StakeRecord) -> Result<bool, StoreError> {
		let mut records = self.records.write().await;
		if !accepts_stake(&records, &record) {
			return Ok(false);
		}
		records.insert(record.key(), record);
		Ok(true)
	}

	async fn conditional_update(
		&self,
		matching: &StakeMatch,
		new_status: StakeStatus,
	) -> Result<u64, StoreError> {
		let mut records = self.records.write().await;
		match first_match(&records, matching, new_status) {
			Some(updated) => {
				records.insert(updated.key(), updated);
				Ok(1)
			}
			None => Ok(0),
		}
	}

	async fn query_by_status(&self, status: StakeStatus) -> Result<Vec<StakeRecord>, StoreError> {
		Ok(select_by_status(&*self.records.read().await, status))
	}
}

/// Append handle on the store's JSON-lines journal
struct Journal {
	file: File,
	len: u64,
}

impl Journal {
	/// Append one record as a single line.
	///
	/// A failed write is truncated away so the next entry starts on a fresh line.
	async fn append(&mut self, record: &StakeRecord) -> Result<(), StoreError> {
		let mut line = serde_json::to_vec(record)?;
		line.push(b'\n');

		if let Err(e) = self.write_line(&line).await {
			if let Err(truncate) = self.file.set_len(self.len).await {
				warn!("Failed to truncate stake journal after write error: {}", truncate);
			}
			return Err(e.into());
		}

		self.len += line.len() as u64;
		Ok(())
	}

	async fn write_line(&mut self, line: &[u8]) -> std::io::Result<()> {
		self.file.write_all(line).await?;
		self.file.flush().await
	}
}

/// File-based implementation of StakeStore.
///
/// Records are held in memory and every mutation appends the new version of one record
/// to a JSON-lines journal; later lines win on load. The journal is compacted to one
/// line per record when the store is opened.
pub struct FileStakeStore {
	path: PathBuf,
	journal: Mutex<Journal>,
	records: RwLock<BTreeMap<StakeKey, StakeRecord>>,
}

impl FileStakeStore {
	/// Open the store at `path`, replaying and compacting an existing journal.
	pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
		let records = if tokio::fs::try_exists(&path).await? {
			let content = tokio::fs::read_to_string(&path).await?;
			let records = replay_journal(&content)?;
			info!("Loaded {} stake records from {:?}", records.len(), path);
			records
		} else {
			if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
				tokio::fs::create_dir_all(parent).await?;
			}
			BTreeMap::new()
		};

		compact(&path, &records).await?;

		let file = OpenOptions::new().append(true).open(&path).await?;
		let len = file.metadata().await?.len();

		Ok(Self {
			path,
			journal: Mutex::new(Journal { file, len }),
			records: RwLock::new(records),
		})
	}
}

/// Rebuild the record map from journal lines.
///
/// Only a torn final line (an interrupted append) is tolerated.
fn replay_journal(content: &str) -> Result<BTreeMap<StakeKey, StakeRecord>, StoreError> {
	let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
	let mut records = BTreeMap::new();

	for (index, line) in lines.iter().enumerate() {
		match serde_json::from_str::<StakeRecord>(line) {
			Ok(record) => {
				records.insert(record.key(), record);
			}
			Err(e) if index + 1 == lines.len() => {
				warn!("Dropping torn stake journal entry: {}", e);
			}
			Err(e) => return Err(e.into()),
		}
	}
	Ok(records)
}

/// Rewrite the journal with one line per record, replacing the file atomically.
async fn compact(path: &Path, records: &BTreeMap<StakeKey, StakeRecord>) -> Result<(), StoreError> {
	let mut content = Vec::new();
	for record in records.values() {
		serde_json::to_writer(&mut content, record)?;
		content.push(b'\n');
	}

	let tmp_path = path.with_extension("tmp");
	tokio::fs::write(&tmp_path, content).await?;
	tokio::fs::rename(&tmp_path, path).await?;
	debug!("Compacted stake journal {:?} to {} records", path, records.len());
	Ok(())
}

#[async_trait::async_trait]
impl StakeStore for FileStakeStore {
	async fn upsert(&self, record: StakeRecord) -> Result<bool, StoreError> {
		let mut journal = self.journal.lock().await;
		let accepted = accepts_stake(&*self.records.read().await, &record);
		if !accepted {
			return Ok(false);
		}

		journal.append(&record).await?;
		self.records.write().await.insert(record.key(), record);
		Ok(true)
	}

	async fn conditional_update(
		&self,
		matching: &StakeMatch,
		new_status: StakeStatus,
	) -> Result<u64, StoreError> {
		let mut journal = self.journal.lock().await;
		let updated = first_match(&*self.records.read().await, matching, new_status);
		let Some(updated) = updated else {
			return Ok(0);
		};

		journal.append(&updated).await?;
		debug!("Journaled status change in {:?}", self.path);
		self.records.write().await.insert(updated.key(), updated);
		Ok(1)
	}

	async fn query_by_status(&self, status: StakeStatus) -> Result<Vec<StakeRecord>, StoreError> {
		Ok(select_by_status(&*self.records.read().await, status))
	}
}

/// File-based implementation of CursorRepository
pub struct FileCursorRepository {
	data_dir: PathBuf,
}

impl FileCursorRepository {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	fn get_cursor_filename(&self) -> PathBuf {
		self.data_dir.join("sync_cursor.meta.json")
	}
}

#[async_trait::async_trait]
impl CursorRepository for FileCursorRepository {
	async fn save(&self, height: u64) -> Result<(), StakeSyncError> {
		let metadata = serde_json::json!({
			"sync_height": height,
			"timestamp": chrono::Utc::now().to_rfc3339(),
		});

		tokio::fs::create_dir_all(&self.data_dir).await.map_err(|e| {
			StakeSyncError::PersistenceError(format!("Failed to create data directory: {}", e))
		})?;

		let content = serde_json::to_string_pretty(&metadata).map_err(|e| {
			StakeSyncError::PersistenceError(format!("Failed to serialize cursor: {}", e))
		})?;
		let filename = self.get_cursor_filename();
		tokio::fs::write(&filename, content).await.map_err(|e| {
			StakeSyncError::PersistenceError(format!("Failed to write cursor file: {}", e))
		})?;

		debug!("Saved sync cursor to {:?} at height {}", filename, height);
		Ok(())
	}

	async fn load(&self) -> Result<Option<u64>, StakeSyncError> {
		let filename = self.get_cursor_filename();

		if !Path::new(&filename).exists() {
			return Ok(None);
		}

		let content = tokio::fs::read_to_string(&filename).await.map_err(|e| {
			StakeSyncError::PersistenceError(format!("Failed to read cursor file: {}", e))
		})?;
		let metadata: serde_json::Value = serde_json::from_str(&content).map_err(|e| {
			StakeSyncError::PersistenceError(format!("Failed to parse cursor file: {}", e))
		})?;

		let height = metadata
			.get("sync_height")
			.and_then(|h| h.as_u64())
			.ok_or_else(|| {
				StakeSyncError::PersistenceError("Cursor file has no sync_height".to_string())
			})?;

		info!("Loaded sync cursor from {:?} at height {}", filename, height);
		Ok(Some(height))
	}
}
