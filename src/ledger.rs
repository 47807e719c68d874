//! Task ledger - append-only record store
//!
//! Durable ledger of task records backed by sled. Records are keyed by
//! their big-endian index so iteration order equals index order, and the
//! index is a permanent, dense, zero-based key: records are never deleted
//! or reordered.
//!
//! ## Mutation rules
//!
//! - Anyone may append a record (creation is deliberately unguarded,
//!   matching the observed contract; only completion is owner-gated).
//! - Only the owner identity fixed at ledger creation may complete a
//!   record. Completion is terminal and idempotent: re-completing an
//!   already-completed record succeeds without changing state.
//! - `content_ref` is set once at creation and never mutated.
//!
//! Every successful append emits a [`RecordCreated`] event on a broadcast
//! channel for consumers that want incremental updates.

use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Capacity of the creation event channel; lagging receivers drop
/// the oldest events and resync via a full reload.
const EVENT_CHANNEL_CAPACITY: usize = 64;

const RECORDS_TREE: &str = "records";
const META_TREE: &str = "meta";
const OWNER_KEY: &[u8] = b"owner";

/// One ledger entry: content reference + completion flag + index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRecord {
    /// Position in the append-only sequence (0-based, stable).
    pub index: u64,
    /// Opaque content-addressed reference into the content store.
    pub content_ref: String,
    /// False at creation, settable true-only by the owner.
    pub completed: bool,
    /// When the record was appended.
    pub created_at: DateTime<Utc>,
    /// Set on the first successful completion, untouched afterward.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Event emitted per successful record creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCreated {
    pub index: u64,
    pub content_ref: String,
}

/// Record store interface consumed by the sync orchestrator.
///
/// The orchestrator treats each mutating call as atomic and blocking; a
/// chain-backed implementation would surface the transport's own
/// timeouts and rejections through these same error variants.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Append a new record with `completed=false`, returning its index.
    async fn create_record(&self, content_ref: &str) -> Result<u64, LedgerError>;

    /// Set `completed=true` on the record at `index`. Owner-only.
    async fn complete_record(&self, caller: &str, index: u64) -> Result<(), LedgerError>;

    /// Fetch one record by index.
    async fn get_record(&self, index: u64) -> Result<TaskRecord, LedgerError>;

    /// Current sequence length; monotonically non-decreasing.
    async fn record_count(&self) -> Result<u64, LedgerError>;

    /// All records in index order.
    async fn list_records(&self) -> Result<Vec<TaskRecord>, LedgerError>;

    /// Subscribe to creation events.
    fn subscribe(&self) -> broadcast::Receiver<RecordCreated>;
}

/// Sled-backed task ledger.
#[derive(Debug)]
pub struct TaskLedger {
    _db: Db,
    records: sled::Tree,
    owner: String,
    /// Serializes appends and read-modify-write completion updates.
    write_lock: Mutex<()>,
    events: broadcast::Sender<RecordCreated>,
}

impl TaskLedger {
    /// Open or create a ledger at the given directory.
    ///
    /// The owner identity is fixed at creation time. Reopening an
    /// existing ledger with a different owner is a configuration error.
    pub fn open<P: AsRef<Path>>(path: P, owner: &str) -> Result<Self, LedgerError> {
        if owner.trim().is_empty() {
            return Err(LedgerError::InvalidInput("owner identity is empty".into()));
        }

        let db = sled::open(path.as_ref())?;
        let records = db.open_tree(RECORDS_TREE)?;
        let meta = db.open_tree(META_TREE)?;

        let owner = match meta.get(OWNER_KEY)? {
            Some(stored) => {
                let stored = String::from_utf8_lossy(&stored).to_string();
                if stored != owner {
                    return Err(LedgerError::Config(format!(
                        "ledger at {} is owned by {}, not {}",
                        path.as_ref().display(),
                        stored,
                        owner
                    )));
                }
                stored
            }
            None => {
                meta.insert(OWNER_KEY, owner.as_bytes())?;
                owner.to_string()
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(path = %path.as_ref().display(), owner = %owner, "Opened task ledger");

        Ok(Self {
            _db: db,
            records,
            owner,
            write_lock: Mutex::new(()),
            events,
        })
    }

    /// The owner identity fixed at ledger creation.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn record_key(index: u64) -> [u8; 8] {
        index.to_be_bytes()
    }

    /// Next free index, derived from the highest existing key.
    fn next_index(&self) -> Result<u64, LedgerError> {
        match self.records.last()? {
            Some((key, _)) => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(&key);
                Ok(u64::from_be_bytes(bytes) + 1)
            }
            None => Ok(0),
        }
    }

    fn load(&self, index: u64) -> Result<Option<TaskRecord>, LedgerError> {
        match self.records.get(Self::record_key(index))? {
            Some(value) => Ok(Some(rmp_serde::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn store(&self, record: &TaskRecord) -> Result<(), LedgerError> {
        let value = rmp_serde::to_vec(record)?;
        self.records.insert(Self::record_key(record.index), value)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl RecordStore for TaskLedger {
    async fn create_record(&self, content_ref: &str) -> Result<u64, LedgerError> {
        if content_ref.trim().is_empty() {
            return Err(LedgerError::InvalidInput("content ref is empty".into()));
        }

        let _guard = self.write_lock.lock().await;

        let index = self.next_index()?;
        let record = TaskRecord {
            index,
            content_ref: content_ref.to_string(),
            completed: false,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.store(&record)?;

        info!(index, content_ref = %content_ref, "Appended task record");

        // No receivers is fine; the event stream is best-effort.
        let _ = self.events.send(RecordCreated {
            index,
            content_ref: content_ref.to_string(),
        });

        Ok(index)
    }

    async fn complete_record(&self, caller: &str, index: u64) -> Result<(), LedgerError> {
        // Ownership is checked before range so a non-owner probe learns
        // nothing about the sequence length.
        if caller != self.owner {
            warn!(caller = %caller, index, "Rejected completion by non-owner");
            return Err(LedgerError::Unauthorized {
                caller: caller.to_string(),
            });
        }

        let _guard = self.write_lock.lock().await;

        let mut record = match self.load(index)? {
            Some(record) => record,
            None => {
                return Err(LedgerError::OutOfRange {
                    index,
                    count: self.next_index()?,
                })
            }
        };

        if record.completed {
            debug!(index, "Record already completed, no-op");
            return Ok(());
        }

        record.completed = true;
        record.completed_at = Some(Utc::now());
        self.store(&record)?;

        info!(index, "Completed task record");
        Ok(())
    }

    async fn get_record(&self, index: u64) -> Result<TaskRecord, LedgerError> {
        match self.load(index)? {
            Some(record) => Ok(record),
            None => Err(LedgerError::OutOfRange {
                index,
                count: self.next_index()?,
            }),
        }
    }

    async fn record_count(&self) -> Result<u64, LedgerError> {
        self.next_index()
    }

    async fn list_records(&self) -> Result<Vec<TaskRecord>, LedgerError> {
        let mut records = Vec::new();
        for entry in self.records.iter() {
            let (_, value) = entry?;
            records.push(rmp_serde::from_slice(&value)?);
        }
        Ok(records)
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordCreated> {
        self.events.subscribe()
    }
}
