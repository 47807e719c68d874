//! Integration tests for the publish-then-record workflow
//!
//! Exercises the orchestrator against the real sled-backed ledger and the
//! in-memory content store, plus counting/failing stubs to pin down which
//! collaborators are touched on each failure path.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use todo_ledger::{
    ContentStore, LedgerError, MemoryContentStore, RecordCreated, RecordStore, SyncOrchestrator,
    TaskContent, TaskLedger, TaskRecord, TaskText,
};
use tokio::sync::broadcast;

const OWNER: &str = "agent-owner";

/// Helper to build an orchestrator over a temp-dir ledger.
fn orchestrator_with_memory_store() -> (SyncOrchestrator, Arc<TaskLedger>, Arc<MemoryContentStore>, TempDir) {
    let temp = TempDir::new().unwrap();
    let ledger = Arc::new(TaskLedger::open(temp.path().join("ledger.sled"), OWNER).unwrap());
    let content = Arc::new(MemoryContentStore::new());
    let orchestrator = SyncOrchestrator::new(ledger.clone(), content.clone(), OWNER);
    (orchestrator, ledger, content, temp)
}

/// Record store stub that counts creations and delegates nothing.
struct CountingRecordStore {
    creations: AtomicU64,
    events: broadcast::Sender<RecordCreated>,
}

impl CountingRecordStore {
    fn new() -> Self {
        let (events, _) = broadcast::channel(8);
        Self {
            creations: AtomicU64::new(0),
            events,
        }
    }

    fn creation_count(&self) -> u64 {
        self.creations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for CountingRecordStore {
    async fn create_record(&self, _content_ref: &str) -> Result<u64, LedgerError> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        Ok(0)
    }

    async fn complete_record(&self, _caller: &str, _index: u64) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn get_record(&self, index: u64) -> Result<TaskRecord, LedgerError> {
        Err(LedgerError::OutOfRange { index, count: 0 })
    }

    async fn record_count(&self) -> Result<u64, LedgerError> {
        Ok(self.creations.load(Ordering::SeqCst))
    }

    async fn list_records(&self) -> Result<Vec<TaskRecord>, LedgerError> {
        Ok(Vec::new())
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordCreated> {
        self.events.subscribe()
    }
}

/// Record store stub whose appends always fail, like a rejected wallet
/// transaction.
struct RejectingRecordStore {
    events: broadcast::Sender<RecordCreated>,
}

impl RejectingRecordStore {
    fn new() -> Self {
        let (events, _) = broadcast::channel(8);
        Self { events }
    }
}

#[async_trait]
impl RecordStore for RejectingRecordStore {
    async fn create_record(&self, _content_ref: &str) -> Result<u64, LedgerError> {
        Err(LedgerError::ChainTransactionFailed("wallet rejected".into()))
    }

    async fn complete_record(&self, _caller: &str, _index: u64) -> Result<(), LedgerError> {
        Err(LedgerError::ChainTransactionFailed("wallet rejected".into()))
    }

    async fn get_record(&self, index: u64) -> Result<TaskRecord, LedgerError> {
        Err(LedgerError::OutOfRange { index, count: 0 })
    }

    async fn record_count(&self) -> Result<u64, LedgerError> {
        Ok(0)
    }

    async fn list_records(&self) -> Result<Vec<TaskRecord>, LedgerError> {
        Ok(Vec::new())
    }

    fn subscribe(&self) -> broadcast::Receiver<RecordCreated> {
        self.events.subscribe()
    }
}

/// Content store stub that counts publishes and always fails transport.
struct DownContentStore {
    publishes: AtomicU64,
}

impl DownContentStore {
    fn new() -> Self {
        Self {
            publishes: AtomicU64::new(0),
        }
    }

    fn publish_count(&self) -> u64 {
        self.publishes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentStore for DownContentStore {
    async fn publish(&self, _content: &TaskContent) -> Result<String, LedgerError> {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        Err(LedgerError::ContentStoreUnavailable("gateway down".into()))
    }

    async fn resolve(&self, _content_ref: &str) -> Result<TaskContent, LedgerError> {
        Err(LedgerError::ContentStoreUnavailable("gateway down".into()))
    }
}

#[tokio::test]
async fn create_then_complete_scenario() {
    let (_, ledger, _, _temp) = orchestrator_with_memory_store();

    ledger.create_record("Qm1").await.unwrap();
    ledger.create_record("Qm2").await.unwrap();
    assert_eq!(ledger.record_count().await.unwrap(), 2);

    let first = ledger.get_record(0).await.unwrap();
    assert_eq!(first.content_ref, "Qm1");
    assert!(!first.completed);

    ledger.complete_record(OWNER, 0).await.unwrap();
    assert!(ledger.get_record(0).await.unwrap().completed);
    assert!(!ledger.get_record(1).await.unwrap().completed);
}

#[tokio::test]
async fn submit_then_reload_shows_task() {
    let (orchestrator, ledger, _, _temp) = orchestrator_with_memory_store();

    let tasks = orchestrator.submit_task("Build a dapp").await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].index, 0);
    assert_eq!(tasks[0].text, TaskText::Loaded("Build a dapp".to_string()));
    assert_eq!(ledger.record_count().await.unwrap(), 1);
}

#[tokio::test]
async fn blank_submit_touches_no_store() {
    let records = Arc::new(CountingRecordStore::new());
    let content = Arc::new(DownContentStore::new());
    let orchestrator = SyncOrchestrator::new(records.clone(), content.clone(), OWNER);

    let err = orchestrator.submit_task("   ").await.unwrap_err();
    assert!(matches!(err, LedgerError::InvalidInput(_)));
    assert_eq!(content.publish_count(), 0);
    assert_eq!(records.creation_count(), 0);
}

#[tokio::test]
async fn publish_failure_creates_no_record() {
    let records = Arc::new(CountingRecordStore::new());
    let content = Arc::new(DownContentStore::new());
    let orchestrator = SyncOrchestrator::new(records.clone(), content.clone(), OWNER);

    let err = orchestrator.submit_task("doomed").await.unwrap_err();
    assert!(matches!(err, LedgerError::ContentStoreUnavailable(_)));
    assert_eq!(content.publish_count(), 1);
    assert_eq!(records.creation_count(), 0);
}

#[tokio::test]
async fn append_failure_orphans_published_content() {
    let records = Arc::new(RejectingRecordStore::new());
    let content = Arc::new(MemoryContentStore::new());
    let orchestrator = SyncOrchestrator::new(records, content.clone(), OWNER);

    let err = orchestrator.submit_task("orphan me").await.unwrap_err();
    assert!(matches!(err, LedgerError::ChainTransactionFailed(_)));

    // The content was pinned before the append failed and stays pinned.
    let json = serde_json::to_string(&TaskContent::new("orphan me")).unwrap();
    let orphan_ref = MemoryContentStore::compute_ref(&json);
    assert_eq!(
        content.resolve(&orphan_ref).await.unwrap(),
        TaskContent::new("orphan me")
    );
}

#[tokio::test]
async fn reload_isolates_one_failed_resolution() {
    let (orchestrator, ledger, _, _temp) = orchestrator_with_memory_store();

    orchestrator.submit_task("first").await.unwrap();
    // Record 1 points at content nobody ever pinned.
    ledger.create_record("sha256-unpinned").await.unwrap();
    orchestrator.submit_task("third").await.unwrap();

    let tasks = orchestrator.reload_tasks().await.unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[0].text, TaskText::Loaded("first".to_string()));
    assert!(matches!(tasks[1].text, TaskText::Unavailable(_)));
    assert_eq!(tasks[2].text, TaskText::Loaded("third".to_string()));

    // Order is index order, not resolution order.
    let indices: Vec<u64> = tasks.iter().map(|t| t.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
}

#[tokio::test]
async fn malformed_content_is_marked_not_fatal() {
    let (orchestrator, ledger, content, _temp) = orchestrator_with_memory_store();

    orchestrator.submit_task("good").await.unwrap();
    let bad_ref = content.pin_raw(r#"{"description":"wrong schema"}"#);
    ledger.create_record(&bad_ref).await.unwrap();

    let tasks = orchestrator.reload_tasks().await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks[0].text.is_loaded());
    assert!(matches!(tasks[1].text, TaskText::Unavailable(_)));
}

#[tokio::test]
async fn non_owner_orchestrator_cannot_complete() {
    let temp = TempDir::new().unwrap();
    let ledger = Arc::new(TaskLedger::open(temp.path().join("ledger.sled"), OWNER).unwrap());
    let content = Arc::new(MemoryContentStore::new());

    let owner_view = SyncOrchestrator::new(ledger.clone(), content.clone(), OWNER);
    let visitor_view = SyncOrchestrator::new(ledger.clone(), content, "agent-visitor");

    owner_view.submit_task("guarded").await.unwrap();

    let err = visitor_view.complete_task(0).await.unwrap_err();
    assert!(matches!(err, LedgerError::Unauthorized { .. }));

    let tasks = owner_view.complete_task(0).await.unwrap();
    assert!(tasks[0].completed);
}

#[tokio::test]
async fn creation_events_stream_per_submit() {
    let (orchestrator, ledger, _, _temp) = orchestrator_with_memory_store();
    let mut events = ledger.subscribe();

    orchestrator.submit_task("one").await.unwrap();
    orchestrator.submit_task("two").await.unwrap();

    assert_eq!(events.recv().await.unwrap().index, 0);
    let second = events.recv().await.unwrap();
    assert_eq!(second.index, 1);
    assert!(!second.content_ref.is_empty());
}
