//! Sync orchestrator - reconciles the ledger with off-chain content
//!
//! The ledger is authoritative for which tasks exist and their completion
//! state; the content store holds the text. This module joins the two:
//!
//! - `submit_task` runs the two-phase publish-then-record flow. Content
//!   is published first so every record ever appended had a resolvable
//!   ref at publish time. If the append itself fails the published
//!   content is orphaned (pinned but unreferenced); that window is
//!   accepted and logged, not rolled back.
//! - `reload_tasks` does a full reload: one authoritative record listing,
//!   then concurrent per-record content resolution. Resolutions are
//!   failure-isolated: one unreachable or malformed blob marks only its
//!   own task as unavailable and never hides the rest of the list.
//!
//! There is no caching across reloads; every call re-fetches every
//! record's content so the result always reflects current ledger state.
//!
//! `submit_task` is not re-entrant-safe against itself: two concurrent
//! calls may both publish and both append. Accepted limitation at this
//! scale; the ledger still serializes the appends.

use crate::content::{ContentStore, TaskContent};
use crate::error::LedgerError;
use crate::ledger::{RecordStore, TaskRecord};
use futures_util::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Resolved text for one display task.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum TaskText {
    /// Content resolved and validated.
    Loaded(String),
    /// Resolution failed; carries the reason for display.
    Unavailable(String),
}

impl TaskText {
    pub fn is_loaded(&self) -> bool {
        matches!(self, TaskText::Loaded(_))
    }
}

/// Read-side projection of one record joined with its content.
///
/// Ephemeral: discarded and rebuilt wholesale on every reload, with no
/// identity beyond the record it mirrors.
#[derive(Debug, Clone, Serialize)]
pub struct DisplayTask {
    pub index: u64,
    pub content_ref: String,
    pub text: TaskText,
    pub completed: bool,
}

/// Orchestrates the publish-then-record flow and full reloads.
pub struct SyncOrchestrator {
    records: Arc<dyn RecordStore>,
    content: Arc<dyn ContentStore>,
    /// Caller identity used for owner-gated completion.
    caller: String,
}

impl SyncOrchestrator {
    pub fn new(records: Arc<dyn RecordStore>, content: Arc<dyn ContentStore>, caller: impl Into<String>) -> Self {
        Self {
            records,
            content,
            caller: caller.into(),
        }
    }

    /// Publish task text and append a ledger record for it, then reload.
    ///
    /// Rejects blank text before touching any store. A publish failure
    /// aborts with no record created; an append failure leaves the
    /// already-pinned content orphaned.
    pub async fn submit_task(&self, text: &str) -> Result<Vec<DisplayTask>, LedgerError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(LedgerError::InvalidInput("task text is empty".into()));
        }

        let content = TaskContent::new(text);
        let content_ref = self.content.publish(&content).await?;
        debug!(content_ref = %content_ref, "Published task content");

        let index = match self.records.create_record(&content_ref).await {
            Ok(index) => index,
            Err(e) => {
                warn!(content_ref = %content_ref, error = %e, "Record append failed, pinned content orphaned");
                return Err(LedgerError::ChainTransactionFailed(e.to_string()));
            }
        };

        info!(index, content_ref = %content_ref, "Submitted task");
        self.reload_tasks().await
    }

    /// Complete the record at `index` as this orchestrator's caller,
    /// then reload so the caller observes the updated list.
    pub async fn complete_task(&self, index: u64) -> Result<Vec<DisplayTask>, LedgerError> {
        self.records.complete_record(&self.caller, index).await?;
        self.reload_tasks().await
    }

    /// Full reload: list records, resolve all content concurrently,
    /// assemble in index order.
    ///
    /// The resolution fan-out is a join, not a race: every resolution
    /// settles before assembly, and dropping the returned future cancels
    /// all of them. Result order is record index order regardless of
    /// which resolution finished first.
    pub async fn reload_tasks(&self) -> Result<Vec<DisplayTask>, LedgerError> {
        let records = self.records.list_records().await?;
        debug!(count = records.len(), "Reloading tasks");

        let resolutions = join_all(
            records
                .iter()
                .map(|record| self.content.resolve(&record.content_ref)),
        )
        .await;

        let tasks = records
            .into_iter()
            .zip(resolutions)
            .map(|(record, resolution)| assemble(record, resolution))
            .collect();

        Ok(tasks)
    }
}

fn assemble(record: TaskRecord, resolution: Result<TaskContent, LedgerError>) -> DisplayTask {
    let text = match resolution {
        Ok(content) => TaskText::Loaded(content.task),
        Err(e) => {
            warn!(index = record.index, content_ref = %record.content_ref, error = %e, "Task content unavailable");
            TaskText::Unavailable(e.to_string())
        }
    };

    DisplayTask {
        index: record.index,
        content_ref: record.content_ref,
        text,
        completed: record.completed,
    }
}
