//! Todo Ledger - decentralized to-do list client
//!
//! An append-only task ledger reconciled with off-chain content blobs
//! held by a pinning gateway.
//!
//! ## Architecture
//!
//! - **Task ledger**: append-only, owner-gated record store. Each record
//!   holds an opaque content ref and a completion flag; records are never
//!   deleted or reordered, and only the owner may complete them.
//! - **Content store**: external content-addressed storage. The ledger
//!   never sees task text, only refs.
//! - **Sync orchestrator**: joins the two. Publishes content before
//!   appending records, and rebuilds the display list on every reload
//!   with per-record failure isolation.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/todo-ledger/
//! ├── ledger.sled/           # Append-only task records
//! └── config.toml            # Configuration
//! ```
//!
//! ## Consistency Contract
//!
//! Content is published before its record is appended, so every record
//! had a resolvable ref at publish time. The reverse failure (record
//! append fails after publish) orphans pinned content; that window is
//! accepted and logged, never rolled back.

pub mod config;
pub mod content;
pub mod error;
pub mod ledger;
pub mod sync;

// Re-exports
pub use config::Config;
pub use content::{ContentStore, GatewayConfig, MemoryContentStore, PinningGateway, TaskContent};
pub use error::LedgerError;
pub use ledger::{RecordCreated, RecordStore, TaskLedger, TaskRecord};
pub use sync::{DisplayTask, SyncOrchestrator, TaskText};
