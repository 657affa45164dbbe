//! # Tether Sync
//!
//! The async reconciliation runtime around [`tether_engine`].
//!
//! Three cooperating components over one activity log:
//!
//! - [`ChangeTracker`] records every local mutation as an immutable change
//!   record, maintains per-entity dirty state and bounded undo/redo, and
//!   delivers records to the log in batches
//! - [`SyncOrchestrator`] drives single-flight reconciliation passes:
//!   fetch remote state, diff both sides against the last reconciled
//!   baseline, resolve conflicts (superposition included), apply the
//!   merged result to both sides, log everything
//! - [`RewindEngine`] replays the log to reconstruct any entity's state at
//!   a past instant, previews it without side effects, and applies a
//!   restore as a new, undoable change record
//!
//! External collaborators (the remote tabular store, the activity log's
//! storage, identity) sit behind the [`adapter`] traits; [`memory`] ships
//! in-memory implementations for tests and embedding. Construct a
//! [`SyncService`] once at process start and pass it by handle - nothing
//! in this crate is a global.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_sync::{
//!     memory::{MemoryActivityLog, MemoryRemoteStore, StaticIdentity},
//!     schema::RemoteSchema,
//!     SyncConfig, SyncService,
//! };
//!
//! # async fn run() {
//! let service = SyncService::new(
//!     SyncConfig::default(),
//!     Arc::new(MemoryRemoteStore::new(RemoteSchema::new())),
//!     Arc::new(MemoryActivityLog::new()),
//!     Arc::new(StaticIdentity::user("kim")),
//! );
//!
//! let report = service.sync_now().await.unwrap();
//! println!("synced {} entities", report.entities_synced);
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod memory;
pub mod orchestrator;
pub mod rewind;
pub mod schema;
pub mod service;
pub mod tracker;

// Re-export main types at crate root
pub use adapter::{
    ActivityLog, ActivityQuery, AdapterError, AdapterResult, Identity, RemoteRecord, RemoteStore,
};
pub use config::{SyncConfig, SyncDirection, MIN_SYNC_INTERVAL};
pub use error::{Result, SyncError, SyncPhase};
pub use orchestrator::{SyncOrchestrator, SyncReport};
pub use rewind::{RewindEngine, RewindOptions, RewindOutcome};
pub use schema::{FieldDef, FieldType, RemoteSchema, SchemaError, TableSchema};
pub use service::SyncService;
pub use tracker::{ChangeTracker, FlushOutcome, TrackerEvent};
