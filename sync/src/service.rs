//! The service facade: one explicit object wiring the whole runtime.
//!
//! Constructed once at process start from config plus adapters and passed
//! by handle to every caller - there is no ambient global state anywhere in
//! the crate.

use crate::adapter::{ActivityLog, Identity, RemoteStore};
use crate::config::SyncConfig;
use crate::error::Result;
use crate::orchestrator::{SyncOrchestrator, SyncReport};
use crate::rewind::RewindEngine;
use crate::tracker::{ChangeTracker, FlushOutcome};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// The assembled reconciliation runtime: tracker, orchestrator, and rewind
/// engine over one set of adapters.
pub struct SyncService {
    tracker: Arc<ChangeTracker>,
    orchestrator: Arc<SyncOrchestrator>,
    rewind: Arc<RewindEngine>,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncService {
    /// Build the runtime. Spawns the tracker's batching timer, and the
    /// sync scheduler when `auto_sync` is enabled.
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteStore>,
        log: Arc<dyn ActivityLog>,
        identity: Arc<dyn Identity>,
    ) -> Self {
        let tracker = ChangeTracker::new(Arc::clone(&log), identity, &config);
        let mut tasks = vec![tracker.spawn_flusher(config.batch_delay)];

        let auto_sync = config.auto_sync;
        let orchestrator =
            SyncOrchestrator::new(remote, Arc::clone(&log), Arc::clone(&tracker), config);
        if auto_sync {
            tasks.push(orchestrator.spawn_scheduler());
        }

        let rewind = RewindEngine::new(log, Arc::clone(&tracker));

        Self {
            tracker,
            orchestrator,
            rewind,
            tasks,
        }
    }

    /// The change tracker.
    pub fn tracker(&self) -> &Arc<ChangeTracker> {
        &self.tracker
    }

    /// The sync orchestrator.
    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    /// The rewind engine.
    pub fn rewind(&self) -> &Arc<RewindEngine> {
        &self.rewind
    }

    /// Run a manual sync pass now.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.orchestrator.run_pass().await
    }

    /// Stop background tasks and deliver anything still queued.
    pub async fn shutdown(self) -> FlushOutcome {
        for task in &self.tasks {
            task.abort();
        }
        self.tracker.flush().await
    }
}
