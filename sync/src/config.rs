//! Configuration consumed, not owned, by the sync runtime.

use std::time::Duration;
use tether_engine::{CaptureMethod, ConflictStrategy, Scale};

/// Which way reconciliation moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    /// Both sides receive the other's changes (default)
    #[default]
    Bidirectional,
    /// Pull only: local receives remote changes, nothing is pushed
    RemoteToLocal,
    /// Push only: remote receives local changes, nothing is pulled in
    LocalToRemote,
}

/// Enforced floor for the sync interval.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Settings for the tracker, orchestrator, and rewind engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Direction of reconciliation
    pub direction: SyncDirection,
    /// Conflict strategy for the resolver
    pub strategy: ConflictStrategy,
    /// Interval between scheduled passes; clamped to [`MIN_SYNC_INTERVAL`]
    pub sync_interval: Duration,
    /// Whether the scheduler runs at all
    pub auto_sync: bool,
    /// Delay between batched deliveries to the activity log
    pub batch_delay: Duration,
    /// Queue length that triggers delivery before the timer fires
    pub batch_capacity: usize,
    /// Undo/redo stack depth
    pub undo_capacity: usize,
    /// Capture method stamped on local edits
    pub local_method: CaptureMethod,
    /// Scale stamped on local edits
    pub local_scale: Scale,
    /// View scale biasing superposition dominance, if any
    pub view_scale: Option<Scale>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            direction: SyncDirection::Bidirectional,
            strategy: ConflictStrategy::Superposition,
            sync_interval: Duration::from_secs(30),
            auto_sync: false,
            batch_delay: Duration::from_secs(2),
            batch_capacity: 50,
            undo_capacity: 100,
            local_method: CaptureMethod::Declared,
            local_scale: Scale::Individual,
            view_scale: None,
        }
    }
}

impl SyncConfig {
    /// The scheduling interval with the floor applied.
    pub fn effective_interval(&self) -> Duration {
        self.sync_interval.max(MIN_SYNC_INTERVAL)
    }
}
