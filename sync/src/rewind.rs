//! The rewind engine: reconstruct and optionally restore past state.
//!
//! Rewind is a read/replay path over the activity log, independent of any
//! running sync pass. It folds change records into snapshots, previews them
//! without side effects, and applies a restore as a brand-new change record
//! so the rewind itself is undoable like any other edit.

use crate::adapter::{ActivityLog, ActivityQuery};
use crate::error::{Result, SyncError, SyncPhase};
use crate::tracker::{now_ms, ChangeTracker};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_engine::{
    ActivitySummary, ChangeAction, ChangeRecord, EntityId, Error as EngineError, FieldDiff,
    Snapshot, Timestamp,
};

/// Options for [`RewindEngine::rewind_to`].
#[derive(Debug, Clone, Copy)]
pub struct RewindOptions {
    /// Check preconditions (snapshot exists, entity clean, not in the
    /// future) before touching anything
    pub validate: bool,
    /// Return the would-be result without applying
    pub preview: bool,
}

impl Default for RewindOptions {
    fn default() -> Self {
        Self {
            validate: true,
            preview: false,
        }
    }
}

/// What a rewind call produced.
#[derive(Debug, Clone)]
pub enum RewindOutcome {
    /// The would-be state; nothing was mutated
    Preview(Snapshot),
    /// The restore was applied as a new change record
    Applied {
        record: ChangeRecord,
        snapshot: Snapshot,
    },
}

/// Releases the global latch when a rewind scope ends, error paths
/// included.
struct LatchGuard<'a> {
    latch: &'a AtomicBool,
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.store(false, Ordering::SeqCst);
    }
}

/// Replays the activity log to reconstruct, preview, and restore entity
/// state.
pub struct RewindEngine {
    log: Arc<dyn ActivityLog>,
    tracker: Arc<ChangeTracker>,
    /// Global latch: two rewinds must not race on tracker state
    rewinding: AtomicBool,
    /// Non-authoritative preview cache keyed by (entity, instant)
    previews: DashMap<(EntityId, Timestamp), Snapshot>,
}

impl RewindEngine {
    /// Create a rewind engine over the given log and tracker.
    pub fn new(log: Arc<dyn ActivityLog>, tracker: Arc<ChangeTracker>) -> Arc<Self> {
        Arc::new(Self {
            log,
            tracker,
            rewinding: AtomicBool::new(false),
            previews: DashMap::new(),
        })
    }

    /// Whether a rewind is currently in flight.
    pub fn is_rewinding(&self) -> bool {
        self.rewinding.load(Ordering::SeqCst)
    }

    /// An entity's activity timeline, newest first.
    pub async fn timeline(&self, entity_id: &str) -> Result<Vec<ActivitySummary>> {
        let records = self.query_history(entity_id).await?;
        let mut summaries: Vec<ActivitySummary> =
            records.iter().map(ActivitySummary::from).collect();
        summaries.reverse();
        Ok(summaries)
    }

    /// Reconstruct an entity's state at `at`, without mutating anything.
    /// Idempotent; cached by `(entity_id, at)`.
    pub async fn preview_at(&self, entity_id: &str, at: Timestamp) -> Result<Snapshot> {
        let key = (entity_id.to_string(), at);
        if let Some(cached) = self.previews.get(&key) {
            return Ok(cached.clone());
        }

        let records = self.query_history(entity_id).await?;
        let snapshot =
            Snapshot::fold(entity_id, &records, at).ok_or(EngineError::NoSnapshot {
                entity_id: entity_id.to_string(),
                at,
            })?;

        self.previews.insert(key, snapshot.clone());
        Ok(snapshot)
    }

    /// Rewind an entity to its state at `at`.
    ///
    /// With `preview: true` the would-be result is returned and nothing is
    /// mutated; call [`apply_preview`](Self::apply_preview) to commit it.
    /// Applying captures the current state first and records the restore as
    /// a change record with action `rewind`, so it is undoable through the
    /// same mechanism as any other edit.
    pub async fn rewind_to(
        &self,
        entity_id: &str,
        at: Timestamp,
        options: RewindOptions,
    ) -> Result<RewindOutcome> {
        // Single-flight: the latch covers preview-folding and apply alike,
        // but a preview releases it on return
        if self
            .rewinding
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::RewindInProgress(entity_id.to_string()));
        }
        let _latch = LatchGuard {
            latch: &self.rewinding,
        };

        if options.validate {
            self.validate(entity_id, at)?;
        }

        let snapshot = self.preview_at(entity_id, at).await?;

        if options.preview {
            tracing::debug!(entity_id, at, "rewind preview ready");
            return Ok(RewindOutcome::Preview(snapshot));
        }

        // Capture current state first so the rewind itself is undoable
        let current = self
            .tracker
            .entity_values(entity_id)
            .unwrap_or(serde_json::Value::Null);

        let record = self
            .tracker
            .track_change(
                &snapshot.entity_type,
                entity_id,
                ChangeAction::Rewind,
                current,
                snapshot.to_value(),
                None,
            )
            .await;

        tracing::info!(
            entity_id,
            at,
            change_id = %record.id,
            "rewind applied"
        );
        Ok(RewindOutcome::Applied { record, snapshot })
    }

    /// Commit a previously previewed rewind: the same path with
    /// `preview: false`.
    pub async fn apply_preview(&self, entity_id: &str, at: Timestamp) -> Result<RewindOutcome> {
        self.rewind_to(
            entity_id,
            at,
            RewindOptions {
                validate: true,
                preview: false,
            },
        )
        .await
    }

    /// Field-level differences between an entity's states at two instants.
    pub async fn compare_states(
        &self,
        entity_id: &str,
        t1: Timestamp,
        t2: Timestamp,
    ) -> Result<Vec<FieldDiff>> {
        let a = self.preview_at(entity_id, t1).await?;
        let b = self.preview_at(entity_id, t2).await?;
        Ok(Snapshot::compare(&a, &b))
    }

    fn validate(&self, entity_id: &str, at: Timestamp) -> Result<()> {
        let now = now_ms();
        if at > now {
            return Err(EngineError::FutureTimestamp { at, now }.into());
        }
        if self.tracker.is_dirty(entity_id) {
            // Unsaved local edits must not be silently overwritten; the
            // caller saves or discards first
            return Err(EngineError::DirtyEntity(entity_id.to_string()).into());
        }
        Ok(())
    }

    async fn query_history(&self, entity_id: &str) -> Result<Vec<ChangeRecord>> {
        self.log
            .query(&ActivityQuery::for_entity(entity_id))
            .await
            .map_err(|source| SyncError::ActivityLog {
                step: SyncPhase::Idle,
                source,
            })
    }
}
