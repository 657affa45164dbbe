//! Change tracking: every local mutation becomes an immutable record.
//!
//! The tracker owns the local workspace state, the per-entity change
//! history, the dirty set, bounded undo/redo stacks, and the outbound queue
//! that batches records to the activity log. Dirty/clean transitions go out
//! on a typed broadcast channel; there are no callback lists.

use crate::adapter::{ActivityLog, Identity};
use crate::config::SyncConfig;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tether_engine::{
    Agent, BoundedStack, CaptureMethod, CellValue, ChangeAction, ChangeId, ChangeRecord, EntityId,
    EntityState, EntityStore, FieldName, Scale, Timestamp, ValueContext,
};

/// Typed dirty/clean notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// The entity gained unreconciled local changes
    Dirty { entity_id: EntityId },
    /// The entity was folded into a completed sync pass
    Clean { entity_id: EntityId },
}

/// Result of a delivery attempt to the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Records appended this attempt
    pub delivered: usize,
    /// Records put back at the front of the queue for the next attempt
    pub requeued: usize,
}

/// Time-ordered unique id for a change record.
pub(crate) fn new_change_id() -> ChangeId {
    uuid::Uuid::now_v7().to_string()
}

/// Current wall clock in milliseconds since epoch.
pub(crate) fn now_ms() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

struct TrackerState {
    store: EntityStore,
    history: HashMap<EntityId, Vec<ChangeRecord>>,
    dirty: BTreeSet<EntityId>,
    undo: BoundedStack<ChangeRecord>,
    redo: BoundedStack<ChangeRecord>,
    queue: VecDeque<ChangeRecord>,
}

/// Records local mutations, maintains dirty state, and exposes undo/redo.
pub struct ChangeTracker {
    state: Mutex<TrackerState>,
    /// Serializes the batching timer's tick against explicit flushes
    delivery: tokio::sync::Mutex<()>,
    log: Arc<dyn ActivityLog>,
    identity: Arc<dyn Identity>,
    events: broadcast::Sender<TrackerEvent>,
    batch_capacity: usize,
    local_method: CaptureMethod,
    local_scale: Scale,
}

impl ChangeTracker {
    /// Create a tracker delivering to `log`, attributing changes via
    /// `identity`.
    pub fn new(
        log: Arc<dyn ActivityLog>,
        identity: Arc<dyn Identity>,
        config: &SyncConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            state: Mutex::new(TrackerState {
                store: EntityStore::new(),
                history: HashMap::new(),
                dirty: BTreeSet::new(),
                undo: BoundedStack::new(config.undo_capacity),
                redo: BoundedStack::new(config.undo_capacity),
                queue: VecDeque::new(),
            }),
            delivery: tokio::sync::Mutex::new(()),
            log,
            identity,
            events,
            batch_capacity: config.batch_capacity.max(1),
            local_method: config.local_method,
            local_scale: config.local_scale,
        })
    }

    /// Spawn the batching timer. Ticks deliver the queue through the same
    /// lock as [`flush`](Self::flush), so a tick never runs concurrently
    /// with a flush it did not trigger. The task ends when the tracker is
    /// dropped.
    pub fn spawn_flusher(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(delay.max(Duration::from_millis(10)));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(tracker) = weak.upgrade() else { break };
                let outcome = tracker.flush().await;
                if outcome.requeued > 0 {
                    tracing::debug!(
                        requeued = outcome.requeued,
                        "activity log delivery incomplete; will retry"
                    );
                }
            }
        })
    }

    /// Subscribe to dirty/clean events.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Record a local mutation: compute checksums, stamp id/agent/time,
    /// apply it to the workspace state, mark the entity dirty, push onto
    /// the undo stack, and queue for batched delivery.
    pub async fn track_change(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: ChangeAction,
        before: serde_json::Value,
        after: serde_json::Value,
        field: Option<FieldName>,
    ) -> ChangeRecord {
        let agent = match self.identity.current_agent().await {
            Ok(agent) => agent,
            Err(err) => {
                tracing::debug!(error = %err, "identity unavailable, acting as system");
                Agent::System
            }
        };
        let created_at = now_ms();
        let record = ChangeRecord::new(
            new_change_id(),
            entity_type,
            entity_id,
            action,
            before,
            after,
            field,
            agent.clone(),
            created_at,
        );
        let context = ValueContext::new(self.local_method, self.local_scale, created_at, agent);

        let (newly_dirty, over_capacity) = {
            let mut state = self.state.lock().expect("tracker lock poisoned");
            state.store.apply_change(&record, &context);
            state
                .history
                .entry(entity_id.to_string())
                .or_default()
                .push(record.clone());
            let newly_dirty = state.dirty.insert(entity_id.to_string());
            state.undo.push(record.clone());
            state.redo.clear();
            state.queue.push_back(record.clone());
            (newly_dirty, state.queue.len() >= self.batch_capacity)
        };

        if newly_dirty {
            let _ = self.events.send(TrackerEvent::Dirty {
                entity_id: entity_id.to_string(),
            });
        }
        if over_capacity {
            self.flush().await;
        }

        record
    }

    /// Whether an entity has changes not yet folded into a sync pass.
    pub fn is_dirty(&self, entity_id: &str) -> bool {
        self.state
            .lock()
            .expect("tracker lock poisoned")
            .dirty
            .contains(entity_id)
    }

    /// All dirty entity ids in sorted order.
    pub fn dirty_entities(&self) -> Vec<EntityId> {
        self.state
            .lock()
            .expect("tracker lock poisoned")
            .dirty
            .iter()
            .cloned()
            .collect()
    }

    /// Undo the most recent change, restoring its `before` value. Returns
    /// `None` on an empty stack - a normal condition, not an error.
    pub fn undo(&self) -> Option<ChangeRecord> {
        let mut state = self.state.lock().expect("tracker lock poisoned");
        let record = state.undo.pop()?;
        let context = ValueContext::new(
            self.local_method,
            self.local_scale,
            record.created_at,
            record.agent.clone(),
        );
        state.store.revert_change(&record, &context);
        state.redo.push(record.clone());
        Some(record)
    }

    /// Redo the most recently undone change. Symmetric inverse of
    /// [`undo`](Self::undo).
    pub fn redo(&self) -> Option<ChangeRecord> {
        let mut state = self.state.lock().expect("tracker lock poisoned");
        let record = state.redo.pop()?;
        let context = ValueContext::new(
            self.local_method,
            self.local_scale,
            record.created_at,
            record.agent.clone(),
        );
        state.store.apply_change(&record, &context);
        state.undo.push(record.clone());
        Some(record)
    }

    /// Whether an undo is available.
    pub fn can_undo(&self) -> bool {
        !self.state.lock().expect("tracker lock poisoned").undo.is_empty()
    }

    /// Whether a redo is available.
    pub fn can_redo(&self) -> bool {
        !self.state.lock().expect("tracker lock poisoned").redo.is_empty()
    }

    /// Deliver all queued records to the activity log immediately,
    /// bypassing the batch timer. Delivery is at-least-once: on failure the
    /// unsent records go back to the front of the queue, order preserved.
    pub async fn flush(&self) -> FlushOutcome {
        let _delivery = self.delivery.lock().await;

        let batch: Vec<ChangeRecord> = {
            let mut state = self.state.lock().expect("tracker lock poisoned");
            state.queue.drain(..).collect()
        };
        if batch.is_empty() {
            return FlushOutcome {
                delivered: 0,
                requeued: 0,
            };
        }

        let mut delivered = 0;
        let mut failed: Vec<ChangeRecord> = Vec::new();
        let mut pending = batch.into_iter();
        while let Some(record) = pending.next() {
            match self.log.append(&record).await {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::warn!(
                        change_id = %record.id,
                        error = %err,
                        "activity log append failed, requeueing remainder"
                    );
                    failed.push(record);
                    failed.extend(pending);
                    break;
                }
            }
        }

        let requeued = failed.len();
        if requeued > 0 {
            let mut state = self.state.lock().expect("tracker lock poisoned");
            for record in failed.into_iter().rev() {
                state.queue.push_front(record);
            }
        }

        tracing::trace!(delivered, requeued, "flush complete");
        FlushOutcome {
            delivered,
            requeued,
        }
    }

    /// Number of records waiting for delivery.
    pub fn pending_count(&self) -> usize {
        self.state.lock().expect("tracker lock poisoned").queue.len()
    }

    /// A snapshot of one entity's current local state.
    pub fn entity_state(&self, entity_id: &str) -> Option<EntityState> {
        self.state
            .lock()
            .expect("tracker lock poisoned")
            .store
            .get(entity_id)
            .cloned()
    }

    /// Current local display values of one entity.
    pub fn entity_values(&self, entity_id: &str) -> Option<serde_json::Value> {
        self.state
            .lock()
            .expect("tracker lock poisoned")
            .store
            .get(entity_id)
            .filter(|s| s.is_active())
            .map(|s| s.values())
    }

    /// This session's change history for one entity, oldest first.
    pub fn local_history(&self, entity_id: &str) -> Vec<ChangeRecord> {
        self.state
            .lock()
            .expect("tracker lock poisoned")
            .history
            .get(entity_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Merge reconciled cells into the workspace without marking dirty -
    /// the sync pass is the one caller allowed to mutate silently.
    pub(crate) fn apply_reconciled(
        &self,
        entity_type: &str,
        entity_id: &str,
        cells: BTreeMap<FieldName, CellValue>,
        at: Timestamp,
    ) {
        let mut state = self.state.lock().expect("tracker lock poisoned");
        state.store.merge_cells(entity_type, entity_id, cells, at);
    }

    /// Tombstone an entity locally after a remote delete was reconciled.
    pub(crate) fn apply_remote_delete(&self, entity_id: &str, at: Timestamp) {
        let mut state = self.state.lock().expect("tracker lock poisoned");
        state.store.mark_deleted(entity_id, at);
    }

    /// Clear an entity's dirty flag after a completed pass.
    pub(crate) fn mark_clean(&self, entity_id: &str) {
        let removed = {
            let mut state = self.state.lock().expect("tracker lock poisoned");
            state.dirty.remove(entity_id)
        };
        if removed {
            let _ = self.events.send(TrackerEvent::Clean {
                entity_id: entity_id.to_string(),
            });
        }
    }
}
