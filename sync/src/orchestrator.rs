//! The sync orchestrator: one full reconciliation pass as a single-flight
//! state machine.
//!
//! A pass walks `Fetching -> Diffing -> Resolving -> Applying -> Logging`;
//! failure at any step aborts the rest, leaves dirty flags untouched, and
//! surfaces the failing step and cause. A pass requested while one runs is
//! rejected with `Busy` rather than queued. Entities are processed in
//! sorted id order so repeated runs over the same input are deterministic.

use crate::adapter::{ActivityLog, RemoteRecord, RemoteStore};
use crate::config::{SyncConfig, SyncDirection};
use crate::error::{Result, SyncError, SyncPhase};
use crate::tracker::{new_change_id, now_ms, ChangeTracker};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;
use tether_engine::{
    checksum, diff_fields, Agent, CellValue, ChangeAction, ChangeRecord, Conflict,
    ConflictOutcome, ContextualValue, EntityId, FieldName, Resolver, Side, Timestamp,
    ValueContext,
};
use tokio::task::JoinHandle;

/// Summary of one completed pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Entities considered (remote change, local dirty, or both)
    pub entities_scanned: usize,
    /// Entities fully reconciled this pass
    pub entities_synced: usize,
    /// Conflict decisions made, superpositions included
    pub conflicts: Vec<Conflict>,
    /// Fields left in superposition
    pub superposed_fields: usize,
    /// Change records appended with action `sync`
    pub records_logged: usize,
    /// Writes issued to the remote store
    pub remote_writes: usize,
    /// Entities whose local state received remote values
    pub local_writes: usize,
    /// Wall-clock duration of the pass
    pub duration_ms: u64,
}

/// Last reconciled state of one entity, the reference point for diffing.
#[derive(Debug, Clone)]
struct Baseline {
    entity_type: String,
    values: serde_json::Value,
    /// Whether the remote held this entity at last reconciliation; an
    /// absent remote record only means "deleted remotely" if it did
    remote_seen: bool,
}

/// One field-level change planned for the Applying/Logging steps.
struct PlannedChange {
    field: Option<FieldName>,
    before: serde_json::Value,
    after: serde_json::Value,
    resolution: serde_json::Value,
}

/// Everything a pass decided about one entity.
struct EntityPlan {
    entity_id: EntityId,
    entity_type: String,
    final_values: serde_json::Value,
    local_cells: BTreeMap<FieldName, CellValue>,
    changes: Vec<PlannedChange>,
    conflicts: Vec<Conflict>,
    remote_write: bool,
    local_delete: bool,
    remote_delete: bool,
    was_dirty: bool,
    remote_seen: bool,
}

/// Drives reconciliation passes between the tracker and the remote store.
pub struct SyncOrchestrator {
    remote: Arc<dyn RemoteStore>,
    log: Arc<dyn ActivityLog>,
    tracker: Arc<ChangeTracker>,
    config: SyncConfig,
    resolver: Resolver,
    running: AtomicBool,
    auto_enabled: AtomicBool,
    phase: Mutex<SyncPhase>,
    baseline: Mutex<HashMap<EntityId, Baseline>>,
}

impl SyncOrchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        log: Arc<dyn ActivityLog>,
        tracker: Arc<ChangeTracker>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let resolver = Resolver::new(config.strategy).with_view_scale(config.view_scale);
        Arc::new(Self {
            remote,
            log,
            tracker,
            resolver,
            running: AtomicBool::new(false),
            auto_enabled: AtomicBool::new(config.auto_sync),
            phase: Mutex::new(SyncPhase::Idle),
            baseline: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// The step the current pass is in, or `Idle`.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    /// Enable or disable scheduled passes. Manual passes are always
    /// allowed while idle.
    pub fn set_auto_sync(&self, enabled: bool) {
        self.auto_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Spawn the scheduling timer. Respects the enforced interval floor
    /// and skips ticks while a manual pass is running. Ends when the
    /// orchestrator is dropped.
    pub fn spawn_scheduler(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let interval = self.config.effective_interval();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(orchestrator) = weak.upgrade() else { break };
                if !orchestrator.auto_enabled.load(Ordering::SeqCst) {
                    continue;
                }
                match orchestrator.run_pass().await {
                    Ok(report) => tracing::info!(
                        entities = report.entities_synced,
                        conflicts = report.conflicts.len(),
                        duration_ms = report.duration_ms,
                        "scheduled sync pass complete"
                    ),
                    Err(SyncError::Busy) => {
                        tracing::debug!("scheduled sync pass skipped, pass in progress")
                    }
                    Err(err) => tracing::warn!(
                        reason = err.reason(),
                        error = %err,
                        "scheduled sync pass failed"
                    ),
                }
            }
        })
    }

    /// Run one full reconciliation pass. Single-flight: returns
    /// [`SyncError::Busy`] if a pass is already in progress.
    pub async fn run_pass(&self) -> Result<SyncReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::Busy);
        }

        let result = self.pass_inner().await;

        self.set_phase(SyncPhase::Idle);
        self.running.store(false, Ordering::SeqCst);

        if let Err(err) = &result {
            tracing::warn!(reason = err.reason(), error = %err, "sync pass failed");
        }
        result
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    async fn pass_inner(&self) -> Result<SyncReport> {
        let started = Instant::now();
        let mut report = SyncReport::default();

        // Fetching: current remote truth, schema first
        self.set_phase(SyncPhase::Fetching);
        let schema = self
            .remote
            .fetch_schema()
            .await
            .map_err(|source| SyncError::Remote {
                step: SyncPhase::Fetching,
                source,
            })?;

        let tables = schema.table_names();
        let fetches = tables.iter().map(|table| {
            let remote = Arc::clone(&self.remote);
            let table = table.clone();
            async move { (table.clone(), remote.fetch_records(&table).await) }
        });
        let mut remote_entities: HashMap<EntityId, (String, serde_json::Value)> = HashMap::new();
        for (table, fetched) in futures::future::join_all(fetches).await {
            let records = fetched.map_err(|source| SyncError::Remote {
                step: SyncPhase::Fetching,
                source,
            })?;
            for record in records {
                remote_entities.insert(record.id.clone(), (table.clone(), record.payload));
            }
        }
        let fetched_at = now_ms();

        // Diffing: who moved since the last reconciled baseline
        self.set_phase(SyncPhase::Diffing);
        let baseline = self
            .baseline
            .lock()
            .expect("baseline lock poisoned")
            .clone();
        let dirty: BTreeSet<EntityId> = self.tracker.dirty_entities().into_iter().collect();

        let mut candidates: BTreeSet<EntityId> = dirty.clone();
        for (entity_id, (_, payload)) in &remote_entities {
            let remote_changed = baseline
                .get(entity_id)
                .map(|base| checksum(&base.values) != checksum(payload))
                .unwrap_or(true);
            if remote_changed {
                candidates.insert(entity_id.clone());
            }
        }
        for entity_id in baseline.keys() {
            if !remote_entities.contains_key(entity_id) {
                // Present at last reconciliation, gone remotely now
                candidates.insert(entity_id.clone());
            }
        }
        report.entities_scanned = candidates.len();

        // Resolving: field-level decisions per candidate. Direction gates
        // which side's diffs participate at all
        self.set_phase(SyncPhase::Resolving);
        let push = self.config.direction != SyncDirection::RemoteToLocal;
        let pull = self.config.direction != SyncDirection::LocalToRemote;
        let mut plans: Vec<EntityPlan> = Vec::with_capacity(candidates.len());
        for entity_id in &candidates {
            let plan = self.plan_entity(
                entity_id,
                &baseline,
                &remote_entities,
                dirty.contains(entity_id),
                fetched_at,
                push,
                pull,
            );
            report.conflicts.extend(plan.conflicts.iter().cloned());
            report.superposed_fields += plan
                .conflicts
                .iter()
                .filter(|c| matches!(c.outcome, ConflictOutcome::Superposed { .. }))
                .count();
            plans.push(plan);
        }

        // Applying: write each side the values it does not yet have
        self.set_phase(SyncPhase::Applying);
        for plan in &plans {
            if plan.local_delete && push {
                self.remote
                    .delete_record(&plan.entity_type, &plan.entity_id)
                    .await
                    .map_err(|source| SyncError::Remote {
                        step: SyncPhase::Applying,
                        source,
                    })?;
                report.remote_writes += 1;
                continue;
            }

            if plan.remote_delete && pull {
                self.tracker.apply_remote_delete(&plan.entity_id, fetched_at);
                report.local_writes += 1;
                continue;
            }

            if plan.remote_write && push {
                // A payload the remote schema rejects is a consistency
                // failure, not something to retry into
                schema
                    .validate_record(&plan.entity_type, &plan.final_values)
                    .map_err(|err| SyncError::Consistency {
                        step: SyncPhase::Applying,
                        entities: vec![plan.entity_id.clone()],
                        detail: err.to_string(),
                    })?;
                self.remote
                    .write_record(
                        &plan.entity_type,
                        &RemoteRecord::new(plan.entity_id.clone(), plan.final_values.clone()),
                    )
                    .await
                    .map_err(|source| SyncError::Remote {
                        step: SyncPhase::Applying,
                        source,
                    })?;
                report.remote_writes += 1;
            }

            if !plan.local_cells.is_empty() && pull {
                self.tracker.apply_reconciled(
                    &plan.entity_type,
                    &plan.entity_id,
                    plan.local_cells.clone(),
                    fetched_at,
                );
                report.local_writes += 1;
            }
        }

        // Logging: local edits first (per-entity order), then the pass's
        // own records; dirty clears only after both landed
        self.set_phase(SyncPhase::Logging);
        let flush = self.tracker.flush().await;
        if flush.requeued > 0 {
            return Err(SyncError::ActivityLog {
                step: SyncPhase::Logging,
                source: crate::adapter::AdapterError::Unavailable(format!(
                    "{} tracked records could not be delivered",
                    flush.requeued
                )),
            });
        }

        let logged_at = now_ms();
        for plan in &plans {
            for change in &plan.changes {
                let record = ChangeRecord::new(
                    new_change_id(),
                    plan.entity_type.clone(),
                    plan.entity_id.clone(),
                    ChangeAction::Sync,
                    change.before.clone(),
                    change.after.clone(),
                    change.field.clone(),
                    Agent::System,
                    logged_at,
                )
                .with_resolution(change.resolution.clone());
                self.log
                    .append(&record)
                    .await
                    .map_err(|source| SyncError::ActivityLog {
                        step: SyncPhase::Logging,
                        source,
                    })?;
                report.records_logged += 1;
            }

            if plan.was_dirty && push {
                self.tracker.mark_clean(&plan.entity_id);
            }
            report.entities_synced += 1;

            let mut baseline = self.baseline.lock().expect("baseline lock poisoned");
            if plan.local_delete || plan.remote_delete {
                baseline.remove(&plan.entity_id);
            } else {
                baseline.insert(
                    plan.entity_id.clone(),
                    Baseline {
                        entity_type: plan.entity_type.clone(),
                        values: plan.final_values.clone(),
                        remote_seen: plan.remote_seen || (plan.remote_write && push),
                    },
                );
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            scanned = report.entities_scanned,
            synced = report.entities_synced,
            conflicts = report.conflicts.len(),
            "sync pass complete"
        );
        Ok(report)
    }

    /// Decide what to do about one entity: diff both sides against the
    /// baseline, resolve fields changed on both, carry one-sided changes
    /// unconditionally. A side whose direction is disabled contributes no
    /// diffs, so nothing is resolved, applied, or logged for it.
    #[allow(clippy::too_many_arguments)]
    fn plan_entity(
        &self,
        entity_id: &str,
        baseline: &HashMap<EntityId, Baseline>,
        remote_entities: &HashMap<EntityId, (String, serde_json::Value)>,
        was_dirty: bool,
        fetched_at: Timestamp,
        push: bool,
        pull: bool,
    ) -> EntityPlan {
        let base = baseline.get(entity_id);
        let base_values = base
            .map(|b| b.values.clone())
            .unwrap_or_else(|| serde_json::json!({}));
        let local_state = self.tracker.entity_state(entity_id);
        let remote = remote_entities.get(entity_id);

        let entity_type = remote
            .map(|(table, _)| table.clone())
            .or_else(|| local_state.as_ref().map(|s| s.entity_type.clone()))
            .or_else(|| base.map(|b| b.entity_type.clone()))
            .unwrap_or_default();

        let local_deleted = push
            && local_state
                .as_ref()
                .map(|s| !s.is_active() && was_dirty)
                .unwrap_or(false);
        let remote_deleted =
            pull && base.map(|b| b.remote_seen).unwrap_or(false) && remote.is_none();

        let mut plan = EntityPlan {
            entity_id: entity_id.to_string(),
            entity_type,
            final_values: serde_json::json!({}),
            local_cells: BTreeMap::new(),
            changes: Vec::new(),
            conflicts: Vec::new(),
            remote_write: false,
            local_delete: local_deleted,
            remote_delete: remote_deleted,
            was_dirty,
            remote_seen: remote.is_some(),
        };

        if local_deleted {
            plan.changes.push(PlannedChange {
                field: None,
                before: base_values,
                after: serde_json::Value::Null,
                resolution: serde_json::json!({"outcome": "carry", "source": "local", "op": "delete"}),
            });
            return plan;
        }
        if remote_deleted {
            plan.changes.push(PlannedChange {
                field: None,
                before: base_values,
                after: serde_json::Value::Null,
                resolution: serde_json::json!({"outcome": "carry", "source": "remote", "op": "delete"}),
            });
            return plan;
        }

        let local_values = local_state
            .as_ref()
            .filter(|s| s.is_active())
            .map(|s| s.values())
            .unwrap_or_else(|| base_values.clone());
        let remote_values = remote
            .map(|(_, payload)| payload.clone())
            .unwrap_or_else(|| base_values.clone());

        let local_diffs: HashMap<FieldName, _> = if push {
            diff_fields(&base_values, &local_values)
                .into_iter()
                .map(|d| (d.field.clone(), d))
                .collect()
        } else {
            HashMap::new()
        };
        let remote_diffs: HashMap<FieldName, _> = if pull {
            diff_fields(&base_values, &remote_values)
                .into_iter()
                .map(|d| (d.field.clone(), d))
                .collect()
        } else {
            HashMap::new()
        };

        let mut fields: BTreeSet<&FieldName> = BTreeSet::new();
        fields.extend(local_diffs.keys());
        fields.extend(remote_diffs.keys());

        let mut final_map = base_values.as_object().cloned().unwrap_or_default();

        for field in fields {
            let local_diff = local_diffs.get(field);
            let remote_diff = remote_diffs.get(field);
            let base_value = final_map
                .get(field.as_str())
                .cloned()
                .unwrap_or(serde_json::Value::Null);

            match (local_diff, remote_diff) {
                (Some(local), Some(remote_d)) => {
                    // Both sides moved: resolve
                    let local_value = local.after.clone().unwrap_or(serde_json::Value::Null);
                    let remote_value = remote_d.after.clone().unwrap_or(serde_json::Value::Null);

                    let local_context = local_state
                        .as_ref()
                        .and_then(|s| s.cell(field).map(|c| c.display_context().clone()))
                        .unwrap_or_else(|| ValueContext::system(fetched_at));
                    let remote_context = ValueContext::system(fetched_at);

                    let mut conflict = self.resolver.resolve(
                        entity_id,
                        field.clone(),
                        ContextualValue::new(local_value.clone(), local_context),
                        ContextualValue::new(remote_value.clone(), remote_context),
                    );

                    let (final_value, local_cell) = match &conflict.outcome {
                        ConflictOutcome::Identical => (local_value, None),
                        ConflictOutcome::Override { winner: Side::Local } => {
                            (local_value, None)
                        }
                        ConflictOutcome::Override {
                            winner: Side::Remote,
                        } => (
                            remote_value.clone(),
                            Some(CellValue::Single(conflict.remote.clone())),
                        ),
                        ConflictOutcome::Superposed { .. } => {
                            let cell = conflict
                                .superposed_cell()
                                .expect("superposed outcome builds a cell");
                            // The remote store cannot represent the
                            // superposition; it receives the dominant value
                            // and the conflict records the collapse
                            if self.config.direction != SyncDirection::RemoteToLocal {
                                conflict.remote_collapsed = true;
                            }
                            (
                                conflict.winning_value().value.clone(),
                                Some(CellValue::Superposed(cell)),
                            )
                        }
                    };

                    if !matches!(conflict.outcome, ConflictOutcome::Identical) {
                        plan.changes.push(PlannedChange {
                            field: Some(field.clone()),
                            before: base_value,
                            after: final_value.clone(),
                            resolution: conflict.resolution_metadata(),
                        });
                        plan.remote_write = true;
                        if let Some(cell) = local_cell {
                            plan.local_cells.insert(field.clone(), cell);
                        }
                    }
                    set_field(&mut final_map, field, final_value);
                    plan.conflicts.push(conflict);
                }
                (Some(local), None) => {
                    // Local-only change: unconditional carry to remote
                    let value = local.after.clone().unwrap_or(serde_json::Value::Null);
                    plan.changes.push(PlannedChange {
                        field: Some(field.clone()),
                        before: base_value,
                        after: value.clone(),
                        resolution: serde_json::json!({"outcome": "carry", "source": "local"}),
                    });
                    plan.remote_write = true;
                    set_field(&mut final_map, field, value);
                }
                (None, Some(remote_d)) => {
                    // Remote-only change: unconditional carry to local
                    let value = remote_d.after.clone().unwrap_or(serde_json::Value::Null);
                    plan.changes.push(PlannedChange {
                        field: Some(field.clone()),
                        before: base_value,
                        after: value.clone(),
                        resolution: serde_json::json!({"outcome": "carry", "source": "remote"}),
                    });
                    plan.local_cells.insert(
                        field.clone(),
                        CellValue::Single(ContextualValue::new(
                            value.clone(),
                            ValueContext::system(fetched_at),
                        )),
                    );
                    set_field(&mut final_map, field, value);
                }
                (None, None) => {}
            }
        }

        plan.final_values = serde_json::Value::Object(final_map);
        plan
    }
}

/// Insert or remove a field; null means the field is gone.
fn set_field(
    map: &mut serde_json::Map<String, serde_json::Value>,
    field: &str,
    value: serde_json::Value,
) {
    if value.is_null() {
        map.remove(field);
    } else {
        map.insert(field.to_string(), value);
    }
}
