//! Snapshots: reconstructed entity state at a past instant.
//!
//! A snapshot is always computable by folding an entity's change records up
//! to a timestamp. It may be cached, but the cache is never authoritative -
//! the log is.

use crate::{
    change::{ChangeAction, ChangeRecord},
    checksum::{diff_fields, FieldDiff},
    context::Agent,
    ChangeId, EntityId, EntityType, FieldName, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The reconstructed state of an entity at a specific instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Entity this snapshot belongs to
    pub entity_id: EntityId,
    /// Entity type, taken from the folded records
    pub entity_type: EntityType,
    /// The instant the snapshot reflects
    pub at: Timestamp,
    /// Field values active at that instant
    pub values: BTreeMap<FieldName, serde_json::Value>,
    /// The change record that produced this state
    pub produced_by: ChangeId,
    /// Whether the entity was deleted at that instant
    pub deleted: bool,
}

impl Snapshot {
    /// Fold an entity's change records up to (and including) `at`.
    ///
    /// Records are applied in creation order; records after `at` and
    /// records for other entities are ignored. Returns `None` when no
    /// record exists at or before `at` - there is no state to reconstruct.
    pub fn fold(entity_id: &str, records: &[ChangeRecord], at: Timestamp) -> Option<Snapshot> {
        let mut applicable: Vec<&ChangeRecord> = records
            .iter()
            .filter(|r| r.entity_id == entity_id && r.created_at <= at)
            .collect();
        applicable.sort();
        applicable.dedup_by(|a, b| a.id == b.id);

        let last = applicable.last()?;
        let mut snapshot = Snapshot {
            entity_id: entity_id.to_string(),
            entity_type: last.entity_type.clone(),
            at,
            values: BTreeMap::new(),
            produced_by: last.id.clone(),
            deleted: false,
        };

        for record in &applicable {
            snapshot.apply(record);
        }

        Some(snapshot)
    }

    fn apply(&mut self, record: &ChangeRecord) {
        match (&record.field, record.action) {
            (_, ChangeAction::Delete) => {
                self.deleted = true;
            }
            (Some(field), _) => {
                if record.after.is_null() {
                    self.values.remove(field);
                } else {
                    self.values.insert(field.clone(), record.after.clone());
                }
                self.deleted = false;
            }
            (None, _) => {
                self.values.clear();
                if let Some(map) = record.after.as_object() {
                    for (name, value) in map {
                        self.values.insert(name.clone(), value.clone());
                    }
                }
                self.deleted = false;
            }
        }
    }

    /// The snapshot's values as a JSON object.
    pub fn to_value(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Field-level differences between two snapshots.
    pub fn compare(a: &Snapshot, b: &Snapshot) -> Vec<FieldDiff> {
        diff_fields(&a.to_value(), &b.to_value())
    }
}

/// One line of an entity's timeline: what changed, by whom, when.
///
/// Carries enough to render the timeline without fetching full snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    /// The underlying change record id
    pub change_id: ChangeId,
    /// Kind of mutation
    pub action: ChangeAction,
    /// Field that changed, if field-level
    pub field: Option<FieldName>,
    /// Who made the change
    pub agent: Agent,
    /// When it happened
    pub at: Timestamp,
    /// Human-readable description
    pub description: String,
}

impl From<&ChangeRecord> for ActivitySummary {
    fn from(record: &ChangeRecord) -> Self {
        let description = match (&record.field, record.action) {
            (_, ChangeAction::Create) => format!("{} created the entity", record.agent.name()),
            (_, ChangeAction::Delete) => format!("{} deleted the entity", record.agent.name()),
            (_, ChangeAction::Rewind) => {
                format!("{} restored an earlier state", record.agent.name())
            }
            (Some(field), ChangeAction::Sync) => {
                format!("sync reconciled '{field}'")
            }
            (None, ChangeAction::Sync) => "sync reconciled the entity".to_string(),
            (Some(field), ChangeAction::Update) => {
                format!("{} changed '{field}'", record.agent.name())
            }
            (None, ChangeAction::Update) => {
                format!("{} updated the entity", record.agent.name())
            }
        };

        Self {
            change_id: record.id.clone(),
            action: record.action,
            field: record.field.clone(),
            agent: record.agent.clone(),
            at: record.created_at,
            description,
        }
    }
}
