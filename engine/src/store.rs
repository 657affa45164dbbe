//! Entity store - the in-memory local workspace state.
//!
//! The store holds the field cells of every tracked entity, including
//! superposed cells, and applies change records to them. It is pure state:
//! dirty tracking, queuing, and delivery live in the sync layer.

use crate::{
    cell::CellValue,
    change::{ChangeAction, ChangeRecord},
    context::{ContextualValue, ValueContext},
    EntityId, EntityType, FieldName, Timestamp, Version,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// The stored state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    /// Unique identifier
    pub id: EntityId,
    /// Entity type (table)
    pub entity_type: EntityType,
    /// Version number, incremented on each applied change
    pub version: Version,
    /// Field cells; BTreeMap keeps serialization deterministic
    cells: BTreeMap<FieldName, CellValue>,
    /// When the entity was first seen (milliseconds since epoch)
    pub created_at: Timestamp,
    /// When the entity last changed
    pub updated_at: Timestamp,
    /// Soft delete flag (tombstone)
    pub deleted: bool,
}

impl EntityState {
    /// Create an empty entity state.
    pub fn new(
        id: impl Into<EntityId>,
        entity_type: impl Into<EntityType>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            version: 0,
            cells: BTreeMap::new(),
            created_at,
            updated_at: created_at,
            deleted: false,
        }
    }

    /// Whether the entity is active (not tombstoned).
    pub fn is_active(&self) -> bool {
        !self.deleted
    }

    /// A field's cell.
    pub fn cell(&self, field: &str) -> Option<&CellValue> {
        self.cells.get(field)
    }

    /// All cells.
    pub fn cells(&self) -> &BTreeMap<FieldName, CellValue> {
        &self.cells
    }

    /// Set a cell directly.
    pub fn set_cell(&mut self, field: impl Into<FieldName>, cell: CellValue) {
        self.cells.insert(field.into(), cell);
    }

    /// The display values as a JSON object (dominant values for superposed
    /// cells).
    pub fn values(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .cells
            .iter()
            .map(|(name, cell)| (name.clone(), cell.display_value().clone()))
            .collect();
        serde_json::Value::Object(map)
    }

    /// Fields currently holding superposed cells.
    pub fn superposed_fields(&self) -> Vec<&FieldName> {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.is_superposed())
            .map(|(name, _)| name)
            .collect()
    }

    fn replace_from_object(&mut self, values: &serde_json::Value, context: &ValueContext) {
        self.cells.clear();
        if let Some(map) = values.as_object() {
            for (name, value) in map {
                self.cells.insert(
                    name.clone(),
                    CellValue::Single(ContextualValue::new(value.clone(), context.clone())),
                );
            }
        }
    }
}

/// All tracked entities, by type then id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStore {
    entities: HashMap<EntityType, HashMap<EntityId, EntityState>>,
    /// Entity ids are globally unique; this maps them back to their type
    index: HashMap<EntityId, EntityType>,
}

impl EntityStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an entity by id.
    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        let entity_type = self.index.get(entity_id)?;
        self.entities.get(entity_type)?.get(entity_id)
    }

    /// Get a mutable entity by id.
    pub fn get_mut(&mut self, entity_id: &str) -> Option<&mut EntityState> {
        let entity_type = self.index.get(entity_id)?;
        self.entities.get_mut(entity_type)?.get_mut(entity_id)
    }

    /// Whether an entity exists (tombstones included).
    pub fn contains(&self, entity_id: &str) -> bool {
        self.index.contains_key(entity_id)
    }

    /// All entity ids in sorted order, for deterministic iteration.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.index.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Active entities of one type.
    pub fn entities_of_type(&self, entity_type: &str) -> Vec<&EntityState> {
        self.entities
            .get(entity_type)
            .map(|m| {
                let mut states: Vec<&EntityState> =
                    m.values().filter(|s| s.is_active()).collect();
                states.sort_by(|a, b| a.id.cmp(&b.id));
                states
            })
            .unwrap_or_default()
    }

    /// Count of active entities across all types.
    pub fn len(&self) -> usize {
        self.entities
            .values()
            .flat_map(|m| m.values())
            .filter(|s| s.is_active())
            .count()
    }

    /// Whether no active entities exist.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        created_at: Timestamp,
    ) -> &mut EntityState {
        self.index
            .entry(entity_id.to_string())
            .or_insert_with(|| entity_type.to_string());
        self.entities
            .entry(entity_type.to_string())
            .or_default()
            .entry(entity_id.to_string())
            .or_insert_with(|| EntityState::new(entity_id, entity_type, created_at))
    }

    /// Apply a change record to the store. Unknown entities are created
    /// implicitly; the record is the source of truth, the store just
    /// materializes it.
    pub fn apply_change(&mut self, record: &ChangeRecord, context: &ValueContext) {
        let state = self.entry(&record.entity_type, &record.entity_id, record.created_at);

        match (&record.field, record.action) {
            (_, ChangeAction::Delete) => {
                state.deleted = true;
            }
            (Some(field), _) => {
                state.set_cell(
                    field.clone(),
                    CellValue::Single(ContextualValue::new(record.after.clone(), context.clone())),
                );
                state.deleted = false;
            }
            (None, _) => {
                state.replace_from_object(&record.after, context);
                state.deleted = false;
            }
        }

        state.version += 1;
        state.updated_at = record.created_at;
    }

    /// Restore the `before` side of a change record (undo path).
    pub fn revert_change(&mut self, record: &ChangeRecord, context: &ValueContext) {
        let state = self.entry(&record.entity_type, &record.entity_id, record.created_at);

        match (&record.field, record.action) {
            (_, ChangeAction::Delete) => {
                // Undoing a delete resurrects the tombstoned state
                state.deleted = false;
            }
            (Some(field), ChangeAction::Create) if record.before.is_null() => {
                state.cells.remove(field);
            }
            (Some(field), _) => {
                state.set_cell(
                    field.clone(),
                    CellValue::Single(ContextualValue::new(
                        record.before.clone(),
                        context.clone(),
                    )),
                );
            }
            (None, ChangeAction::Create) => {
                // The entity did not exist before
                state.cells.clear();
                state.deleted = true;
            }
            (None, _) => {
                state.replace_from_object(&record.before, context);
            }
        }

        state.version += 1;
        state.updated_at = record.created_at;
    }

    /// Merge resolved cells into an entity (sync application). Superposed
    /// cells land here; a single null value removes the field; versions
    /// bump once per call.
    pub fn merge_cells(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        cells: BTreeMap<FieldName, CellValue>,
        at: Timestamp,
    ) {
        let state = self.entry(entity_type, entity_id, at);
        for (field, cell) in cells {
            match &cell {
                CellValue::Single(cv) if cv.value.is_null() => {
                    state.cells.remove(&field);
                }
                _ => {
                    state.cells.insert(field, cell);
                }
            }
        }
        state.deleted = false;
        state.version += 1;
        state.updated_at = at;
    }

    /// Tombstone an entity (sync application of a remote delete).
    pub fn mark_deleted(&mut self, entity_id: &str, at: Timestamp) {
        if let Some(state) = self.get_mut(entity_id) {
            state.deleted = true;
            state.version += 1;
            state.updated_at = at;
        }
    }
}
