//! Change records: one atomic observation of a mutation.
//!
//! Changes are expressed as immutable records, not direct mutations. Every
//! record carries before/after values with their checksums, so no-op edits
//! are detectable without deep comparison and history can be replayed from
//! the log alone.

use crate::{
    checksum::checksum, context::Agent, ChangeId, EntityId, EntityType, FieldName, Fingerprint,
    Timestamp,
};
use serde::{Deserialize, Serialize};

/// What kind of mutation a record captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
    /// Applied by a reconciliation pass
    Sync,
    /// Applied by restoring a past snapshot
    Rewind,
}

/// An immutable record of a single field or entity mutation.
///
/// Created once at the moment of mutation, never modified afterwards,
/// eventually appended to the activity log. Delivery is at-least-once, so
/// consumers deduplicate by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Globally unique, time-ordered id
    pub id: ChangeId,
    /// Entity type (table) the change belongs to
    pub entity_type: EntityType,
    /// Entity the change belongs to
    pub entity_id: EntityId,
    /// Field that changed; None for whole-entity mutations
    pub field: Option<FieldName>,
    /// Kind of mutation
    pub action: ChangeAction,
    /// Value before the mutation
    pub before: serde_json::Value,
    /// Value after the mutation
    pub after: serde_json::Value,
    /// Checksum of `before`
    pub before_checksum: Fingerprint,
    /// Checksum of `after`
    pub after_checksum: Fingerprint,
    /// Who made the change
    pub agent: Agent,
    /// When the record was created (milliseconds since epoch)
    pub created_at: Timestamp,
    /// Resolution metadata for sync records (outcome, winner, collapse)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<serde_json::Value>,
}

impl ChangeRecord {
    /// Create a record, computing both checksums.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<ChangeId>,
        entity_type: impl Into<EntityType>,
        entity_id: impl Into<EntityId>,
        action: ChangeAction,
        before: serde_json::Value,
        after: serde_json::Value,
        field: Option<FieldName>,
        agent: Agent,
        created_at: Timestamp,
    ) -> Self {
        let before_checksum = checksum(&before);
        let after_checksum = checksum(&after);
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            field,
            action,
            before,
            after,
            before_checksum,
            after_checksum,
            agent,
            created_at,
            resolution: None,
        }
    }

    /// Attach resolution metadata (sync records).
    pub fn with_resolution(mut self, resolution: serde_json::Value) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Whether before and after are equal under checksum.
    pub fn is_noop(&self) -> bool {
        self.before_checksum == self.after_checksum
    }
}

/// Creation order: records sort by (created_at, id). Ids are time-ordered
/// at generation, so this matches the order the tracker produced them.
impl Ord for ChangeRecord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match self.created_at.cmp(&other.created_at) {
            std::cmp::Ordering::Equal => self.id.cmp(&other.id),
            other => other,
        }
    }
}

impl PartialOrd for ChangeRecord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for ChangeRecord {}
