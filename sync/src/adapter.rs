//! Adapter traits for the external collaborators.
//!
//! The core depends on these contracts, never on a transport. Vendor REST
//! clients, database-backed logs, and auth providers all live behind these
//! traits; the in-memory implementations in [`crate::memory`] satisfy them
//! for tests and embedding.

use crate::schema::RemoteSchema;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tether_engine::{Agent, ChangeAction, ChangeRecord, EntityId, Timestamp};
use thiserror::Error;

/// Failures surfaced by adapters.
///
/// Transient conditions (rate limits, outages) are retried by the core;
/// permanent ones (bad credentials, rejected payloads) abort the operation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("rate limited{}", .retry_after_ms.map(|ms| format!(" (retry after {ms} ms)")).unwrap_or_default())]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rejected: {0}")]
    Rejected(String),
}

impl AdapterError {
    /// Whether the condition is expected to clear on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. } | AdapterError::Unavailable(_)
        )
    }
}

/// Result type for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// One record in the remote tabular store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    /// Record id, shared with the local entity id
    pub id: EntityId,
    /// Field values as a JSON object
    pub payload: serde_json::Value,
}

impl RemoteRecord {
    /// Create a remote record.
    pub fn new(id: impl Into<EntityId>, payload: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// The remote tabular store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the table/field definitions.
    async fn fetch_schema(&self) -> AdapterResult<RemoteSchema>;

    /// Fetch all records of one table.
    async fn fetch_records(&self, table: &str) -> AdapterResult<Vec<RemoteRecord>>;

    /// Create or update a record.
    async fn write_record(&self, table: &str, record: &RemoteRecord) -> AdapterResult<()>;

    /// Delete a record.
    async fn delete_record(&self, table: &str, id: &str) -> AdapterResult<()>;
}

/// Filters for querying the activity log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityQuery {
    /// Restrict to one entity
    pub entity_id: Option<EntityId>,
    /// Records created at or after this instant
    pub start: Option<Timestamp>,
    /// Records created at or before this instant
    pub end: Option<Timestamp>,
    /// Restrict to one action kind
    pub action: Option<ChangeAction>,
    /// Maximum records returned
    pub limit: Option<usize>,
    /// Records skipped before returning
    pub offset: Option<usize>,
}

impl ActivityQuery {
    /// Query for one entity's full history.
    pub fn for_entity(entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_id: Some(entity_id.into()),
            ..Self::default()
        }
    }

    /// Restrict to records at or before `end`.
    pub fn until(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }

    /// Restrict to records at or after `start`.
    pub fn since(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    /// Restrict to one action kind.
    pub fn with_action(mut self, action: ChangeAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Cap the number of returned records.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The append-only activity log.
///
/// The core never updates or deletes log entries; recovery is always a new
/// record. Appends are at-least-once, so implementations should treat the
/// record id as the deduplication key.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    /// Append one record.
    async fn append(&self, record: &ChangeRecord) -> AdapterResult<()>;

    /// Query records in creation order (oldest first).
    async fn query(&self, query: &ActivityQuery) -> AdapterResult<Vec<ChangeRecord>>;

    /// The last record for an entity at or before `at`.
    async fn snapshot_at(&self, entity_id: &str, at: Timestamp)
        -> AdapterResult<Option<ChangeRecord>>;
}

/// Resolves the acting agent.
#[async_trait]
pub trait Identity: Send + Sync {
    /// Who is acting right now. Callers substitute [`Agent::System`] when
    /// this fails; identity outages must never block a mutation.
    async fn current_agent(&self) -> AdapterResult<Agent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(AdapterError::RateLimited {
            retry_after_ms: Some(1000)
        }
        .is_transient());
        assert!(AdapterError::Unavailable("down".into()).is_transient());
        assert!(!AdapterError::Unauthorized("bad key".into()).is_transient());
        assert!(!AdapterError::Rejected("schema".into()).is_transient());
    }

    #[test]
    fn error_display() {
        let err = AdapterError::RateLimited {
            retry_after_ms: Some(250),
        };
        assert_eq!(err.to_string(), "rate limited (retry after 250 ms)");

        let err = AdapterError::RateLimited {
            retry_after_ms: None,
        };
        assert_eq!(err.to_string(), "rate limited");
    }

    #[test]
    fn query_builder() {
        let query = ActivityQuery::for_entity("rec_1")
            .until(5000)
            .with_action(ChangeAction::Rewind)
            .limit(10);
        assert_eq!(query.entity_id.as_deref(), Some("rec_1"));
        assert_eq!(query.end, Some(5000));
        assert_eq!(query.action, Some(ChangeAction::Rewind));
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.offset, None);
    }
}
