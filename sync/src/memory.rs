//! In-memory adapter implementations.
//!
//! Useful on their own for embedding and indispensable for tests: a full
//! sync/rewind stack can run against them with no network. All three honor
//! the adapter contracts exactly, including append-only, id-deduplicated
//! log semantics, and can simulate outages for failure-path tests.

use crate::adapter::{
    ActivityLog, ActivityQuery, AdapterError, AdapterResult, Identity, RemoteRecord, RemoteStore,
};
use crate::schema::RemoteSchema;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tether_engine::{Agent, ChangeRecord, EntityId, Timestamp};

/// An append-only, id-deduplicated activity log held in memory.
#[derive(Default)]
pub struct MemoryActivityLog {
    records: RwLock<Vec<ChangeRecord>>,
    unavailable: AtomicBool,
}

impl MemoryActivityLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage; all calls fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.read().expect("log lock poisoned").len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> AdapterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AdapterError::Unavailable("activity log offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ActivityLog for MemoryActivityLog {
    async fn append(&self, record: &ChangeRecord) -> AdapterResult<()> {
        self.check_available()?;
        let mut records = self.records.write().expect("log lock poisoned");
        // At-least-once delivery upstream; dedupe by id here
        if !records.iter().any(|r| r.id == record.id) {
            records.push(record.clone());
        }
        Ok(())
    }

    async fn query(&self, query: &ActivityQuery) -> AdapterResult<Vec<ChangeRecord>> {
        self.check_available()?;
        let records = self.records.read().expect("log lock poisoned");

        let mut matched: Vec<ChangeRecord> = records
            .iter()
            .filter(|r| {
                query
                    .entity_id
                    .as_ref()
                    .map_or(true, |id| &r.entity_id == id)
                    && query.start.map_or(true, |start| r.created_at >= start)
                    && query.end.map_or(true, |end| r.created_at <= end)
                    && query.action.map_or(true, |action| r.action == action)
            })
            .cloned()
            .collect();
        matched.sort();

        let offset = query.offset.unwrap_or(0);
        let matched: Vec<ChangeRecord> = match query.limit {
            Some(limit) => matched.into_iter().skip(offset).take(limit).collect(),
            None => matched.into_iter().skip(offset).collect(),
        };

        Ok(matched)
    }

    async fn snapshot_at(
        &self,
        entity_id: &str,
        at: Timestamp,
    ) -> AdapterResult<Option<ChangeRecord>> {
        self.check_available()?;
        let records = self.records.read().expect("log lock poisoned");
        let mut candidates: Vec<&ChangeRecord> = records
            .iter()
            .filter(|r| r.entity_id == entity_id && r.created_at <= at)
            .collect();
        candidates.sort();
        Ok(candidates.last().map(|r| (*r).clone()))
    }
}

/// An in-memory remote tabular store.
#[derive(Default)]
pub struct MemoryRemoteStore {
    schema: RwLock<RemoteSchema>,
    tables: RwLock<BTreeMap<String, BTreeMap<EntityId, serde_json::Value>>>,
    unavailable: AtomicBool,
    write_count: std::sync::atomic::AtomicUsize,
}

impl MemoryRemoteStore {
    /// Create a store exposing the given schema.
    pub fn new(schema: RemoteSchema) -> Self {
        Self {
            schema: RwLock::new(schema),
            ..Self::default()
        }
    }

    /// Simulate an outage; all calls fail with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Seed or overwrite a record directly (a "remote edit").
    pub fn put(&self, table: &str, id: impl Into<EntityId>, payload: serde_json::Value) {
        self.tables
            .write()
            .expect("store lock poisoned")
            .entry(table.to_string())
            .or_default()
            .insert(id.into(), payload);
    }

    /// Read one record's payload back.
    pub fn get(&self, table: &str, id: &str) -> Option<serde_json::Value> {
        self.tables
            .read()
            .expect("store lock poisoned")
            .get(table)?
            .get(id)
            .cloned()
    }

    /// Remove a record directly (a "remote delete").
    pub fn remove(&self, table: &str, id: &str) {
        if let Some(records) = self
            .tables
            .write()
            .expect("store lock poisoned")
            .get_mut(table)
        {
            records.remove(id);
        }
    }

    /// How many writes the core issued; sync idempotence tests watch this.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> AdapterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(AdapterError::Unavailable("remote store offline".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_schema(&self) -> AdapterResult<RemoteSchema> {
        self.check_available()?;
        Ok(self.schema.read().expect("store lock poisoned").clone())
    }

    async fn fetch_records(&self, table: &str) -> AdapterResult<Vec<RemoteRecord>> {
        self.check_available()?;
        let tables = self.tables.read().expect("store lock poisoned");
        Ok(tables
            .get(table)
            .map(|records| {
                records
                    .iter()
                    .map(|(id, payload)| RemoteRecord::new(id.clone(), payload.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn write_record(&self, table: &str, record: &RemoteRecord) -> AdapterResult<()> {
        self.check_available()?;
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.put(table, record.id.clone(), record.payload.clone());
        Ok(())
    }

    async fn delete_record(&self, table: &str, id: &str) -> AdapterResult<()> {
        self.check_available()?;
        self.write_count.fetch_add(1, Ordering::SeqCst);
        self.remove(table, id);
        Ok(())
    }
}

/// An identity adapter that always answers with the same agent.
pub struct StaticIdentity {
    agent: Agent,
    unavailable: AtomicBool,
}

impl StaticIdentity {
    /// Identity for a named user.
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            agent: Agent::User(name.into()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Identity for the system agent.
    pub fn system() -> Self {
        Self {
            agent: Agent::System,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an identity outage; callers must fall back to
    /// [`Agent::System`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl Identity for StaticIdentity {
    async fn current_agent(&self) -> AdapterResult<Agent> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable("identity provider offline".into()));
        }
        Ok(self.agent.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tether_engine::ChangeAction;

    fn record(id: &str, entity_id: &str, at: Timestamp) -> ChangeRecord {
        ChangeRecord::new(
            id,
            "tasks",
            entity_id,
            ChangeAction::Update,
            json!("a"),
            json!("b"),
            Some("status".into()),
            Agent::System,
            at,
        )
    }

    #[tokio::test]
    async fn append_dedupes_by_id() {
        let log = MemoryActivityLog::new();
        let r = record("ch_1", "rec_1", 1000);
        log.append(&r).await.unwrap();
        log.append(&r).await.unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn query_filters_and_orders() {
        let log = MemoryActivityLog::new();
        log.append(&record("ch_2", "rec_1", 2000)).await.unwrap();
        log.append(&record("ch_1", "rec_1", 1000)).await.unwrap();
        log.append(&record("ch_3", "rec_2", 1500)).await.unwrap();

        let all = log
            .query(&ActivityQuery::for_entity("rec_1"))
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "ch_1"); // oldest first
        assert_eq!(all[1].id, "ch_2");

        let bounded = log
            .query(&ActivityQuery::for_entity("rec_1").until(1500))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 1);

        let limited = log
            .query(&ActivityQuery::default().limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[tokio::test]
    async fn snapshot_at_picks_last_at_or_before() {
        let log = MemoryActivityLog::new();
        log.append(&record("ch_1", "rec_1", 1000)).await.unwrap();
        log.append(&record("ch_2", "rec_1", 2000)).await.unwrap();

        let hit = log.snapshot_at("rec_1", 1500).await.unwrap().unwrap();
        assert_eq!(hit.id, "ch_1");

        let exact = log.snapshot_at("rec_1", 2000).await.unwrap().unwrap();
        assert_eq!(exact.id, "ch_2");

        assert!(log.snapshot_at("rec_1", 500).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn outage_simulation() {
        let log = MemoryActivityLog::new();
        log.set_unavailable(true);
        let err = log.append(&record("ch_1", "rec_1", 1000)).await.unwrap_err();
        assert!(err.is_transient());

        log.set_unavailable(false);
        assert!(log.append(&record("ch_1", "rec_1", 1000)).await.is_ok());
    }

    #[tokio::test]
    async fn remote_store_roundtrip() {
        let store = MemoryRemoteStore::new(RemoteSchema::new());
        store
            .write_record("tasks", &RemoteRecord::new("rec_1", json!({"name": "Ship"})))
            .await
            .unwrap();

        let records = store.fetch_records("tasks").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].payload, json!({"name": "Ship"}));

        store.delete_record("tasks", "rec_1").await.unwrap();
        assert!(store.fetch_records("tasks").await.unwrap().is_empty());
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn identity_fallback_path() {
        let identity = StaticIdentity::user("kim");
        assert_eq!(
            identity.current_agent().await.unwrap(),
            Agent::User("kim".into())
        );

        identity.set_unavailable(true);
        assert!(identity.current_agent().await.is_err());
    }
}
