//! InMemoryOutbox - 開発・テスト用の outbox テーブル群
//!
//! - table 名ごとに行を保持し、id 順で `limit` 件返す
//! - 補償イベントは `adapter_table` に追記する
//! - `set_unavailable(true)` でクエリ障害を再現できる
//! - `with_claims` で claim store を渡すと、終端状態の行を返さない
//!   （PgStore の LEFT JOIN と同じ挙動）。渡さなければ全行を返す

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::InMemoryClaimStore;
use crate::domain::{DeliveryFailed, EventId, OutboxRecord, StoreError};
use crate::ports::{Clock, EventSink, IdGenerator, OutboxSource, SystemClock, UlidGenerator};

pub struct InMemoryOutbox {
    tables: Mutex<HashMap<String, Vec<OutboxRecord>>>,
    adapter_table: String,
    clock: Arc<dyn Clock>,
    id_gen: Box<dyn IdGenerator>,
    unavailable: AtomicBool,
    claims: Option<Arc<InMemoryClaimStore>>,
}

impl InMemoryOutbox {
    pub fn new(adapter_table: impl Into<String>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            adapter_table: adapter_table.into(),
            clock: Arc::new(SystemClock),
            id_gen: Box::new(UlidGenerator::new(SystemClock)),
            unavailable: AtomicBool::new(false),
            claims: None,
        }
    }

    /// Hide rows whose event has converged in `claims`.
    pub fn with_claims(mut self, claims: Arc<InMemoryClaimStore>) -> Self {
        self.claims = Some(claims);
        self
    }

    async fn is_converged(&self, record: &OutboxRecord) -> bool {
        let Some(claims) = &self.claims else {
            return false;
        };
        let Ok(event_id) = EventId::parse(&record.id) else {
            return false;
        };
        claims
            .get(&event_id)
            .await
            .is_some_and(|state| state.status.is_terminal())
    }

    /// Producer side: append a row to `table`.
    pub async fn insert(&self, table: &str, record: OutboxRecord) {
        let mut tables = self.tables.lock().await;
        tables.entry(table.to_string()).or_default().push(record);
    }

    pub async fn rows(&self, table: &str) -> Vec<OutboxRecord> {
        let tables = self.tables.lock().await;
        tables.get(table).cloned().unwrap_or_default()
    }

    /// Compensating events written so far, decoded.
    pub async fn delivery_failures(&self) -> Vec<DeliveryFailed> {
        self.rows(&self.adapter_table)
            .await
            .into_iter()
            .filter(|r| r.event_type == DeliveryFailed::EVENT_TYPE)
            .filter_map(|r| serde_json::from_slice(&r.payload).ok())
            .collect()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory outbox disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxSource for InMemoryOutbox {
    async fn fetch_batch(&self, table: &str, limit: u32) -> Result<Vec<OutboxRecord>, StoreError> {
        self.check_available()?;
        let mut rows = self.rows(table).await;
        rows.sort_by(|a, b| a.id.cmp(&b.id));

        let mut batch = Vec::new();
        for record in rows {
            if batch.len() == limit as usize {
                break;
            }
            if !self.is_converged(&record).await {
                batch.push(record);
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl EventSink for InMemoryOutbox {
    async fn emit(&self, event: &DeliveryFailed) -> Result<EventId, StoreError> {
        self.check_available()?;
        let id = self.id_gen.generate_event_id();
        let payload = serde_json::to_vec(event)?;
        let record = OutboxRecord::new(
            id.to_string(),
            DeliveryFailed::EVENT_TYPE,
            payload,
            self.clock.now(),
        );
        self.insert(&self.adapter_table, record).await;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ClaimStore;
    use chrono::Utc;

    fn row(id: &str) -> OutboxRecord {
        OutboxRecord::new(id, "Test", b"{}".to_vec(), Utc::now())
    }

    #[tokio::test]
    async fn fetch_returns_oldest_ids_first_up_to_limit() {
        let outbox = InMemoryOutbox::new("adapter_outbox");
        for id in ["c", "a", "d", "b"] {
            outbox.insert("events", row(id)).await;
        }

        let batch = outbox.fetch_batch("events", 3).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn unknown_table_is_an_empty_batch() {
        let outbox = InMemoryOutbox::new("adapter_outbox");
        assert!(outbox.fetch_batch("nope", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn emitted_events_land_in_adapter_table() {
        let outbox = InMemoryOutbox::new("adapter_outbox");
        let original = EventId::parse("6f1c2f4e-8a47-4c41-9d4b-7f0e4f0b2a10").unwrap();

        let new_id = outbox
            .emit(&DeliveryFailed::new(original, 3, "boom"))
            .await
            .unwrap();

        let rows = outbox.rows("adapter_outbox").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, new_id.to_string());
        assert_eq!(rows[0].event_type, "DeliveryFailed");

        let failures = outbox.delivery_failures().await;
        assert_eq!(failures[0].original_event_id, original);
    }

    #[tokio::test]
    async fn converged_rows_are_hidden_when_claims_are_attached() {
        let claims = Arc::new(InMemoryClaimStore::new());
        let outbox = InMemoryOutbox::new("adapter_outbox").with_claims(claims.clone());
        let sent = "00000000-0000-4000-8000-000000000001";
        let failed = "00000000-0000-4000-8000-000000000002";
        let pending = "00000000-0000-4000-8000-000000000003";
        for id in [sent, failed, pending, "not-a-uuid"] {
            outbox.insert("events", row(id)).await;
        }

        for id in [sent, failed, pending] {
            claims.claim(&EventId::parse(id).unwrap()).await.unwrap();
        }
        claims.mark_sent(&EventId::parse(sent).unwrap()).await.unwrap();
        claims
            .mark_failed(&EventId::parse(failed).unwrap(), "gave up")
            .await
            .unwrap();

        let batch = outbox.fetch_batch("events", 10).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec![pending, "not-a-uuid"]);

        let limited = outbox.fetch_batch("events", 1).await.unwrap();
        assert_eq!(limited[0].id, pending);
    }

    #[tokio::test]
    async fn without_claims_every_row_is_returned() {
        let outbox = InMemoryOutbox::new("adapter_outbox");
        let claims = InMemoryClaimStore::new();
        let id = "00000000-0000-4000-8000-000000000001";
        outbox.insert("events", row(id)).await;
        claims.claim(&EventId::parse(id).unwrap()).await.unwrap();
        claims.mark_sent(&EventId::parse(id).unwrap()).await.unwrap();

        assert_eq!(outbox.fetch_batch("events", 10).await.unwrap().len(), 1);
    }
}
