//! PgStore - PostgreSQL 実装（本番用）
//!
//! 1 つの pool で 3 つの port を実装する:
//! - ClaimStore: `adapter_event_state` への条件付き upsert
//! - OutboxSource: producer の outbox テーブルを id 順に読む
//! - EventSink: 補償イベントを adapter 用 outbox テーブルへ書く
//!
//! # 設計原則
//! - claim は単一の `INSERT .. ON CONFLICT DO UPDATE .. WHERE .. RETURNING`
//!   （行が返らなければ終端）
//! - mark_* は `status = 'pending'` の行だけを更新する
//! - テーブル名は bind できないので、検証済みの名前だけを埋め込む

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{Column, Row, TypeInfo};

use crate::domain::{ClaimOutcome, ClaimStatus, DeliveryFailed, EventId, OutboxRecord, StoreError};
use crate::ports::{
    ClaimStore, Clock, EventSink, IdGenerator, OutboxSource, SystemClock, UlidGenerator,
};

const MAX_CONNECTIONS: u32 = 10;
const MAX_LIFETIME: Duration = Duration::from_secs(30 * 60);

/// True when `name` only contains `[A-Za-z0-9_.]` (and is not empty).
///
/// The dot allows schema-qualified names such as `billing.outbox`.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn checked_table(name: &str) -> Result<&str, StoreError> {
    if is_valid_table_name(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidTableName(name.to_string()))
    }
}

const CLAIM_SQL: &str = r#"
    INSERT INTO adapter_event_state (event_id, attempts, status, last_error, updated_at)
    VALUES ($1, 1, $2, NULL, $3)
    ON CONFLICT (event_id) DO UPDATE
    SET attempts = adapter_event_state.attempts + 1,
        status = $2,
        updated_at = $3
    WHERE adapter_event_state.status NOT IN ($4, $5)
    RETURNING attempts
"#;

const SETTLE_SQL: &str = r#"
    UPDATE adapter_event_state
    SET status = $2,
        last_error = $3,
        updated_at = $4
    WHERE event_id = $1
      AND status = $5
"#;

fn fetch_batch_sql(table: &str) -> String {
    format!(
        r#"
    SELECT o.id::text AS id,
           o.event_type,
           o.payload,
           o.created_at
    FROM {table} o
    LEFT JOIN adapter_event_state s ON s.event_id::text = o.id::text
    WHERE s.status IS NULL OR s.status NOT IN ($2, $3)
    ORDER BY o.id
    LIMIT $1
"#
    )
}

fn emit_sql(table: &str) -> String {
    format!(
        r#"
    INSERT INTO {table} (id, event_type, payload, created_at)
    VALUES ($1, $2, $3, $4)
"#
    )
}

pub struct PgStore {
    pool: PgPool,
    adapter_outbox_table: String,
    clock: Arc<dyn Clock>,
    id_gen: Box<dyn IdGenerator>,
}

impl PgStore {
    /// Open a pool and wrap it.
    pub async fn connect(database_url: &str, adapter_outbox_table: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .max_lifetime(Some(MAX_LIFETIME))
            .connect(database_url)
            .await?;
        Self::new(pool, adapter_outbox_table)
    }

    pub fn new(pool: PgPool, adapter_outbox_table: &str) -> Result<Self, StoreError> {
        let table = checked_table(adapter_outbox_table)?;
        Ok(Self {
            pool,
            adapter_outbox_table: table.to_string(),
            clock: Arc::new(SystemClock),
            id_gen: Box::new(UlidGenerator::new(SystemClock)),
        })
    }

    /// Create the claim table if needed.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn settle(
        &self,
        event_id: &EventId,
        status: ClaimStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(SETTLE_SQL)
            .bind(event_id.as_uuid())
            .bind(status.as_str())
            .bind(last_error)
            .bind(self.clock.now())
            .bind(ClaimStatus::Pending.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// How the producer stores its payload column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PayloadColumn {
    Bytes,
    Json,
    Text,
}

impl PayloadColumn {
    fn from_type_name(name: &str) -> Self {
        match name {
            "BYTEA" => PayloadColumn::Bytes,
            "JSON" | "JSONB" => PayloadColumn::Json,
            _ => PayloadColumn::Text,
        }
    }
}

fn payload_from_row(row: &PgRow) -> Result<Vec<u8>, StoreError> {
    let column = row.try_column("payload")?;
    Ok(match PayloadColumn::from_type_name(column.type_info().name()) {
        PayloadColumn::Bytes => row.try_get::<Vec<u8>, _>("payload")?,
        PayloadColumn::Json => {
            let value: serde_json::Value = row.try_get("payload")?;
            serde_json::to_vec(&value)?
        }
        PayloadColumn::Text => row.try_get::<String, _>("payload")?.into_bytes(),
    })
}

fn record_from_row(row: &PgRow) -> Result<OutboxRecord, StoreError> {
    let id: String = row.try_get("id")?;
    let event_type: String = row.try_get("event_type")?;
    let payload = payload_from_row(row)?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(OutboxRecord::new(id, event_type, payload, created_at))
}

/// The claim table never holds fewer than one attempt.
fn claimed_attempts(raw: i32) -> Result<u32, StoreError> {
    match u32::try_from(raw) {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(StoreError::CorruptState(format!("attempts = {raw}"))),
    }
}

#[async_trait]
impl ClaimStore for PgStore {
    async fn claim(&self, event_id: &EventId) -> Result<ClaimOutcome, StoreError> {
        let attempts: Option<i32> = sqlx::query_scalar(CLAIM_SQL)
            .bind(event_id.as_uuid())
            .bind(ClaimStatus::Pending.as_str())
            .bind(self.clock.now())
            .bind(ClaimStatus::Sent.as_str())
            .bind(ClaimStatus::Failed.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(match attempts {
            Some(n) => ClaimOutcome::Claimed {
                attempts: claimed_attempts(n)?,
            },
            None => ClaimOutcome::AlreadyTerminal,
        })
    }

    async fn mark_sent(&self, event_id: &EventId) -> Result<(), StoreError> {
        self.settle(event_id, ClaimStatus::Sent, None).await
    }

    async fn mark_retry(&self, event_id: &EventId, error: &str) -> Result<(), StoreError> {
        self.settle(event_id, ClaimStatus::Pending, Some(error)).await
    }

    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), StoreError> {
        self.settle(event_id, ClaimStatus::Failed, Some(error)).await
    }
}

#[async_trait]
impl OutboxSource for PgStore {
    async fn fetch_batch(&self, table: &str, limit: u32) -> Result<Vec<OutboxRecord>, StoreError> {
        let sql = fetch_batch_sql(checked_table(table)?);
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .bind(ClaimStatus::Sent.as_str())
            .bind(ClaimStatus::Failed.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }
}

#[async_trait]
impl EventSink for PgStore {
    async fn emit(&self, event: &DeliveryFailed) -> Result<EventId, StoreError> {
        let id = self.id_gen.generate_event_id();
        sqlx::query(&emit_sql(&self.adapter_outbox_table))
            .bind(id.as_uuid())
            .bind(DeliveryFailed::EVENT_TYPE)
            .bind(Json(event))
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;
        Ok(id)
    }
}
