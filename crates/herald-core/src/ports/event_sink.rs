//! EventSink port - 補償イベントの書き戻し
//!
//! 恒久失敗した event ごとに `DeliveryFailed` を 1 件、outbox テーブルに追加する。

use async_trait::async_trait;

use crate::domain::{DeliveryFailed, EventId, StoreError};

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append the compensating event; returns the id of the new outbox row.
    async fn emit(&self, event: &DeliveryFailed) -> Result<EventId, StoreError>;
}
