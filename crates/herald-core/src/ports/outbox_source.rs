//! OutboxSource port - producer が書いた outbox テーブルの読み出し

use async_trait::async_trait;

use crate::domain::{OutboxRecord, StoreError};

/// Reads batches of outbox rows, oldest id first.
///
/// Implementations never mutate the outbox tables they read.
#[async_trait]
pub trait OutboxSource: Send + Sync {
    async fn fetch_batch(&self, table: &str, limit: u32) -> Result<Vec<OutboxRecord>, StoreError>;
}
