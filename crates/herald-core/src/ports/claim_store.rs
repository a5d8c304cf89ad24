//! ClaimStore port - event ごとの配送状態（正本）

use async_trait::async_trait;

use crate::domain::{ClaimOutcome, EventId, StoreError};

/// ClaimStore は event の claim / 終端化を管理する
///
/// # 設計原則
/// - `claim` は「行がなければ attempts=1 で作成、あれば status が終端でない場合に
///   限り attempts+1」を 1 回の原子的な操作で行う
/// - 終端（sent / failed）の行に対する claim は何も変更せず `AlreadyTerminal`
/// - mark_* は claim 済みの行だけを更新する。attempts は触らない
/// - 行は削除しない
#[async_trait]
pub trait ClaimStore: Send + Sync {
    async fn claim(&self, event_id: &EventId) -> Result<ClaimOutcome, StoreError>;

    /// status = sent, last_error = NULL
    async fn mark_sent(&self, event_id: &EventId) -> Result<(), StoreError>;

    /// status = pending, last_error = error
    async fn mark_retry(&self, event_id: &EventId, error: &str) -> Result<(), StoreError>;

    /// status = failed, last_error = error
    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), StoreError>;
}
