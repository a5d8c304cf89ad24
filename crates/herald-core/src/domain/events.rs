//! Events - 補償イベント
//!
//! 恒久失敗した event について、outbox テーブルへ `DeliveryFailed` を書き戻す。
//! 下流はこれを見て「配送されなかった」ことを知る。

use serde::{Deserialize, Serialize};

use super::EventId;

/// Adapter tag written into every compensating event.
pub const ADAPTER_TAG: &str = "adapter-matrix";

/// Compensating event emitted when an event exhausts its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailed {
    pub original_event_id: EventId,
    pub adapter: String,
    pub reason: String,
}

impl DeliveryFailed {
    /// `event_type` of the outbox row carrying this payload.
    pub const EVENT_TYPE: &'static str = "DeliveryFailed";

    pub fn new(original_event_id: EventId, max_retries: u32, last_error: &str) -> Self {
        Self {
            original_event_id,
            adapter: ADAPTER_TAG.to_string(),
            reason: format!("Matrix send failed after {max_retries} retries: {last_error}"),
        }
    }
}
