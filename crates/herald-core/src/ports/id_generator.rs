//! IdGenerator port - ID 生成の抽象化
//!
//! 補償イベントの outbox 行に付ける id を生成する。
//! outbox は id 順に読まれるので、時刻順に並ぶ ULID を UUID として埋め込む。
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::EventId;
use crate::ports::Clock;
use ulid::Ulid;

/// # Thread Safety
/// - `Send + Sync` を要求（複数タスクから使える）
pub trait IdGenerator: Send + Sync {
    fn generate_event_id(&self) -> EventId;
}

/// UlidGenerator は Clock の時刻から ULID を作る
///
/// テスト時に FixedClock を渡すと、timestamp 部分が固定される。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_event_id(&self) -> EventId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        EventId::from_ulid(ulid)
    }
}
