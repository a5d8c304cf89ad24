//! Domain model (ids, claim state, records, messages, errors, decisions).
//!
//! ここにはストアやネットワークへの依存を置かない。
//! - ids: EventId（outbox の id と claim テーブルの event_id は同じ値）
//! - state / record: claim の状態機械と、outbox から読んだ行
//! - message: 変換後の CanonicalMessage
//! - events: 恒久失敗時に書き戻す補償イベント
//! - decision: attempts と予算からの純粋な判定

pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod record;
pub mod state;

pub use decision::{Decision, RetryBudget};
pub use errors::{DispatchError, ErrorKind, PlatformError, StoreError, TransformError};
pub use events::DeliveryFailed;
pub use ids::EventId;
pub use message::{CanonicalMessage, MessageFormat};
pub use record::{ClaimOutcome, ClaimState, OutboxRecord};
pub use state::ClaimStatus;
