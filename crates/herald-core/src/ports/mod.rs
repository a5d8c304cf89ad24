//! Ports - 抽象化レイヤー
//!
//! 外部システム（PostgreSQL, Matrix homeserver）への境界を trait で定義する。
//! app 層はこれらの trait だけに依存し、実装は impls に置く。
//!
//! # 設計原則
//! - PostgreSQL が source of truth（claim の状態はすべてここにある）
//! - claim は単一の条件付き upsert（read-then-write はしない）
//! - Matrix 側は join / send / joined_rooms / membership 同期の4操作だけ

pub mod claim_store;
pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod outbox_source;
pub mod platform;

pub use self::claim_store::ClaimStore;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::outbox_source::OutboxSource;
pub use self::platform::{
    Membership, MembershipEvent, MessageContent, PlatformClient, SyncBatch,
};
