//! Impls - ports の実装
//!
//! # 本番用
//! - **PgStore**: ClaimStore / OutboxSource / EventSink を PostgreSQL で
//! - **MatrixClient**: PlatformClient を Matrix client-server API で
//!
//! # 開発・テスト用
//! - **InMemoryClaimStore** / **InMemoryOutbox** / **InMemoryPlatform**
//!   （障害注入つき。DB やネットワークなしで poll cycle を動かせる）

pub mod inmem_outbox;
pub mod inmem_platform;
pub mod inmem_store;
pub mod matrix;
pub mod postgres;

pub use self::inmem_outbox::InMemoryOutbox;
pub use self::inmem_platform::InMemoryPlatform;
pub use self::inmem_store::InMemoryClaimStore;
pub use self::matrix::MatrixClient;
pub use self::postgres::{PgStore, is_valid_table_name};
