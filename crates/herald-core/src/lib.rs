//! herald-core
//!
//! Outbox テーブルのイベントを Matrix の room へ届ける配送パイプライン。
//! at-least-once、retry 予算つき、恒久失敗は補償イベントで通知する。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, claim state, message, decision, errors, events）
//! - **transform**: payload → CanonicalMessage の純粋関数
//! - **ports**: 抽象化レイヤー（ClaimStore, OutboxSource, EventSink, PlatformClient, Clock）
//! - **impls**: 実装（PgStore, MatrixClient, 開発・テスト用の in-memory 版）
//! - **app**: アプリケーションロジック（poller, dispatcher, membership sync, builder）
//! - **config**: 起動時設定と検証

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod transform;

pub use self::app::{App, AppBuilder, RunningApp};
pub use self::config::{ConfigError, RelayConfig};
