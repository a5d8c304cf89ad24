//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）: 足りない port があれば build() で止める
//! - 停止は watch チャネルで全タスクに伝え、期限つきで join する

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{info, warn};

use super::dispatcher::MessageDispatcher;
use super::membership_sync::MembershipSync;
use super::poller::{OutboxPoller, PollerSettings};
use crate::config::RelayConfig;
use crate::ports::{ClaimStore, EventSink, OutboxSource, PlatformClient};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let store = Arc::new(PgStore::connect(&url, "adapter_outbox").await?);
/// let app = AppBuilder::from_config(&config)
///     .claim_store(store.clone())
///     .outbox_source(store.clone())
///     .event_sink(store)
///     .platform(Arc::new(matrix))
///     .build()?;
/// let running = app.start();
/// ```
pub struct AppBuilder {
    settings: PollerSettings,
    allowed_rooms: Vec<String>,
    claims: Option<Arc<dyn ClaimStore>>,
    source: Option<Arc<dyn OutboxSource>>,
    sink: Option<Arc<dyn EventSink>>,
    platform: Option<Arc<dyn PlatformClient>>,
    sync_error_backoff: Option<Duration>,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("missing component: {0}. Register it on the builder before build().")]
    MissingComponent(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("tasks did not stop within {0:?}")]
    Timeout(Duration),

    #[error("task panicked or was cancelled: {0}")]
    Join(#[from] JoinError),
}

impl AppBuilder {
    pub fn new(settings: PollerSettings) -> Self {
        Self {
            settings,
            allowed_rooms: Vec::new(),
            claims: None,
            source: None,
            sink: None,
            platform: None,
            sync_error_backoff: None,
        }
    }

    /// Poller settings and allow-list taken from a validated config.
    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(PollerSettings::from_config(config)).allowed_rooms(config.allowed_rooms.clone())
    }

    pub fn allowed_rooms(mut self, rooms: Vec<String>) -> Self {
        self.allowed_rooms = rooms;
        self
    }

    pub fn claim_store(mut self, claims: Arc<dyn ClaimStore>) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn outbox_source(mut self, source: Arc<dyn OutboxSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn platform(mut self, platform: Arc<dyn PlatformClient>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn sync_error_backoff(mut self, backoff: Duration) -> Self {
        self.sync_error_backoff = Some(backoff);
        self
    }

    /// Wire every component. Nothing is started yet.
    pub fn build(self) -> Result<App, BuildError> {
        let claims = self.claims.ok_or(BuildError::MissingComponent("claim store"))?;
        let source = self
            .source
            .ok_or(BuildError::MissingComponent("outbox source"))?;
        let sink = self.sink.ok_or(BuildError::MissingComponent("event sink"))?;
        let platform = self
            .platform
            .ok_or(BuildError::MissingComponent("platform client"))?;

        let dispatcher = Arc::new(MessageDispatcher::new(platform, &self.allowed_rooms));
        let poller = Arc::new(OutboxPoller::new(
            source,
            claims,
            sink,
            Arc::clone(&dispatcher),
            self.settings,
        ));
        let mut sync = MembershipSync::new(Arc::clone(&dispatcher));
        if let Some(backoff) = self.sync_error_backoff {
            sync = sync.with_error_backoff(backoff);
        }

        Ok(App {
            dispatcher,
            poller,
            sync,
        })
    }
}

/// App は配線済みで未起動のアプリケーション
pub struct App {
    dispatcher: Arc<MessageDispatcher>,
    poller: Arc<OutboxPoller>,
    sync: MembershipSync,
}

impl App {
    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    pub fn poller(&self) -> &Arc<OutboxPoller> {
        &self.poller
    }

    /// Spawn the poll loop and the membership sync.
    pub fn start(self) -> RunningApp {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let poller = tokio::spawn(Arc::clone(&self.poller).run(shutdown_rx.clone()));
        let sync = tokio::spawn(self.sync.run(shutdown_rx));
        info!("herald started");

        RunningApp {
            shutdown_tx,
            joins: vec![poller, sync],
            dispatcher: self.dispatcher,
        }
    }
}

/// Handle to the running tasks.
pub struct RunningApp {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
    dispatcher: Arc<MessageDispatcher>,
}

impl RunningApp {
    pub fn dispatcher(&self) -> &Arc<MessageDispatcher> {
        &self.dispatcher
    }

    /// Ask every task to stop. In-flight work is not interrupted.
    pub fn request_shutdown(&self) {
        // 受信側がすでに終わっていても問題ない
        let _ = self.shutdown_tx.send(true);
    }

    /// Request shutdown and wait up to `timeout` for both tasks.
    ///
    /// On timeout the tasks are left running detached; nothing is aborted.
    pub async fn shutdown(self, timeout: Duration) -> Result<(), ShutdownError> {
        self.request_shutdown();
        let joins = self.joins;
        let wait_all = async move {
            for join in joins {
                join.await?;
            }
            Ok::<(), ShutdownError>(())
        };
        match tokio::time::timeout(timeout, wait_all).await {
            Ok(result) => {
                result?;
                info!("herald stopped");
                Ok(())
            }
            Err(_) => {
                warn!(?timeout, "shutdown timed out");
                Err(ShutdownError::Timeout(timeout))
            }
        }
    }
}
