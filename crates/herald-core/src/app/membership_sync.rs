//! MembershipSync - platform の membership ストリームを消費するタスク
//!
//! 起動時に joined-room のスナップショットを取り、その後は long-poll で
//! 自分宛ての invite を待つ。join の結果は Dispatcher 経由で共有集合に入る。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::dispatcher::MessageDispatcher;
use super::sleep_or_shutdown;

/// Pause before the next sync after a platform error.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(5);

pub struct MembershipSync {
    dispatcher: Arc<MessageDispatcher>,
    error_backoff: Duration,
}

impl MembershipSync {
    pub fn new(dispatcher: Arc<MessageDispatcher>) -> Self {
        Self {
            dispatcher,
            error_backoff: DEFAULT_ERROR_BACKOFF,
        }
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        match self.dispatcher.load_joined_rooms().await {
            Ok(count) => info!(count, "loaded joined rooms"),
            Err(error) => warn!(%error, "could not load joined rooms, continuing with sync"),
        }

        let platform = Arc::clone(self.dispatcher.platform());
        let mut since: Option<String> = None;
        loop {
            if *shutdown.borrow() {
                break;
            }
            // long-poll は shutdown と競合させる（待ち続けない）
            let result = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                result = platform.sync_membership(since.as_deref()) => result,
            };

            match result {
                Ok(batch) => {
                    debug!(events = batch.events.len(), next_batch = %batch.next_batch, "membership sync");
                    for event in &batch.events {
                        self.dispatcher.handle_membership_event(event).await;
                    }
                    since = Some(batch.next_batch);
                }
                Err(error) => {
                    warn!(%error, "membership sync failed");
                    if sleep_or_shutdown(self.error_backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        info!("membership sync stopped");
    }
}
