//! OutboxPoller - poll cycle と retry 状態機械
//!
//! # フロー（1 行ごと、逐次）
//! 1. EventId::parse（不正な id はログを出して状態を変えずに skip）
//! 2. transform（失敗しても claim はする。予算を消費させるため）
//! 3. ClaimStore::claim（終端なら skip）
//! 4. Dispatcher::send → mark_sent、失敗なら RetryBudget で retry / give up
//!
//! # 失敗の範囲
//! - 1 行の transform / dispatch 失敗は、その行の状態遷移として記録するだけ
//! - 行の処理中の StoreError は、その table の残りを打ち切る
//! - fetch（バッチのクエリ）の失敗は cycle 全体を打ち切る

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::dispatcher::MessageDispatcher;
use super::sleep_or_shutdown;
use super::status::{CycleStats, EventOutcome};
use crate::config::RelayConfig;
use crate::domain::{
    ClaimOutcome, Decision, DeliveryFailed, ErrorKind, EventId, OutboxRecord, RetryBudget,
    StoreError,
};
use crate::ports::{ClaimStore, EventSink, OutboxSource};
use crate::transform::transform;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerSettings {
    pub tables: Vec<String>,
    pub batch_size: u32,
    pub poll_interval: Duration,
    pub max_retries: u32,
}

impl PollerSettings {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            tables: config.outbox_tables.clone(),
            batch_size: config.batch_size,
            poll_interval: config.poll_interval,
            max_retries: config.max_retries,
        }
    }
}

pub struct OutboxPoller {
    source: Arc<dyn OutboxSource>,
    claims: Arc<dyn ClaimStore>,
    sink: Arc<dyn EventSink>,
    dispatcher: Arc<MessageDispatcher>,
    settings: PollerSettings,
    budget: RetryBudget,
}

impl OutboxPoller {
    pub fn new(
        source: Arc<dyn OutboxSource>,
        claims: Arc<dyn ClaimStore>,
        sink: Arc<dyn EventSink>,
        dispatcher: Arc<MessageDispatcher>,
        settings: PollerSettings,
    ) -> Self {
        let budget = RetryBudget::new(settings.max_retries);
        Self {
            source,
            claims,
            sink,
            dispatcher,
            settings,
            budget,
        }
    }

    pub fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Poll on a fixed interval until shutdown is requested.
    ///
    /// An in-flight cycle always runs to completion.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            tables = ?self.settings.tables,
            interval_ms = self.settings.poll_interval.as_millis() as u64,
            max_retries = self.settings.max_retries,
            "outbox poller started"
        );
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.poll_once().await {
                Ok(stats) if stats.is_idle() => debug!("poll cycle found nothing"),
                Ok(stats) => info!(
                    fetched = stats.fetched,
                    sent = stats.sent,
                    retried = stats.retried,
                    failed = stats.failed,
                    skipped = stats.skipped,
                    errors = stats.errors,
                    "poll cycle finished"
                ),
                Err(error) => error!(%error, "poll cycle aborted"),
            }
            if sleep_or_shutdown(self.settings.poll_interval, &mut shutdown).await {
                break;
            }
        }
        info!("outbox poller stopped");
    }

    /// One pass over every configured table.
    ///
    /// Fails only when a batch query fails; the remaining tables then wait for
    /// the next cycle.
    pub async fn poll_once(&self) -> Result<CycleStats, StoreError> {
        let mut stats = CycleStats::default();
        for table in &self.settings.tables {
            let records = self
                .source
                .fetch_batch(table, self.settings.batch_size)
                .await?;
            stats.merge(self.poll_table(table, &records).await);
        }
        Ok(stats)
    }

    async fn poll_table(&self, table: &str, records: &[OutboxRecord]) -> CycleStats {
        let mut stats = CycleStats {
            fetched: records.len(),
            ..CycleStats::default()
        };
        for record in records {
            match self.process_event(record).await {
                Ok(outcome) => stats.record(outcome),
                Err(error) if error.kind() == ErrorKind::Rejected => {
                    warn!(table, event_id = %record.id, %error, "skipping outbox row");
                    stats.skipped += 1;
                }
                Err(error) => {
                    error!(table, event_id = %record.id, %error, "store error, abandoning rest of batch");
                    stats.errors += 1;
                    break;
                }
            }
        }
        stats
    }

    /// Drive one row to its next state.
    pub async fn process_event(&self, record: &OutboxRecord) -> Result<EventOutcome, StoreError> {
        let event_id = EventId::parse(&record.id)?;
        let message = transform(&record.event_type, &record.payload);

        let attempts = match self.claims.claim(&event_id).await? {
            ClaimOutcome::Claimed { attempts } => attempts,
            ClaimOutcome::AlreadyTerminal => {
                debug!(%event_id, "event already terminal");
                return Ok(EventOutcome::AlreadyTerminal);
            }
        };

        let failure = match message {
            Ok(message) => match self.dispatcher.send(&message).await {
                Ok(()) => {
                    self.claims.mark_sent(&event_id).await?;
                    info!(%event_id, room_id = %message.room_id, attempts, "event delivered");
                    return Ok(EventOutcome::Sent);
                }
                Err(error) => error.to_string(),
            },
            Err(error) => {
                debug!(%event_id, event_type = %record.event_type, %error, "payload rejected");
                error.to_string()
            }
        };

        self.handle_failure(event_id, attempts, &failure).await
    }

    async fn handle_failure(
        &self,
        event_id: EventId,
        attempts: u32,
        error: &str,
    ) -> Result<EventOutcome, StoreError> {
        match self.budget.decide(attempts) {
            Decision::Retry {
                attempts,
                max_retries,
            } => {
                self.claims.mark_retry(&event_id, error).await?;
                warn!(%event_id, attempts, max_retries, error, "delivery failed, will retry");
                Ok(EventOutcome::Retried { attempts })
            }
            Decision::GiveUp {
                attempts,
                max_retries,
            } => {
                self.claims.mark_failed(&event_id, error).await?;
                let compensating = DeliveryFailed::new(event_id, max_retries, error);
                let emitted = self.sink.emit(&compensating).await?;
                error!(
                    %event_id,
                    attempts,
                    compensating_event_id = %emitted,
                    error,
                    "delivery failed permanently"
                );
                Ok(EventOutcome::Failed { attempts })
            }
        }
    }
}
