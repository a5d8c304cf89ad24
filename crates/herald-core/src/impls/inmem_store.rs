//! InMemoryClaimStore - 開発・テスト用の claim ストア
//!
//! # 実装詳細
//! - HashMap<EventId, ClaimState> を 1 つの Mutex で守る
//! - claim は lock を取ったまま「読んで、判定して、書く」を完結させる
//!   （PostgreSQL の条件付き upsert と同じ原子性）
//! - `set_unavailable(true)` でストア障害を再現できる

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ClaimOutcome, ClaimState, ClaimStatus, EventId, StoreError};
use crate::ports::{ClaimStore, Clock, SystemClock};

pub struct InMemoryClaimStore {
    claims: Mutex<HashMap<EventId, ClaimState>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryClaimStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            claims: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every operation fail with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of one claim row.
    pub async fn get(&self, event_id: &EventId) -> Option<ClaimState> {
        self.claims.lock().await.get(event_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.claims.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.claims.lock().await.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store disabled".into()));
        }
        Ok(())
    }

    async fn settle(
        &self,
        event_id: &EventId,
        status: ClaimStatus,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut claims = self.claims.lock().await;
        // 終端の行は書き換えない（並行 poller の遅れた結果で sent を戻さない）
        if let Some(state) = claims.get_mut(event_id)
            && state.status == ClaimStatus::Pending
        {
            state.status = status;
            state.last_error = last_error.map(str::to_string);
            state.updated_at = self.clock.now();
        }
        Ok(())
    }
}

impl Default for InMemoryClaimStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClaimStore for InMemoryClaimStore {
    async fn claim(&self, event_id: &EventId) -> Result<ClaimOutcome, StoreError> {
        self.check_available()?;
        let now = self.clock.now();
        let mut claims = self.claims.lock().await;

        match claims.get_mut(event_id) {
            None => {
                claims.insert(
                    *event_id,
                    ClaimState {
                        event_id: *event_id,
                        attempts: 1,
                        status: ClaimStatus::Pending,
                        last_error: None,
                        updated_at: now,
                    },
                );
                Ok(ClaimOutcome::Claimed { attempts: 1 })
            }
            Some(state) if state.status.is_terminal() => Ok(ClaimOutcome::AlreadyTerminal),
            Some(state) => {
                state.attempts += 1;
                state.status = ClaimStatus::Pending;
                state.updated_at = now;
                Ok(ClaimOutcome::Claimed {
                    attempts: state.attempts,
                })
            }
        }
    }

    async fn mark_sent(&self, event_id: &EventId) -> Result<(), StoreError> {
        self.settle(event_id, ClaimStatus::Sent, None).await
    }

    async fn mark_retry(&self, event_id: &EventId, error: &str) -> Result<(), StoreError> {
        self.settle(event_id, ClaimStatus::Pending, Some(error)).await
    }

    async fn mark_failed(&self, event_id: &EventId, error: &str) -> Result<(), StoreError> {
        self.settle(event_id, ClaimStatus::Failed, Some(error)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn id() -> EventId {
        EventId::from(Uuid::new_v4())
    }

    #[tokio::test]
    async fn first_claim_creates_pending_row_with_one_attempt() {
        let store = InMemoryClaimStore::new();
        let event = id();

        let outcome = store.claim(&event).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed { attempts: 1 });

        let state = store.get(&event).await.unwrap();
        assert_eq!(state.status, ClaimStatus::Pending);
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn attempts_increase_by_one_per_claim() {
        let store = InMemoryClaimStore::new();
        let event = id();

        for expected in 1..=5 {
            let outcome = store.claim(&event).await.unwrap();
            assert_eq!(outcome.attempts(), Some(expected));
            store.mark_retry(&event, "boom").await.unwrap();
        }
    }

    #[tokio::test]
    async fn terminal_rows_are_never_claimed_or_changed_again() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let store = InMemoryClaimStore::with_clock(Arc::new(FixedClock::new(t0)));

        for finish in [ClaimStatus::Sent, ClaimStatus::Failed] {
            let event = id();
            store.claim(&event).await.unwrap();
            match finish {
                ClaimStatus::Sent => store.mark_sent(&event).await.unwrap(),
                _ => store.mark_failed(&event, "gave up").await.unwrap(),
            }
            let before = store.get(&event).await.unwrap();

            for _ in 0..3 {
                let outcome = store.claim(&event).await.unwrap();
                assert_eq!(outcome, ClaimOutcome::AlreadyTerminal);
                assert!(!outcome.is_claimed());
            }
            store.mark_retry(&event, "late result").await.unwrap();

            assert_eq!(store.get(&event).await.unwrap(), before);
        }
    }

    #[tokio::test]
    async fn mark_sent_clears_last_error() {
        let store = InMemoryClaimStore::new();
        let event = id();
        store.claim(&event).await.unwrap();
        store.mark_retry(&event, "timeout").await.unwrap();
        assert_eq!(
            store.get(&event).await.unwrap().last_error.as_deref(),
            Some("timeout")
        );

        store.claim(&event).await.unwrap();
        store.mark_sent(&event).await.unwrap();
        let state = store.get(&event).await.unwrap();
        assert_eq!(state.status, ClaimStatus::Sent);
        assert_eq!(state.last_error, None);
        assert_eq!(state.attempts, 2);
    }

    #[tokio::test]
    async fn concurrent_claims_hand_out_distinct_attempt_numbers() {
        let store = Arc::new(InMemoryClaimStore::new());
        let event = id();

        let mut joins = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            joins.push(tokio::spawn(async move { store.claim(&event).await.unwrap() }));
        }
        let mut seen = Vec::new();
        for join in joins {
            seen.push(join.await.unwrap().attempts().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=16).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn unavailable_store_reports_errors() {
        let store = InMemoryClaimStore::new();
        store.set_unavailable(true);
        let err = store.claim(&id()).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert!(store.is_empty().await);
    }
}
