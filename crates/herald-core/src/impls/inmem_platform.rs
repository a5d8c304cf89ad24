//! InMemoryPlatform - 開発・テスト用の Matrix 代替
//!
//! # 学習ポイント
//! - std::sync::Mutex は await を跨がない短い区間だけで使う
//! - Notify で「イベントが積まれたら long-poll を起こす」を再現する

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::domain::PlatformError;
use crate::ports::{MembershipEvent, MessageContent, PlatformClient, SyncBatch};

#[derive(Default)]
struct PlatformState {
    joined: HashSet<String>,
    join_calls: Vec<String>,
    sent: Vec<(String, MessageContent)>,
    failing_sends: u32,
    rejected_joins: HashSet<String>,
    joined_rooms_unavailable: bool,
    pending_sync: VecDeque<Vec<MembershipEvent>>,
    sync_calls: Vec<Option<String>>,
    next_token: u64,
}

pub struct InMemoryPlatform {
    user_id: String,
    state: Mutex<PlatformState>,
    sync_ready: Notify,
}

impl InMemoryPlatform {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: Mutex::new(PlatformState::default()),
            sync_ready: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PlatformState> {
        // poison は直前のテストの panic なので中身をそのまま使う
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Rooms the session already belongs to on the "server".
    pub fn with_joined(self, rooms: &[&str]) -> Self {
        self.lock()
            .joined
            .extend(rooms.iter().map(|r| r.to_string()));
        self
    }

    /// The next `n` sends fail with a 500.
    pub fn fail_next_sends(&self, n: u32) {
        self.lock().failing_sends = n;
    }

    /// Joins to `room_id` fail with a 403.
    pub fn reject_joins_to(&self, room_id: &str) {
        self.lock().rejected_joins.insert(room_id.to_string());
    }

    pub fn set_joined_rooms_unavailable(&self, unavailable: bool) {
        self.lock().joined_rooms_unavailable = unavailable;
    }

    /// Queue membership events for the next `sync_membership` call.
    pub fn push_sync(&self, events: Vec<MembershipEvent>) {
        self.lock().pending_sync.push_back(events);
        self.sync_ready.notify_one();
    }

    pub fn join_calls(&self) -> Vec<String> {
        self.lock().join_calls.clone()
    }

    pub fn sent(&self) -> Vec<(String, MessageContent)> {
        self.lock().sent.clone()
    }

    pub fn sync_calls(&self) -> Vec<Option<String>> {
        self.lock().sync_calls.clone()
    }
}

#[async_trait]
impl PlatformClient for InMemoryPlatform {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn joined_rooms(&self) -> Result<Vec<String>, PlatformError> {
        let state = self.lock();
        if state.joined_rooms_unavailable {
            return Err(PlatformError::Unavailable("joined_rooms".into()));
        }
        let mut rooms: Vec<_> = state.joined.iter().cloned().collect();
        rooms.sort();
        Ok(rooms)
    }

    async fn join_room(&self, room_id: &str) -> Result<(), PlatformError> {
        let mut state = self.lock();
        state.join_calls.push(room_id.to_string());
        if state.rejected_joins.contains(room_id) {
            return Err(PlatformError::Status {
                status: 403,
                body: "M_FORBIDDEN".into(),
            });
        }
        state.joined.insert(room_id.to_string());
        Ok(())
    }

    async fn send_message(
        &self,
        room_id: &str,
        content: &MessageContent,
    ) -> Result<(), PlatformError> {
        let mut state = self.lock();
        if state.failing_sends > 0 {
            state.failing_sends -= 1;
            return Err(PlatformError::Status {
                status: 500,
                body: "M_UNKNOWN".into(),
            });
        }
        if !state.joined.contains(room_id) {
            return Err(PlatformError::Status {
                status: 403,
                body: "M_FORBIDDEN: not in room".into(),
            });
        }
        state.sent.push((room_id.to_string(), content.clone()));
        Ok(())
    }

    async fn sync_membership(&self, since: Option<&str>) -> Result<SyncBatch, PlatformError> {
        loop {
            // 通知の取りこぼしを避けるため、キューを見る前に待機を登録する
            let notified = self.sync_ready.notified();
            {
                let mut state = self.lock();
                if let Some(events) = state.pending_sync.pop_front() {
                    state.sync_calls.push(since.map(str::to_string));
                    state.next_token += 1;
                    return Ok(SyncBatch {
                        next_batch: format!("s{}", state.next_token),
                        events,
                    });
                }
            }
            notified.await;
        }
    }
}
