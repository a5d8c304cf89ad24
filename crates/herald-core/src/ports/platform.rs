//! PlatformClient port - チャットプラットフォーム（Matrix）の能力
//!
//! このシステムが必要とするのは以下だけ:
//! - 参加中の room の一覧（起動時のスナップショット）
//! - room への join
//! - room へのメッセージ送信
//! - 自分宛ての membership 変更イベントの取得（long-poll）
//!
//! チャットの本文を読むことはない。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Invite,
    Join,
    Leave,
    Ban,
    Knock,
    #[serde(other)]
    Unknown,
}

/// A membership change reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipEvent {
    pub room_id: String,
    /// The user whose membership changed.
    pub state_key: String,
    pub membership: Membership,
}

impl MembershipEvent {
    pub fn invite(room_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            state_key: user_id.into(),
            membership: Membership::Invite,
        }
    }
}

/// One page of the membership stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncBatch {
    /// Token to pass as `since` on the next call.
    pub next_batch: String,
    pub events: Vec<MembershipEvent>,
}

/// `m.room.message` content.
///
/// Rich formats keep the raw body in `formatted_body`; rendering is left to
/// the clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    pub msgtype: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_body: Option<String>,
}

#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Identity of the session (`@user:domain`).
    fn user_id(&self) -> &str;

    async fn joined_rooms(&self) -> Result<Vec<String>, PlatformError>;

    async fn join_room(&self, room_id: &str) -> Result<(), PlatformError>;

    async fn send_message(
        &self,
        room_id: &str,
        content: &MessageContent,
    ) -> Result<(), PlatformError>;

    /// Wait for membership changes after `since` (long-poll).
    ///
    /// `None` starts from the current state, which includes invites that
    /// arrived while the process was down.
    async fn sync_membership(&self, since: Option<&str>) -> Result<SyncBatch, PlatformError>;
}
