//! MessageDispatcher - room への配送と membership 管理
//!
//! # 設計原則
//! - joined-room 集合は Dispatcher だけが持つ（RwLock、読みが大半）
//! - 送信経路と MembershipSync は同じ `ensure_joined` / `record_joined` を通る
//! - allow-list は起動時に固定。未参加かつ未許可の room には join すら試みない

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::{CanonicalMessage, DispatchError, MessageFormat, PlatformError};
use crate::ports::{Membership, MembershipEvent, MessageContent, PlatformClient};

const MSGTYPE_TEXT: &str = "m.text";
const FORMAT_MARKDOWN: &str = "org.matrix.custom.markdown";
const FORMAT_HTML: &str = "org.matrix.custom.html";

/// What happened to an inbound membership event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteOutcome {
    /// Not an invite, or addressed to someone else.
    Ignored,
    NotAllowed,
    Joined,
    JoinFailed,
}

pub struct MessageDispatcher {
    platform: Arc<dyn PlatformClient>,
    allowed: HashSet<String>,
    joined: RwLock<HashSet<String>>,
}

impl MessageDispatcher {
    /// Blank entries of `allowed_rooms` are dropped, the rest trimmed.
    pub fn new<I, S>(platform: Arc<dyn PlatformClient>, allowed_rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed_rooms
            .into_iter()
            .map(|r| r.as_ref().trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        Self {
            platform,
            allowed,
            joined: RwLock::new(HashSet::new()),
        }
    }

    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        &self.platform
    }

    pub fn is_allowed(&self, room_id: &str) -> bool {
        self.allowed.contains(room_id)
    }

    pub async fn is_joined(&self, room_id: &str) -> bool {
        self.joined.read().await.contains(room_id)
    }

    /// Sorted snapshot of the joined-room set.
    pub async fn joined_rooms(&self) -> Vec<String> {
        let mut rooms: Vec<_> = self.joined.read().await.iter().cloned().collect();
        rooms.sort();
        rooms
    }

    /// Seed the joined-room set from the platform.
    pub async fn load_joined_rooms(&self) -> Result<usize, PlatformError> {
        let rooms = self.platform.joined_rooms().await?;
        let mut joined = self.joined.write().await;
        joined.extend(rooms);
        Ok(joined.len())
    }

    /// Deliver one message, joining the room first when needed.
    pub async fn send(&self, message: &CanonicalMessage) -> Result<(), DispatchError> {
        let room_id = message.room_id.trim();
        if room_id.is_empty() {
            return Err(DispatchError::MissingRoom);
        }
        self.ensure_joined(room_id).await?;

        let content = message_content(message);
        self.platform
            .send_message(room_id, &content)
            .await
            .map_err(|source| DispatchError::SendRejected {
                room_id: room_id.to_string(),
                source,
            })
    }

    async fn ensure_joined(&self, room_id: &str) -> Result<(), DispatchError> {
        if self.is_joined(room_id).await {
            return Ok(());
        }
        if !self.is_allowed(room_id) {
            return Err(DispatchError::NotAllowed(room_id.to_string()));
        }
        self.platform
            .join_room(room_id)
            .await
            .map_err(|source| DispatchError::JoinFailed {
                room_id: room_id.to_string(),
                source,
            })?;
        self.record_joined(room_id).await;
        Ok(())
    }

    async fn record_joined(&self, room_id: &str) {
        let inserted = self.joined.write().await.insert(room_id.to_string());
        if inserted {
            info!(room_id, "joined room");
        }
    }

    /// React to a membership change from the platform stream.
    ///
    /// Only invites addressed to this session matter. Allow-listed rooms are
    /// joined; everything else is logged and dropped.
    pub async fn handle_membership_event(&self, event: &MembershipEvent) -> InviteOutcome {
        if event.membership != Membership::Invite || event.state_key != self.platform.user_id() {
            return InviteOutcome::Ignored;
        }
        let room_id = event.room_id.as_str();
        if !self.is_allowed(room_id) {
            warn!(room_id, "ignoring invite to room that is not allow-listed");
            return InviteOutcome::NotAllowed;
        }
        if self.is_joined(room_id).await {
            debug!(room_id, "invite for a room already joined");
            return InviteOutcome::Joined;
        }
        match self.platform.join_room(room_id).await {
            Ok(()) => {
                self.record_joined(room_id).await;
                InviteOutcome::Joined
            }
            Err(error) => {
                warn!(room_id, %error, "join after invite failed");
                InviteOutcome::JoinFailed
            }
        }
    }
}

/// Platform content for `message`. Rich formats carry the raw body in
/// `formatted_body`; no conversion happens here.
pub fn message_content(message: &CanonicalMessage) -> MessageContent {
    let format = match message.format {
        MessageFormat::Plain => None,
        MessageFormat::Markdown => Some(FORMAT_MARKDOWN),
        MessageFormat::Html => Some(FORMAT_HTML),
    };
    MessageContent {
        msgtype: MSGTYPE_TEXT.to_string(),
        body: message.body.clone(),
        format: format.map(str::to_string),
        formatted_body: format.map(|_| message.body.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::InMemoryPlatform;
    use rstest::rstest;

    const ME: &str = "@herald:example.org";

    fn message(room_id: &str, format: MessageFormat) -> CanonicalMessage {
        CanonicalMessage {
            room_id: room_id.into(),
            body: "**hi**".into(),
            format,
        }
    }

    fn setup(allowed: &[&str]) -> (Arc<InMemoryPlatform>, MessageDispatcher) {
        let platform = Arc::new(InMemoryPlatform::new(ME));
        let dispatcher = MessageDispatcher::new(platform.clone(), allowed.iter().copied());
        (platform, dispatcher)
    }

    #[tokio::test]
    async fn unknown_room_fails_without_join_attempt() {
        let (platform, dispatcher) = setup(&["!ops:x"]);

        let err = dispatcher
            .send(&message("!elsewhere:x", MessageFormat::Plain))
            .await
            .unwrap_err();

        assert!(matches!(err, DispatchError::NotAllowed(ref r) if r == "!elsewhere:x"));
        assert!(platform.join_calls().is_empty());
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn allowed_room_is_joined_once_then_reused() {
        let (platform, dispatcher) = setup(&["!ops:x"]);

        dispatcher.send(&message("!ops:x", MessageFormat::Plain)).await.unwrap();
        dispatcher.send(&message("!ops:x", MessageFormat::Plain)).await.unwrap();

        assert_eq!(platform.join_calls(), vec!["!ops:x".to_string()]);
        assert_eq!(platform.sent().len(), 2);
        assert!(dispatcher.is_joined("!ops:x").await);
    }

    #[tokio::test]
    async fn joined_room_needs_no_allow_list_entry() {
        let platform = Arc::new(InMemoryPlatform::new(ME).with_joined(&["!legacy:x"]));
        let dispatcher = MessageDispatcher::new(platform.clone(), Vec::<String>::new());

        assert_eq!(dispatcher.load_joined_rooms().await.unwrap(), 1);
        dispatcher.send(&message("!legacy:x", MessageFormat::Plain)).await.unwrap();
        assert!(platform.join_calls().is_empty());
    }

    #[tokio::test]
    async fn join_failure_is_reported_with_room() {
        let (platform, dispatcher) = setup(&["!ops:x"]);
        platform.reject_joins_to("!ops:x");

        let err = dispatcher
            .send(&message("!ops:x", MessageFormat::Plain))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::JoinFailed { ref room_id, .. } if room_id == "!ops:x"));
        assert!(!dispatcher.is_joined("!ops:x").await);
    }

    #[tokio::test]
    async fn blank_room_is_missing() {
        let (_, dispatcher) = setup(&[]);
        let err = dispatcher
            .send(&message("  ", MessageFormat::Plain))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingRoom));
    }

    #[rstest]
    #[case::plain(MessageFormat::Plain, None)]
    #[case::markdown(MessageFormat::Markdown, Some("org.matrix.custom.markdown"))]
    #[case::html(MessageFormat::Html, Some("org.matrix.custom.html"))]
    fn rich_formats_carry_marker_and_raw_body(
        #[case] format: MessageFormat,
        #[case] marker: Option<&str>,
    ) {
        let content = message_content(&message("!a:x", format));
        assert_eq!(content.msgtype, "m.text");
        assert_eq!(content.body, "**hi**");
        assert_eq!(content.format.as_deref(), marker);
        assert_eq!(
            content.formatted_body.as_deref(),
            marker.map(|_| "**hi**")
        );
    }

    #[tokio::test]
    async fn invites_join_only_allow_listed_rooms() {
        let (platform, dispatcher) = setup(&["!ops:x"]);

        let outcome = dispatcher
            .handle_membership_event(&MembershipEvent::invite("!spam:x", ME))
            .await;
        assert_eq!(outcome, InviteOutcome::NotAllowed);

        let outcome = dispatcher
            .handle_membership_event(&MembershipEvent::invite("!ops:x", ME))
            .await;
        assert_eq!(outcome, InviteOutcome::Joined);

        assert_eq!(platform.join_calls(), vec!["!ops:x".to_string()]);
        assert_eq!(dispatcher.joined_rooms().await, vec!["!ops:x".to_string()]);
    }

    #[tokio::test]
    async fn invites_for_other_users_are_ignored() {
        let (platform, dispatcher) = setup(&["!ops:x"]);

        let outcome = dispatcher
            .handle_membership_event(&MembershipEvent::invite("!ops:x", "@alice:x"))
            .await;
        assert_eq!(outcome, InviteOutcome::Ignored);

        let leave = MembershipEvent {
            room_id: "!ops:x".into(),
            state_key: ME.into(),
            membership: Membership::Leave,
        };
        assert_eq!(dispatcher.handle_membership_event(&leave).await, InviteOutcome::Ignored);
        assert!(platform.join_calls().is_empty());
    }
}
