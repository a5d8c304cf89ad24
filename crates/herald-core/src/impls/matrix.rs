//! MatrixClient - Matrix client-server API の PlatformClient 実装
//!
//! 使う endpoint は 4 つだけ:
//! - `GET  /_matrix/client/v3/joined_rooms`
//! - `POST /_matrix/client/v3/join/{room}`
//! - `PUT  /_matrix/client/v3/rooms/{room}/send/m.room.message/{txn}`
//! - `GET  /_matrix/client/v3/sync` (long-poll、invite だけを拾う)
//!
//! # 学習ポイント
//! - reqwest::Client は 1 回だけ作って使い回す（接続プール）
//! - room id は `path_segments_mut` で積むので `#` などはエスケープされる
//! - 非 2xx は本文ごと `PlatformError::Status` にする

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::domain::PlatformError;
use crate::ports::{Membership, MembershipEvent, MessageContent, PlatformClient, SyncBatch};

const CLIENT_API: [&str; 3] = ["_matrix", "client", "v3"];

/// Slack on top of the long-poll so the HTTP timeout never fires first.
const REQUEST_SLACK: Duration = Duration::from_secs(30);

/// Only membership state matters; everything else is filtered server-side.
const SYNC_FILTER: &str = r#"{"presence":{"types":[]},"account_data":{"types":[]},"room":{"timeline":{"types":["m.room.member"]},"ephemeral":{"types":[]},"account_data":{"types":[]}}}"#;

pub struct MatrixClient {
    http: reqwest::Client,
    base: Url,
    user_id: String,
    access_token: String,
    sync_timeout: Duration,
}

impl MatrixClient {
    pub fn new(
        homeserver_url: &str,
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        sync_timeout: Duration,
    ) -> Result<Self, PlatformError> {
        let base = Url::parse(homeserver_url.trim())?;
        if base.cannot_be_a_base() {
            return Err(PlatformError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(sync_timeout + REQUEST_SLACK)
            .build()?;

        Ok(Self {
            http,
            base,
            user_id: user_id.into(),
            access_token: access_token.into(),
            sync_timeout,
        })
    }

    /// `{base}/_matrix/client/v3/{segments..}`
    fn endpoint(&self, segments: &[&str]) -> Result<Url, PlatformError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| PlatformError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(CLIENT_API)
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.access_token)
    }

    async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PlatformError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(PlatformError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[derive(Deserialize)]
struct JoinedRoomsResponse {
    joined_rooms: Vec<String>,
}

#[derive(Deserialize)]
struct Ignored {}

#[derive(Deserialize)]
struct SyncResponse {
    next_batch: String,
    #[serde(default)]
    rooms: SyncRooms,
}

#[derive(Default, Deserialize)]
struct SyncRooms {
    #[serde(default)]
    invite: HashMap<String, InvitedRoom>,
}

#[derive(Deserialize)]
struct InvitedRoom {
    #[serde(default)]
    invite_state: StrippedState,
}

#[derive(Default, Deserialize)]
struct StrippedState {
    #[serde(default)]
    events: Vec<StrippedEvent>,
}

#[derive(Deserialize)]
struct StrippedEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    state_key: Option<String>,
    #[serde(default)]
    content: MemberContent,
}

#[derive(Default, Deserialize)]
struct MemberContent {
    #[serde(default)]
    membership: Option<Membership>,
}

impl SyncResponse {
    /// Invite membership events addressed to `user_id`, in room-id order.
    fn into_batch(self, user_id: &str) -> SyncBatch {
        let mut rooms: Vec<_> = self.rooms.invite.into_iter().collect();
        rooms.sort_by(|a, b| a.0.cmp(&b.0));

        let events = rooms
            .into_iter()
            .flat_map(move |(room_id, room)| {
                room.invite_state
                    .events
                    .into_iter()
                    .filter(|e| e.kind == "m.room.member")
                    .filter(move |e| e.state_key.as_deref() == Some(user_id))
                    .filter_map(move |e| {
                        Some(MembershipEvent {
                            room_id: room_id.clone(),
                            state_key: e.state_key?,
                            membership: e.content.membership?,
                        })
                    })
            })
            .collect();

        SyncBatch {
            next_batch: self.next_batch,
            events,
        }
    }
}

#[async_trait]
impl PlatformClient for MatrixClient {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn joined_rooms(&self) -> Result<Vec<String>, PlatformError> {
        let url = self.endpoint(&["joined_rooms"])?;
        let response: JoinedRoomsResponse = self.execute(self.request(Method::GET, url)).await?;
        Ok(response.joined_rooms)
    }

    async fn join_room(&self, room_id: &str) -> Result<(), PlatformError> {
        let url = self.endpoint(&["join", room_id])?;
        let _: Ignored = self
            .execute(self.request(Method::POST, url).json(&serde_json::json!({})))
            .await?;
        Ok(())
    }

    async fn send_message(
        &self,
        room_id: &str,
        content: &MessageContent,
    ) -> Result<(), PlatformError> {
        let txn_id = Uuid::new_v4().simple().to_string();
        let url = self.endpoint(&["rooms", room_id, "send", "m.room.message", &txn_id])?;
        let _: Ignored = self
            .execute(self.request(Method::PUT, url).json(content))
            .await?;
        debug!(room_id, txn_id = %txn_id, "matrix message sent");
        Ok(())
    }

    async fn sync_membership(&self, since: Option<&str>) -> Result<SyncBatch, PlatformError> {
        let mut url = self.endpoint(&["sync"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("timeout", &self.sync_timeout.as_millis().to_string());
            query.append_pair("filter", SYNC_FILTER);
            if let Some(since) = since {
                query.append_pair("since", since);
            }
        }
        let response: SyncResponse = self.execute(self.request(Method::GET, url)).await?;
        Ok(response.into_batch(&self.user_id))
    }
}
