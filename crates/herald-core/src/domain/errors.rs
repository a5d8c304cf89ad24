//! Errors - エラー型と分類
//!
//! # 分類
//! - TransformError: 壊れた / 未対応の payload。予算まではリトライ、その後 failed
//! - DispatchError: 未許可の room、join 失敗、送信拒否。同上 + 補償イベント
//! - StoreError: claim ストアの障害。その table の残りのバッチを打ち切る
//! - ClaimConflict はエラーではない（`ClaimOutcome::AlreadyTerminal`）
//! - ConfigError は `crate::config` にある（起動時のみ、致命的）

use thiserror::Error;

/// ErrorKind は poll cycle がエラーをどう扱うかの分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Consumes one attempt of the event's retry budget.
    Retriable,
    /// The row itself is unusable; logged and skipped without state change.
    Rejected,
    /// The store is unhealthy; stop working on the current table.
    Infrastructure,
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("payload decode: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("unsupported event type: {0}")]
    Unsupported(String),

    #[error("payload missing room id")]
    MissingRoom,

    #[error("payload missing required field: {0}")]
    MissingField(&'static str),

    #[error("unsupported payload format: {0}")]
    InvalidFormat(String),
}

impl TransformError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Retriable
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid event id: {0:?}")]
    InvalidId(String),

    #[error("table name contains invalid characters: {0:?}")]
    InvalidTableName(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("claim state is corrupt: {0}")]
    CorruptState(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::InvalidId(_) => ErrorKind::Rejected,
            _ => ErrorKind::Infrastructure,
        }
    }
}

/// Errors reported by the messaging platform client.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("response decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid homeserver url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("platform unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("room ID is required")]
    MissingRoom,

    #[error("room is not allow-listed: {0}")]
    NotAllowed(String),

    #[error("join room failed for {room_id}: {source}")]
    JoinFailed {
        room_id: String,
        #[source]
        source: PlatformError,
    },

    #[error("send to {room_id} rejected: {source}")]
    SendRejected {
        room_id: String,
        #[source]
        source: PlatformError,
    },
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Retriable
    }
}
