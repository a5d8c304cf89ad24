//! Claim status - event ごとの配送状態
//!
//! # 状態遷移
//! - (行なし) → Pending(attempts=1)         : 初回 claim
//! - Pending(k) → Pending(k+1)              : 再 claim（リトライ）
//! - Pending → Sent | Failed                : 終端
//!
//! Sent / Failed に入った行は二度と claim できない。
//! その判定は claim 操作そのもの（条件付き upsert）が持つ。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Sent,
    Failed,
}

impl ClaimStatus {
    /// Is this a terminal state (no further claims)?
    pub fn is_terminal(self) -> bool {
        matches!(self, ClaimStatus::Sent | ClaimStatus::Failed)
    }

    /// The text stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Sent => "sent",
            ClaimStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClaimStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ClaimStatus::Pending),
            "sent" => Ok(ClaimStatus::Sent),
            "failed" => Ok(ClaimStatus::Failed),
            other => Err(format!("unknown claim status: {other}")),
        }
    }
}
