//! App - アプリケーション層
//!
//! ports を組み合わせて配送パイプラインを動かす。
//!
//! # 主要コンポーネント
//! - **AppBuilder / App**: ワイヤリング、起動、期限つき停止
//! - **OutboxPoller**: read → transform → claim → dispatch → 記録
//! - **MessageDispatcher**: room への送信と joined-room 集合
//! - **MembershipSync**: invite を受けて join するバックグラウンドタスク
//! - **CycleStats**: poll cycle ごとの集計

pub mod builder;
pub mod dispatcher;
pub mod membership_sync;
pub mod poller;
pub mod status;

use std::time::Duration;

use tokio::sync::watch;

pub use self::builder::{App, AppBuilder, BuildError, RunningApp, ShutdownError};
pub use self::dispatcher::{InviteOutcome, MessageDispatcher};
pub use self::membership_sync::MembershipSync;
pub use self::poller::{OutboxPoller, PollerSettings};
pub use self::status::{CycleStats, EventOutcome};

/// Wait `period`; returns `true` as soon as shutdown is requested (or the
/// sender is gone).
pub(crate) async fn sleep_or_shutdown(period: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(period) => {}
        changed = shutdown.changed() => {
            if changed.is_err() {
                return true;
            }
        }
    }
    *shutdown.borrow()
}
