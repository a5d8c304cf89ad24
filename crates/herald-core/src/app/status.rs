//! Status - poll cycle の集計
//!
//! 1 cycle ごとに CycleStats を作り、最後に 1 行でログに出す。

use serde::{Deserialize, Serialize};

/// Result of processing one outbox row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Sent,
    /// Left pending; claimed again next cycle.
    Retried { attempts: u32 },
    /// Budget exhausted; compensating event emitted.
    Failed { attempts: u32 },
    /// Claim refused because the event already converged.
    AlreadyTerminal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    pub fetched: usize,
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    /// Already terminal, or rejected before any state change.
    pub skipped: usize,
    /// Store errors; each one ends the current table early.
    pub errors: usize,
}

impl CycleStats {
    pub fn record(&mut self, outcome: EventOutcome) {
        match outcome {
            EventOutcome::Sent => self.sent += 1,
            EventOutcome::Retried { .. } => self.retried += 1,
            EventOutcome::Failed { .. } => self.failed += 1,
            EventOutcome::AlreadyTerminal => self.skipped += 1,
        }
    }

    pub fn merge(&mut self, other: CycleStats) {
        self.fetched += other.fetched;
        self.sent += other.sent;
        self.retried += other.retried;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }

    /// Nothing was read.
    pub fn is_idle(&self) -> bool {
        self.fetched == 0 && self.errors == 0
    }
}
