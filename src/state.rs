use std::sync::Arc;
use tokio::sync::RwLock;

use crate::dispatch::{CycleReport, OutcomeCounts};
use crate::event::EventKind;

/// Where the loop controller currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Not yet started, or resolving identity
    #[default]
    Idle,
    /// A cycle is executing
    Running,
    /// Waiting for the next cycle
    Sleeping,
}

/// Point-in-time copy of the running totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub cycles: u32,
    pub cycle_failures: u32,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
    pub mentions: OutcomeCounts,
    pub direct_messages: OutcomeCounts,
}

/// State shared between the loop controller and observers
#[derive(Debug, Default)]
pub struct SharedState {
    /// Current controller state
    pub loop_state: RwLock<LoopState>,
    /// Running totals across all cycles
    pub stats: RwLock<StatsSnapshot>,
}

impl SharedState {
    /// Create a new SharedState with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an Arc-wrapped SharedState for sharing between tasks
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub async fn set_loop_state(&self, state: LoopState) {
        *self.loop_state.write().await = state;
    }

    pub async fn loop_state(&self) -> LoopState {
        *self.loop_state.read().await
    }

    /// Increment the cycle counter and return the new cycle number
    pub async fn increment_cycle(&self) -> u32 {
        let mut stats = self.stats.write().await;
        stats.cycles += 1;
        stats.cycles
    }

    pub async fn record_cycle_failure(&self) {
        self.stats.write().await.cycle_failures += 1;
    }

    /// Add the event outcomes of one cycle to the totals
    pub async fn record_report(&self, report: &CycleReport) {
        let mut stats = self.stats.write().await;
        stats.sent += report.sent();
        stats.skipped += report.skipped();
        stats.failed += report.failed();
        stats.mentions.merge(report.counts(EventKind::Mention));
        stats
            .direct_messages
            .merge(report.counts(EventKind::DirectMessage));
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        *self.stats.read().await
    }
}
