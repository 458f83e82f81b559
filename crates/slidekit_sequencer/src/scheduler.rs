// SPDX-License-Identifier: MIT OR Apache-2.0
//! Debounced rebuild timer.
//!
//! Bursts of edits collapse into one rebuild: every request pushes the
//! deadline out again, and only the most recent direction is kept. The owner
//! polls the scheduler from its event loop; nothing here sleeps or spawns.

use std::time::{Duration, Instant};

/// Which way a pending rebuild goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerMode {
    /// Regenerate the timing tree from the effect lists
    RebuildTree,
    /// Reparse the effect lists from the timing tree
    RecreateList,
}

/// Single-shot, restartable deadline
#[derive(Debug, Clone)]
pub struct RebuildScheduler {
    delay: Duration,
    pending: Option<(Instant, TimerMode)>,
}

impl RebuildScheduler {
    /// Create an idle scheduler
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    /// Debounce delay
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Start or restart the timer, replacing any pending request
    pub fn start(&mut self, mode: TimerMode, now: Instant) {
        if let Some((_, previous)) = self.pending {
            if previous != mode {
                tracing::trace!("Rebuild timer switched from {:?} to {:?}", previous, mode);
            }
        }
        self.pending = Some((now + self.delay, mode));
    }

    /// Cancel the pending request
    pub fn stop(&mut self) {
        self.pending = None;
    }

    /// Whether a request is pending
    pub fn is_active(&self) -> bool {
        self.pending.is_some()
    }

    /// Mode of the pending request
    pub fn mode(&self) -> Option<TimerMode> {
        self.pending.map(|(_, mode)| mode)
    }

    /// When the pending request fires
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(deadline, _)| deadline)
    }

    /// Take the pending request if its deadline has passed
    pub fn poll(&mut self, now: Instant) -> Option<TimerMode> {
        match self.pending {
            Some((deadline, _)) if now >= deadline => self.take(),
            _ => None,
        }
    }

    /// Take the pending request regardless of its deadline
    pub fn take(&mut self) -> Option<TimerMode> {
        self.pending.take().map(|(_, mode)| mode)
    }
}
