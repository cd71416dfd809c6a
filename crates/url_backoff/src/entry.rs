// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

/// Backoff state of a single destination.
///
/// `delay` never exceeds the maximum delay of the owning manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BackoffEntry {
    pub delay: Duration,
    pub last_update: Instant,
}

/// What a failure did to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Advance {
    /// The delay was doubled, or set to the base delay for a new entry.
    Advanced,
    /// The entry had been idle past its stale window and started over.
    Restarted,
}

impl BackoffEntry {
    pub fn new(base: Duration, max: Duration, now: Instant) -> Self {
        Self {
            delay: base.min(max),
            last_update: now,
        }
    }

    /// Idle time after which the entry no longer carries over into new failures.
    pub fn stale_window(&self, base: Duration) -> Duration {
        self.delay.saturating_mul(2).max(base)
    }

    pub fn is_stale(&self, base: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_update) > self.stale_window(base)
    }

    /// Records a failure at `now`.
    pub fn advance(&mut self, base: Duration, max: Duration, now: Instant) -> Advance {
        let advance = if self.is_stale(base, now) {
            self.delay = base.min(max);
            Advance::Restarted
        } else {
            self.delay = self.delay.saturating_mul(2).min(max);
            Advance::Advanced
        };

        self.last_update = now;
        advance
    }

    pub fn is_in_backoff_since(&self, event_time: Instant) -> bool {
        event_time.saturating_duration_since(self.last_update) < self.delay
    }
}
