// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tick::Clock;

use crate::constants::{ERR_POISONED_LOCK, PRUNE_THRESHOLD};
use crate::entry::{Advance, BackoffEntry};
use crate::telemetry::{BackoffEvent, TelemetryHelper};
use crate::{Backoff, Destination, Outcome};

/// Tracks exponential backoff delays per destination.
///
/// The first failure reported for a destination sets its delay to the base delay. Every further
/// failure doubles the delay, up to the maximum delay. Any outcome that is not a failure clears the
/// delay.
///
/// A destination that stays quiet for longer than its stale window, which is twice its current
/// delay but never less than the base delay, does not carry its old delay forward: the next failure
/// starts over from the base delay.
///
/// A base delay or a maximum delay of zero disables the manager; it then behaves like
/// [`NullBackoffManager`][crate::NullBackoffManager].
///
/// # Concurrency
///
/// All destinations live behind a single lock that is held only for map lookups and arithmetic.
/// Concurrent updates of the same destination are applied one after another.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use tick::Clock;
/// use url_backoff::{Backoff, BackoffManager, Destination, Outcome};
///
/// let manager = BackoffManager::new(Duration::from_millis(100), Duration::from_secs(1), Clock::new_frozen());
/// let destination = Destination::new("https://api.example.com");
///
/// for _ in 0..3 {
///     manager.update_backoff(&destination, Outcome::transport_error());
/// }
///
/// assert_eq!(manager.calculate_backoff(&destination), Duration::from_millis(400));
/// ```
#[derive(Debug)]
pub struct BackoffManager {
    entries: Mutex<Entries>,
    base_delay: Duration,
    max_delay: Duration,
    clock: Clock,
    telemetry: TelemetryHelper,
}

impl BackoffManager {
    /// Creates a manager with the given base and maximum delays.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, clock: impl AsRef<Clock>) -> Self {
        Self::with_telemetry(base_delay, max_delay, clock.as_ref().clone(), TelemetryHelper::default())
    }

    pub(crate) fn with_telemetry(base_delay: Duration, max_delay: Duration, clock: Clock, telemetry: TelemetryHelper) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            base_delay,
            max_delay,
            clock,
            telemetry,
        }
    }

    /// Returns the delay applied on the first failure of a destination.
    #[must_use]
    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    /// Returns the ceiling of every delay.
    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Returns `true` unless the base delay or the maximum delay is zero.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.base_delay.is_zero() && !self.max_delay.is_zero()
    }

    /// Returns `true` if `destination` is still backing off at `event_time`.
    ///
    /// A destination is backing off while less than its current delay has passed since its last
    /// failure.
    #[must_use]
    pub fn is_in_backoff_since(&self, destination: &Destination, event_time: Instant) -> bool {
        self.lock()
            .map
            .get(destination)
            .is_some_and(|entry| entry.is_in_backoff_since(event_time))
    }

    /// Forgets the backoff state of `destination`.
    pub fn reset(&self, destination: &Destination) {
        self.lock().map.remove(destination);
    }

    /// Removes every destination that has been idle for longer than its stale window.
    ///
    /// Returns the number of destinations removed. Pruned destinations report a zero delay, which
    /// matches what they would report after their next failure restarted them anyway.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.instant();
        self.lock().prune(self.base_delay, now)
    }

    /// Returns the number of destinations currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Returns `true` if no destination is currently tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().expect(ERR_POISONED_LOCK)
    }

    fn record_failure(&self, destination: &Destination, outcome: Outcome) {
        let (event, delay) = {
            let mut entries = self.lock();
            let now = self.clock.instant();

            if let Some(entry) = entries.map.get_mut(destination) {
                let event = match entry.advance(self.base_delay, self.max_delay, now) {
                    Advance::Advanced => BackoffEvent::Backoff,
                    Advance::Restarted => BackoffEvent::Restart,
                };
                (event, entry.delay)
            } else {
                if entries.map.len() >= entries.prune_at {
                    entries.prune(self.base_delay, now);
                }

                let entry = BackoffEntry::new(self.base_delay, self.max_delay, now);
                entries.map.insert(destination.clone(), entry);
                (BackoffEvent::Backoff, entry.delay)
            }
        };

        self.telemetry.emit(event, destination, delay, outcome);
    }

    fn record_success(&self, destination: &Destination, outcome: Outcome) {
        if outcome.is_unexpected_status() {
            self.telemetry.emit_unexpected_status(destination, outcome);
        }

        let removed = self.lock().map.remove(destination);

        if removed.is_some() {
            self.telemetry.emit(BackoffEvent::Reset, destination, Duration::ZERO, outcome);
        }
    }
}

impl Backoff for BackoffManager {
    fn calculate_backoff(&self, destination: &Destination) -> Duration {
        if !self.is_enabled() {
            return Duration::ZERO;
        }

        self.lock().map.get(destination).map_or(Duration::ZERO, |entry| entry.delay)
    }

    fn update_backoff(&self, destination: &Destination, outcome: Outcome) {
        if !self.is_enabled() {
            return;
        }

        if outcome.is_failure() {
            self.record_failure(destination, outcome);
        } else {
            self.record_success(destination, outcome);
        }
    }
}

/// Tracked destinations and the size at which inserting a new one prunes first.
///
/// `prune_at` grows with the live entries, so a map full of active destinations is scanned once
/// per doubling rather than on every insert.
#[derive(Debug)]
struct Entries {
    map: HashMap<Destination, BackoffEntry>,
    prune_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            prune_at: PRUNE_THRESHOLD,
        }
    }
}

impl Entries {
    fn prune(&mut self, base_delay: Duration, now: Instant) -> usize {
        let before = self.map.len();
        self.map.retain(|_, entry| !entry.is_stale(base_delay, now));
        self.prune_at = self.map.len().saturating_mul(2).max(PRUNE_THRESHOLD);
        before - self.map.len()
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::StatusCode;
    use rstest::rstest;
    use tracing_test::traced_test;

    use super::*;
    use tick::ClockControl;

    static_assertions::assert_impl_all!(BackoffManager: Send, Sync, std::fmt::Debug);

    const SERVER_ERROR: Outcome = Outcome::Status(StatusCode::INTERNAL_SERVER_ERROR);

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    fn manager(base: Duration, max: Duration) -> (BackoffManager, ClockControl) {
        let control = ClockControl::new();
        (BackoffManager::new(base, max, control.to_clock()), control)
    }

    fn destination() -> Destination {
        Destination::new("https://api.example.com")
    }

    #[test]
    fn untracked_destination_has_no_delay() {
        let (manager, _) = manager(secs(1), secs(10));

        assert_eq!(manager.calculate_backoff(&destination()), Duration::ZERO);
        assert!(manager.is_empty());
    }

    #[rstest]
    #[case(1, 1)]
    #[case(2, 2)]
    #[case(3, 4)]
    #[case(4, 8)]
    #[case(5, 10)]
    #[case(12, 10)]
    fn consecutive_failures_double_until_capped(#[case] failures: usize, #[case] expected_secs: u64) {
        let (manager, _) = manager(secs(1), secs(10));

        for _ in 0..failures {
            manager.update_backoff(&destination(), SERVER_ERROR);
        }

        assert_eq!(manager.calculate_backoff(&destination()), secs(expected_secs));
    }

    #[test]
    fn delays_never_decrease_while_failing() {
        let (manager, _) = manager(Duration::from_millis(300), secs(30));
        let mut previous = Duration::ZERO;

        for _ in 0..20 {
            manager.update_backoff(&destination(), Outcome::transport_error());
            let delay = manager.calculate_backoff(&destination());
            assert!(delay >= previous);
            assert!(delay <= secs(30));
            previous = delay;
        }

        assert_eq!(previous, secs(30));
    }

    #[test]
    fn two_failures_with_two_second_cap() {
        let (manager, _) = manager(secs(1), secs(2));

        manager.update_backoff(&destination(), SERVER_ERROR);
        manager.update_backoff(&destination(), SERVER_ERROR);

        assert_eq!(manager.calculate_backoff(&destination()), secs(2));
    }

    #[rstest]
    #[case(secs(1), Duration::ZERO)]
    #[case(Duration::ZERO, secs(10))]
    #[case(Duration::ZERO, Duration::ZERO)]
    fn zero_configuration_disables_backoff(#[case] base: Duration, #[case] max: Duration) {
        let (manager, _) = manager(base, max);

        for _ in 0..5 {
            manager.update_backoff(&destination(), SERVER_ERROR);
        }

        assert!(!manager.is_enabled());
        assert_eq!(manager.calculate_backoff(&destination()), Duration::ZERO);
        assert!(manager.is_empty());
    }

    #[test]
    fn base_larger_than_max_is_clamped() {
        let (manager, _) = manager(secs(5), secs(3));

        manager.update_backoff(&destination(), SERVER_ERROR);

        assert_eq!(manager.calculate_backoff(&destination()), secs(3));
    }

    #[rstest]
    #[case(StatusCode::OK)]
    #[case(StatusCode::NO_CONTENT)]
    #[case(StatusCode::NOT_MODIFIED)]
    #[case(StatusCode::NOT_FOUND)]
    #[case(StatusCode::CONFLICT)]
    fn non_failure_resets_delay(#[case] status: StatusCode) {
        let (manager, _) = manager(secs(1), secs(10));
        manager.update_backoff(&destination(), SERVER_ERROR);
        manager.update_backoff(&destination(), SERVER_ERROR);

        manager.update_backoff(&destination(), Outcome::status(status));

        assert_eq!(manager.calculate_backoff(&destination()), Duration::ZERO);
        assert!(manager.is_empty());
    }

    #[test]
    fn failure_after_reset_starts_at_base() {
        let (manager, _) = manager(secs(1), secs(10));
        manager.update_backoff(&destination(), SERVER_ERROR);
        manager.update_backoff(&destination(), SERVER_ERROR);
        manager.update_backoff(&destination(), Outcome::status(StatusCode::OK));

        manager.update_backoff(&destination(), SERVER_ERROR);

        assert_eq!(manager.calculate_backoff(&destination()), secs(1));
    }

    #[test]
    fn destinations_are_independent() {
        let (manager, _) = manager(secs(1), secs(10));
        let other = Destination::new("https://other.example.com");

        manager.update_backoff(&destination(), SERVER_ERROR);
        manager.update_backoff(&destination(), SERVER_ERROR);
        manager.update_backoff(&other, SERVER_ERROR);

        assert_eq!(manager.calculate_backoff(&destination()), secs(2));
        assert_eq!(manager.calculate_backoff(&other), secs(1));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn failure_after_idle_gap_restarts_from_base() {
        let (manager, control) = manager(secs(1), secs(60));
        for _ in 0..4 {
            manager.update_backoff(&destination(), SERVER_ERROR);
        }
        assert_eq!(manager.calculate_backoff(&destination()), secs(8));

        control.advance(secs(17));
        manager.update_backoff(&destination(), SERVER_ERROR);

        assert_eq!(manager.calculate_backoff(&destination()), secs(1));
    }

    #[test]
    fn failure_within_stale_window_keeps_doubling() {
        let (manager, control) = manager(secs(1), secs(60));
        for _ in 0..4 {
            manager.update_backoff(&destination(), SERVER_ERROR);
        }

        control.advance(secs(16));
        manager.update_backoff(&destination(), SERVER_ERROR);

        assert_eq!(manager.calculate_backoff(&destination()), secs(16));
    }

    #[test]
    fn calculate_does_not_refresh_timestamp() {
        let (manager, control) = manager(secs(1), secs(60));
        manager.update_backoff(&destination(), SERVER_ERROR);

        for _ in 0..3 {
            control.advance(secs(1));
            _ = manager.calculate_backoff(&destination());
        }

        // Three seconds idle exceeds the two second window despite the reads in between.
        manager.update_backoff(&destination(), SERVER_ERROR);
        assert_eq!(manager.calculate_backoff(&destination()), secs(1));
    }

    #[test]
    fn in_backoff_since_tracks_last_failure() {
        let (manager, control) = manager(secs(2), secs(60));
        let clock = control.to_clock();
        assert!(!manager.is_in_backoff_since(&destination(), clock.instant()));

        manager.update_backoff(&destination(), SERVER_ERROR);
        assert!(manager.is_in_backoff_since(&destination(), clock.instant()));

        control.advance(secs(1));
        assert!(manager.is_in_backoff_since(&destination(), clock.instant()));

        control.advance(secs(1));
        assert!(!manager.is_in_backoff_since(&destination(), clock.instant()));
    }

    #[test]
    fn reset_forgets_destination() {
        let (manager, _) = manager(secs(1), secs(10));
        manager.update_backoff(&destination(), SERVER_ERROR);

        manager.reset(&destination());

        assert_eq!(manager.calculate_backoff(&destination()), Duration::ZERO);
        assert!(manager.is_empty());
    }

    #[test]
    fn prune_removes_only_stale_entries() {
        let (manager, control) = manager(secs(1), secs(60));
        let busy = Destination::new("https://busy.example.com");
        manager.update_backoff(&destination(), SERVER_ERROR);
        for _ in 0..3 {
            manager.update_backoff(&busy, SERVER_ERROR);
        }

        // The single failure goes stale after 2s, the busy destination (4s delay) after 8s.
        control.advance(secs(3));

        assert_eq!(manager.prune_expired(), 1);
        assert_eq!(manager.calculate_backoff(&destination()), Duration::ZERO);
        assert_eq!(manager.calculate_backoff(&busy), secs(4));
    }

    #[test]
    fn new_destination_prunes_when_map_is_full() {
        let (manager, control) = manager(secs(1), secs(60));
        for index in 0..PRUNE_THRESHOLD {
            manager.update_backoff(&Destination::new(format!("https://{index}.example.com")), SERVER_ERROR);
        }
        assert_eq!(manager.len(), PRUNE_THRESHOLD);

        control.advance(secs(5));
        manager.update_backoff(&destination(), SERVER_ERROR);

        assert_eq!(manager.len(), 1);
        assert_eq!(manager.calculate_backoff(&destination()), secs(1));
    }

    #[test]
    fn full_map_of_active_destinations_raises_prune_mark() {
        let (manager, control) = manager(secs(1), secs(60));
        for index in 0..PRUNE_THRESHOLD {
            manager.update_backoff(&Destination::new(format!("https://{index}.example.com")), SERVER_ERROR);
        }

        // Nothing is stale, so the scan keeps every entry and defers the next one.
        manager.update_backoff(&destination(), SERVER_ERROR);
        assert_eq!(manager.len(), PRUNE_THRESHOLD + 1);
        assert_eq!(manager.lock().prune_at, PRUNE_THRESHOLD * 2);

        // Below the raised mark, new destinations are inserted without a scan.
        control.advance(secs(5));
        manager.update_backoff(&Destination::new("https://late.example.com"), SERVER_ERROR);
        assert_eq!(manager.len(), PRUNE_THRESHOLD + 2);

        assert_eq!(manager.prune_expired(), PRUNE_THRESHOLD + 1);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.lock().prune_at, PRUNE_THRESHOLD);
    }

    #[test]
    fn accessors() {
        let (manager, _) = manager(secs(1), secs(10));

        assert_eq!(manager.base_delay(), secs(1));
        assert_eq!(manager.max_delay(), secs(10));
        assert!(manager.is_enabled());
    }

    #[test]
    fn concurrent_failures_on_one_destination() {
        const THREADS: u32 = 16;
        let (manager, _) = manager(Duration::from_millis(1), Duration::from_secs(3600));
        let manager = Arc::new(manager);

        std::thread::scope(|scope| {
            for _ in 0..THREADS {
                let manager = Arc::clone(&manager);
                scope.spawn(move || manager.update_backoff(&destination(), Outcome::transport_error()));
            }
        });

        // With time frozen every ordering of the updates lands on the same value.
        assert_eq!(
            manager.calculate_backoff(&destination()),
            Duration::from_millis(1) * 2_u32.pow(THREADS - 1)
        );
    }

    #[test]
    fn concurrent_mixed_updates_stay_within_bounds() {
        let (manager, _) = manager(secs(1), secs(8));

        std::thread::scope(|scope| {
            for index in 0..8 {
                let manager = &manager;
                scope.spawn(move || {
                    for round in 0..50 {
                        let outcome = if (index + round) % 5 == 0 {
                            Outcome::status(StatusCode::OK)
                        } else {
                            SERVER_ERROR
                        };
                        manager.update_backoff(&destination(), outcome);
                        let delay = manager.calculate_backoff(&destination());
                        assert!(delay <= secs(8));
                    }
                });
            }
        });

        let delay = manager.calculate_backoff(&destination());
        assert!([0, 1, 2, 4, 8].contains(&delay.as_secs()), "unreachable delay {delay:?}");
    }

    #[test]
    #[traced_test]
    fn logs_backoff_and_reset_when_enabled() {
        let telemetry = TelemetryHelper {
            event_reporter: None,
            logs_enabled: true,
        };
        let manager = BackoffManager::with_telemetry(secs(1), secs(10), Clock::new_frozen(), telemetry);
        let destination = Destination::new("https://logs.example.com");

        manager.update_backoff(&destination, SERVER_ERROR);
        manager.update_backoff(&destination, Outcome::status(StatusCode::UNAUTHORIZED));

        assert!(logs_contain("backoff.destination=https://logs.example.com"));
        assert!(logs_contain("backoff.delay=1"));
        assert!(logs_contain("backoff.outcome=500"));
        assert!(logs_contain("backoff.status=401"));
        assert!(logs_contain("backoff.outcome=401"));
    }

    #[test]
    #[traced_test]
    fn logs_restart_after_idle_gap() {
        let control = ClockControl::new();
        let telemetry = TelemetryHelper {
            event_reporter: None,
            logs_enabled: true,
        };
        let manager = BackoffManager::with_telemetry(secs(1), secs(10), control.to_clock(), telemetry);
        let destination = Destination::new("https://restart.example.com");

        manager.update_backoff(&destination, SERVER_ERROR);
        control.advance(secs(3));
        manager.update_backoff(&destination, Outcome::transport_error());

        assert!(logs_contain("backoff.outcome=transport error"));
        assert_eq!(manager.calculate_backoff(&destination), secs(1));
    }
}
