// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use tick::Clock;

use crate::telemetry::TelemetryHelper;
use crate::{BackoffConfig, BackoffManager, NullBackoffManager, SharedBackoff};

/// Builds backoff managers from configuration.
///
/// The factory carries the dependencies shared by every manager it builds: the clock and the
/// telemetry settings. Configuration that cannot enable backoff never fails the build; the factory
/// returns a [`NullBackoffManager`] instead, so a misconfigured client keeps working without
/// backoff.
///
/// Building is free of side effects beyond the returned manager. Every call returns a manager with
/// its own, empty state.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use tick::Clock;
/// use url_backoff::{Backoff, BackoffConfig, Destination, ManagerFactory, Outcome};
///
/// let factory = ManagerFactory::new(Clock::new_frozen());
/// let destination = Destination::new("https://api.example.com");
///
/// let enabled = factory.build(&BackoffConfig::parse(Some("1"), Some("2")));
/// enabled.update_backoff(&destination, Outcome::transport_error());
/// assert_eq!(enabled.calculate_backoff(&destination), Duration::from_secs(1));
///
/// let disabled = factory.build(&BackoffConfig::parse(Some("1"), None));
/// disabled.update_backoff(&destination, Outcome::transport_error());
/// assert_eq!(disabled.calculate_backoff(&destination), Duration::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct ManagerFactory {
    clock: Clock,
    #[cfg(any(feature = "metrics", test))]
    meter: Option<opentelemetry::metrics::Meter>,
    logs_enabled: bool,
}

impl ManagerFactory {
    /// Creates a factory whose managers read time from `clock`.
    #[must_use]
    pub fn new(clock: impl AsRef<Clock>) -> Self {
        Self {
            clock: clock.as_ref().clone(),
            #[cfg(any(feature = "metrics", test))]
            meter: None,
            logs_enabled: false,
        }
    }

    /// Enable metrics reporting with the given OpenTelemetry meter provider.
    #[must_use]
    #[cfg(any(feature = "metrics", test))]
    pub fn enable_metrics(self, provider: &dyn opentelemetry::metrics::MeterProvider) -> Self {
        Self {
            meter: Some(crate::metrics::create_meter(provider)),
            ..self
        }
    }

    /// Enable structured logging for backoff events.
    #[must_use]
    #[cfg(any(feature = "logs", test))]
    pub fn enable_logs(self) -> Self {
        Self {
            logs_enabled: true,
            ..self
        }
    }

    /// Builds the manager described by `config`.
    ///
    /// Returns a [`BackoffManager`] when both delays are set and non-zero, and a
    /// [`NullBackoffManager`] otherwise.
    #[must_use]
    pub fn build(&self, config: &BackoffConfig) -> SharedBackoff {
        match self.build_manager(config) {
            Some(manager) => Arc::new(manager),
            None => Arc::new(NullBackoffManager::new()),
        }
    }

    /// Builds a [`BackoffManager`] if `config` enables backoff.
    ///
    /// Use this instead of [`build`][Self::build] to reach the operations that only a tracking
    /// manager offers, such as [`BackoffManager::prune_expired`].
    #[must_use]
    pub fn build_manager(&self, config: &BackoffConfig) -> Option<BackoffManager> {
        let telemetry = self.create_telemetry();

        match config.enabled_delays() {
            Ok((base_delay, max_delay)) => Some(BackoffManager::with_telemetry(
                base_delay,
                max_delay,
                self.clock.clone(),
                telemetry,
            )),
            Err(reason) => {
                telemetry.emit_config_ignored(reason);
                None
            }
        }
    }

    fn create_telemetry(&self) -> TelemetryHelper {
        TelemetryHelper {
            #[cfg(any(feature = "metrics", test))]
            event_reporter: self.meter.as_ref().map(crate::metrics::create_backoff_event_counter),
            logs_enabled: self.logs_enabled,
        }
    }
}
