// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::{Destination, Outcome};

/// Attribute key for the kind of backoff event being reported.
#[cfg(any(feature = "metrics", test))]
pub(crate) const EVENT_NAME: &str = "backoff.event.name";

/// Attribute key for the destination an event applies to.
#[cfg(any(feature = "metrics", test))]
pub(crate) const DESTINATION: &str = "backoff.destination";

/// A change to the backoff state of a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackoffEvent {
    /// A failure advanced the delay.
    Backoff,
    /// A failure arrived after the entry went stale; the delay started over.
    Restart,
    /// A non-failure outcome cleared the delay.
    Reset,
}

impl BackoffEvent {
    #[cfg(any(feature = "metrics", test))]
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Backoff => "backoff",
            Self::Restart => "restart",
            Self::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TelemetryHelper {
    #[cfg(any(feature = "metrics", test))]
    pub(crate) event_reporter: Option<opentelemetry::metrics::Counter<u64>>,
    pub(crate) logs_enabled: bool,
}

impl TelemetryHelper {
    #[cfg(test)]
    pub(crate) fn metrics_enabled(&self) -> bool {
        self.event_reporter.is_some()
    }

    #[cfg_attr(
        not(any(feature = "logs", feature = "metrics", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when logs nor metrics are used")
    )]
    #[cfg_attr(
        all(feature = "metrics", not(any(feature = "logs", test))),
        expect(unused_variables, reason = "delay and outcome are only logged")
    )]
    pub(crate) fn emit(&self, event: BackoffEvent, destination: &Destination, delay: Duration, outcome: Outcome) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            match event {
                BackoffEvent::Backoff => tracing::event!(
                    name: "url_backoff.backoff",
                    tracing::Level::WARN,
                    backoff.destination = %destination,
                    backoff.delay = delay.as_secs_f32(),
                    backoff.outcome = %outcome,
                ),
                BackoffEvent::Restart => tracing::event!(
                    name: "url_backoff.restart",
                    tracing::Level::DEBUG,
                    backoff.destination = %destination,
                    backoff.delay = delay.as_secs_f32(),
                    backoff.outcome = %outcome,
                ),
                BackoffEvent::Reset => tracing::event!(
                    name: "url_backoff.reset",
                    tracing::Level::DEBUG,
                    backoff.destination = %destination,
                    backoff.outcome = %outcome,
                ),
            }
        }

        #[cfg(any(feature = "metrics", test))]
        if let Some(reporter) = &self.event_reporter {
            reporter.add(
                1,
                &[
                    opentelemetry::KeyValue::new(EVENT_NAME, event.as_str()),
                    opentelemetry::KeyValue::new(DESTINATION, destination.to_string()),
                ],
            );
        }
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when logs feature not used")
    )]
    pub(crate) fn emit_unexpected_status(&self, destination: &Destination, outcome: Outcome) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            tracing::event!(
                name: "url_backoff.unexpected_status",
                tracing::Level::DEBUG,
                backoff.destination = %destination,
                backoff.status = %outcome,
            );
        }
    }

    #[cfg_attr(
        not(any(feature = "logs", test)),
        expect(unused_variables, clippy::unused_self, reason = "unused when logs feature not used")
    )]
    pub(crate) fn emit_config_ignored(&self, reason: &str) {
        #[cfg(any(feature = "logs", test))]
        if self.logs_enabled {
            tracing::event!(
                name: "url_backoff.config_ignored",
                tracing::Level::WARN,
                backoff.error = reason,
            );
        }
    }
}
