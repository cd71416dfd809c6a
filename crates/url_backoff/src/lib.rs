// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Per-destination exponential backoff tracking for HTTP clients.
//!
//! # Why
//!
//! A client that keeps hammering an overloaded service makes the overload worse. This crate
//! remembers, for every destination a client talks to, how long the client should wait before its
//! next attempt. The wait grows exponentially while a destination keeps failing and disappears once
//! the destination answers successfully again.
//!
//! The crate only computes durations. Sleeping, cancellation and retry limits stay with the caller.
//! Managers read monotonic time from a [`tick::Clock`], so tests can move time forward with
//! `tick::ClockControl` instead of waiting.
//!
//! # Core Types
//!
//! - [`Backoff`]: The contract shared by every manager. Call [`Backoff::calculate_backoff`] before
//!   an attempt and [`Backoff::update_backoff`] after it.
//! - [`BackoffManager`]: Tracks exponential delays per [`Destination`].
//! - [`NullBackoffManager`]: Never delays. Used when backoff is disabled.
//! - [`ManagerFactory`]: Builds the right manager from a [`BackoffConfig`].
//! - [`Outcome`]: The result of one attempt, either an HTTP status or a transport error.
//!
//! # Quick Start
//!
//! ```rust
//! use std::time::Duration;
//!
//! use http::StatusCode;
//! use tick::runtime::InactiveClock;
//! use url_backoff::{Backoff, BackoffConfig, Destination, ManagerFactory, Outcome};
//!
//! // Only timers need the driver; reading the time does not.
//! let (clock, _driver) = InactiveClock::default().activate();
//!
//! let config = BackoffConfig::new()
//!     .base_delay(Duration::from_secs(1))
//!     .max_delay(Duration::from_secs(2));
//! let backoff = ManagerFactory::new(&clock).build(&config);
//!
//! let destination: Destination = "https://api.example.com/v1/pods".parse()?;
//!
//! backoff.update_backoff(&destination, Outcome::status(StatusCode::SERVICE_UNAVAILABLE));
//! backoff.update_backoff(&destination, Outcome::transport_error());
//! assert_eq!(backoff.calculate_backoff(&destination), Duration::from_secs(2));
//!
//! backoff.update_backoff(&destination, Outcome::status(StatusCode::OK));
//! assert_eq!(backoff.calculate_backoff(&destination), Duration::ZERO);
//! # Ok::<(), url_backoff::DestinationError>(())
//! ```
//!
//! # Disabling Backoff
//!
//! A configuration with a missing value, an unparsable value or a zero maximum delay produces a
//! [`NullBackoffManager`]. Call sites keep the same code path either way.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use tick::Clock;
//! use url_backoff::{Backoff, BackoffConfig, Destination, ManagerFactory, Outcome};
//!
//! let config = BackoffConfig::parse(Some("1"), Some("0"));
//! let backoff = ManagerFactory::new(&Clock::new_frozen()).build(&config);
//! let destination = Destination::new("https://api.example.com");
//!
//! backoff.update_backoff(&destination, Outcome::transport_error());
//! assert_eq!(backoff.calculate_backoff(&destination), Duration::ZERO);
//! ```
//!
//! # Features
//!
//! - `logs`: Emits `tracing` events for backoff decisions when `ManagerFactory::enable_logs` is used.
//! - `metrics`: Reports backoff events through OpenTelemetry when `ManagerFactory::enable_metrics` is used.
//! - `serde`: Serialization support for [`BackoffConfig`].
//! - `test-util`: Enables `tick/test-util`, so `tick::ClockControl` can drive the clock of a manager.

mod backoff;
mod config;
mod constants;
mod destination;
mod entry;
mod factory;
mod manager;
#[cfg(any(feature = "metrics", test))]
mod metrics;
mod null;
mod outcome;
mod telemetry;

pub use backoff::{Backoff, SharedBackoff};
pub use config::{BackoffConfig, ConfigError, parse_seconds};
pub use constants::{ENV_BACKOFF_BASE, ENV_BACKOFF_DURATION, PRUNE_THRESHOLD};
pub use destination::{Destination, DestinationError};
pub use factory::ManagerFactory;
pub use manager::BackoffManager;
pub use null::NullBackoffManager;
pub use outcome::Outcome;
