// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::{Destination, Outcome};

/// A backoff manager shared between the attempts of a client.
pub type SharedBackoff = Arc<dyn Backoff>;

/// Tracks how long a client must wait before its next attempt to a destination.
///
/// Callers follow a simple protocol around every outbound attempt:
///
/// 1. Ask [`calculate_backoff`][Backoff::calculate_backoff] for the current delay and, if it is
///    non-zero, wait that long before sending.
/// 2. Report the result through [`update_backoff`][Backoff::update_backoff].
///
/// Implementations never sleep or perform I/O. Both operations are safe to call concurrently for
/// the same or different destinations.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use url_backoff::{Backoff, Destination, NullBackoffManager, Outcome};
///
/// fn before_attempt(backoff: &dyn Backoff, destination: &Destination) -> Duration {
///     backoff.calculate_backoff(destination)
/// }
///
/// let backoff = NullBackoffManager::new();
/// let destination = Destination::new("https://api.example.com");
/// backoff.update_backoff(&destination, Outcome::transport_error());
/// assert_eq!(before_attempt(&backoff, &destination), Duration::ZERO);
/// ```
pub trait Backoff: Debug + Send + Sync {
    /// Returns the delay the caller must wait before the next attempt to `destination`.
    ///
    /// Returns [`Duration::ZERO`] for destinations that have never failed. This is a pure read.
    fn calculate_backoff(&self, destination: &Destination) -> Duration;

    /// Records the outcome of one attempt to `destination`.
    fn update_backoff(&self, destination: &Destination, outcome: Outcome);
}

impl<T: Backoff + ?Sized> Backoff for Arc<T> {
    fn calculate_backoff(&self, destination: &Destination) -> Duration {
        (**self).calculate_backoff(destination)
    }

    fn update_backoff(&self, destination: &Destination, outcome: Outcome) {
        (**self).update_backoff(destination, outcome);
    }
}
